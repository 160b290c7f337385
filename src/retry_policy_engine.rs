//! Retry Policy Engine (C6, §4.6).
//!
//! Classifies an `(http_status, error)` pair into an [`ErrorCategory`], and
//! computes backoff delay with jitter and `Retry-After` honoring. Pure
//! logic, no I/O — the lookup of the per-category [`RetryPolicy`] row is
//! the caller's (C7's) job via `crate::repository`.

use chrono::{DateTime, Utc};
use rand::Rng;

use crate::models::{BackoffStrategy, ErrorCategory};

/// A classifiable failure: an HTTP status and/or a free-form error kind
/// describing the underlying exception, as C9/C10 would report it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Timeout,
    Network,
    Parse,
    Validation,
    Other,
}

/// Classify `(http_status, error_kind)` into an [`ErrorCategory`] (§4.6
/// step 1/2).
pub fn classify(http_status: Option<u16>, error_kind: Option<ErrorKind>) -> ErrorCategory {
    if let Some(status) = http_status {
        return match status {
            404 => ErrorCategory::NotFound,
            401 | 403 => ErrorCategory::AuthError,
            408 => ErrorCategory::Timeout,
            429 => ErrorCategory::RateLimit,
            500..=599 => ErrorCategory::ServerError,
            400..=499 => ErrorCategory::ClientError,
            _ => ErrorCategory::Unknown,
        };
    }

    match error_kind {
        Some(ErrorKind::Timeout) => ErrorCategory::Timeout,
        Some(ErrorKind::Network) => ErrorCategory::NetworkError,
        Some(ErrorKind::Parse) => ErrorCategory::ParseError,
        Some(ErrorKind::Validation) => ErrorCategory::ValidationError,
        _ => ErrorCategory::Unknown,
    }
}

/// A server-directed retry delay, parsed from a `Retry-After` header.
#[derive(Debug, Clone, Copy)]
pub enum RetryAfter {
    Seconds(u64),
    At(DateTime<Utc>),
}

impl RetryAfter {
    /// Parse an HTTP `Retry-After` header value: either an integer number
    /// of seconds or an HTTP-date.
    pub fn parse(value: &str) -> Option<Self> {
        if let Ok(secs) = value.trim().parse::<u64>() {
            return Some(RetryAfter::Seconds(secs));
        }
        DateTime::parse_from_rfc2822(value.trim())
            .ok()
            .map(|dt| RetryAfter::At(dt.with_timezone(&Utc)))
    }

    fn seconds_from(&self, now: DateTime<Utc>) -> u64 {
        match self {
            RetryAfter::Seconds(s) => *s,
            RetryAfter::At(at) => (*at - now).num_seconds().max(0) as u64,
        }
    }
}

const JITTER_PERCENT: f64 = 0.20;

/// Compute the backoff delay for attempt `n` (1-indexed) under `strategy`
/// (§4.6). `apply_jitter` defaults to `true` in every caller per the
/// original's "always use jitter to avoid thundering herd" comment.
#[allow(clippy::too_many_arguments)]
pub fn calculate_backoff(
    strategy: BackoffStrategy,
    attempt: u32,
    initial_delay_seconds: u32,
    max_delay_seconds: u32,
    multiplier: f64,
    apply_jitter: bool,
    retry_after: Option<RetryAfter>,
    now: DateTime<Utc>,
) -> u64 {
    let initial = initial_delay_seconds as f64;
    let max = max_delay_seconds as f64;
    let n = attempt.max(1) as i32;

    let base = match strategy {
        BackoffStrategy::Exponential => initial * multiplier.powi(n - 1),
        BackoffStrategy::Linear => initial * n as f64,
        BackoffStrategy::Fixed => initial,
    }
    .min(max);

    let mut delay = base;
    if apply_jitter && delay > 0.0 {
        let mut rng = rand::thread_rng();
        let factor = rng.gen_range((1.0 - JITTER_PERCENT)..=(1.0 + JITTER_PERCENT));
        delay = (delay * factor).clamp(0.0, max);
    }

    let mut delay_secs = delay.round().max(0.0) as u64;

    if let Some(retry_after) = retry_after {
        delay_secs = delay_secs.max(retry_after.seconds_from(now));
    }

    delay_secs
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn classify_maps_http_status_codes() {
        assert_eq!(classify(Some(404), None), ErrorCategory::NotFound);
        assert_eq!(classify(Some(401), None), ErrorCategory::AuthError);
        assert_eq!(classify(Some(403), None), ErrorCategory::AuthError);
        assert_eq!(classify(Some(408), None), ErrorCategory::Timeout);
        assert_eq!(classify(Some(429), None), ErrorCategory::RateLimit);
        assert_eq!(classify(Some(503), None), ErrorCategory::ServerError);
        assert_eq!(classify(Some(418), None), ErrorCategory::ClientError);
        assert_eq!(classify(Some(101), None), ErrorCategory::Unknown);
        assert_eq!(classify(Some(302), None), ErrorCategory::Unknown);
    }

    #[test]
    fn classify_maps_error_kinds_without_status() {
        assert_eq!(classify(None, Some(ErrorKind::Timeout)), ErrorCategory::Timeout);
        assert_eq!(
            classify(None, Some(ErrorKind::Network)),
            ErrorCategory::NetworkError
        );
        assert_eq!(classify(None, Some(ErrorKind::Parse)), ErrorCategory::ParseError);
        assert_eq!(
            classify(None, Some(ErrorKind::Validation)),
            ErrorCategory::ValidationError
        );
        assert_eq!(classify(None, None), ErrorCategory::Unknown);
    }

    #[test]
    fn exponential_backoff_without_jitter_doubles_each_attempt() {
        let now = Utc::now();
        let d1 = calculate_backoff(BackoffStrategy::Exponential, 1, 2, 600, 2.0, false, None, now);
        let d2 = calculate_backoff(BackoffStrategy::Exponential, 2, 2, 600, 2.0, false, None, now);
        let d3 = calculate_backoff(BackoffStrategy::Exponential, 3, 2, 600, 2.0, false, None, now);
        assert_eq!(d1, 2);
        assert_eq!(d2, 4);
        assert_eq!(d3, 8);
    }

    #[test]
    fn exponential_backoff_is_capped_at_max_delay() {
        let now = Utc::now();
        let d = calculate_backoff(BackoffStrategy::Exponential, 20, 2, 60, 2.0, false, None, now);
        assert_eq!(d, 60);
    }

    #[test]
    fn linear_backoff_scales_with_attempt() {
        let now = Utc::now();
        let d = calculate_backoff(BackoffStrategy::Linear, 3, 5, 1000, 1.0, false, None, now);
        assert_eq!(d, 15);
    }

    #[test]
    fn fixed_backoff_ignores_attempt_number() {
        let now = Utc::now();
        let d1 = calculate_backoff(BackoffStrategy::Fixed, 1, 10, 1000, 1.0, false, None, now);
        let d5 = calculate_backoff(BackoffStrategy::Fixed, 5, 10, 1000, 1.0, false, None, now);
        assert_eq!(d1, 10);
        assert_eq!(d5, 10);
    }

    #[test]
    fn jitter_stays_within_twenty_percent() {
        let now = Utc::now();
        for attempt in 1..5 {
            let base =
                calculate_backoff(BackoffStrategy::Exponential, attempt, 10, 600, 2.0, false, None, now);
            let jittered =
                calculate_backoff(BackoffStrategy::Exponential, attempt, 10, 600, 2.0, true, None, now);
            if base > 0 {
                let diff = (jittered as f64 - base as f64).abs() / base as f64;
                assert!(diff <= 0.21, "diff {diff} exceeded 20% jitter bound");
            }
        }
    }

    #[test]
    fn retry_after_seconds_wins_when_larger_than_computed_delay() {
        let now = Utc::now();
        let d = calculate_backoff(
            BackoffStrategy::Fixed,
            1,
            2,
            600,
            1.0,
            false,
            Some(RetryAfter::Seconds(120)),
            now,
        );
        assert_eq!(d, 120);
    }

    #[test]
    fn computed_delay_wins_when_larger_than_retry_after() {
        let now = Utc::now();
        let d = calculate_backoff(
            BackoffStrategy::Fixed,
            1,
            200,
            600,
            1.0,
            false,
            Some(RetryAfter::Seconds(5)),
            now,
        );
        assert_eq!(d, 200);
    }

    #[test]
    fn parses_retry_after_as_seconds_or_http_date() {
        assert!(matches!(RetryAfter::parse("120"), Some(RetryAfter::Seconds(120))));
        assert!(RetryAfter::parse("Wed, 21 Oct 2015 07:28:00 GMT").is_some());
        assert!(RetryAfter::parse("not a valid value").is_none());
    }
}
