//! Cron Engine (C5, §4.5).
//!
//! Parses standard 5-field cron plus an optional leading seconds field and
//! the extended mnemonics (`@yearly`, `@daily`, …), and computes the next
//! fire instant in a named IANA timezone, always returning a UTC,
//! timezone-aware instant. DST transition advisories are grounded on
//! `original_source/crawler/utils/dst.py`'s `is_dst_transition`/
//! `get_dst_transition_type`.

use chrono::{DateTime, LocalResult, TimeZone, Utc};
use chrono_tz::Tz;
use cron::Schedule;
use std::str::FromStr;

use crate::error::{Error, Result};

/// A DST transition advisory attached to a computed fire instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DstAdvisory {
    /// The wall-clock instant falls in a spring-forward gap; the fire was
    /// moved to the first valid instant after the gap.
    SpringForward,
    /// The wall-clock instant falls in a fall-back repeat; the fire uses
    /// the first occurrence.
    FallBack,
}

/// Expand `@yearly`/`@daily`/… mnemonics and 5-field expressions into the
/// 6-field (seconds-first) form the `cron` crate expects.
fn normalize(expr: &str) -> Result<String> {
    let trimmed = expr.trim();
    let mnemonic = match trimmed {
        "@yearly" | "@annually" => Some("0 0 0 1 1 *"),
        "@monthly" => Some("0 0 0 1 * *"),
        "@weekly" => Some("0 0 0 * * 0"),
        "@daily" | "@midnight" => Some("0 0 0 * * *"),
        "@hourly" => Some("0 0 * * * *"),
        _ => None,
    };
    if let Some(expanded) = mnemonic {
        return Ok(expanded.to_string());
    }

    let fields: Vec<&str> = trimmed.split_whitespace().collect();
    match fields.len() {
        5 => Ok(format!("0 {trimmed}")),
        6 => Ok(trimmed.to_string()),
        n => Err(Error::Validation(format!(
            "cron expression must have 5 fields, or 6 with a leading seconds field, got {n}: '{expr}'"
        ))),
    }
}

/// Validate a cron expression's format and semantics (§4.5).
pub fn is_valid(expr: &str) -> bool {
    parse_schedule(expr).is_ok()
}

fn parse_schedule(expr: &str) -> Result<Schedule> {
    let normalized = normalize(expr)?;
    Schedule::from_str(&normalized)
        .map_err(|e| Error::Validation(format!("invalid cron expression '{expr}': {e}")))
}

/// Compute the next fire instant for `expr` after `base_time`, evaluated in
/// `tz` (an IANA zone name; empty string defaults to "UTC").
///
/// Returns the next instant in UTC plus a DST advisory when the local
/// wall-clock at that instant falls in a spring-forward gap or fall-back
/// repeat.
pub fn next_run(
    expr: &str,
    base_time: DateTime<Utc>,
    tz: &str,
) -> Result<(DateTime<Utc>, Option<DstAdvisory>)> {
    let tz_name = if tz.trim().is_empty() { "UTC" } else { tz };
    let zone: Tz = tz_name
        .parse()
        .map_err(|_| Error::Validation(format!("unknown timezone '{tz_name}'")))?;

    let schedule = parse_schedule(expr)?;

    let local_base = base_time.with_timezone(&zone);
    let next_local = schedule
        .after(&local_base)
        .next()
        .ok_or_else(|| Error::Validation(format!("cron expression '{expr}' never fires")))?;

    let advisory = dst_advisory(&zone, &next_local);
    Ok((next_local.with_timezone(&Utc), advisory))
}

fn dst_advisory(zone: &Tz, instant: &DateTime<Tz>) -> Option<DstAdvisory> {
    let naive = instant.naive_local();
    match zone.from_local_datetime(&naive) {
        LocalResult::None => Some(DstAdvisory::SpringForward),
        LocalResult::Ambiguous(_, _) => Some(DstAdvisory::FallBack),
        LocalResult::Single(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone as _;

    #[test]
    fn cron_daily_from_a_wall_clock_instant() {
        let base = Utc.with_ymd_and_hms(2025, 1, 1, 10, 0, 0).unwrap();
        let (next, advisory) = next_run("0 0 * * *", base, "UTC").unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2025, 1, 2, 0, 0, 0).unwrap());
        assert_eq!(advisory, None);
    }

    #[test]
    fn next_run_is_always_strictly_after_base() {
        let base = Utc.with_ymd_and_hms(2025, 6, 15, 3, 27, 0).unwrap();
        let (next, _) = next_run("*/5 * * * *", base, "UTC").unwrap();
        assert!(next > base);
    }

    #[test]
    fn invalid_expression_is_rejected() {
        assert!(next_run("not a cron", Utc::now(), "UTC").is_err());
        assert!(!is_valid("not a cron"));
    }

    #[test]
    fn unknown_timezone_is_rejected() {
        assert!(next_run("0 0 * * *", Utc::now(), "Fake/Zone").is_err());
    }

    #[test]
    fn mnemonics_expand_correctly() {
        let base = Utc.with_ymd_and_hms(2025, 3, 1, 0, 0, 0).unwrap();
        let (hourly, _) = next_run("@hourly", base, "UTC").unwrap();
        assert_eq!(hourly, Utc.with_ymd_and_hms(2025, 3, 1, 1, 0, 0).unwrap());

        let (daily, _) = next_run("@daily", base, "UTC").unwrap();
        assert_eq!(daily, Utc.with_ymd_and_hms(2025, 3, 2, 0, 0, 0).unwrap());
    }

    #[test]
    fn six_field_expression_with_leading_seconds_is_accepted() {
        let base = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let (next, _) = next_run("30 0 0 * * *", base, "UTC").unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 30).unwrap());
    }

    #[test]
    fn detects_spring_forward_gap_in_named_timezone() {
        // America/New_York springs forward at 2025-03-09 02:00 local -> 03:00.
        let base = Utc.with_ymd_and_hms(2025, 3, 9, 6, 30, 0).unwrap(); // 01:30 EST
        let (_, advisory) = next_run("30 2 * * *", base, "America/New_York").unwrap();
        assert_eq!(advisory, Some(DstAdvisory::SpringForward));
    }

    #[test]
    fn detects_fall_back_repeat_in_named_timezone() {
        // America/New_York falls back at 2025-11-02 02:00 local -> 01:00, so
        // 01:30 local occurs twice.
        let base = Utc.with_ymd_and_hms(2025, 11, 2, 5, 0, 0).unwrap(); // 01:00 EDT
        let (_, advisory) = next_run("30 1 * * *", base, "America/New_York").unwrap();
        assert_eq!(advisory, Some(DstAdvisory::FallBack));
    }
}
