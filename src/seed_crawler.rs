//! Seed-URL Crawler (C9, §4.9).
//!
//! Fetches one seed page, extracts detail URLs, and drives pagination
//! (when configured) until a stop condition fires. Grounded on
//! `original_source/crawler/services/seed_crawler.py`
//! (`crawl`, `generate_with_stop_detection`, `_determine_pagination_strategy`)
//! and the teacher's `scrapers/` extraction pipeline for the
//! fetch-then-extract shape, narrowed here to the `HttpFetcher`/
//! `HtmlExtractor` trait boundary so this module never touches `reqwest`
//! or `scraper` directly.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use serde::Deserialize;
use url::Url;
use uuid::Uuid;

use crate::cancellation::CancellationSignal;
use crate::canonical::{self, CanonicalizeOptions};
use crate::dedup_cache::DedupCache;
use crate::html_extractor::HtmlExtractor;
use crate::http_fetcher::HttpFetcher;
use crate::models::CrawlOutcome;

/// Required selector key (§4.9 step 1): the set of URLs to a detail page.
pub const DETAIL_URLS_KEY: &str = "detail_urls";
/// Conventional container-selector key (§4.9 step 1).
pub const CONTAINER_KEY: &str = "container";

/// How to advance from one page to the next.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaginationType {
    PageBased,
    Offset,
    Cursor,
    Disabled,
}

/// Pagination knobs (§4.9 steps 4 and 6).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PaginationConfig {
    pub pagination_type: PaginationType,
    /// Query parameter carrying the page number (`page_based`).
    pub page_param: String,
    /// Query parameter carrying the offset (`offset`).
    pub offset_param: String,
    pub page_size: u32,
    /// Page number the seed URL itself represents; the generator starts
    /// one page past this.
    pub start_page: u32,
    pub max_pages: u32,
    /// Pages with less content than this count toward the empty-page run.
    pub min_content_length: usize,
    pub consecutive_empty_limit: u32,
    /// CSS selector for a "next page" link, used by `cursor`-style
    /// (selector-based) pagination.
    pub next_page_selector: Option<String>,
}

impl Default for PaginationConfig {
    fn default() -> Self {
        Self {
            pagination_type: PaginationType::Disabled,
            page_param: "page".to_string(),
            offset_param: "offset".to_string(),
            page_size: 20,
            start_page: 1,
            max_pages: 50,
            min_content_length: 0,
            consecutive_empty_limit: 3,
            next_page_selector: None,
        }
    }
}

/// The step definition C9 executes: selectors plus optional pagination.
#[derive(Debug, Clone, Deserialize)]
pub struct StepConfig {
    pub selectors: HashMap<String, String>,
    pub pagination: Option<PaginationConfig>,
}

impl StepConfig {
    /// §4.9 step 1.
    fn validate(&self) -> Result<(), ()> {
        if !self.selectors.contains_key(DETAIL_URLS_KEY) {
            return Err(());
        }
        Ok(())
    }
}

/// Inputs to one [`crawl`] call (§4.9 entry point).
pub struct CrawlConfig<'a> {
    pub step: StepConfig,
    pub job_id: Option<Uuid>,
    pub request_timeout: Duration,
    pub dedup_cache: Option<&'a DedupCache<'a>>,
    pub cancellation: Option<&'a CancellationSignal<'a>>,
}

/// Result of one [`crawl`] call (§4.9).
#[derive(Debug, Clone)]
pub struct CrawlResult {
    pub outcome: CrawlOutcome,
    pub urls: Vec<String>,
    pub warnings: Vec<String>,
}

/// A page yielded by the pagination generator, or the reason it stopped.
enum PageEvent {
    Page { url: String, status: u16, content: bytes::Bytes },
    Stop(StopReason),
}

#[derive(Debug, Clone, Copy)]
enum StopReason {
    MaxPages,
    EmptyPages,
    ServerOrNetworkError,
    Circular,
    NoFurtherPages,
}

struct PaginationState {
    next_page_num: u32,
    seen_urls: HashSet<String>,
    pages_yielded: u32,
    consecutive_empty: u32,
    prev_html: Option<String>,
    pending_stop: Option<StopReason>,
    done: bool,
}

/// §4.9 step 1: validate, rejecting configs that use a synonym key
/// (`urls`, `links`) instead of the required `detail_urls`.
fn validate_config(step: &StepConfig) -> bool {
    step.validate().is_ok()
}

/// §4.9 step 4: pick a pagination strategy from config and the seed URL
/// shape. Returns the resolved config plus any warning to surface.
fn determine_pagination(
    pagination: Option<&PaginationConfig>,
    seed_url: &Url,
) -> (PaginationConfig, Option<String>) {
    let Some(cfg) = pagination else {
        return (PaginationConfig::default(), None);
    };

    if cfg.pagination_type == PaginationType::Cursor && cfg.next_page_selector.is_none() {
        return (
            PaginationConfig {
                pagination_type: PaginationType::Disabled,
                ..cfg.clone()
            },
            Some("pagination_selector_not_found".to_string()),
        );
    }

    let mut resolved = cfg.clone();
    if matches!(cfg.pagination_type, PaginationType::PageBased | PaginationType::Offset) {
        if let Some((_, value)) = seed_url
            .query_pairs()
            .find(|(k, _)| k == cfg.page_param.as_str())
        {
            if let Ok(current) = value.parse::<u32>() {
                resolved.start_page = current;
            }
        }
    }
    (resolved, None)
}

/// Builds the URL for the next page given the pagination state, or
/// `None` when pagination has nothing left to generate (`Disabled`, or
/// `Cursor` with no further selector match).
fn next_page_url(
    seed_url: &Url,
    config: &PaginationConfig,
    state: &PaginationState,
    extractor: &dyn HtmlExtractor,
) -> Option<String> {
    match config.pagination_type {
        PaginationType::Disabled => None,
        PaginationType::PageBased => {
            let mut url = seed_url.clone();
            let page = state.next_page_num;
            let pairs: Vec<(String, String)> = url
                .query_pairs()
                .filter(|(k, _)| k != config.page_param.as_str())
                .map(|(k, v)| (k.into_owned(), v.into_owned()))
                .collect();
            let mut query = pairs
                .iter()
                .map(|(k, v)| format!("{k}={v}"))
                .collect::<Vec<_>>();
            query.push(format!("{}={}", config.page_param, page));
            url.set_query(Some(&query.join("&")));
            Some(url.to_string())
        }
        PaginationType::Offset => {
            let mut url = seed_url.clone();
            let offset = (state.next_page_num.saturating_sub(1)) * config.page_size;
            let pairs: Vec<(String, String)> = url
                .query_pairs()
                .filter(|(k, _)| k != config.offset_param.as_str())
                .map(|(k, v)| (k.into_owned(), v.into_owned()))
                .collect();
            let mut query = pairs
                .iter()
                .map(|(k, v)| format!("{k}={v}"))
                .collect::<Vec<_>>();
            query.push(format!("{}={}", config.offset_param, offset));
            url.set_query(Some(&query.join("&")));
            Some(url.to_string())
        }
        PaginationType::Cursor => {
            let selector = config.next_page_selector.as_ref()?;
            let html = state.prev_html.as_ref()?;
            let candidates = extractor.extract_links(html, selector, seed_url).ok()?;
            candidates.into_iter().next()
        }
    }
}

/// §4.9 step 6: advance the pagination state by one page, honoring all
/// four stop conditions.
async fn next_pagination_event(
    seed_url: &Url,
    config: &PaginationConfig,
    state: &mut PaginationState,
    fetcher: &dyn HttpFetcher,
    extractor: &dyn HtmlExtractor,
) -> Option<PageEvent> {
    if state.done {
        return None;
    }
    if let Some(reason) = state.pending_stop.take() {
        state.done = true;
        return Some(PageEvent::Stop(reason));
    }
    if state.pages_yielded >= config.max_pages {
        state.done = true;
        return Some(PageEvent::Stop(StopReason::MaxPages));
    }

    let Some(url) = next_page_url(seed_url, config, state, extractor) else {
        state.done = true;
        return Some(PageEvent::Stop(StopReason::NoFurtherPages));
    };

    if state.seen_urls.contains(&url) {
        state.done = true;
        return Some(PageEvent::Stop(StopReason::Circular));
    }
    state.seen_urls.insert(url.clone());
    state.next_page_num += 1;

    match fetcher.fetch(&url).await {
        Ok(resp) if resp.status >= 500 => {
            state.done = true;
            Some(PageEvent::Stop(StopReason::ServerOrNetworkError))
        }
        Ok(resp) => {
            state.pages_yielded += 1;
            if resp.body.len() < config.min_content_length {
                state.consecutive_empty += 1;
            } else {
                state.consecutive_empty = 0;
            }
            if state.consecutive_empty >= config.consecutive_empty_limit {
                state.pending_stop = Some(StopReason::EmptyPages);
            }
            state.prev_html = Some(String::from_utf8_lossy(&resp.body).to_string());
            Some(PageEvent::Page {
                url,
                status: resp.status,
                content: resp.body,
            })
        }
        Err(_) => {
            state.done = true;
            Some(PageEvent::Stop(StopReason::ServerOrNetworkError))
        }
    }
}

/// §4.9 step 5/6: extract, canonicalize, and dedup detail URLs from one
/// page's HTML.
async fn extract_page_urls(
    html: &str,
    page_url: &Url,
    selector: &str,
    extractor: &dyn HtmlExtractor,
    dedup_cache: Option<&DedupCache<'_>>,
    job_id: Option<Uuid>,
    warnings: &mut Vec<String>,
) -> Vec<String> {
    let raw_urls = match extractor.extract_links(html, selector, page_url) {
        Ok(urls) => urls,
        Err(e) => {
            warnings.push(format!("extraction failed for {page_url}: {e}"));
            return Vec::new();
        }
    };

    let mut seen_digests: HashSet<String> = HashSet::new();
    let mut canonical_by_digest: HashMap<String, String> = HashMap::new();
    for raw in &raw_urls {
        let Ok(canonical) = canonical::canonicalize(raw, &CanonicalizeOptions::default()) else {
            continue;
        };
        if seen_digests.insert(canonical.digest.clone()) {
            canonical_by_digest.insert(canonical.digest, canonical.url);
        }
    }

    let digests: Vec<String> = canonical_by_digest.keys().cloned().collect();
    let already_present = match dedup_cache {
        Some(cache) if job_id.is_some() => cache.exists_batch(&digests).await,
        _ => Vec::new(),
    };
    let already_present: HashSet<String> = already_present.into_iter().collect();

    let mut result = Vec::new();
    for (digest, url) in canonical_by_digest {
        if already_present.contains(&digest) {
            continue;
        }
        if let (Some(cache), Some(job_id)) = (dedup_cache, job_id) {
            let metadata = serde_json::json!({
                "job_id": job_id.to_string(),
                "extracted_from": page_url.to_string(),
            });
            cache.set(&digest, &metadata, None).await;
        }
        result.push(url);
    }
    result
}

/// Entry point (§4.9). Never throws: every failure mode is reported
/// through [`CrawlResult::outcome`] plus accumulated warnings.
pub async fn crawl(
    seed_url: &str,
    config: CrawlConfig<'_>,
    fetcher: &dyn HttpFetcher,
    extractor: &dyn HtmlExtractor,
) -> CrawlResult {
    let mut warnings = Vec::new();

    if !validate_config(&config.step) {
        return CrawlResult {
            outcome: CrawlOutcome::InvalidConfig,
            urls: Vec::new(),
            warnings,
        };
    }

    let Ok(seed) = Url::parse(seed_url) else {
        return CrawlResult {
            outcome: CrawlOutcome::SeedUrlError,
            urls: Vec::new(),
            warnings,
        };
    };

    let detail_selector = config.step.selectors[DETAIL_URLS_KEY].clone();

    let seed_response = match fetcher.fetch(seed_url).await {
        Ok(resp) => resp,
        Err(_) => {
            return CrawlResult {
                outcome: CrawlOutcome::SeedUrlError,
                urls: Vec::new(),
                warnings,
            }
        }
    };
    if seed_response.status == 404 {
        return CrawlResult {
            outcome: CrawlOutcome::SeedUrl404,
            urls: Vec::new(),
            warnings,
        };
    }
    if seed_response.status >= 400 {
        return CrawlResult {
            outcome: CrawlOutcome::SeedUrlError,
            urls: Vec::new(),
            warnings,
        };
    }

    let (pagination_config, pagination_warning) =
        determine_pagination(config.step.pagination.as_ref(), &seed);
    if let Some(w) = pagination_warning {
        warnings.push(w);
    }

    if let Some(signal) = config.cancellation {
        if let Some(job_id) = config.job_id {
            if signal.is_cancelled(job_id).await {
                return CrawlResult {
                    outcome: CrawlOutcome::Cancelled,
                    urls: Vec::new(),
                    warnings,
                };
            }
        }
    }

    let seed_html = String::from_utf8_lossy(&seed_response.body).to_string();
    let mut urls = extract_page_urls(
        &seed_html,
        &seed,
        &detail_selector,
        extractor,
        config.dedup_cache,
        config.job_id,
        &mut warnings,
    )
    .await;

    let mut state = PaginationState {
        next_page_num: pagination_config.start_page + 1,
        seen_urls: HashSet::from([seed_url.to_string()]),
        pages_yielded: 0,
        consecutive_empty: 0,
        prev_html: Some(seed_html),
        pending_stop: None,
        done: false,
    };

    let mut stop_outcome: Option<CrawlOutcome> = None;

    loop {
        if let Some(signal) = config.cancellation {
            if let Some(job_id) = config.job_id {
                if signal.is_cancelled(job_id).await {
                    stop_outcome = Some(CrawlOutcome::Cancelled);
                    break;
                }
            }
        }

        let Some(event) =
            next_pagination_event(&seed, &pagination_config, &mut state, fetcher, extractor).await
        else {
            break;
        };

        match event {
            PageEvent::Page { url, content, .. } => {
                let page_url = match Url::parse(&url) {
                    Ok(u) => u,
                    Err(_) => continue,
                };
                let html = String::from_utf8_lossy(&content).to_string();
                let mut page_urls = extract_page_urls(
                    &html,
                    &page_url,
                    &detail_selector,
                    extractor,
                    config.dedup_cache,
                    config.job_id,
                    &mut warnings,
                )
                .await;
                urls.append(&mut page_urls);
            }
            PageEvent::Stop(reason) => {
                stop_outcome = Some(match reason {
                    StopReason::MaxPages => CrawlOutcome::PaginationStopped,
                    StopReason::EmptyPages => CrawlOutcome::EmptyPages,
                    StopReason::Circular => CrawlOutcome::CircularPagination,
                    StopReason::ServerOrNetworkError => CrawlOutcome::PartialSuccess,
                    StopReason::NoFurtherPages => {
                        if urls.is_empty() {
                            CrawlOutcome::SuccessNoUrls
                        } else {
                            CrawlOutcome::Success
                        }
                    }
                });
                break;
            }
        }
    }

    let outcome = stop_outcome.unwrap_or(if urls.is_empty() {
        CrawlOutcome::SuccessNoUrls
    } else {
        CrawlOutcome::Success
    });

    CrawlResult {
        outcome,
        urls,
        warnings,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::html_extractor::CssExtractor;
    use crate::http_fetcher::fake::{Canned, FakeFetcher};

    fn step_with_detail_selector(sel: &str) -> StepConfig {
        let mut selectors = HashMap::new();
        selectors.insert(DETAIL_URLS_KEY.to_string(), sel.to_string());
        StepConfig {
            selectors,
            pagination: None,
        }
    }

    fn default_config<'a>(step: StepConfig) -> CrawlConfig<'a> {
        CrawlConfig {
            step,
            job_id: None,
            request_timeout: Duration::from_secs(5),
            dedup_cache: None,
            cancellation: None,
        }
    }

    #[test]
    fn rejects_config_missing_detail_urls_key() {
        let mut selectors = HashMap::new();
        selectors.insert("urls".to_string(), ".items a".to_string());
        let step = StepConfig {
            selectors,
            pagination: None,
        };
        assert!(!validate_config(&step));
    }

    #[test]
    fn accepts_config_with_detail_urls_key() {
        assert!(validate_config(&step_with_detail_selector(".items a")));
    }

    #[tokio::test]
    async fn seed_404_short_circuits() {
        let fetcher = FakeFetcher::new();
        fetcher.queue("https://example.com/list", Canned::Ok(404, ""));
        let extractor = CssExtractor;
        let result = crawl(
            "https://example.com/list",
            default_config(step_with_detail_selector(".items a")),
            &fetcher,
            &extractor,
        )
        .await;
        assert_eq!(result.outcome, CrawlOutcome::SeedUrl404);
        assert!(result.urls.is_empty());
    }

    #[tokio::test]
    async fn seed_5xx_is_seed_url_error() {
        let fetcher = FakeFetcher::new();
        fetcher.queue("https://example.com/list", Canned::Ok(503, ""));
        let extractor = CssExtractor;
        let result = crawl(
            "https://example.com/list",
            default_config(step_with_detail_selector(".items a")),
            &fetcher,
            &extractor,
        )
        .await;
        assert_eq!(result.outcome, CrawlOutcome::SeedUrlError);
    }

    #[tokio::test]
    async fn extracts_urls_from_seed_with_no_pagination() {
        let html = r#"<ul class="items"><li><a href="/d/1">1</a></li><li><a href="/d/2">2</a></li></ul>"#;
        let fetcher = FakeFetcher::new();
        fetcher.queue("https://example.com/list", Canned::Ok(200, html));
        let extractor = CssExtractor;
        let result = crawl(
            "https://example.com/list",
            default_config(step_with_detail_selector(".items a")),
            &fetcher,
            &extractor,
        )
        .await;
        assert_eq!(result.outcome, CrawlOutcome::Success);
        assert_eq!(result.urls.len(), 2);
    }

    #[tokio::test]
    async fn no_matching_links_is_success_no_urls() {
        let html = r#"<div>nothing here</div>"#;
        let fetcher = FakeFetcher::new();
        fetcher.queue("https://example.com/list", Canned::Ok(200, html));
        let extractor = CssExtractor;
        let result = crawl(
            "https://example.com/list",
            default_config(step_with_detail_selector(".items a")),
            &fetcher,
            &extractor,
        )
        .await;
        assert_eq!(result.outcome, CrawlOutcome::SuccessNoUrls);
        assert!(result.urls.is_empty());
    }

    #[tokio::test]
    async fn page_based_pagination_stops_at_max_pages() {
        let html_page = |n: u32| {
            format!(
                r#"<ul class="items"><li><a href="/d/{n}">{n}</a></li></ul>"#
            )
        };
        let fetcher = FakeFetcher::new();
        fetcher.queue("https://example.com/list", Canned::Ok(200, Box::leak(html_page(0).into_boxed_str())));
        fetcher.queue("https://example.com/list?page=2", Canned::Ok(200, Box::leak(html_page(1).into_boxed_str())));
        fetcher.queue("https://example.com/list?page=3", Canned::Ok(200, Box::leak(html_page(2).into_boxed_str())));

        let pagination = PaginationConfig {
            pagination_type: PaginationType::PageBased,
            max_pages: 2,
            ..PaginationConfig::default()
        };
        let step = StepConfig {
            pagination: Some(pagination),
            ..step_with_detail_selector(".items a")
        };
        let extractor = CssExtractor;
        let result = crawl(
            "https://example.com/list",
            default_config(step),
            &fetcher,
            &extractor,
        )
        .await;
        assert_eq!(result.outcome, CrawlOutcome::PaginationStopped);
        // seed page + 2 paginated pages = 3 urls total
        assert_eq!(result.urls.len(), 3);
    }

    #[tokio::test]
    async fn next_link_pointing_back_to_itself_is_circular_pagination() {
        let fetcher = FakeFetcher::new();
        fetcher.queue(
            "https://example.com/list",
            Canned::Ok(
                200,
                r#"<ul class="items"><li><a href="/d/0">0</a></li></ul><a class="next" href="/list?page=2">next</a>"#,
            ),
        );
        // page=2's own "next" link points right back at itself, which
        // must be caught as a repeat on the following iteration.
        fetcher.queue(
            "https://example.com/list?page=2",
            Canned::Ok(
                200,
                r#"<ul class="items"><li><a href="/d/1">1</a></li></ul><a class="next" href="/list?page=2">next</a>"#,
            ),
        );
        let pagination = PaginationConfig {
            pagination_type: PaginationType::Cursor,
            next_page_selector: Some("a.next".to_string()),
            ..PaginationConfig::default()
        };
        let step = StepConfig {
            pagination: Some(pagination),
            ..step_with_detail_selector(".items a")
        };
        let extractor = CssExtractor;
        let result = crawl(
            "https://example.com/list",
            default_config(step),
            &fetcher,
            &extractor,
        )
        .await;
        assert_eq!(result.outcome, CrawlOutcome::CircularPagination);
        assert_eq!(result.urls.len(), 2);
    }

    #[tokio::test]
    async fn cursor_pagination_without_selector_falls_back_to_single_page() {
        let fetcher = FakeFetcher::new();
        fetcher.queue(
            "https://example.com/list",
            Canned::Ok(200, r#"<ul class="items"><li><a href="/d/0">0</a></li></ul>"#),
        );
        let pagination = PaginationConfig {
            pagination_type: PaginationType::Cursor,
            next_page_selector: None,
            ..PaginationConfig::default()
        };
        let step = StepConfig {
            pagination: Some(pagination),
            ..step_with_detail_selector(".items a")
        };
        let extractor = CssExtractor;
        let result = crawl(
            "https://example.com/list",
            default_config(step),
            &fetcher,
            &extractor,
        )
        .await;
        assert_eq!(result.outcome, CrawlOutcome::Success);
        assert_eq!(result.urls.len(), 1);
        assert!(result
            .warnings
            .iter()
            .any(|w| w == "pagination_selector_not_found"));
    }

    #[tokio::test]
    async fn empty_content_run_stops_pagination() {
        let fetcher = FakeFetcher::new();
        fetcher.queue(
            "https://example.com/list",
            Canned::Ok(200, r#"<ul class="items"><li><a href="/d/0">0</a></li></ul>"#),
        );
        for p in 2..=5 {
            fetcher.queue(&format!("https://example.com/list?page={p}"), Canned::Ok(200, ""));
        }
        let pagination = PaginationConfig {
            pagination_type: PaginationType::PageBased,
            min_content_length: 1,
            consecutive_empty_limit: 2,
            max_pages: 10,
            ..PaginationConfig::default()
        };
        let step = StepConfig {
            pagination: Some(pagination),
            ..step_with_detail_selector(".items a")
        };
        let extractor = CssExtractor;
        let result = crawl(
            "https://example.com/list",
            default_config(step),
            &fetcher,
            &extractor,
        )
        .await;
        assert_eq!(result.outcome, CrawlOutcome::EmptyPages);
    }

    #[tokio::test]
    async fn cancellation_checked_before_pagination() {
        use crate::cancellation::CancellationSignal;
        use crate::kv::fake::FakeKvStore;

        let kv = FakeKvStore::new();
        let signal = CancellationSignal::new(&kv);
        let job_id = Uuid::now_v7();
        signal.set(job_id, Some("operator request")).await;

        let fetcher = FakeFetcher::new();
        fetcher.queue(
            "https://example.com/list",
            Canned::Ok(200, r#"<ul class="items"><li><a href="/d/1">1</a></li></ul>"#),
        );
        let extractor = CssExtractor;
        let mut config = default_config(step_with_detail_selector(".items a"));
        config.job_id = Some(job_id);
        config.cancellation = Some(&signal);
        let result = crawl("https://example.com/list", config, &fetcher, &extractor).await;
        assert_eq!(result.outcome, CrawlOutcome::Cancelled);
    }
}
