//! Domain model structs and enums for the control-plane core (§3 of the
//! design). Each type mirrors a row in `crate::schema`; enum-shaped columns
//! round-trip through `Display`/`FromStr` the same way the teacher's
//! `UrlStatus`/`DiscoveryMethod` did against `Text` columns.

mod crawl_job;
mod crawled_page;
mod duplicate;
mod retry;
mod scheduled_job;
mod website;

pub use crawl_job::{CrawlJob, CrawlOutcome, JobStatus, JobType, NewCrawlJob};
pub use crawled_page::{CrawledPage, NewCrawledPage};
pub use duplicate::{
    ContentHash, DetectionMethod, DuplicateGroup, DuplicateRelationship, NewContentHash,
    NewDuplicateRelationship,
};
pub use retry::{
    BackoffStrategy, DeadLetterQueueEntry, ErrorCategory, NewDeadLetterQueueEntry,
    NewRetryHistoryEntry, RetryHistoryEntry, RetryPolicy,
};
pub use scheduled_job::{NewScheduledJob, ScheduledJob};
pub use website::{NewWebsite, NewWebsiteConfigHistory, Website, WebsiteConfigHistory, WebsiteStatus};
