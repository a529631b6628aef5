// Crawler module: trait and implementations for job board spiders.
// Each crawler fetches postings from one source and returns them as
// RawJob records ready for enrichment.

pub mod linkedin;

use async_trait::async_trait;

use crate::models::job::RawJob;
use crate::models::search::SpiderConfig;

#[derive(Debug, thiserror::Error)]
pub enum CrawlerError {
    #[error("search request failed: {0}")]
    Request(String),

    #[error("search page could not be parsed: {0}")]
    Parse(String),
}

/// Trait that all job board crawlers implement. A crawler instance is
/// owned by a single run; the pagination cursor lives inside `crawl`.
#[async_trait]
#[allow(dead_code)]
pub trait Crawler: Send {
    /// Source tag stamped on emitted records.
    fn name(&self) -> &str;

    /// Fetch up to `max_jobs` postings for the query. Job ids are unique
    /// within the returned batch; per-detail failures are skipped.
    async fn crawl(&mut self, config: &SpiderConfig) -> Result<Vec<RawJob>, CrawlerError>;
}

/// Resolve a crawler by source name.
pub fn get_crawler(source: &str) -> Option<Box<dyn Crawler>> {
    match source {
        "linkedin" => linkedin::LinkedInCrawler::new().ok().map(|c| Box::new(c) as Box<dyn Crawler>),
        _ => None,
    }
}
