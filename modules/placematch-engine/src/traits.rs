// Trait abstraction for the crawler collaborator.
//
// The engine never fetches or parses anything itself; everything that
// touches an external platform sits behind `Crawler`. This keeps the
// reconciliation core testable with MockCrawler: no network, no browser.

use anyhow::Result;
use async_trait::async_trait;

use placematch_common::{CrawledRecord, CrawledReview, Platform};

#[async_trait]
pub trait Crawler: Send + Sync {
    /// Keyword search within one region on one platform. Returns
    /// normalized venue records.
    async fn search(
        &self,
        platform: Platform,
        region: &str,
        keyword: &str,
    ) -> Result<Vec<CrawledRecord>>;

    /// Fetch the current review listing for one platform record.
    async fn reviews(&self, platform: Platform, platform_id: &str) -> Result<Vec<CrawledReview>>;

    /// Existence re-check for closure detection: does the platform still
    /// serve a page for this record?
    async fn still_exists(&self, platform: Platform, platform_id: &str) -> Result<bool>;
}
