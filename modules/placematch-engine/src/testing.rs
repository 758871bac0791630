// Test mocks and fixture helpers for the reconciliation engine.
//
// MockCrawler mirrors the Crawler trait with HashMap-registered
// responses: register what a search/review/existence call should return,
// and unregistered calls bail. Deterministic `cargo test` with no network.

use std::collections::HashMap;
use std::sync::Mutex;

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use uuid::Uuid;

use placematch_common::{CrawledRecord, CrawledReview, Platform, Venue, VenueStatus};

use crate::traits::Crawler;

// ---------------------------------------------------------------------------
// Fixture helpers
// ---------------------------------------------------------------------------

/// A minimal crawled record; tests set coordinates/phone/hints directly.
pub fn record(platform: Platform, platform_id: &str, name: &str, address: &str) -> CrawledRecord {
    CrawledRecord {
        platform,
        platform_id: platform_id.to_string(),
        name: name.to_string(),
        address: address.to_string(),
        phone: None,
        business_hours: None,
        category: None,
        latitude: None,
        longitude: None,
        status_hint: None,
        raw_payload: serde_json::json!({}),
    }
}

/// A venue as it would come back from the store; tests adjust fields
/// directly.
pub fn venue(platform: Platform, platform_id: &str, name: &str, address: &str) -> Venue {
    let now = Utc::now();
    Venue {
        id: Uuid::new_v4(),
        name: name.to_string(),
        address: address.to_string(),
        phone: String::new(),
        description: None,
        latitude: None,
        longitude: None,
        source_platform: platform,
        platform_id: platform_id.to_string(),
        status: VenueStatus::New,
        last_synced_at: now,
        review_count: 0,
        bookmark_count: 0,
        rating_avg: 0.0,
        created_at: now,
    }
}

/// A crawled review dated `day` days into January 2026.
pub fn crawled_review(review_id: &str, day: u32) -> CrawledReview {
    CrawledReview {
        platform_review_id: review_id.to_string(),
        nickname: format!("reviewer-{review_id}"),
        rating: 4,
        content: format!("review {review_id}"),
        review_date: review_date(day),
        image_url: None,
    }
}

pub fn review_date(day: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 1, day, 12, 0, 0).unwrap()
}

// ---------------------------------------------------------------------------
// MockCrawler
// ---------------------------------------------------------------------------

type SearchKey = (Platform, String, String);
type RecordKey = (Platform, String);

/// HashMap-registered crawler. `Err` for anything not registered, so a
/// test exercising failure isolation just leaves a region unregistered
/// (or registers it with `fail_search`).
#[derive(Default)]
pub struct MockCrawler {
    searches: HashMap<SearchKey, Vec<CrawledRecord>>,
    failing_searches: Vec<SearchKey>,
    reviews: HashMap<RecordKey, Vec<CrawledReview>>,
    existence: HashMap<RecordKey, bool>,
    /// Calls observed, for asserting pacing/ordering behavior.
    pub search_log: Mutex<Vec<String>>,
}

impl MockCrawler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_search(
        mut self,
        platform: Platform,
        region: &str,
        keyword: &str,
        records: Vec<CrawledRecord>,
    ) -> Self {
        self.searches
            .insert((platform, region.to_string(), keyword.to_string()), records);
        self
    }

    /// Register a search that fails with a transient error.
    pub fn fail_search(mut self, platform: Platform, region: &str, keyword: &str) -> Self {
        self.failing_searches
            .push((platform, region.to_string(), keyword.to_string()));
        self
    }

    pub fn on_reviews(
        mut self,
        platform: Platform,
        platform_id: &str,
        reviews: Vec<CrawledReview>,
    ) -> Self {
        self.reviews
            .insert((platform, platform_id.to_string()), reviews);
        self
    }

    pub fn on_existence(mut self, platform: Platform, platform_id: &str, exists: bool) -> Self {
        self.existence
            .insert((platform, platform_id.to_string()), exists);
        self
    }
}

#[async_trait]
impl Crawler for MockCrawler {
    async fn search(
        &self,
        platform: Platform,
        region: &str,
        keyword: &str,
    ) -> Result<Vec<CrawledRecord>> {
        self.search_log
            .lock()
            .unwrap()
            .push(format!("{platform}:{region}:{keyword}"));
        let key = (platform, region.to_string(), keyword.to_string());
        if self.failing_searches.contains(&key) {
            bail!("simulated fetch failure for region {region}");
        }
        match self.searches.get(&key) {
            Some(records) => Ok(records.clone()),
            None => bail!("no search registered for {platform}:{region}:{keyword}"),
        }
    }

    async fn reviews(&self, platform: Platform, platform_id: &str) -> Result<Vec<CrawledReview>> {
        match self.reviews.get(&(platform, platform_id.to_string())) {
            Some(reviews) => Ok(reviews.clone()),
            None => bail!("no reviews registered for {platform}:{platform_id}"),
        }
    }

    async fn still_exists(&self, platform: Platform, platform_id: &str) -> Result<bool> {
        match self.existence.get(&(platform, platform_id.to_string())) {
            Some(exists) => Ok(*exists),
            None => bail!("no existence check registered for {platform}:{platform_id}"),
        }
    }
}
