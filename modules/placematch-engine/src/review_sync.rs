//! Incremental review synchronization.
//!
//! Crawled review listings overlap between runs. Two filters keep the
//! sync idempotent: a per-venue watermark (the newest stored review date,
//! recomputed by query each run) and a per-review identity check on
//! `(platform, platform_review_id)`. Reviews dated exactly at the
//! watermark are kept and left to the identity check, since several
//! reviews can share one content date.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};

use placematch_catalog::{CatalogStore, NewReview};
use placematch_common::{CatalogError, CrawledReview, Platform, Result, Review, Venue};

use crate::pacing::Pacing;
use crate::traits::Crawler;
use crate::Shutdown;

/// Counters for one platform-wide sync pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReviewSyncStats {
    pub venues_ok: usize,
    pub venues_failed: usize,
    pub inserted: usize,
}

pub struct ReviewSyncer {
    store: Arc<dyn CatalogStore>,
}

impl ReviewSyncer {
    pub fn new(store: Arc<dyn CatalogStore>) -> Self {
        Self { store }
    }

    /// Merge a crawled review listing into one venue. Returns how many
    /// reviews were actually inserted.
    pub async fn sync_reviews(
        &self,
        venue_id: uuid::Uuid,
        reviews: &[CrawledReview],
    ) -> Result<usize> {
        let venue = self.fetch(venue_id).await?;
        let platform = venue.source_platform;
        let watermark = self.store.latest_review_date(venue_id, platform).await?;

        let mut fresh = Vec::new();
        for review in reviews {
            if let Some(watermark) = watermark {
                if review.review_date < watermark {
                    continue;
                }
            }
            if self
                .store
                .review_exists(platform, &review.platform_review_id)
                .await?
            {
                continue;
            }
            fresh.push(NewReview {
                source_platform: Some(platform),
                platform_review_id: Some(review.platform_review_id.clone()),
                author: review.nickname.clone(),
                rating: review.rating,
                content: review.content.clone(),
                image_url: review.image_url.clone(),
                created_at: review.review_date,
            });
        }

        if fresh.is_empty() {
            // Nothing new; still record that the venue was looked at.
            self.store.touch_last_synced(venue_id).await?;
            debug!(venue_id = %venue_id, candidates = reviews.len(), "review sync found nothing new");
            return Ok(0);
        }

        let inserted = self.store.insert_crawled_reviews(venue_id, fresh).await?;
        info!(
            venue_id = %venue_id,
            candidates = reviews.len(),
            inserted,
            watermark = ?watermark,
            "reviews merged"
        );
        Ok(inserted)
    }

    /// First-party review: no platform identity, no dedup, and the
    /// venue's running aggregates move with it.
    pub async fn add_user_review(
        &self,
        venue_id: uuid::Uuid,
        author: &str,
        rating: i32,
        content: &str,
        image_url: Option<String>,
    ) -> Result<Review> {
        if !(1..=5).contains(&rating) {
            return Err(CatalogError::InvariantViolation(format!(
                "rating {rating} outside 1..=5"
            )));
        }
        self.fetch(venue_id).await?;
        self.store
            .insert_user_review(
                venue_id,
                NewReview {
                    source_platform: None,
                    platform_review_id: None,
                    author: author.to_string(),
                    rating,
                    content: content.to_string(),
                    image_url,
                    created_at: Utc::now(),
                },
            )
            .await
    }

    /// Remove a review, rolling its contribution out of the aggregates.
    pub async fn delete_review(&self, review_id: uuid::Uuid) -> Result<()> {
        self.store.delete_review(review_id).await
    }

    /// Incremental sync across every venue discovered on one platform.
    pub async fn sync_platform(
        &self,
        crawler: &Arc<dyn Crawler>,
        pacing: Pacing,
        platform: Platform,
        shutdown: &Shutdown,
    ) -> Result<ReviewSyncStats> {
        let venues = self.store.venues_by_source_platform(platform).await?;
        let total = venues.len();
        let mut stats = ReviewSyncStats::default();

        for (i, venue) in venues.into_iter().enumerate() {
            if *shutdown.borrow() {
                info!(done = stats.venues_ok, total, "review sync interrupted by shutdown");
                break;
            }
            if i > 0 {
                pacing.pause().await;
            }
            match self.sync_venue(crawler, platform, &venue).await {
                Ok(inserted) => {
                    stats.venues_ok += 1;
                    stats.inserted += inserted;
                }
                Err(err) => {
                    warn!(
                        venue_id = %venue.id,
                        platform = %platform,
                        error = %err,
                        "review sync failed for venue; continuing"
                    );
                    stats.venues_failed += 1;
                }
            }
        }

        info!(
            platform = %platform,
            venues_ok = stats.venues_ok,
            venues_failed = stats.venues_failed,
            inserted = stats.inserted,
            "platform review sync finished"
        );
        Ok(stats)
    }

    async fn sync_venue(
        &self,
        crawler: &Arc<dyn Crawler>,
        platform: Platform,
        venue: &Venue,
    ) -> Result<usize> {
        let listing = crawler.reviews(platform, &venue.platform_id).await?;
        self.sync_reviews(venue.id, &listing).await
    }

    async fn fetch(&self, id: uuid::Uuid) -> Result<Venue> {
        self.store
            .venue(id)
            .await?
            .ok_or_else(|| CatalogError::NotFound(format!("venue {id}")))
    }
}
