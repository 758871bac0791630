//! The persistence seam for the reconciliation engine.
//!
//! `CatalogStore` keeps two promises the engine leans on:
//!
//! - Every method that writes more than one row is atomic as a unit, so a
//!   crashed run never leaves a half-written venue/review state.
//! - The targeted candidate queries (`venues_near`, phone, name+address)
//!   return the same candidates a full O(n) scan would, because the
//!   normalized columns they compare against are computed with the same
//!   normalizer at write time and the geo cell window is wider than the
//!   match radius.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use placematch_common::{
    Platform, PlatformSnapshot, Result, Review, Venue, VenueStatus,
};

/// A venue to insert. Normalized phone/address are supplied by the caller
/// (the engine's normalizer) so candidate queries stay consistent with
/// in-memory matching.
#[derive(Debug, Clone)]
pub struct NewVenue {
    pub name: String,
    pub address: String,
    pub phone: String,
    pub description: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub source_platform: Platform,
    pub platform_id: String,
    pub status: VenueStatus,
    pub normalized_phone: String,
    pub normalized_address: String,
}

/// Field updates applied to an existing venue in one statement.
/// `None` leaves the column untouched. `phone`/`address` updates must be
/// paired with their recomputed normalized forms.
#[derive(Debug, Clone, Default)]
pub struct VenueFieldPatch {
    pub name: Option<String>,
    pub address: Option<String>,
    pub normalized_address: Option<String>,
    pub phone: Option<String>,
    pub normalized_phone: Option<String>,
    pub description: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

impl VenueFieldPatch {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.address.is_none()
            && self.phone.is_none()
            && self.description.is_none()
            && self.latitude.is_none()
            && self.longitude.is_none()
    }
}

/// Snapshot payload for one `(venue, platform)` pair. Replaces any
/// previous snapshot for the pair wholesale.
#[derive(Debug, Clone)]
pub struct NewSnapshot {
    pub venue_id: Uuid,
    pub platform: Platform,
    pub raw_payload: serde_json::Value,
    pub rating: Option<f64>,
    pub review_count: Option<i32>,
    pub link: Option<String>,
}

/// A review to insert. Crawled reviews carry the platform identity pair;
/// first-party reviews carry neither field.
#[derive(Debug, Clone)]
pub struct NewReview {
    pub source_platform: Option<Platform>,
    pub platform_review_id: Option<String>,
    pub author: String,
    pub rating: i32,
    pub content: String,
    pub image_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[async_trait]
pub trait CatalogStore: Send + Sync {
    // --- Venue reads ---

    async fn venue(&self, id: Uuid) -> Result<Option<Venue>>;

    /// All venues carrying this platform identity. The uniqueness
    /// invariant says at most one; returning a Vec lets the reconciler
    /// detect and report the broken-invariant case instead of picking one.
    async fn venues_by_platform_identity(
        &self,
        platform: Platform,
        platform_id: &str,
    ) -> Result<Vec<Venue>>;

    /// Venues in the probe point's geohash cell and its eight neighbors.
    /// A superset of any venue within the match radius of the probe.
    async fn venues_near(&self, lat: f64, lng: f64) -> Result<Vec<Venue>>;

    async fn venues_by_normalized_phone(&self, normalized_phone: &str) -> Result<Vec<Venue>>;

    /// Exact raw-name + normalized-address candidates.
    async fn venues_by_name_and_address(
        &self,
        name: &str,
        normalized_address: &str,
    ) -> Result<Vec<Venue>>;

    async fn venues_by_source_platform(&self, platform: Platform) -> Result<Vec<Venue>>;

    async fn venues_by_status(&self, status: VenueStatus) -> Result<Vec<Venue>>;

    /// Venues whose `last_synced_at` is before the cutoff, oldest first.
    async fn venues_stale_since(&self, cutoff: DateTime<Utc>, limit: i64) -> Result<Vec<Venue>>;

    // --- Venue writes ---

    async fn insert_venue(&self, venue: NewVenue) -> Result<Venue>;

    /// Apply the patch and refresh `last_synced_at` in one statement.
    async fn update_venue_fields(&self, id: Uuid, patch: VenueFieldPatch) -> Result<()>;

    /// Write status and `last_synced_at` atomically. No intermediate
    /// state is observable to concurrent readers.
    async fn set_status(&self, id: Uuid, status: VenueStatus) -> Result<()>;

    async fn touch_last_synced(&self, id: Uuid) -> Result<()>;

    // --- Snapshots ---

    /// Insert or replace the snapshot for `(venue, platform)`, stamping
    /// `last_checked_at`.
    async fn upsert_snapshot(&self, snapshot: NewSnapshot) -> Result<()>;

    async fn snapshots_for_venue(&self, venue_id: Uuid) -> Result<Vec<PlatformSnapshot>>;

    // --- Reviews ---

    /// Watermark for incremental sync: max content date over stored
    /// reviews for this `(venue, platform)`. Computed by query each time,
    /// never cached on the venue, so late-arriving backfills cannot cause
    /// drift.
    async fn latest_review_date(
        &self,
        venue_id: Uuid,
        platform: Platform,
    ) -> Result<Option<DateTime<Utc>>>;

    async fn review_exists(&self, platform: Platform, platform_review_id: &str) -> Result<bool>;

    /// Insert crawled reviews and refresh the venue's `last_synced_at`
    /// in one transaction. Venue aggregates are not touched — platform
    /// review counts live on the snapshot. Returns rows inserted.
    async fn insert_crawled_reviews(&self, venue_id: Uuid, reviews: Vec<NewReview>)
        -> Result<usize>;

    /// Insert a first-party review and update the venue's running
    /// `review_count` / `rating_avg` in one transaction.
    async fn insert_user_review(&self, venue_id: Uuid, review: NewReview) -> Result<Review>;

    /// Remove a review and roll its contribution out of the venue
    /// aggregates in one transaction. `review_count` never goes below 0.
    async fn delete_review(&self, review_id: Uuid) -> Result<()>;

    async fn reviews_for_venue(&self, venue_id: Uuid) -> Result<Vec<Review>>;

    // --- Aggregates ---

    /// The explicit aggregate-update hook for bookmark writes. Clamped
    /// at zero; returns the new count.
    async fn adjust_bookmark_count(&self, venue_id: Uuid, delta: i32) -> Result<i32>;
}
