//! In-memory [`CatalogStore`] for deterministic engine tests: no network,
//! no database, no Docker. Mirrors the Postgres implementation's
//! semantics, including the platform-identity uniqueness constraint and
//! the idempotent crawled-review insert.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use placematch_common::{
    CatalogError, Platform, PlatformSnapshot, Result, Review, Venue, VenueStatus,
};

use crate::cell;
use crate::store::{CatalogStore, NewReview, NewSnapshot, NewVenue, VenueFieldPatch};

#[derive(Debug, Clone)]
struct VenueRec {
    venue: Venue,
    normalized_phone: String,
    normalized_address: String,
    geo_cell: Option<String>,
}

#[derive(Default)]
struct Inner {
    venues: HashMap<Uuid, VenueRec>,
    snapshots: Vec<PlatformSnapshot>,
    reviews: Vec<Review>,
}

#[derive(Default)]
pub struct MemoryCatalog {
    inner: Mutex<Inner>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Direct status override for test setup (e.g. forcing a venue into
    /// `Active` without going through the promotion call).
    pub fn force_status(&self, venue_id: Uuid, status: VenueStatus) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(rec) = inner.venues.get_mut(&venue_id) {
            rec.venue.status = status;
        }
    }

    /// Direct identity override for test setup. Bypasses the uniqueness
    /// check, so tests can stage the broken-invariant state the engine
    /// must detect.
    pub fn force_platform_identity(&self, venue_id: Uuid, platform: Platform, platform_id: &str) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(rec) = inner.venues.get_mut(&venue_id) {
            rec.venue.source_platform = platform;
            rec.venue.platform_id = platform_id.to_string();
        }
    }

    pub fn venue_count(&self) -> usize {
        self.inner.lock().unwrap().venues.len()
    }

    pub fn review_count(&self) -> usize {
        self.inner.lock().unwrap().reviews.len()
    }
}

fn lock_err() -> CatalogError {
    CatalogError::Database("memory catalog lock poisoned".into())
}

#[async_trait]
impl CatalogStore for MemoryCatalog {
    async fn venue(&self, id: Uuid) -> Result<Option<Venue>> {
        let inner = self.inner.lock().map_err(|_| lock_err())?;
        Ok(inner.venues.get(&id).map(|r| r.venue.clone()))
    }

    async fn venues_by_platform_identity(
        &self,
        platform: Platform,
        platform_id: &str,
    ) -> Result<Vec<Venue>> {
        let inner = self.inner.lock().map_err(|_| lock_err())?;
        Ok(inner
            .venues
            .values()
            .filter(|r| {
                r.venue.source_platform == platform && r.venue.platform_id == platform_id
            })
            .map(|r| r.venue.clone())
            .collect())
    }

    async fn venues_near(&self, lat: f64, lng: f64) -> Result<Vec<Venue>> {
        let cells = cell::probe_cells(lat, lng);
        let inner = self.inner.lock().map_err(|_| lock_err())?;
        Ok(inner
            .venues
            .values()
            .filter(|r| r.geo_cell.as_ref().is_some_and(|c| cells.contains(c)))
            .map(|r| r.venue.clone())
            .collect())
    }

    async fn venues_by_normalized_phone(&self, normalized_phone: &str) -> Result<Vec<Venue>> {
        let inner = self.inner.lock().map_err(|_| lock_err())?;
        Ok(inner
            .venues
            .values()
            .filter(|r| !r.normalized_phone.is_empty() && r.normalized_phone == normalized_phone)
            .map(|r| r.venue.clone())
            .collect())
    }

    async fn venues_by_name_and_address(
        &self,
        name: &str,
        normalized_address: &str,
    ) -> Result<Vec<Venue>> {
        let inner = self.inner.lock().map_err(|_| lock_err())?;
        Ok(inner
            .venues
            .values()
            .filter(|r| r.venue.name == name && r.normalized_address == normalized_address)
            .map(|r| r.venue.clone())
            .collect())
    }

    async fn venues_by_source_platform(&self, platform: Platform) -> Result<Vec<Venue>> {
        let inner = self.inner.lock().map_err(|_| lock_err())?;
        Ok(inner
            .venues
            .values()
            .filter(|r| r.venue.source_platform == platform)
            .map(|r| r.venue.clone())
            .collect())
    }

    async fn venues_by_status(&self, status: VenueStatus) -> Result<Vec<Venue>> {
        let inner = self.inner.lock().map_err(|_| lock_err())?;
        Ok(inner
            .venues
            .values()
            .filter(|r| r.venue.status == status)
            .map(|r| r.venue.clone())
            .collect())
    }

    async fn venues_stale_since(&self, cutoff: DateTime<Utc>, limit: i64) -> Result<Vec<Venue>> {
        let inner = self.inner.lock().map_err(|_| lock_err())?;
        let mut venues: Vec<Venue> = inner
            .venues
            .values()
            .filter(|r| r.venue.last_synced_at < cutoff)
            .map(|r| r.venue.clone())
            .collect();
        venues.sort_by_key(|v| v.last_synced_at);
        venues.truncate(limit as usize);
        Ok(venues)
    }

    async fn insert_venue(&self, venue: NewVenue) -> Result<Venue> {
        let mut inner = self.inner.lock().map_err(|_| lock_err())?;
        let duplicate = inner.venues.values().any(|r| {
            r.venue.source_platform == venue.source_platform
                && r.venue.platform_id == venue.platform_id
        });
        if duplicate {
            return Err(CatalogError::Database(format!(
                "duplicate platform identity ({}, {})",
                venue.source_platform, venue.platform_id
            )));
        }

        let now = Utc::now();
        let geo_cell = match (venue.latitude, venue.longitude) {
            (Some(lat), Some(lng)) => cell::cell_for(lat, lng),
            _ => None,
        };
        let stored = Venue {
            id: Uuid::new_v4(),
            name: venue.name,
            address: venue.address,
            phone: venue.phone,
            description: venue.description,
            latitude: venue.latitude,
            longitude: venue.longitude,
            source_platform: venue.source_platform,
            platform_id: venue.platform_id,
            status: venue.status,
            last_synced_at: now,
            review_count: 0,
            bookmark_count: 0,
            rating_avg: 0.0,
            created_at: now,
        };
        inner.venues.insert(
            stored.id,
            VenueRec {
                venue: stored.clone(),
                normalized_phone: venue.normalized_phone,
                normalized_address: venue.normalized_address,
                geo_cell,
            },
        );
        Ok(stored)
    }

    async fn update_venue_fields(&self, id: Uuid, patch: VenueFieldPatch) -> Result<()> {
        let mut inner = self.inner.lock().map_err(|_| lock_err())?;
        let rec = inner
            .venues
            .get_mut(&id)
            .ok_or_else(|| CatalogError::NotFound(format!("venue {id}")))?;

        if let Some(name) = patch.name {
            rec.venue.name = name;
        }
        if let Some(address) = patch.address {
            rec.venue.address = address;
        }
        if let Some(normalized_address) = patch.normalized_address {
            rec.normalized_address = normalized_address;
        }
        if let Some(phone) = patch.phone {
            rec.venue.phone = phone;
        }
        if let Some(normalized_phone) = patch.normalized_phone {
            rec.normalized_phone = normalized_phone;
        }
        if let Some(description) = patch.description {
            rec.venue.description = Some(description);
        }
        if let Some(lat) = patch.latitude {
            rec.venue.latitude = Some(lat);
        }
        if let Some(lng) = patch.longitude {
            rec.venue.longitude = Some(lng);
        }
        if let (Some(lat), Some(lng)) = (patch.latitude, patch.longitude) {
            rec.geo_cell = cell::cell_for(lat, lng);
        }
        rec.venue.last_synced_at = Utc::now();
        Ok(())
    }

    async fn set_status(&self, id: Uuid, status: VenueStatus) -> Result<()> {
        let mut inner = self.inner.lock().map_err(|_| lock_err())?;
        let rec = inner
            .venues
            .get_mut(&id)
            .ok_or_else(|| CatalogError::NotFound(format!("venue {id}")))?;
        rec.venue.status = status;
        rec.venue.last_synced_at = Utc::now();
        Ok(())
    }

    async fn touch_last_synced(&self, id: Uuid) -> Result<()> {
        let mut inner = self.inner.lock().map_err(|_| lock_err())?;
        if let Some(rec) = inner.venues.get_mut(&id) {
            rec.venue.last_synced_at = Utc::now();
        }
        Ok(())
    }

    async fn upsert_snapshot(&self, snapshot: NewSnapshot) -> Result<()> {
        let mut inner = self.inner.lock().map_err(|_| lock_err())?;
        let now = Utc::now();
        if let Some(existing) = inner
            .snapshots
            .iter_mut()
            .find(|s| s.venue_id == snapshot.venue_id && s.platform == snapshot.platform)
        {
            existing.raw_payload = snapshot.raw_payload;
            existing.rating = snapshot.rating;
            existing.review_count = snapshot.review_count;
            existing.link = snapshot.link;
            existing.last_checked_at = now;
        } else {
            inner.snapshots.push(PlatformSnapshot {
                id: Uuid::new_v4(),
                venue_id: snapshot.venue_id,
                platform: snapshot.platform,
                raw_payload: snapshot.raw_payload,
                rating: snapshot.rating,
                review_count: snapshot.review_count,
                link: snapshot.link,
                last_checked_at: now,
            });
        }
        Ok(())
    }

    async fn snapshots_for_venue(&self, venue_id: Uuid) -> Result<Vec<PlatformSnapshot>> {
        let inner = self.inner.lock().map_err(|_| lock_err())?;
        Ok(inner
            .snapshots
            .iter()
            .filter(|s| s.venue_id == venue_id)
            .cloned()
            .collect())
    }

    async fn latest_review_date(
        &self,
        venue_id: Uuid,
        platform: Platform,
    ) -> Result<Option<DateTime<Utc>>> {
        let inner = self.inner.lock().map_err(|_| lock_err())?;
        Ok(inner
            .reviews
            .iter()
            .filter(|r| r.venue_id == venue_id && r.source_platform == Some(platform))
            .map(|r| r.created_at)
            .max())
    }

    async fn review_exists(&self, platform: Platform, platform_review_id: &str) -> Result<bool> {
        let inner = self.inner.lock().map_err(|_| lock_err())?;
        Ok(inner.reviews.iter().any(|r| {
            r.source_platform == Some(platform)
                && r.platform_review_id.as_deref() == Some(platform_review_id)
        }))
    }

    async fn insert_crawled_reviews(
        &self,
        venue_id: Uuid,
        reviews: Vec<NewReview>,
    ) -> Result<usize> {
        let mut inner = self.inner.lock().map_err(|_| lock_err())?;
        let now = Utc::now();
        let mut inserted = 0usize;

        for review in reviews {
            let exists = match (&review.source_platform, &review.platform_review_id) {
                (Some(platform), Some(review_id)) => inner.reviews.iter().any(|r| {
                    r.source_platform == Some(*platform)
                        && r.platform_review_id.as_deref() == Some(review_id.as_str())
                }),
                _ => false,
            };
            if exists {
                continue;
            }
            inner.reviews.push(Review {
                id: Uuid::new_v4(),
                venue_id,
                source_platform: review.source_platform,
                platform_review_id: review.platform_review_id,
                author: review.author,
                rating: review.rating,
                content: review.content,
                image_url: review.image_url,
                created_at: review.created_at,
                crawled_at: now,
            });
            inserted += 1;
        }

        if let Some(rec) = inner.venues.get_mut(&venue_id) {
            rec.venue.last_synced_at = now;
        }
        Ok(inserted)
    }

    async fn insert_user_review(&self, venue_id: Uuid, review: NewReview) -> Result<Review> {
        let mut inner = self.inner.lock().map_err(|_| lock_err())?;
        let stored = Review {
            id: Uuid::new_v4(),
            venue_id,
            source_platform: review.source_platform,
            platform_review_id: review.platform_review_id,
            author: review.author,
            rating: review.rating,
            content: review.content,
            image_url: review.image_url,
            created_at: review.created_at,
            crawled_at: Utc::now(),
        };
        inner.reviews.push(stored.clone());

        let rec = inner
            .venues
            .get_mut(&venue_id)
            .ok_or_else(|| CatalogError::NotFound(format!("venue {venue_id}")))?;
        let count = rec.venue.review_count as f64;
        rec.venue.rating_avg = (rec.venue.rating_avg * count + stored.rating as f64) / (count + 1.0);
        rec.venue.review_count += 1;
        Ok(stored)
    }

    async fn delete_review(&self, review_id: Uuid) -> Result<()> {
        let mut inner = self.inner.lock().map_err(|_| lock_err())?;
        let pos = inner
            .reviews
            .iter()
            .position(|r| r.id == review_id)
            .ok_or_else(|| CatalogError::NotFound(format!("review {review_id}")))?;
        let removed = inner.reviews.remove(pos);

        if let Some(rec) = inner.venues.get_mut(&removed.venue_id) {
            let count = rec.venue.review_count;
            rec.venue.rating_avg = if count > 1 {
                (rec.venue.rating_avg * count as f64 - removed.rating as f64) / (count - 1) as f64
            } else {
                0.0
            };
            rec.venue.review_count = (count - 1).max(0);
        }
        Ok(())
    }

    async fn reviews_for_venue(&self, venue_id: Uuid) -> Result<Vec<Review>> {
        let inner = self.inner.lock().map_err(|_| lock_err())?;
        Ok(inner
            .reviews
            .iter()
            .filter(|r| r.venue_id == venue_id)
            .cloned()
            .collect())
    }

    async fn adjust_bookmark_count(&self, venue_id: Uuid, delta: i32) -> Result<i32> {
        let mut inner = self.inner.lock().map_err(|_| lock_err())?;
        let rec = inner
            .venues
            .get_mut(&venue_id)
            .ok_or_else(|| CatalogError::NotFound(format!("venue {venue_id}")))?;
        rec.venue.bookmark_count = (rec.venue.bookmark_count + delta).max(0);
        Ok(rec.venue.bookmark_count)
    }
}
