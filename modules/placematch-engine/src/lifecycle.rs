//! Closure detection and recovery.
//!
//! A venue is never closed on a single failed lookup. The first miss
//! marks it suspected, a second independent miss confirms, and a hit
//! while suspected recovers it. Confirmed closure is terminal.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rand::seq::SliceRandom;
use tracing::{info, warn};

use placematch_catalog::CatalogStore;
use placematch_common::{CatalogError, Result, Venue, VenueStatus};

use crate::pacing::Pacing;
use crate::traits::Crawler;
use crate::Shutdown;

/// Next lifecycle state given one existence observation.
pub fn next_status(current: VenueStatus, still_exists: bool) -> VenueStatus {
    match (current, still_exists) {
        (VenueStatus::ClosedConfirmed, _) => VenueStatus::ClosedConfirmed,
        (VenueStatus::ClosedSuspected, true) => VenueStatus::Active,
        (VenueStatus::ClosedSuspected, false) => VenueStatus::ClosedConfirmed,
        (VenueStatus::Active, false) | (VenueStatus::New, false) => VenueStatus::ClosedSuspected,
        (VenueStatus::Active, true) => VenueStatus::Active,
        // Activation of a new venue is an explicit editorial step, not a
        // side effect of an existence probe.
        (VenueStatus::New, true) => VenueStatus::New,
    }
}

/// Counters for one revalidation batch.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ValidationStats {
    pub checked: usize,
    pub suspected: usize,
    pub confirmed: usize,
    pub recovered: usize,
    pub failed: usize,
}

pub struct LifecycleValidator {
    store: Arc<dyn CatalogStore>,
    crawler: Arc<dyn Crawler>,
    pacing: Pacing,
}

impl LifecycleValidator {
    pub fn new(store: Arc<dyn CatalogStore>, crawler: Arc<dyn Crawler>, pacing: Pacing) -> Self {
        Self {
            store,
            crawler,
            pacing,
        }
    }

    /// Apply one existence observation to a venue and persist the
    /// transition. No-op transitions still bump `last_synced_at` so the
    /// venue drops out of the stale queue.
    pub async fn validate(&self, venue_id: uuid::Uuid, still_exists: bool) -> Result<Venue> {
        let venue = self.fetch(venue_id).await?;
        let next = next_status(venue.status, still_exists);
        if next == venue.status {
            self.store.touch_last_synced(venue_id).await?;
        } else {
            info!(venue_id = %venue_id, from = %venue.status, to = %next, "lifecycle transition");
            self.store.set_status(venue_id, next).await?;
        }
        self.fetch(venue_id).await
    }

    /// Editorial activation of a newly discovered venue.
    pub async fn activate(&self, venue_id: uuid::Uuid) -> Result<Venue> {
        let venue = self.fetch(venue_id).await?;
        match venue.status {
            VenueStatus::New => {
                self.store.set_status(venue_id, VenueStatus::Active).await?;
                self.fetch(venue_id).await
            }
            VenueStatus::Active => Ok(venue),
            VenueStatus::ClosedSuspected | VenueStatus::ClosedConfirmed => {
                Err(CatalogError::InvariantViolation(format!(
                    "cannot activate venue {venue_id} in status {}",
                    venue.status
                )))
            }
        }
    }

    /// Re-check every suspected closure against its source platform.
    pub async fn revalidate_suspected(&self, shutdown: &Shutdown) -> Result<ValidationStats> {
        let venues = self
            .store
            .venues_by_status(VenueStatus::ClosedSuspected)
            .await?;
        self.revalidate(venues, shutdown).await
    }

    /// Spot-check a random sample of active venues. Catches closures the
    /// stale queue would only reach once the venue stops being crawled,
    /// without probing the whole active set every run.
    pub async fn revalidate_active_sample(
        &self,
        sample_size: usize,
        shutdown: &Shutdown,
    ) -> Result<ValidationStats> {
        let mut venues = self.store.venues_by_status(VenueStatus::Active).await?;
        venues.shuffle(&mut rand::rng());
        venues.truncate(sample_size);
        self.revalidate(venues, shutdown).await
    }

    /// Re-check venues that have not been seen by any crawl since
    /// `cutoff`, oldest first.
    pub async fn revalidate_stale(
        &self,
        cutoff: DateTime<Utc>,
        limit: i64,
        shutdown: &Shutdown,
    ) -> Result<ValidationStats> {
        let venues = self.store.venues_stale_since(cutoff, limit).await?;
        self.revalidate(venues, shutdown).await
    }

    async fn revalidate(&self, venues: Vec<Venue>, shutdown: &Shutdown) -> Result<ValidationStats> {
        let mut stats = ValidationStats::default();
        let total = venues.len();

        for (i, venue) in venues.into_iter().enumerate() {
            if *shutdown.borrow() {
                info!(checked = stats.checked, total, "revalidation interrupted by shutdown");
                break;
            }
            if i > 0 {
                self.pacing.pause().await;
            }

            // One venue failing its probe must not sink the batch.
            let exists = match self
                .crawler
                .still_exists(venue.source_platform, &venue.platform_id)
                .await
            {
                Ok(exists) => exists,
                Err(err) => {
                    warn!(
                        venue_id = %venue.id,
                        platform = %venue.source_platform,
                        error = %err,
                        "existence probe failed; leaving status untouched"
                    );
                    stats.failed += 1;
                    continue;
                }
            };

            let before = venue.status;
            let after = self.validate(venue.id, exists).await?.status;
            stats.checked += 1;
            match (before, after) {
                (VenueStatus::ClosedSuspected, VenueStatus::Active) => stats.recovered += 1,
                (_, VenueStatus::ClosedConfirmed) if before != after => stats.confirmed += 1,
                (_, VenueStatus::ClosedSuspected) if before != after => stats.suspected += 1,
                _ => {}
            }
        }

        info!(
            checked = stats.checked,
            suspected = stats.suspected,
            confirmed = stats.confirmed,
            recovered = stats.recovered,
            failed = stats.failed,
            "revalidation batch finished"
        );
        Ok(stats)
    }

    async fn fetch(&self, id: uuid::Uuid) -> Result<Venue> {
        self.store
            .venue(id)
            .await?
            .ok_or_else(|| CatalogError::NotFound(format!("venue {id}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn two_misses_confirm_closure() {
        let first = next_status(VenueStatus::Active, false);
        assert_eq!(first, VenueStatus::ClosedSuspected);
        assert_eq!(next_status(first, false), VenueStatus::ClosedConfirmed);
    }

    #[test]
    fn hit_while_suspected_recovers() {
        assert_eq!(
            next_status(VenueStatus::ClosedSuspected, true),
            VenueStatus::Active
        );
    }

    #[test]
    fn confirmed_closure_is_terminal() {
        assert_eq!(
            next_status(VenueStatus::ClosedConfirmed, true),
            VenueStatus::ClosedConfirmed
        );
        assert_eq!(
            next_status(VenueStatus::ClosedConfirmed, false),
            VenueStatus::ClosedConfirmed
        );
    }

    #[test]
    fn existence_does_not_activate_new_venues() {
        assert_eq!(next_status(VenueStatus::New, true), VenueStatus::New);
    }

    #[test]
    fn missing_new_venue_is_suspected() {
        assert_eq!(
            next_status(VenueStatus::New, false),
            VenueStatus::ClosedSuspected
        );
    }
}
