//! Create-or-update decisions for canonical venues.
//!
//! Identity decisions are irreversible (a wrong merge cannot be unwound
//! by a later crawl), so every branch is deterministic and explainable:
//! platform identity updates in place, a single dedup match attaches a
//! snapshot to the existing venue, anything ambiguous is refused.

use std::sync::Arc;

use tracing::{info, warn};

use placematch_catalog::{CatalogStore, NewSnapshot, NewVenue, VenueFieldPatch};
use placematch_common::{
    CatalogError, CrawledRecord, MatcherConfig, Result, Venue, VenueStatus,
};

use crate::matcher::{MatchOutcome, MatchRule, Matcher};
use crate::normalize::{normalize_phone, platform_address};

/// What `reconcile` did with the record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileAction {
    /// Platform identity already known — mutable fields refreshed.
    UpdatedIdentity,
    /// Dedup match against a venue first seen on another platform — the
    /// record became (or refreshed) a secondary snapshot.
    AttachedSnapshot,
    /// No match — a new canonical venue.
    Created,
}

#[derive(Debug, Clone)]
pub struct ReconcileOutcome {
    pub venue: Venue,
    pub action: ReconcileAction,
    /// The rule that explained a match; `None` when a venue was created.
    pub rule: Option<MatchRule>,
}

pub struct Reconciler {
    store: Arc<dyn CatalogStore>,
    matcher: Matcher,
}

impl Reconciler {
    pub fn new(store: Arc<dyn CatalogStore>, config: MatcherConfig) -> Self {
        Self {
            store,
            matcher: Matcher::new(config),
        }
    }

    pub fn store(&self) -> &Arc<dyn CatalogStore> {
        &self.store
    }

    /// Reconcile one crawled record into the catalog. Idempotent: feeding
    /// the same record twice updates timestamps on the second pass and
    /// never creates a duplicate venue.
    pub async fn reconcile(&self, record: &CrawledRecord) -> Result<ReconcileOutcome> {
        // Rule 1: platform identity — the definite update path.
        let identical = self
            .store
            .venues_by_platform_identity(record.platform, &record.platform_id)
            .await?;
        if identical.len() > 1 {
            let ids: Vec<_> = identical.iter().map(|v| v.id).collect();
            warn!(
                platform = %record.platform,
                platform_id = %record.platform_id,
                venues = ?ids,
                "multiple venues share one platform identity"
            );
            return Err(CatalogError::InvariantViolation(format!(
                "{} venues share platform identity ({}, {}): {:?}",
                identical.len(),
                record.platform,
                record.platform_id,
                ids
            )));
        }
        if let Some(existing) = identical.into_iter().next() {
            return self.update_identity(existing, record).await;
        }

        // Rules 2-4: dedup heuristics against venues from other platforms.
        let candidates = self.dedup_candidates(record).await?;
        match self.matcher.evaluate(record, &candidates) {
            MatchOutcome::Ambiguous { venue_ids } => {
                warn!(
                    platform = %record.platform,
                    platform_id = %record.platform_id,
                    candidates = ?venue_ids,
                    "record matches multiple venues; refusing to merge"
                );
                Err(CatalogError::AmbiguousMatch { venue_ids })
            }
            MatchOutcome::Matched { venue, rule } => self.attach_snapshot(venue, rule, record).await,
            MatchOutcome::None => self.create_venue(record).await,
        }
    }

    /// Candidate set for the heuristic rules, unioned from the targeted
    /// queries. Each query compares against columns derived with the same
    /// normalizer used here, so the union is a superset of whatever a
    /// full scan would have matched.
    async fn dedup_candidates(&self, record: &CrawledRecord) -> Result<Vec<Venue>> {
        let mut candidates = Vec::new();

        if let Some((lat, lng)) = record.coords() {
            candidates.extend(self.store.venues_near(lat, lng).await?);
        }
        if let Some(phone) = record.phone.as_deref() {
            let normalized = normalize_phone(phone);
            if !normalized.is_empty() {
                candidates.extend(self.store.venues_by_normalized_phone(&normalized).await?);
            }
        }
        let address = platform_address(&record.address, record.platform);
        candidates.extend(
            self.store
                .venues_by_name_and_address(&record.name, &address)
                .await?,
        );

        Ok(candidates)
    }

    async fn update_identity(
        &self,
        existing: Venue,
        record: &CrawledRecord,
    ) -> Result<ReconcileOutcome> {
        let mut patch = VenueFieldPatch {
            name: Some(record.name.clone()),
            address: Some(record.address.clone()),
            normalized_address: Some(platform_address(&record.address, record.platform)),
            description: record.compose_description(),
            ..Default::default()
        };
        if let Some(phone) = &record.phone {
            patch.normalized_phone = Some(normalize_phone(phone));
            patch.phone = Some(phone.clone());
        }
        if let Some((lat, lng)) = record.coords() {
            patch.latitude = Some(lat);
            patch.longitude = Some(lng);
        }
        self.store.update_venue_fields(existing.id, patch).await?;

        // Status hints only ever move a venue forward along the
        // lifecycle; recovery goes through the validator.
        if let Some(hint) = record.status_hint {
            if hint.rank() > existing.status.rank() {
                info!(venue_id = %existing.id, from = %existing.status, to = %hint, "status hint applied");
                self.store.set_status(existing.id, hint).await?;
            }
        }

        self.upsert_snapshot(existing.id, record).await?;
        let venue = self.refetch(existing.id).await?;
        Ok(ReconcileOutcome {
            venue,
            action: ReconcileAction::UpdatedIdentity,
            rule: Some(MatchRule::PlatformIdentity),
        })
    }

    async fn attach_snapshot(
        &self,
        venue: Venue,
        rule: MatchRule,
        record: &CrawledRecord,
    ) -> Result<ReconcileOutcome> {
        info!(
            venue_id = %venue.id,
            rule = %rule,
            platform = %record.platform,
            platform_id = %record.platform_id,
            "cross-platform confirmation"
        );

        // First-registered platform's fields win; the secondary platform
        // may only fill gaps.
        let patch = gap_fill_patch(&venue, record);
        if patch.is_empty() {
            self.store.touch_last_synced(venue.id).await?;
        } else {
            self.store.update_venue_fields(venue.id, patch).await?;
        }

        self.upsert_snapshot(venue.id, record).await?;
        let venue = self.refetch(venue.id).await?;
        Ok(ReconcileOutcome {
            venue,
            action: ReconcileAction::AttachedSnapshot,
            rule: Some(rule),
        })
    }

    async fn create_venue(&self, record: &CrawledRecord) -> Result<ReconcileOutcome> {
        let status = record.status_hint.unwrap_or(VenueStatus::New);
        let venue = self
            .store
            .insert_venue(NewVenue {
                name: record.name.clone(),
                address: record.address.clone(),
                phone: record.phone.clone().unwrap_or_default(),
                description: record.compose_description(),
                latitude: record.latitude,
                longitude: record.longitude,
                source_platform: record.platform,
                platform_id: record.platform_id.clone(),
                status,
                normalized_phone: record
                    .phone
                    .as_deref()
                    .map(normalize_phone)
                    .unwrap_or_default(),
                normalized_address: platform_address(&record.address, record.platform),
            })
            .await?;

        info!(
            venue_id = %venue.id,
            platform = %record.platform,
            platform_id = %record.platform_id,
            name = %record.name,
            "new venue discovered"
        );

        self.upsert_snapshot(venue.id, record).await?;
        Ok(ReconcileOutcome {
            venue,
            action: ReconcileAction::Created,
            rule: None,
        })
    }

    async fn upsert_snapshot(&self, venue_id: uuid::Uuid, record: &CrawledRecord) -> Result<()> {
        let (rating, review_count, link) = legacy_scalars(&record.raw_payload);
        self.store
            .upsert_snapshot(NewSnapshot {
                venue_id,
                platform: record.platform,
                raw_payload: record.raw_payload.clone(),
                rating,
                review_count,
                link,
            })
            .await
    }

    async fn refetch(&self, id: uuid::Uuid) -> Result<Venue> {
        self.store
            .venue(id)
            .await?
            .ok_or_else(|| CatalogError::NotFound(format!("venue {id}")))
    }
}

/// Fill only fields the venue does not have yet.
fn gap_fill_patch(venue: &Venue, record: &CrawledRecord) -> VenueFieldPatch {
    let mut patch = VenueFieldPatch::default();

    if venue.phone.is_empty() {
        if let Some(phone) = record.phone.as_deref().filter(|p| !p.is_empty()) {
            patch.phone = Some(phone.to_string());
            patch.normalized_phone = Some(normalize_phone(phone));
        }
    }
    if venue.coords().is_none() {
        if let Some((lat, lng)) = record.coords() {
            patch.latitude = Some(lat);
            patch.longitude = Some(lng);
        }
    }
    if venue.description.as_deref().is_none_or(|d| d.is_empty()) {
        patch.description = record.compose_description();
    }
    if venue.address.is_empty() && !record.address.is_empty() {
        patch.address = Some(record.address.clone());
        patch.normalized_address = Some(platform_address(&record.address, record.platform));
    }

    patch
}

/// Legacy scalar snapshot fields for platforms still reporting them
/// inside the raw payload.
fn legacy_scalars(payload: &serde_json::Value) -> (Option<f64>, Option<i32>, Option<String>) {
    let rating = payload.get("rating").and_then(as_f64);
    let review_count = payload
        .get("review_count")
        .and_then(as_f64)
        .map(|n| n as i32);
    let link = payload
        .get("link")
        .and_then(|v| v.as_str())
        .map(str::to_string);
    (rating, review_count, link)
}

fn as_f64(value: &serde_json::Value) -> Option<f64> {
    match value {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
