//! Bulk discovery over a region list.
//!
//! One (platform, region, keyword) search is the unit of work and the
//! unit of failure: a region whose crawl blows up is logged and skipped,
//! and the next scheduled run picks it up again. Ambiguous records are
//! counted, not merged.

use std::sync::Arc;

use tracing::{error, info, warn};

use placematch_common::{Platform, Result};

use crate::pacing::Pacing;
use crate::reconciler::{ReconcileAction, Reconciler};
use crate::traits::Crawler;
use crate::Shutdown;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DiscoveryStats {
    pub units_ok: usize,
    pub units_failed: usize,
    pub new_venues: usize,
    pub updated: usize,
    pub snapshots_attached: usize,
    pub ambiguous: usize,
    /// Records whose reconciliation errored (ambiguity excluded).
    pub records_failed: usize,
}

pub struct DiscoveryRunner {
    reconciler: Reconciler,
    crawler: Arc<dyn Crawler>,
    pacing: Pacing,
}

impl DiscoveryRunner {
    pub fn new(reconciler: Reconciler, crawler: Arc<dyn Crawler>, pacing: Pacing) -> Self {
        Self {
            reconciler,
            crawler,
            pacing,
        }
    }

    pub fn reconciler(&self) -> &Reconciler {
        &self.reconciler
    }

    /// Search every region for the keyword on one platform and reconcile
    /// whatever comes back. Runs units sequentially with a pacing pause
    /// between them; a shutdown signal stops before the next unit starts.
    pub async fn run(
        &self,
        platform: Platform,
        regions: &[String],
        keyword: &str,
        shutdown: &Shutdown,
    ) -> Result<DiscoveryStats> {
        let mut stats = DiscoveryStats::default();
        let total = regions.len();

        for (i, region) in regions.iter().enumerate() {
            if *shutdown.borrow() {
                info!(
                    done = stats.units_ok + stats.units_failed,
                    total,
                    "discovery interrupted by shutdown"
                );
                break;
            }
            if i > 0 {
                self.pacing.pause().await;
            }

            match self.crawler.search(platform, region, keyword).await {
                Ok(records) => {
                    info!(
                        platform = %platform,
                        region = %region,
                        keyword = %keyword,
                        records = records.len(),
                        "region searched"
                    );
                    for record in &records {
                        self.reconcile_record(record, &mut stats).await?;
                    }
                    stats.units_ok += 1;
                }
                Err(err) => {
                    warn!(
                        platform = %platform,
                        region = %region,
                        keyword = %keyword,
                        error = %err,
                        "region search failed; continuing with remaining regions"
                    );
                    stats.units_failed += 1;
                }
            }
        }

        info!(
            platform = %platform,
            keyword = %keyword,
            units_ok = stats.units_ok,
            units_failed = stats.units_failed,
            new_venues = stats.new_venues,
            updated = stats.updated,
            snapshots_attached = stats.snapshots_attached,
            ambiguous = stats.ambiguous,
            records_failed = stats.records_failed,
            "discovery run finished"
        );
        Ok(stats)
    }

    /// A record that fails reconciliation must not sink its region:
    /// ambiguity and per-record store errors are counted and skipped,
    /// and only those are swallowed here.
    async fn reconcile_record(
        &self,
        record: &placematch_common::CrawledRecord,
        stats: &mut DiscoveryStats,
    ) -> Result<()> {
        match self.reconciler.reconcile(record).await {
            Ok(outcome) => {
                match outcome.action {
                    ReconcileAction::Created => stats.new_venues += 1,
                    ReconcileAction::UpdatedIdentity => stats.updated += 1,
                    ReconcileAction::AttachedSnapshot => stats.snapshots_attached += 1,
                }
                Ok(())
            }
            Err(placematch_common::CatalogError::AmbiguousMatch { .. }) => {
                stats.ambiguous += 1;
                Ok(())
            }
            Err(err @ placematch_common::CatalogError::InvariantViolation(_)) => {
                error!(
                    platform = %record.platform,
                    platform_id = %record.platform_id,
                    error = %err,
                    "catalog invariant broken; skipping record"
                );
                stats.records_failed += 1;
                Ok(())
            }
            Err(err) => {
                warn!(
                    platform = %record.platform,
                    platform_id = %record.platform_id,
                    error = %err,
                    "record reconciliation failed; skipping record"
                );
                stats.records_failed += 1;
                Ok(())
            }
        }
    }
}
