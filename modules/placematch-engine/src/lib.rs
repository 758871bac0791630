pub mod discovery;
pub mod lifecycle;
pub mod matcher;
pub mod normalize;
pub mod pacing;
pub mod reconciler;
pub mod review_sync;
#[cfg(any(test, feature = "test-support"))]
pub mod testing;
pub mod traits;

pub use discovery::{DiscoveryRunner, DiscoveryStats};
pub use lifecycle::{LifecycleValidator, ValidationStats};
pub use matcher::{MatchOutcome, MatchRule, Matcher};
pub use pacing::Pacing;
pub use reconciler::{ReconcileAction, ReconcileOutcome, Reconciler};
pub use review_sync::{ReviewSyncStats, ReviewSyncer};
pub use traits::Crawler;

/// Cooperative shutdown signal checked between crawl units. The in-flight
/// unit always finishes or aborts cleanly; no venue or review write is
/// interrupted mid-transaction.
pub type Shutdown = tokio::sync::watch::Receiver<bool>;

pub fn shutdown_channel() -> (tokio::sync::watch::Sender<bool>, Shutdown) {
    tokio::sync::watch::channel(false)
}
