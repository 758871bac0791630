use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("Not found: {0}")]
    NotFound(String),

    /// More than one existing venue matched a candidate record. Never
    /// auto-merged — requires manual resolution.
    #[error("Ambiguous match: {} candidate venues: {}", venue_ids.len(), format_ids(venue_ids))]
    AmbiguousMatch { venue_ids: Vec<Uuid> },

    /// A uniqueness invariant broke elsewhere (e.g. two venues share one
    /// platform identity). Fatal to the affected unit; a data-integrity
    /// signal, not a retryable failure.
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Crawl error: {0}")]
    Crawl(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, CatalogError>;

fn format_ids(ids: &[Uuid]) -> String {
    ids.iter()
        .map(|id| id.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}
