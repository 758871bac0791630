use std::env;

/// Dedup thresholds. Kept as configuration rather than hard-coded
/// constants so they can be tuned without code changes.
#[derive(Debug, Clone, Copy)]
pub struct MatcherConfig {
    /// Max distance between coordinates for the geo+name rule, in meters.
    pub max_distance_m: f64,
    /// Min normalized-name similarity for the geo+name rule, in [0, 1].
    pub min_name_similarity: f64,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            max_distance_m: 50.0,
            min_name_similarity: 0.8,
        }
    }
}

/// Bounds for the randomized inter-request delay used between crawl units.
#[derive(Debug, Clone, Copy)]
pub struct PacingConfig {
    pub min_ms: u64,
    pub max_ms: u64,
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self {
            min_ms: 2_000,
            max_ms: 5_000,
        }
    }
}

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,

    // Dedup thresholds
    pub match_max_distance_m: f64,
    pub match_min_name_similarity: f64,

    // Anti-block pacing between crawl units
    pub pacing_min_ms: u64,
    pub pacing_max_ms: u64,

    /// Venues not synced for this many days are prioritized by the
    /// stale-revalidation and stale-review-sync passes.
    pub stale_after_days: i64,
}

impl Config {
    /// Load configuration from environment variables.
    /// Panics with a clear message if required vars are missing.
    pub fn from_env() -> Self {
        Self {
            database_url: required_env("DATABASE_URL"),
            match_max_distance_m: optional_parsed("MATCH_MAX_DISTANCE_M", 50.0),
            match_min_name_similarity: optional_parsed("MATCH_MIN_NAME_SIMILARITY", 0.8),
            pacing_min_ms: optional_parsed("PACING_MIN_MS", 2_000),
            pacing_max_ms: optional_parsed("PACING_MAX_MS", 5_000),
            stale_after_days: optional_parsed("STALE_AFTER_DAYS", 7),
        }
    }

    pub fn matcher(&self) -> MatcherConfig {
        MatcherConfig {
            max_distance_m: self.match_max_distance_m,
            min_name_similarity: self.match_min_name_similarity,
        }
    }

    pub fn pacing(&self) -> PacingConfig {
        PacingConfig {
            min_ms: self.pacing_min_ms,
            max_ms: self.pacing_max_ms,
        }
    }
}

fn required_env(key: &str) -> String {
    env::var(key).unwrap_or_else(|_| panic!("{key} environment variable is required"))
}

fn optional_parsed<T: std::str::FromStr>(key: &str, default: T) -> T {
    match env::var(key) {
        Ok(v) => v
            .parse()
            .unwrap_or_else(|_| panic!("{key} must be a valid number, got {v:?}")),
        Err(_) => default,
    }
}
