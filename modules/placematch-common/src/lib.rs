pub mod config;
pub mod error;
pub mod types;

pub use config::{Config, MatcherConfig, PacingConfig};
pub use error::{CatalogError, Result};
pub use types::*;
