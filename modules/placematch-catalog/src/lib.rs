pub mod cell;
pub mod pg;
pub mod store;
#[cfg(any(test, feature = "test-utils"))]
pub mod testutil;

pub use pg::PgCatalog;
pub use store::{CatalogStore, NewReview, NewSnapshot, NewVenue, VenueFieldPatch};
