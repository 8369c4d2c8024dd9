//! Embedded tours/reviews catalog core.
//!
//! Collections of BSON documents with declared schemas, a request-driven [`query::QueryBuilder`]
//! (filter, sort, projection, pagination from `key=value` pairs) and a [`ratings::RatingsMaintainer`]
//! that keeps each tour's `ratingsQuantity`/`ratingsAverage` in step with its reviews.

pub mod aggregate;
pub mod catalog;
pub mod cli;
pub mod collection;
pub mod config;
pub mod document;
pub mod errors;
pub mod logger;
pub mod persist;
pub mod query;
pub mod ratings;
pub mod schema;
pub mod types;
pub mod utils;

pub use catalog::{Catalog, Resource};
pub use collection::Collection;
pub use config::AppConfig;
pub use document::Document;
pub use errors::DbError;
pub use types::DocumentId;

/// Initializes logging from the `TOURLITE_*` environment variables.
///
/// Call once before opening a [`Catalog`]; later calls are ignored with a warning.
///
/// # Errors
/// Fails when the log directory or one of its files cannot be created.
pub fn init() -> Result<(), Box<dyn std::error::Error>> {
    logger::configure_from_env()?;
    Ok(())
}
