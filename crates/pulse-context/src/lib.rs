//! First-turn business context.
//!
//! Collects leads, partners, products and orders for the caller from
//! independent sources, tolerating slow or broken ones, and produces one
//! bounded [`ContextSnapshot`](pulse_core::ContextSnapshot).

pub mod aggregate;
pub mod error;
pub mod fetcher;

pub use aggregate::Aggregator;
pub use error::SourceError;
pub use fetcher::{fetch, CacheSource, HttpSource, SourceFetcher};
