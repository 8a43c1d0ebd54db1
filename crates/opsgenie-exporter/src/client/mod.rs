//! Upstream API client.
//!
//! - `ApiFetcher`: authenticated GET, page envelope decoding, cursor following
//! - `OpsgenieApi`: typed resource accessors built on the fetcher

pub mod fetcher;
pub mod resources;

pub use fetcher::{resolve_cursor, ApiFetcher};
pub use resources::{OpsgenieApi, OpsgenieClient};
