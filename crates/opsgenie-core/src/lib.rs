//! opsgenie core: resource model, page envelope, metric facts and aggregators.
//!
//! This crate defines the data contracts of the upstream incident-management
//! API and the pure functions that turn fetched collections into metric
//! facts. It carries no HTTP, runtime, or server dependencies so the
//! aggregation rules can be tested in isolation.
//!
//! # Defensive guarantees
//! Panics, `unwrap`, and `expect` are compile-denied here.
//! All fallible paths surface as `ExporterError`/`Result`.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod aggregate;
pub mod error;
pub mod fact;
pub mod model;

/// Shared result type.
pub use error::{ErrorKind, ExporterError, Result};
pub use fact::{labels, Labels, MetricFact};
