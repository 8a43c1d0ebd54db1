//! In-process metric store.
//!
//! Holds every exported gauge and the exporter's own counters; rendered by
//! the `/metrics` handler in Prometheus text format.

pub mod metrics;

pub use metrics::{MetricKind, MetricStore};
