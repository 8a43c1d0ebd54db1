//! opsgenie exporter library entry.
//!
//! This crate wires the paginated API client, the per-resource collection
//! pipelines, the shared metric store and the operational HTTP endpoints
//! into one exporter. It is consumed by the binary (`main.rs`) and by
//! integration tests.

pub mod app_state;
pub mod client;
pub mod collector;
pub mod config;
pub mod obs;
pub mod ops;
pub mod router;
