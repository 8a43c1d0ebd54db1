//! Exporter config loader (strict parsing).

pub mod schema;

use std::fs;

use opsgenie_core::error::{ExporterError, Result};

pub use schema::{ApiSection, CollectorSection, ExporterConfig, ServerSection, StaleLabelPolicy};

/// Command-line values layered over the file (or the defaults).
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub http_port: Option<u16>,
    pub refresh_secs: Option<u64>,
    pub base_url: Option<String>,
}

/// defaults <- optional YAML file <- overrides, validated once at the end.
pub fn resolve(path: Option<&str>, overrides: &Overrides) -> Result<ExporterConfig> {
    let mut cfg = match path {
        Some(path) => load_from_file(path)?,
        None => ExporterConfig::default(),
    };
    if let Some(port) = overrides.http_port {
        cfg.set_port(port)?;
    }
    if let Some(secs) = overrides.refresh_secs {
        cfg.collector.interval_secs = secs;
    }
    if let Some(base_url) = &overrides.base_url {
        cfg.api.base_url = base_url.clone();
    }
    cfg.validate()?;
    Ok(cfg)
}

pub fn load_from_file(path: &str) -> Result<ExporterConfig> {
    let s = fs::read_to_string(path)
        .map_err(|e| ExporterError::Config(format!("read config {path} failed: {e}")))?;
    load_from_str(&s)
}

pub fn load_from_str(s: &str) -> Result<ExporterConfig> {
    let cfg: ExporterConfig =
        serde_yaml::from_str(s).map_err(|e| ExporterError::Config(format!("invalid yaml: {e}")))?;
    cfg.validate()?;
    Ok(cfg)
}
