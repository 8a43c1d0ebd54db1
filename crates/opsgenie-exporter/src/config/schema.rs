use std::net::SocketAddr;
use std::time::Duration;

use serde::Deserialize;
use opsgenie_core::error::{ExporterError, Result};

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExporterConfig {
    pub version: u32,

    #[serde(default)]
    pub api: ApiSection,

    #[serde(default)]
    pub collector: CollectorSection,

    #[serde(default)]
    pub server: ServerSection,
}

impl Default for ExporterConfig {
    fn default() -> Self {
        Self {
            version: 1,
            api: ApiSection::default(),
            collector: CollectorSection::default(),
            server: ServerSection::default(),
        }
    }
}

impl ExporterConfig {
    pub fn validate(&self) -> Result<()> {
        if self.version != 1 {
            return Err(ExporterError::Config(format!(
                "unsupported config version {}",
                self.version
            )));
        }

        self.api.validate()?;
        self.collector.validate()?;
        self.server.validate()?;

        Ok(())
    }

    /// Replace the port of `server.listen`, keeping its address.
    pub fn set_port(&mut self, port: u16) -> Result<()> {
        let mut addr = self.server.listen_addr()?;
        addr.set_port(port);
        self.server.listen = addr.to_string();
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ApiSection {
    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    #[serde(default = "default_page_limit")]
    pub page_limit: u32,

    #[serde(default = "default_max_pages")]
    pub max_pages: usize,
}

impl Default for ApiSection {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            request_timeout_ms: default_request_timeout_ms(),
            page_limit: default_page_limit(),
            max_pages: default_max_pages(),
        }
    }
}

impl ApiSection {
    pub fn validate(&self) -> Result<()> {
        let url = url::Url::parse(&self.base_url)
            .map_err(|e| ExporterError::Config(format!("api.base_url is not a valid url: {e}")))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ExporterError::Config("api.base_url must be http or https".into()));
        }
        if !self.base_url.ends_with('/') {
            return Err(ExporterError::Config("api.base_url must end with '/'".into()));
        }
        if !(1000..=120000).contains(&self.request_timeout_ms) {
            return Err(ExporterError::Config(
                "api.request_timeout_ms must be between 1000 and 120000".into(),
            ));
        }
        if !(1..=100).contains(&self.page_limit) {
            return Err(ExporterError::Config("api.page_limit must be between 1 and 100".into()));
        }
        if !(1..=100000).contains(&self.max_pages) {
            return Err(ExporterError::Config("api.max_pages must be between 1 and 100000".into()));
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// What happens to label series a successful pipeline did not emit this poll.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StaleLabelPolicy {
    /// Set them to zero.
    #[default]
    Zero,
    /// Keep the last reported value.
    Retain,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CollectorSection {
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,

    #[serde(default = "default_pipeline_timeout_secs")]
    pub pipeline_timeout_secs: u64,

    #[serde(default = "default_heartbeat_concurrency")]
    pub heartbeat_concurrency: usize,

    #[serde(default)]
    pub stale_labels: StaleLabelPolicy,

    #[serde(default = "default_shutdown_grace_secs")]
    pub shutdown_grace_secs: u64,
}

impl Default for CollectorSection {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            pipeline_timeout_secs: default_pipeline_timeout_secs(),
            heartbeat_concurrency: default_heartbeat_concurrency(),
            stale_labels: StaleLabelPolicy::default(),
            shutdown_grace_secs: default_shutdown_grace_secs(),
        }
    }
}

impl CollectorSection {
    pub fn validate(&self) -> Result<()> {
        if !(10..=86400).contains(&self.interval_secs) {
            return Err(ExporterError::Config(
                "collector.interval_secs must be between 10 and 86400".into(),
            ));
        }
        if !(1..=3600).contains(&self.pipeline_timeout_secs) {
            return Err(ExporterError::Config(
                "collector.pipeline_timeout_secs must be between 1 and 3600".into(),
            ));
        }
        if !(1..=64).contains(&self.heartbeat_concurrency) {
            return Err(ExporterError::Config(
                "collector.heartbeat_concurrency must be between 1 and 64".into(),
            ));
        }
        if self.shutdown_grace_secs > 300 {
            return Err(ExporterError::Config(
                "collector.shutdown_grace_secs must be at most 300".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerSection {
    #[serde(default = "default_listen")]
    pub listen: String,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            listen: default_listen(),
        }
    }
}

impl ServerSection {
    pub fn validate(&self) -> Result<()> {
        self.listen_addr().map(|_| ())
    }

    pub fn listen_addr(&self) -> Result<SocketAddr> {
        self.listen
            .parse()
            .map_err(|e| ExporterError::Config(format!("server.listen must be a valid SocketAddr: {e}")))
    }
}

fn default_base_url() -> String {
    "https://api.eu.opsgenie.com/v2/".into()
}
fn default_request_timeout_ms() -> u64 {
    10000
}
fn default_page_limit() -> u32 {
    100
}
fn default_max_pages() -> usize {
    1000
}
fn default_interval_secs() -> u64 {
    600
}
fn default_pipeline_timeout_secs() -> u64 {
    300
}
fn default_heartbeat_concurrency() -> usize {
    4
}
fn default_shutdown_grace_secs() -> u64 {
    10
}
fn default_listen() -> String {
    "0.0.0.0:8080".into()
}
