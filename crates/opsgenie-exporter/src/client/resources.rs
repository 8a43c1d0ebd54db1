use async_trait::async_trait;

use opsgenie_core::error::{ExporterError, Result};
use opsgenie_core::model::{AccountInfo, Heartbeat, HeartbeatDetail, HeartbeatList, Integration, Team, User};

use crate::client::ApiFetcher;
use crate::config::ApiSection;

/// Typed accessors for the upstream resources.
///
/// The collector only talks to this trait, so pipelines can run against an
/// in-memory implementation in tests.
#[async_trait]
pub trait OpsgenieApi: Send + Sync {
    async fn list_users(&self) -> Result<Vec<User>>;
    async fn list_teams(&self) -> Result<Vec<Team>>;
    async fn account_info(&self) -> Result<AccountInfo>;
    async fn list_integrations(&self) -> Result<Vec<Integration>>;
    async fn list_heartbeats(&self) -> Result<Vec<Heartbeat>>;
    async fn heartbeat_detail(&self, name: &str) -> Result<HeartbeatDetail>;
}

/// HTTP implementation over [`ApiFetcher`].
#[derive(Clone)]
pub struct OpsgenieClient {
    fetcher: ApiFetcher,
    page_limit: u32,
}

impl OpsgenieClient {
    pub fn new(fetcher: ApiFetcher, page_limit: u32) -> Self {
        Self { fetcher, page_limit }
    }

    pub fn from_config(api: &ApiSection, api_key: &str) -> Result<Self> {
        let fetcher = ApiFetcher::new(&api.base_url, api_key, api.request_timeout(), api.max_pages)?;
        Ok(Self::new(fetcher, api.page_limit))
    }
}

#[async_trait]
impl OpsgenieApi for OpsgenieClient {
    async fn list_users(&self) -> Result<Vec<User>> {
        self.fetcher
            .fetch_all_json(&format!("users?limit={}", self.page_limit))
            .await
    }

    async fn list_teams(&self) -> Result<Vec<Team>> {
        self.fetcher
            .fetch_all_json(&format!("teams?limit={}", self.page_limit))
            .await
    }

    async fn account_info(&self) -> Result<AccountInfo> {
        self.fetcher.fetch_single("account").await
    }

    async fn list_integrations(&self) -> Result<Vec<Integration>> {
        // single page: the endpoint is not paginated upstream
        self.fetcher.fetch_single("integrations").await
    }

    async fn list_heartbeats(&self) -> Result<Vec<Heartbeat>> {
        let list: HeartbeatList = self.fetcher.fetch_single("heartbeats").await?;
        Ok(list.heartbeats)
    }

    async fn heartbeat_detail(&self, name: &str) -> Result<HeartbeatDetail> {
        let mut url = self.fetcher.base().clone();
        url.path_segments_mut()
            .map_err(|_| ExporterError::Config("api.base_url cannot carry a path".into()))?
            .pop_if_empty()
            .push("heartbeats")
            .push(name);
        // absolute, so the escaped segment is kept as-is by the base join
        self.fetcher.fetch_single(url.as_str()).await
    }
}
