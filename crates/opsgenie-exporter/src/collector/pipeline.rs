use futures_util::future::BoxFuture;
use futures_util::stream::{self, StreamExt};
use tracing::warn;

use opsgenie_core::aggregate::{self, names};
use opsgenie_core::error::Result;
use opsgenie_core::model::HeartbeatDetail;
use opsgenie_core::MetricFact;

use crate::client::OpsgenieApi;

/// The independent resource pipelines run on every poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Resource {
    Users,
    Teams,
    Account,
    Integrations,
    Heartbeats,
}

impl Resource {
    pub const ALL: [Resource; 5] = [
        Resource::Users,
        Resource::Teams,
        Resource::Account,
        Resource::Integrations,
        Resource::Heartbeats,
    ];

    /// Label value used in logs and self metrics.
    pub fn as_str(self) -> &'static str {
        match self {
            Resource::Users => "users",
            Resource::Teams => "teams",
            Resource::Account => "account",
            Resource::Integrations => "integrations",
            Resource::Heartbeats => "heartbeats",
        }
    }

    /// Metric families written exclusively by this pipeline.
    pub fn families(self) -> &'static [&'static str] {
        match self {
            Resource::Users => &[names::USERS, names::USER_VERIFIED],
            Resource::Teams => &[names::TEAMS_TOTAL],
            Resource::Account => &[names::ACCOUNT],
            Resource::Integrations => &[names::INTEGRATIONS],
            Resource::Heartbeats => &[names::HEARTBEATS, names::HEARTBEATS_EXPIRED],
        }
    }
}

/// Facts from one successful pipeline run.
#[derive(Debug, Default)]
pub struct PipelineOutput {
    pub facts: Vec<MetricFact>,
    /// Items dropped after a per-item fetch failure.
    pub skipped: usize,
}

impl From<Vec<MetricFact>> for PipelineOutput {
    fn from(facts: Vec<MetricFact>) -> Self {
        Self { facts, skipped: 0 }
    }
}

/// Fetch one resource and aggregate it.
pub async fn run_pipeline(
    resource: Resource,
    api: &dyn OpsgenieApi,
    heartbeat_concurrency: usize,
) -> Result<PipelineOutput> {
    match resource {
        Resource::Users => Ok(aggregate::users(&api.list_users().await?).into()),
        Resource::Teams => Ok(aggregate::teams(&api.list_teams().await?).into()),
        Resource::Account => Ok(aggregate::account(&api.account_info().await?).into()),
        Resource::Integrations => Ok(aggregate::integrations(&api.list_integrations().await?).into()),
        Resource::Heartbeats => heartbeats(api, heartbeat_concurrency).await,
    }
}

/// List heartbeats, then fetch each detail through a bounded worker pool.
///
/// A failed detail is logged when it fails and skipped; it never fails the
/// pipeline.
async fn heartbeats<'a>(api: &'a dyn OpsgenieApi, concurrency: usize) -> Result<PipelineOutput> {
    let listed = api.list_heartbeats().await?;
    let names: Vec<String> = listed.iter().map(|hb| hb.name.clone()).collect();

    let fetched: Vec<Option<HeartbeatDetail>> = stream::iter(names)
        .map(move |name: String| -> BoxFuture<'a, Option<HeartbeatDetail>> {
            Box::pin(async move {
                match api.heartbeat_detail(&name).await {
                    Ok(detail) => Some(detail),
                    Err(e) => {
                        warn!(heartbeat = %name, kind = e.kind().as_str(), error = %e, "heartbeat detail fetch failed, skipping");
                        None
                    }
                }
            })
        })
        .buffered(concurrency.max(1))
        .collect()
        .await;

    let skipped = fetched.iter().filter(|d| d.is_none()).count();
    let details: Vec<HeartbeatDetail> = fetched.into_iter().flatten().collect();

    Ok(PipelineOutput {
        facts: aggregate::heartbeats(&listed, &details),
        skipped,
    })
}
