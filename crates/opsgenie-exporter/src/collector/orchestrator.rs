use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio::time::{timeout, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use opsgenie_core::aggregate::names;
use opsgenie_core::error::ExporterError;
use opsgenie_core::{labels, Labels};

use crate::client::OpsgenieApi;
use crate::collector::pipeline::{run_pipeline, Resource};
use crate::config::{CollectorSection, StaleLabelPolicy};
use crate::obs::{MetricKind, MetricStore};

/// Exporter self metrics.
pub mod self_names {
    pub const COLLECT_ERRORS: &str = "opsgenie_exporter_collect_errors_total";
    pub const HEARTBEAT_DETAIL_ERRORS: &str = "opsgenie_exporter_heartbeat_detail_errors_total";
    pub const COLLECT_DURATION: &str = "opsgenie_exporter_collect_duration_seconds";
    pub const LAST_POLL: &str = "opsgenie_exporter_last_poll_timestamp_seconds";
    pub const POLL_DURATION: &str = "opsgenie_exporter_poll_duration_seconds";
}

#[derive(Debug, Clone)]
pub struct CollectorSettings {
    pub interval: Duration,
    pub pipeline_timeout: Duration,
    pub heartbeat_concurrency: usize,
    pub stale_labels: StaleLabelPolicy,
    pub shutdown_grace: Duration,
}

impl From<&CollectorSection> for CollectorSettings {
    fn from(c: &CollectorSection) -> Self {
        Self {
            interval: Duration::from_secs(c.interval_secs),
            pipeline_timeout: Duration::from_secs(c.pipeline_timeout_secs),
            heartbeat_concurrency: c.heartbeat_concurrency,
            stale_labels: c.stale_labels,
            shutdown_grace: Duration::from_secs(c.shutdown_grace_secs),
        }
    }
}

/// Outcome of one poll, after the join barrier.
#[derive(Debug, Default)]
pub struct PollReport {
    pub succeeded: Vec<Resource>,
    pub failed: Vec<(Resource, ExporterError)>,
    pub elapsed: Duration,
}

/// Timer-driven fan-out of the resource pipelines into the metric store.
pub struct Collector {
    api: Arc<dyn OpsgenieApi>,
    store: Arc<MetricStore>,
    settings: CollectorSettings,
    polls: watch::Sender<u64>,
}

impl Collector {
    pub fn new(api: Arc<dyn OpsgenieApi>, store: Arc<MetricStore>, settings: CollectorSettings) -> Self {
        for (name, help) in names::DESCRIPTIONS {
            store.describe(name, MetricKind::Gauge, help);
        }
        for name in names::PER_ENTITY {
            store.mark_per_entity(name);
        }
        store.describe(
            self_names::COLLECT_ERRORS,
            MetricKind::Counter,
            "Failed resource collections by resource and error kind.",
        );
        store.describe(
            self_names::HEARTBEAT_DETAIL_ERRORS,
            MetricKind::Counter,
            "Heartbeat detail fetches that failed and were skipped.",
        );
        store.describe(
            self_names::COLLECT_DURATION,
            MetricKind::Gauge,
            "Wall time of the last collection of each resource.",
        );
        store.describe(
            self_names::LAST_POLL,
            MetricKind::Gauge,
            "Unix time at which the last poll completed.",
        );
        store.describe(
            self_names::POLL_DURATION,
            MetricKind::Gauge,
            "Wall time of the last complete poll.",
        );

        let (polls, _) = watch::channel(0);
        Self {
            api,
            store,
            settings,
            polls,
        }
    }

    /// Number of completed polls; changes after every join barrier.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.polls.subscribe()
    }

    pub fn store(&self) -> &Arc<MetricStore> {
        &self.store
    }

    /// Run every resource pipeline concurrently and wait for all of them.
    ///
    /// Each pipeline commits its own facts as soon as it finishes; a failed
    /// pipeline leaves its families untouched. The last-poll stamp is written
    /// only after all pipelines are accounted for.
    pub async fn poll_once(&self) -> PollReport {
        let started = Instant::now();
        info!("poll started");

        let mut tasks = JoinSet::new();
        for resource in Resource::ALL {
            let api = Arc::clone(&self.api);
            let store = Arc::clone(&self.store);
            let settings = self.settings.clone();
            tasks.spawn(async move {
                let res = collect_resource(resource, api.as_ref(), &store, &settings).await;
                (resource, res)
            });
        }

        let mut report = PollReport::default();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((resource, Ok(()))) => report.succeeded.push(resource),
                Ok((resource, Err(e))) => report.failed.push((resource, e)),
                Err(e) => error!(error = %e, "collection task did not complete"),
            }
        }
        report.succeeded.sort();
        report.failed.sort_by_key(|(resource, _)| *resource);
        report.elapsed = started.elapsed();

        self.store.set(self_names::POLL_DURATION, Labels::new(), report.elapsed.as_secs_f64());
        self.store.set(
            self_names::LAST_POLL,
            Labels::new(),
            Utc::now().timestamp_millis() as f64 / 1000.0,
        );
        self.polls.send_modify(|n| *n += 1);

        info!(
            elapsed_ms = report.elapsed.as_millis() as u64,
            succeeded = report.succeeded.len(),
            failed = report.failed.len(),
            "poll finished"
        );
        report
    }

    /// Poll on every interval tick until `shutdown` is cancelled.
    ///
    /// A poll in flight at shutdown gets `shutdown_grace` to finish; after
    /// that it is dropped, which aborts its remaining pipeline tasks.
    pub async fn run(&self, shutdown: CancellationToken) {
        let mut tick = tokio::time::interval(self.settings.interval);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(interval_secs = self.settings.interval.as_secs(), "collector started");

        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                _ = tick.tick() => {}
            }

            let poll = self.poll_once();
            tokio::pin!(poll);
            tokio::select! {
                _ = &mut poll => {}
                _ = shutdown.cancelled() => {
                    info!(grace_secs = self.settings.shutdown_grace.as_secs(), "shutdown requested, waiting for in-flight poll");
                    if timeout(self.settings.shutdown_grace, &mut poll).await.is_err() {
                        warn!("in-flight poll abandoned after grace period");
                    }
                    break;
                }
            }
        }

        info!("collector stopped");
    }
}

async fn collect_resource(
    resource: Resource,
    api: &dyn OpsgenieApi,
    store: &MetricStore,
    settings: &CollectorSettings,
) -> Result<(), ExporterError> {
    let started = Instant::now();
    let res = match timeout(
        settings.pipeline_timeout,
        run_pipeline(resource, api, settings.heartbeat_concurrency),
    )
    .await
    {
        Ok(res) => res,
        Err(_) => Err(ExporterError::Timeout {
            what: format!("{} collection", resource.as_str()),
            after: settings.pipeline_timeout,
        }),
    };

    store.set(
        self_names::COLLECT_DURATION,
        labels(&[("resource", resource.as_str())]),
        started.elapsed().as_secs_f64(),
    );

    match res {
        Ok(output) => {
            if output.skipped > 0 {
                store.add(self_names::HEARTBEAT_DETAIL_ERRORS, Labels::new(), output.skipped as f64);
            }
            debug!(resource = resource.as_str(), facts = output.facts.len(), "committing facts");
            store.commit(resource.families(), output.facts, settings.stale_labels);
            Ok(())
        }
        Err(e) => {
            warn!(
                resource = resource.as_str(),
                kind = e.kind().as_str(),
                error = %e,
                "collection failed, keeping previous values"
            );
            store.inc(
                self_names::COLLECT_ERRORS,
                labels(&[("resource", resource.as_str()), ("kind", e.kind().as_str())]),
            );
            Err(e)
        }
    }
}
