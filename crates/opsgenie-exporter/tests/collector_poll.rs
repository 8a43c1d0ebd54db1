//! Orchestrator behaviour against an in-memory API.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use opsgenie_core::aggregate::names;
use opsgenie_core::error::{ExporterError, Result};
use opsgenie_core::model::{
    AccountInfo, Heartbeat, HeartbeatDetail, Integration, OwnerTeam, Plan, Team, User,
};
use opsgenie_core::{labels, Labels, MetricFact};
use opsgenie_exporter::client::OpsgenieApi;
use opsgenie_exporter::collector::{run_pipeline, self_names, Collector, CollectorSettings, Resource};
use opsgenie_exporter::config::StaleLabelPolicy;
use opsgenie_exporter::obs::MetricStore;

#[derive(Clone)]
struct Heart {
    name: &'static str,
    enabled: bool,
    expired: bool,
    team: &'static str,
}

#[derive(Default)]
struct State {
    users: Vec<User>,
    teams: Vec<Team>,
    integrations: Vec<&'static str>,
    hearts: Vec<Heart>,
    failing: HashSet<Resource>,
    failing_details: HashSet<&'static str>,
}

#[derive(Default)]
struct FakeApi {
    state: Mutex<State>,
    detail_delay: Duration,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl FakeApi {
    fn seeded() -> Self {
        let api = FakeApi::default();
        {
            let mut s = api.state.lock().unwrap();
            s.users = vec![user("a", false, true), user("b", true, false), user("c", false, false)];
            s.teams = vec![Team { name: "ops".into() }, Team { name: "web".into() }];
            s.integrations = vec!["API", "Email", "API"];
            s.hearts = vec![
                Heart { name: "db", enabled: true, expired: true, team: "ops" },
                Heart { name: "cron", enabled: true, expired: false, team: "ops" },
                Heart { name: "batch", enabled: true, expired: true, team: "" },
                Heart { name: "legacy", enabled: false, expired: true, team: "web" },
            ];
        }
        api
    }

    fn update(&self, f: impl FnOnce(&mut State)) {
        f(&mut self.state.lock().unwrap());
    }

    fn check(&self, resource: Resource) -> Result<()> {
        if self.state.lock().unwrap().failing.contains(&resource) {
            return Err(ExporterError::Status {
                status: 503,
                endpoint: resource.as_str().to_string(),
            });
        }
        Ok(())
    }
}

fn user(name: &str, blocked: bool, verified: bool) -> User {
    User {
        username: name.into(),
        blocked,
        verified,
    }
}

fn owner(team: &str) -> OwnerTeam {
    OwnerTeam {
        id: String::new(),
        name: team.into(),
    }
}

#[async_trait]
impl OpsgenieApi for FakeApi {
    async fn list_users(&self) -> Result<Vec<User>> {
        self.check(Resource::Users)?;
        Ok(self.state.lock().unwrap().users.clone())
    }

    async fn list_teams(&self) -> Result<Vec<Team>> {
        self.check(Resource::Teams)?;
        Ok(self.state.lock().unwrap().teams.clone())
    }

    async fn account_info(&self) -> Result<AccountInfo> {
        self.check(Resource::Account)?;
        Ok(AccountInfo {
            name: "acme".into(),
            user_count: 42,
            plan: Plan {
                max_user_count: 100,
                name: "Enterprise".into(),
                is_yearly: true,
            },
        })
    }

    async fn list_integrations(&self) -> Result<Vec<Integration>> {
        self.check(Resource::Integrations)?;
        let kinds = self.state.lock().unwrap().integrations.clone();
        Ok(kinds
            .into_iter()
            .enumerate()
            .map(|(i, kind)| Integration {
                id: i.to_string(),
                name: format!("int-{i}"),
                kind: kind.into(),
                enabled: true,
            })
            .collect())
    }

    async fn list_heartbeats(&self) -> Result<Vec<Heartbeat>> {
        self.check(Resource::Heartbeats)?;
        let hearts = self.state.lock().unwrap().hearts.clone();
        Ok(hearts
            .into_iter()
            .map(|h| Heartbeat {
                name: h.name.into(),
                description: String::new(),
                interval: 5,
                interval_unit: "minutes".into(),
                enabled: h.enabled,
                owner_team: owner(h.team),
                alert_message: String::new(),
                alert_tags: vec![],
                alert_priority: "P3".into(),
            })
            .collect())
    }

    async fn heartbeat_detail(&self, name: &str) -> Result<HeartbeatDetail> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);
        if !self.detail_delay.is_zero() {
            tokio::time::sleep(self.detail_delay).await;
        }
        let res = self.lookup_detail(name);
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        res
    }
}

impl FakeApi {
    fn lookup_detail(&self, name: &str) -> Result<HeartbeatDetail> {
        let heart = {
            let s = self.state.lock().unwrap();
            if s.failing_details.contains(name) {
                return Err(ExporterError::Transport("connection reset".into()));
            }
            s.hearts.iter().find(|h| h.name == name).cloned()
        };
        let h = heart.ok_or_else(|| ExporterError::Status {
            status: 404,
            endpoint: format!("heartbeats/{name}"),
        })?;
        Ok(HeartbeatDetail {
            name: h.name.into(),
            enabled: h.enabled,
            expired: h.expired,
            interval: 5,
            interval_unit: "minutes".into(),
            owner_team: owner(h.team),
            alert_message: String::new(),
            alert_tags: vec![],
            alert_priority: "P3".into(),
        })
    }
}

fn settings(stale_labels: StaleLabelPolicy) -> CollectorSettings {
    CollectorSettings {
        interval: Duration::from_secs(3600),
        pipeline_timeout: Duration::from_secs(5),
        heartbeat_concurrency: 2,
        stale_labels,
        shutdown_grace: Duration::from_secs(1),
    }
}

fn collector(api: Arc<FakeApi>, policy: StaleLabelPolicy) -> (Collector, Arc<MetricStore>) {
    let store = Arc::new(MetricStore::new());
    let collector = Collector::new(api, Arc::clone(&store), settings(policy));
    (collector, store)
}

/// Facts produced by the resource pipelines, without the exporter's own metrics.
fn resource_facts(store: &MetricStore) -> Vec<MetricFact> {
    store
        .snapshot()
        .into_iter()
        .filter(|f| !f.name.starts_with("opsgenie_exporter_"))
        .collect()
}

fn one(key: &str, value: &str) -> Labels {
    labels(&[(key, value)])
}

#[tokio::test]
async fn full_poll_publishes_every_resource() {
    let api = Arc::new(FakeApi::seeded());
    let (collector, store) = collector(api, StaleLabelPolicy::Zero);

    let report = collector.poll_once().await;
    assert_eq!(report.succeeded, Resource::ALL.to_vec());
    assert!(report.failed.is_empty());

    assert_eq!(store.get(names::USERS, &one("key", "total")), Some(3.0));
    assert_eq!(store.get(names::USERS, &one("key", "blocked")), Some(1.0));
    assert_eq!(store.get(names::USERS, &one("key", "unverified")), Some(2.0));
    assert_eq!(store.get(names::USER_VERIFIED, &one("username", "a")), None);
    assert_eq!(store.get(names::USER_VERIFIED, &one("username", "b")), Some(0.0));
    assert_eq!(store.get(names::USER_VERIFIED, &one("username", "c")), Some(0.0));

    assert_eq!(store.get(names::TEAMS_TOTAL, &Labels::new()), Some(2.0));

    assert_eq!(store.get(names::ACCOUNT, &one("key", "userCount")), Some(42.0));
    assert_eq!(store.get(names::ACCOUNT, &one("key", "maxUserCount")), Some(100.0));
    assert_eq!(store.get(names::ACCOUNT, &one("key", "isYearly")), Some(1.0));

    assert_eq!(store.get(names::INTEGRATIONS, &one("type", "API")), Some(2.0));
    assert_eq!(store.get(names::INTEGRATIONS, &one("type", "Email")), Some(1.0));

    assert_eq!(store.get(names::HEARTBEATS, &one("key", "total")), Some(4.0));
    assert_eq!(store.get(names::HEARTBEATS, &one("key", "enabled")), Some(3.0));
    assert_eq!(store.get(names::HEARTBEATS_EXPIRED, &one("team", "ops")), Some(1.0));
    assert_eq!(store.get(names::HEARTBEATS_EXPIRED, &one("team", "no_team")), Some(1.0));
    assert_eq!(store.get(names::HEARTBEATS_EXPIRED, &one("team", "web")), None);

    assert!(store.get(self_names::LAST_POLL, &Labels::new()).unwrap() > 0.0);
}

#[tokio::test]
async fn one_failing_resource_does_not_affect_the_others() {
    let healthy = Arc::new(FakeApi::seeded());
    let (healthy_collector, healthy_store) = collector(healthy, StaleLabelPolicy::Zero);
    healthy_collector.poll_once().await;

    let broken = Arc::new(FakeApi::seeded());
    broken.update(|s| {
        s.failing.insert(Resource::Teams);
    });
    let (broken_collector, broken_store) = collector(broken, StaleLabelPolicy::Zero);
    let report = broken_collector.poll_once().await;

    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].0, Resource::Teams);
    assert_eq!(report.failed[0].1.kind().as_str(), "status");
    assert_eq!(report.succeeded.len(), 4);

    let without_teams = |facts: Vec<MetricFact>| -> Vec<MetricFact> {
        facts.into_iter().filter(|f| f.name != names::TEAMS_TOTAL).collect()
    };
    assert_eq!(
        without_teams(resource_facts(&broken_store)),
        without_teams(resource_facts(&healthy_store))
    );
    assert_eq!(broken_store.get(names::TEAMS_TOTAL, &Labels::new()), None);
    assert_eq!(
        broken_store.get(
            self_names::COLLECT_ERRORS,
            &labels(&[("resource", "teams"), ("kind", "status")])
        ),
        Some(1.0)
    );
    assert!(broken_store.get(self_names::LAST_POLL, &Labels::new()).is_some());
}

#[tokio::test]
async fn failed_resource_keeps_previous_values() {
    let api = Arc::new(FakeApi::seeded());
    let (collector, store) = collector(Arc::clone(&api), StaleLabelPolicy::Zero);
    collector.poll_once().await;

    api.update(|s| {
        s.users.push(user("d", false, true));
        s.failing.insert(Resource::Users);
    });
    collector.poll_once().await;

    assert_eq!(store.get(names::USERS, &one("key", "total")), Some(3.0));
    assert_eq!(store.get(names::USER_VERIFIED, &one("username", "b")), Some(0.0));
}

#[tokio::test]
async fn repeated_polls_on_unchanged_data_are_identical() {
    let api = Arc::new(FakeApi::seeded());
    let (collector, store) = collector(api, StaleLabelPolicy::Zero);

    collector.poll_once().await;
    let first = resource_facts(&store);
    collector.poll_once().await;
    let second = resource_facts(&store);

    assert!(!first.is_empty());
    assert_eq!(first, second);
}

#[tokio::test]
async fn vanished_labels_are_zeroed_under_zero_policy() {
    let api = Arc::new(FakeApi::seeded());
    let (collector, store) = collector(Arc::clone(&api), StaleLabelPolicy::Zero);
    collector.poll_once().await;

    api.update(|s| {
        s.integrations = vec!["API"];
        s.hearts.retain(|h| h.team != "ops");
        s.users.retain(|u| u.username != "c");
    });
    collector.poll_once().await;

    assert_eq!(store.get(names::INTEGRATIONS, &one("type", "API")), Some(1.0));
    assert_eq!(store.get(names::INTEGRATIONS, &one("type", "Email")), Some(0.0));
    assert_eq!(store.get(names::HEARTBEATS_EXPIRED, &one("team", "ops")), Some(0.0));
    assert_eq!(store.get(names::USER_VERIFIED, &one("username", "c")), None);
    assert_eq!(store.get(names::USER_VERIFIED, &one("username", "b")), Some(0.0));
    assert_eq!(store.get(names::USERS, &one("key", "unverified")), Some(1.0));
}

#[tokio::test]
async fn newly_verified_user_leaves_the_per_username_family() {
    let api = Arc::new(FakeApi::seeded());
    let (collector, store) = collector(Arc::clone(&api), StaleLabelPolicy::Zero);
    collector.poll_once().await;
    assert_eq!(store.series_count(names::USER_VERIFIED), 2);

    api.update(|s| {
        for u in s.users.iter_mut() {
            u.verified = true;
        }
    });
    collector.poll_once().await;

    assert_eq!(store.get(names::USERS, &one("key", "unverified")), Some(0.0));
    assert_eq!(store.get(names::USER_VERIFIED, &one("username", "b")), None);
    assert_eq!(store.series_count(names::USER_VERIFIED), 0);
    assert!(!store.render().contains(names::USER_VERIFIED));
}

#[tokio::test]
async fn vanished_labels_keep_last_value_under_retain_policy() {
    let api = Arc::new(FakeApi::seeded());
    let (collector, store) = collector(Arc::clone(&api), StaleLabelPolicy::Retain);
    collector.poll_once().await;

    api.update(|s| {
        s.integrations = vec!["API"];
        s.hearts.retain(|h| h.team != "ops");
    });
    collector.poll_once().await;

    assert_eq!(store.get(names::INTEGRATIONS, &one("type", "API")), Some(1.0));
    assert_eq!(store.get(names::INTEGRATIONS, &one("type", "Email")), Some(1.0));
    assert_eq!(store.get(names::HEARTBEATS_EXPIRED, &one("team", "ops")), Some(1.0));
}

#[tokio::test]
async fn retain_policy_keeps_users_that_became_verified() {
    let api = Arc::new(FakeApi::seeded());
    let (collector, store) = collector(Arc::clone(&api), StaleLabelPolicy::Retain);
    collector.poll_once().await;

    api.update(|s| {
        for u in s.users.iter_mut() {
            u.verified = true;
        }
    });
    collector.poll_once().await;

    assert_eq!(store.get(names::USER_VERIFIED, &one("username", "b")), Some(0.0));
}

const MANY: [&str; 12] = [
    "hb-00", "hb-01", "hb-02", "hb-03", "hb-04", "hb-05", "hb-06", "hb-07", "hb-08", "hb-09", "hb-10", "hb-11",
];

#[tokio::test]
async fn heartbeat_details_respect_concurrency_bound() {
    let api = Arc::new(FakeApi {
        detail_delay: Duration::from_millis(20),
        ..FakeApi::default()
    });
    api.update(|s| {
        s.hearts = MANY
            .iter()
            .map(|&name| Heart { name, enabled: true, expired: true, team: "ops" })
            .collect();
    });

    let store = Arc::new(MetricStore::new());
    let mut cfg = settings(StaleLabelPolicy::Zero);
    cfg.heartbeat_concurrency = 3;
    let collector = Collector::new(Arc::clone(&api) as Arc<dyn OpsgenieApi>, Arc::clone(&store), cfg);

    let report = collector.poll_once().await;
    assert!(report.failed.is_empty());
    assert_eq!(store.get(names::HEARTBEATS_EXPIRED, &one("team", "ops")), Some(12.0));

    let peak = api.peak_in_flight.load(Ordering::SeqCst);
    assert!(peak <= 3, "peak in-flight detail fetches {peak} exceeds bound");
    assert!(peak > 1, "detail fetches ran serially");
}

#[tokio::test]
async fn heartbeat_pipeline_runs_on_a_spawned_task() {
    let api: Arc<dyn OpsgenieApi> = Arc::new(FakeApi::seeded());
    let out = tokio::spawn(async move { run_pipeline(Resource::Heartbeats, api.as_ref(), 2).await })
        .await
        .unwrap()
        .unwrap();

    assert_eq!(out.skipped, 0);
    assert_eq!(out.facts.len(), 4);
}

#[tokio::test]
async fn failing_heartbeat_detail_is_skipped() {
    let api = Arc::new(FakeApi::seeded());
    api.update(|s| {
        s.failing_details.insert("db");
    });
    let (collector, store) = collector(api, StaleLabelPolicy::Zero);

    let report = collector.poll_once().await;
    assert!(report.failed.is_empty());

    assert_eq!(store.get(names::HEARTBEATS, &one("key", "total")), Some(4.0));
    assert_eq!(store.get(names::HEARTBEATS_EXPIRED, &one("team", "ops")), None);
    assert_eq!(store.get(names::HEARTBEATS_EXPIRED, &one("team", "no_team")), Some(1.0));
    assert_eq!(
        store.get(self_names::HEARTBEAT_DETAIL_ERRORS, &Labels::new()),
        Some(1.0)
    );
}

#[tokio::test]
async fn run_polls_until_cancelled() {
    let api = Arc::new(FakeApi::seeded());
    let (collector, store) = collector(api, StaleLabelPolicy::Zero);
    let collector = Arc::new(collector);
    let mut polls = collector.subscribe();

    let shutdown = CancellationToken::new();
    let task = {
        let collector = Arc::clone(&collector);
        let shutdown = shutdown.clone();
        tokio::spawn(async move { collector.run(shutdown).await })
    };

    tokio::time::timeout(Duration::from_secs(5), polls.changed())
        .await
        .expect("first poll did not complete")
        .unwrap();
    assert_eq!(*polls.borrow(), 1);
    assert_eq!(store.get(names::TEAMS_TOTAL, &Labels::new()), Some(2.0));

    shutdown.cancel();
    tokio::time::timeout(Duration::from_secs(5), task)
        .await
        .expect("collector did not stop")
        .unwrap();
}
