//! Per-resource aggregation rules.
//!
//! Every function here is pure: the same fetched collection always yields the
//! same facts, in the same order. Breakdowns are emitted in label order.

use std::collections::BTreeMap;

use crate::fact::{bool_value, MetricFact};
use crate::model::{AccountInfo, Heartbeat, HeartbeatDetail, Integration, Team, User};

/// Metric family names.
pub mod names {
    pub const USERS: &str = "opsgenie_users";
    pub const USER_VERIFIED: &str = "opsgenie_user_verified";
    pub const TEAMS_TOTAL: &str = "opsgenie_teams_total";
    pub const ACCOUNT: &str = "opsgenie_account";
    pub const INTEGRATIONS: &str = "opsgenie_integrations";
    pub const HEARTBEATS: &str = "opsgenie_heartbeats";
    pub const HEARTBEATS_EXPIRED: &str = "opsgenie_heartbeats_expired";

    /// `(name, help)` for every family produced by the aggregators.
    pub const DESCRIPTIONS: &[(&str, &str)] = &[
        (USERS, "Counts of Opsgenie users by various characteristics."),
        (USER_VERIFIED, "Verification state of Opsgenie users (only unverified users are reported)."),
        (TEAMS_TOTAL, "Total number of Opsgenie teams."),
        (ACCOUNT, "Information about the Opsgenie account."),
        (INTEGRATIONS, "Number of Opsgenie integrations by type."),
        (HEARTBEATS, "Counts of Opsgenie heartbeats."),
        (HEARTBEATS_EXPIRED, "Enabled and expired Opsgenie heartbeats by owner team."),
    ];

    /// Families with one series per upstream entity. A series that is not
    /// re-emitted means the entity no longer qualifies, not a zero count.
    pub const PER_ENTITY: &[&str] = &[USER_VERIFIED];
}

/// Label used for heartbeats without an owner team.
pub const NO_TEAM: &str = "no_team";

/// Users: total/blocked/unverified counts plus one fact per unverified user.
///
/// Verified users get no per-username fact; the family only ever carries
/// zeros, one per unverified username.
pub fn users(users: &[User]) -> Vec<MetricFact> {
    let mut blocked = 0usize;
    let mut unverified = Vec::new();
    for user in users {
        if user.blocked {
            blocked += 1;
        }
        if !user.verified {
            unverified.push(user.username.as_str());
        }
    }

    let mut facts = vec![
        MetricFact::labelled(names::USERS, "key", "total", users.len() as f64),
        MetricFact::labelled(names::USERS, "key", "blocked", blocked as f64),
        MetricFact::labelled(names::USERS, "key", "unverified", unverified.len() as f64),
    ];
    facts.extend(
        unverified
            .into_iter()
            .map(|username| MetricFact::labelled(names::USER_VERIFIED, "username", username, 0.0)),
    );
    facts
}

pub fn teams(teams: &[Team]) -> Vec<MetricFact> {
    vec![MetricFact::new(names::TEAMS_TOTAL, teams.len() as f64)]
}

/// Account: user count, plan limit and billing cycle (yearly = 1).
pub fn account(info: &AccountInfo) -> Vec<MetricFact> {
    vec![
        MetricFact::labelled(names::ACCOUNT, "key", "userCount", info.user_count as f64),
        MetricFact::labelled(names::ACCOUNT, "key", "maxUserCount", info.plan.max_user_count as f64),
        MetricFact::labelled(names::ACCOUNT, "key", "isYearly", bool_value(info.plan.is_yearly)),
    ]
}

/// Integrations: one fact per distinct type.
pub fn integrations(integrations: &[Integration]) -> Vec<MetricFact> {
    let mut by_type: BTreeMap<&str, usize> = BTreeMap::new();
    for integration in integrations {
        *by_type.entry(integration.kind.as_str()).or_default() += 1;
    }
    by_type
        .into_iter()
        .map(|(kind, count)| MetricFact::labelled(names::INTEGRATIONS, "type", kind, count as f64))
        .collect()
}

/// Heartbeats: total and enabled over the listed heartbeats, expired counts
/// per owner team over the fetched details.
///
/// `details` may be shorter than `listed` when individual detail fetches
/// failed; those heartbeats simply contribute no expired count.
pub fn heartbeats(listed: &[Heartbeat], details: &[HeartbeatDetail]) -> Vec<MetricFact> {
    let enabled = listed.iter().filter(|hb| hb.enabled).count();

    let mut expired_by_team: BTreeMap<&str, usize> = BTreeMap::new();
    for detail in details.iter().filter(|d| d.enabled && d.expired) {
        let team = match detail.owner_team.name.as_str() {
            "" => {
                tracing::debug!(heartbeat = %detail.name, "expired heartbeat has no owner team");
                NO_TEAM
            }
            name => name,
        };
        *expired_by_team.entry(team).or_default() += 1;
    }

    let mut facts = vec![
        MetricFact::labelled(names::HEARTBEATS, "key", "total", listed.len() as f64),
        MetricFact::labelled(names::HEARTBEATS, "key", "enabled", enabled as f64),
    ];
    facts.extend(
        expired_by_team
            .into_iter()
            .map(|(team, count)| MetricFact::labelled(names::HEARTBEATS_EXPIRED, "team", team, count as f64)),
    );
    facts
}
