//! Upstream API resource model (JSON contracts).
//!
//! List endpoints answer `{ "data": [...], "paging": { "next": "<absolute url>" } }`,
//! singular endpoints answer `{ "data": { ... } }`. All snapshots are poll-scoped:
//! they are decoded, aggregated and dropped within one collection cycle.

use serde::{Deserialize, Deserializer};

/// Reads an explicit JSON `null` as the field's default, like an absent field.
fn null_default<'de, D, T>(d: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Option::<T>::deserialize(d).map(Option::unwrap_or_default)
}

/// Generic page envelope for list endpoints.
#[derive(Debug, Deserialize)]
pub struct Page<T> {
    pub data: Vec<T>,
    #[serde(default)]
    pub paging: Option<Paging>,
}

#[derive(Debug, Default, Deserialize)]
pub struct Paging {
    #[serde(default)]
    pub next: Option<String>,
}

impl<T> Page<T> {
    /// Next-page cursor. An empty string is treated as end-of-stream.
    pub fn next_cursor(&self) -> Option<&str> {
        self.paging
            .as_ref()
            .and_then(|p| p.next.as_deref())
            .filter(|next| !next.is_empty())
    }
}

/// Envelope for singular endpoints.
#[derive(Debug, Deserialize)]
pub struct Single<T> {
    pub data: T,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct User {
    pub username: String,
    #[serde(default, deserialize_with = "null_default")]
    pub blocked: bool,
    #[serde(default, deserialize_with = "null_default")]
    pub verified: bool,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Team {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Integration {
    #[serde(default, deserialize_with = "null_default")]
    pub id: String,
    #[serde(default, deserialize_with = "null_default")]
    pub name: String,
    #[serde(rename = "type", default, deserialize_with = "null_default")]
    pub kind: String,
    #[serde(default, deserialize_with = "null_default")]
    pub enabled: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct OwnerTeam {
    #[serde(default, deserialize_with = "null_default")]
    pub id: String,
    #[serde(default, deserialize_with = "null_default")]
    pub name: String,
}

/// Heartbeat as listed by `heartbeats`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Heartbeat {
    pub name: String,
    #[serde(default, deserialize_with = "null_default")]
    pub description: String,
    #[serde(default, deserialize_with = "null_default")]
    pub interval: u64,
    #[serde(default, deserialize_with = "null_default")]
    pub interval_unit: String,
    #[serde(default, deserialize_with = "null_default")]
    pub enabled: bool,
    #[serde(default, deserialize_with = "null_default")]
    pub owner_team: OwnerTeam,
    #[serde(default, deserialize_with = "null_default")]
    pub alert_message: String,
    #[serde(default, deserialize_with = "null_default")]
    pub alert_tags: Vec<String>,
    #[serde(default, deserialize_with = "null_default")]
    pub alert_priority: String,
}

/// `heartbeats` wraps its list one level deeper than the other list endpoints.
#[derive(Debug, Deserialize)]
pub struct HeartbeatList {
    #[serde(default, deserialize_with = "null_default")]
    pub heartbeats: Vec<Heartbeat>,
}

/// Heartbeat as returned by `heartbeats/<name>`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeartbeatDetail {
    pub name: String,
    #[serde(default, deserialize_with = "null_default")]
    pub enabled: bool,
    #[serde(default, deserialize_with = "null_default")]
    pub expired: bool,
    #[serde(default, deserialize_with = "null_default")]
    pub interval: u64,
    #[serde(default, deserialize_with = "null_default")]
    pub interval_unit: String,
    #[serde(default, deserialize_with = "null_default")]
    pub owner_team: OwnerTeam,
    #[serde(default, deserialize_with = "null_default")]
    pub alert_message: String,
    #[serde(default, deserialize_with = "null_default")]
    pub alert_tags: Vec<String>,
    #[serde(default, deserialize_with = "null_default")]
    pub alert_priority: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountInfo {
    #[serde(default, deserialize_with = "null_default")]
    pub name: String,
    #[serde(default, deserialize_with = "null_default")]
    pub user_count: u64,
    #[serde(default, deserialize_with = "null_default")]
    pub plan: Plan,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Plan {
    #[serde(default, deserialize_with = "null_default")]
    pub max_user_count: u64,
    #[serde(default, deserialize_with = "null_default")]
    pub name: String,
    #[serde(default, deserialize_with = "null_default")]
    pub is_yearly: bool,
}
