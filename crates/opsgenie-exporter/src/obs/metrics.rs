//! Metric store for exported facts.
//!
//! Families are keyed by metric name in a `DashMap`; every family keeps its
//! series in a `BTreeMap` keyed by the sorted label set. A write to a family
//! happens under that family's shard lock, so readers never observe a label
//! set without its value, and a whole-family commit is seen all at once.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt::Write;

use dashmap::DashMap;
use opsgenie_core::{Labels, MetricFact};

use crate::config::StaleLabelPolicy;

/// Helper to escape label values.
fn escape_label(v: &str) -> String {
    v.replace('\\', "\\\\").replace('"', "\\\"").replace('\n', "\\n")
}

/// Helper to escape help text.
fn escape_help(v: &str) -> String {
    v.replace('\\', "\\\\").replace('\n', "\\n")
}

fn format_value(v: f64) -> String {
    if v.is_nan() {
        "NaN".into()
    } else if v.is_infinite() {
        if v > 0.0 { "+Inf".into() } else { "-Inf".into() }
    } else {
        v.to_string()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricKind {
    Gauge,
    Counter,
}

impl MetricKind {
    fn as_str(self) -> &'static str {
        match self {
            MetricKind::Gauge => "gauge",
            MetricKind::Counter => "counter",
        }
    }
}

#[derive(Debug, Clone)]
struct Family {
    kind: MetricKind,
    help: Option<String>,
    /// One series per entity; a series not re-emitted means the entity is gone.
    per_entity: bool,
    series: BTreeMap<Labels, f64>,
}

impl Family {
    fn new(kind: MetricKind) -> Self {
        Self {
            kind,
            help: None,
            per_entity: false,
            series: BTreeMap::new(),
        }
    }

    /// Render in Prometheus text exposition format.
    fn render(&self, name: &str, out: &mut String) {
        if let Some(help) = &self.help {
            let _ = writeln!(out, "# HELP {} {}", name, escape_help(help));
        }
        let _ = writeln!(out, "# TYPE {} {}", name, self.kind.as_str());
        for (labels, value) in &self.series {
            if labels.is_empty() {
                let _ = writeln!(out, "{} {}", name, format_value(*value));
                continue;
            }
            let label_str = labels
                .iter()
                .map(|(k, v)| format!("{}=\"{}\"", k, escape_label(v)))
                .collect::<Vec<_>>()
                .join(",");
            let _ = writeln!(out, "{}{{{}}} {}", name, label_str, format_value(*value));
        }
    }
}

/// Process-wide store of labelled gauges and counters.
///
/// Constructed once at startup and shared as `Arc<MetricStore>` between the
/// collector (writer) and the `/metrics` handler (reader).
#[derive(Default)]
pub struct MetricStore {
    families: DashMap<String, Family>,
}

impl MetricStore {
    pub fn new() -> Self {
        Self {
            families: DashMap::new(),
        }
    }

    /// Declare a family's kind and help text. Existing series are kept.
    pub fn describe(&self, name: &str, kind: MetricKind, help: &str) {
        let mut family = self
            .families
            .entry(name.to_string())
            .or_insert_with(|| Family::new(kind));
        family.kind = kind;
        family.help = Some(help.to_string());
    }

    /// Mark a family as keyed by entity. Under [`StaleLabelPolicy::Zero`] its
    /// series that a commit does not re-emit are removed instead of zeroed.
    pub fn mark_per_entity(&self, name: &str) {
        self.families
            .entry(name.to_string())
            .or_insert_with(|| Family::new(MetricKind::Gauge))
            .per_entity = true;
    }

    /// Set one series. Idempotent overwrite.
    pub fn set(&self, name: &str, labels: Labels, value: f64) {
        self.families
            .entry(name.to_string())
            .or_insert_with(|| Family::new(MetricKind::Gauge))
            .series
            .insert(labels, value);
    }

    /// Add `v` to a counter series, creating it at zero.
    pub fn add(&self, name: &str, labels: Labels, v: f64) {
        let mut family = self
            .families
            .entry(name.to_string())
            .or_insert_with(|| Family::new(MetricKind::Counter));
        *family.series.entry(labels).or_insert(0.0) += v;
    }

    /// Increment a counter series by 1.
    pub fn inc(&self, name: &str, labels: Labels) {
        self.add(name, labels, 1.0);
    }

    /// Commit one pipeline's facts for the families it owns.
    ///
    /// Each owned family is updated under a single lock. With
    /// [`StaleLabelPolicy::Zero`], series of an owned family that are absent
    /// from `facts` are set to zero, or removed when the family is per-entity;
    /// with [`StaleLabelPolicy::Retain`] they keep their last value. Facts for families not listed in `owned` are
    /// written as plain sets.
    pub fn commit(&self, owned: &[&str], facts: Vec<MetricFact>, policy: StaleLabelPolicy) {
        let mut by_family: HashMap<String, Vec<(Labels, f64)>> = HashMap::new();
        for fact in facts {
            by_family
                .entry(fact.name)
                .or_default()
                .push((fact.labels, fact.value));
        }

        for name in owned {
            let incoming = by_family.remove(*name).unwrap_or_default();
            let mut family = self
                .families
                .entry(name.to_string())
                .or_insert_with(|| Family::new(MetricKind::Gauge));

            if policy == StaleLabelPolicy::Zero {
                let fresh: HashSet<&Labels> = incoming.iter().map(|(labels, _)| labels).collect();
                if family.per_entity {
                    family.series.retain(|labels, _| fresh.contains(labels));
                } else {
                    for (labels, value) in family.series.iter_mut() {
                        if !fresh.contains(labels) {
                            *value = 0.0;
                        }
                    }
                }
            }
            family.series.extend(incoming);
        }

        for (name, series) in by_family {
            for (labels, value) in series {
                self.set(&name, labels, value);
            }
        }
    }

    /// Current value of one series.
    pub fn get(&self, name: &str, labels: &Labels) -> Option<f64> {
        self.families.get(name)?.series.get(labels).copied()
    }

    /// Number of series in a family.
    pub fn series_count(&self, name: &str) -> usize {
        self.families.get(name).map(|f| f.series.len()).unwrap_or(0)
    }

    /// All series as facts, ordered by name then labels.
    pub fn snapshot(&self) -> Vec<MetricFact> {
        let mut facts: Vec<MetricFact> = self
            .families
            .iter()
            .flat_map(|family| {
                let name = family.key().clone();
                family
                    .value()
                    .series
                    .iter()
                    .map(|(labels, value)| MetricFact {
                        name: name.clone(),
                        labels: labels.clone(),
                        value: *value,
                    })
                    .collect::<Vec<_>>()
            })
            .collect();
        facts.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.labels.cmp(&b.labels)));
        facts
    }

    /// Render all families in Prometheus text exposition format.
    ///
    /// Families are cloned out one at a time, so rendering never holds more
    /// than one shard lock and never blocks a whole poll.
    pub fn render(&self) -> String {
        let mut names: Vec<String> = self.families.iter().map(|f| f.key().clone()).collect();
        names.sort();

        let mut out = String::new();
        for name in names {
            let Some(family) = self.families.get(&name).map(|f| f.value().clone()) else {
                continue;
            };
            if family.series.is_empty() {
                continue;
            }
            family.render(&name, &mut out);
        }
        out
    }
}
