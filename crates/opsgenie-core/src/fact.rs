//! Metric facts: the unit of output of every aggregator.

use std::collections::BTreeMap;

/// Label set. Sorted by key so equal sets compare and render identically.
pub type Labels = BTreeMap<String, String>;

/// One named, labelled numeric value.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricFact {
    pub name: String,
    pub labels: Labels,
    pub value: f64,
}

impl MetricFact {
    /// Unlabelled fact.
    pub fn new(name: impl Into<String>, value: f64) -> Self {
        Self {
            name: name.into(),
            labels: Labels::new(),
            value,
        }
    }

    /// Fact with a single label, the common case for breakdowns.
    pub fn labelled(name: impl Into<String>, key: &str, label: impl Into<String>, value: f64) -> Self {
        Self::new(name, value).with_label(key, label)
    }

    pub fn with_label(mut self, key: &str, value: impl Into<String>) -> Self {
        self.labels.insert(key.to_string(), value.into());
        self
    }

    /// Label value lookup.
    pub fn label(&self, key: &str) -> Option<&str> {
        self.labels.get(key).map(String::as_str)
    }
}

/// Build a label set from pairs.
pub fn labels(pairs: &[(&str, &str)]) -> Labels {
    pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
}

/// Gauge value for a boolean.
pub fn bool_value(b: bool) -> f64 {
    if b {
        1.0
    } else {
        0.0
    }
}
