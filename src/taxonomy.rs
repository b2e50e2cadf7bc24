// Content-category taxonomy — the closed label set posts are classified into.
//
// The taxonomy is configurable per agency but always contains "other":
// any label outside the configured set normalises to it, so downstream
// aggregation never drops a post on an unknown label.

use serde::{Deserialize, Serialize};

/// Catch-all bucket. Always present; never dropped from aggregates.
pub const OTHER: &str = "other";

/// Default category labels, in display order.
pub const DEFAULT_LABELS: [&str; 6] = [
    "storytime",
    "grwm",
    "thirst_trap",
    "behind_scenes",
    "money_talk",
    OTHER,
];

/// An ordered set of allowed content-category labels.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Taxonomy {
    labels: Vec<String>,
}

impl Default for Taxonomy {
    fn default() -> Self {
        Self {
            labels: DEFAULT_LABELS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl Taxonomy {
    /// Build a taxonomy from custom labels. "other" is appended if missing.
    pub fn new(labels: Vec<String>) -> Self {
        let mut labels = labels;
        if !labels.iter().any(|l| l == OTHER) {
            labels.push(OTHER.to_string());
        }
        Self { labels }
    }

    /// The allowed labels, in order.
    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    /// Labels eligible for recommendations — everything except "other".
    pub fn recommendable(&self) -> impl Iterator<Item = &str> {
        self.labels.iter().map(String::as_str).filter(|l| *l != OTHER)
    }

    pub fn contains(&self, label: &str) -> bool {
        self.labels.iter().any(|l| l == label)
    }

    /// Normalise a raw label into the taxonomy. Unknown or absent labels
    /// map to "other".
    pub fn normalize(&self, label: Option<&str>) -> String {
        match label {
            Some(l) if self.contains(l) => l.to_string(),
            _ => OTHER.to_string(),
        }
    }
}
