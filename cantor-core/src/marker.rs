//! Points and ranges of interest drawn over the pitch graph.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    #[default]
    Medium,
    High,
}

/// A point of interest such as an unstable note, used for annotation and
/// click-to-seek.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Marker {
    pub time: f64,
    #[serde(default)]
    pub severity: Severity,
    #[serde(default)]
    pub label: Option<String>,
}

impl Marker {
    pub fn new(time: f64, severity: Severity) -> Self {
        Self {
            time,
            severity,
            label: None,
        }
    }
}

/// A scored time range returned by the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Region {
    pub start: f64,
    pub end: f64,
    #[serde(default)]
    pub score: Option<f32>,
}

impl Region {
    pub fn contains(&self, time: f64) -> bool {
        time >= self.start && time <= self.end
    }
}
