//! Past practice attempts, kept next to the settings file.

use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::settings::app_dir;

const HISTORY_FILE: &str = "history.json";

/// Oldest attempts are dropped beyond this.
pub const MAX_ATTEMPTS: usize = 200;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attempt {
    pub reference_id: Option<String>,
    pub reference_title: Option<String>,
    pub score: f32,
    /// Seconds since the Unix epoch.
    pub timestamp: u64,
}

impl Attempt {
    pub fn now(reference_id: Option<String>, reference_title: Option<String>, score: f32) -> Self {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        Self {
            reference_id,
            reference_title,
            score,
            timestamp,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AttemptHistory {
    attempts: VecDeque<Attempt>,
}

impl AttemptHistory {
    pub fn path() -> PathBuf {
        app_dir().join(HISTORY_FILE)
    }

    pub fn attempts(&self) -> impl Iterator<Item = &Attempt> {
        self.attempts.iter()
    }

    pub fn len(&self) -> usize {
        self.attempts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attempts.is_empty()
    }

    pub fn record(&mut self, attempt: Attempt) {
        if self.attempts.len() >= MAX_ATTEMPTS {
            self.attempts.pop_front();
        }
        self.attempts.push_back(attempt);
    }

    /// Highest score recorded for a reference.
    pub fn best_for(&self, reference_id: &str) -> Option<f32> {
        self.attempts
            .iter()
            .filter(|a| a.reference_id.as_deref() == Some(reference_id))
            .map(|a| a.score)
            .fold(None, |best, score| Some(best.map_or(score, |b: f32| b.max(score))))
    }

    pub fn load() -> Self {
        Self::load_from(&Self::path()).unwrap_or_default()
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::path())
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }
}
