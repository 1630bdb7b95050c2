//! Prediction-validation log, written by the pipeline runner after each run.
//!
//! Layout:
//!   .adapt/prediction-validation.jsonl   one entry per validated prediction

use crate::error::Result;
use crate::{io, paths};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ts: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issue_id: Option<String>,
    pub predicted_complexity: f64,
    /// `predicted - actual`.
    pub delta: f64,
}

/// The trailing `window` entries, oldest first.
pub fn load_recent(root: &Path, window: usize) -> Vec<ValidationEntry> {
    let mut entries: Vec<ValidationEntry> = io::read_jsonl(&paths::validation_path(root));
    if entries.len() > window {
        entries.drain(..entries.len() - window);
    }
    entries
}

#[cfg(test)]
pub(crate) fn append(root: &Path, entry: &ValidationEntry) -> Result<()> {
    io::append_jsonl(&paths::validation_path(root), entry)
}

pub fn rotate(root: &Path, max_entries: usize) -> Result<usize> {
    io::rotate_lines(&paths::validation_path(root), max_entries)
}
