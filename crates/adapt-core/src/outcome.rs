//! Outcome log: one JSON line per completed pipeline run.
//!
//! Layout:
//!   .adapt/outcomes.jsonl   `{"type":"outcome",...}` and
//!                             `{"type":"ci_metrics",...}` entries, oldest first
//!
//! The log is append-only and rotated to `outcomes.max_entries` lines.

use crate::error::Result;
use crate::{io, paths};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

// ---------------------------------------------------------------------------
// PipelineResult
// ---------------------------------------------------------------------------

/// Final result of a pipeline run. Unrecognized values are kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum PipelineResult {
    Success,
    Completed,
    Failure,
    Error,
    Unknown,
    Other(String),
}

impl PipelineResult {
    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "success" => PipelineResult::Success,
            "completed" | "complete" => PipelineResult::Completed,
            "failure" | "failed" => PipelineResult::Failure,
            "error" => PipelineResult::Error,
            "" | "unknown" => PipelineResult::Unknown,
            other => PipelineResult::Other(other.to_string()),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, PipelineResult::Success | PipelineResult::Completed)
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, PipelineResult::Failure | PipelineResult::Error)
    }
}

impl fmt::Display for PipelineResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PipelineResult::Success => "success",
            PipelineResult::Completed => "completed",
            PipelineResult::Failure => "failure",
            PipelineResult::Error => "error",
            PipelineResult::Unknown => "unknown",
            PipelineResult::Other(s) => s.as_str(),
        };
        f.write_str(s)
    }
}

impl From<String> for PipelineResult {
    fn from(s: String) -> Self {
        PipelineResult::parse(&s)
    }
}

impl From<PipelineResult> for String {
    fn from(r: PipelineResult) -> Self {
        r.to_string()
    }
}

// ---------------------------------------------------------------------------
// StageResult
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageResult {
    pub name: String,
    pub status: String,
}

impl StageResult {
    pub fn is_completed(&self) -> bool {
        matches!(
            self.status.to_ascii_lowercase().as_str(),
            "complete" | "completed" | "success" | "passed"
        )
    }
}

// ---------------------------------------------------------------------------
// OutcomeRecord
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutcomeRecord {
    pub ts: DateTime<Utc>,
    #[serde(default = "unknown")]
    pub issue_id: String,
    #[serde(default = "unknown")]
    pub template: String,
    #[serde(default = "unknown_result")]
    pub result: PipelineResult,
    #[serde(default = "unknown")]
    pub model: String,
    /// Comma-separated free text.
    #[serde(default)]
    pub labels: String,
    #[serde(default)]
    pub iterations: u32,
    #[serde(default)]
    pub cost: f64,
    #[serde(default)]
    pub complexity: u32,
    #[serde(default)]
    pub stages: Vec<StageResult>,
}

fn unknown() -> String {
    "unknown".to_string()
}

fn unknown_result() -> PipelineResult {
    PipelineResult::Unknown
}

impl OutcomeRecord {
    /// Labels split on commas, trimmed, empties dropped.
    pub fn label_list(&self) -> Vec<&str> {
        self.labels
            .split(',')
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .collect()
    }
}

// ---------------------------------------------------------------------------
// CiMetricsRecord
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CiMetricsRecord {
    pub ts: DateTime<Utc>,
    pub issue_id: String,
    /// Percentage of successful CI runs, 0-100.
    pub ci_success_rate: f64,
    pub ci_avg_duration_s: f64,
}

// ---------------------------------------------------------------------------
// LogEntry
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LogEntry {
    Outcome(OutcomeRecord),
    CiMetrics(CiMetricsRecord),
}

// ---------------------------------------------------------------------------
// Log I/O
// ---------------------------------------------------------------------------

/// Every readable entry of the outcome log. Missing or corrupt lines are
/// skipped, never fatal.
pub fn load_entries(root: &Path) -> Vec<LogEntry> {
    io::read_jsonl(&paths::outcomes_path(root))
}

/// Outcome records only, oldest first.
pub fn load_outcomes(root: &Path) -> Vec<OutcomeRecord> {
    load_entries(root)
        .into_iter()
        .filter_map(|e| match e {
            LogEntry::Outcome(r) => Some(r),
            LogEntry::CiMetrics(_) => None,
        })
        .collect()
}

pub fn append(root: &Path, entry: &LogEntry) -> Result<()> {
    io::append_jsonl(&paths::outcomes_path(root), entry)
}

/// Drop the oldest lines beyond `max_entries`. Returns how many were dropped.
pub fn rotate(root: &Path, max_entries: usize) -> Result<usize> {
    io::rotate_lines(&paths::outcomes_path(root), max_entries)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use tempfile::TempDir;

    /// Minimal record for tests in sibling modules.
    pub(crate) fn record(template: &str, labels: &str, result: &str) -> OutcomeRecord {
        OutcomeRecord {
            ts: Utc::now(),
            issue_id: "1".to_string(),
            template: template.to_string(),
            result: PipelineResult::parse(result),
            model: "opus".to_string(),
            labels: labels.to_string(),
            iterations: 0,
            cost: 0.0,
            complexity: 0,
            stages: Vec::new(),
        }
    }

    #[test]
    fn result_classification() {
        assert!(PipelineResult::parse("success").is_success());
        assert!(PipelineResult::parse("Completed").is_success());
        assert!(PipelineResult::parse("failure").is_failure());
        assert!(PipelineResult::parse("error").is_failure());
        let other = PipelineResult::parse("cancelled");
        assert!(!other.is_success() && !other.is_failure());
        assert_eq!(other.to_string(), "cancelled");
    }

    #[test]
    fn label_list_trims_and_drops_empty() {
        let r = record("standard", " auth , ,api-gateway,", "success");
        assert_eq!(r.label_list(), vec!["auth", "api-gateway"]);
    }

    #[test]
    fn log_entry_is_type_tagged() {
        let entry = LogEntry::Outcome(record("standard", "auth", "failure"));
        let json = serde_json::to_string(&entry).unwrap();
        assert!(json.contains("\"type\":\"outcome\""));
        assert!(json.contains("\"result\":\"failure\""));
    }

    #[test]
    fn sparse_outcome_line_gets_defaults() {
        let line = r#"{"type":"outcome","ts":"2026-01-01T00:00:00Z","result":"success"}"#;
        let LogEntry::Outcome(r) = serde_json::from_str::<LogEntry>(line).unwrap() else {
            panic!("expected outcome");
        };
        assert_eq!(r.template, "unknown");
        assert_eq!(r.iterations, 0);
        assert!(r.stages.is_empty());
    }

    #[test]
    fn load_outcomes_filters_ci_entries() {
        let dir = TempDir::new().unwrap();
        append(dir.path(), &LogEntry::Outcome(record("a", "x", "success"))).unwrap();
        append(
            dir.path(),
            &LogEntry::CiMetrics(CiMetricsRecord {
                ts: Utc::now(),
                issue_id: "1".to_string(),
                ci_success_rate: 80.0,
                ci_avg_duration_s: 120.0,
            }),
        )
        .unwrap();
        assert_eq!(load_entries(dir.path()).len(), 2);
        assert_eq!(load_outcomes(dir.path()).len(), 1);
    }
}
