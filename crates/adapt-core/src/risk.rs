//! Risk keyword learning.
//!
//! Labels on failed runs push their keywords' weights up, labels on
//! successful runs pull them down. Weights decay by 5% per observation and
//! are bounded to `[-50, 50]`. The table is replayed from the full outcome
//! log on every pass.

use crate::error::Result;
use crate::outcome::OutcomeRecord;
use crate::{io, paths};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

pub const FAILURE_DELTA: i32 = 5;
/// Half the failure delta, truncated.
pub const SUCCESS_DELTA: i32 = -(FAILURE_DELTA / 2);
pub const DECAY: f64 = 0.95;
pub const WEIGHT_BOUND: i32 = 50;
const MIN_KEYWORD_LEN: usize = 3;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RiskKeywordTable {
    #[serde(default)]
    pub keywords: BTreeMap<String, i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl RiskKeywordTable {
    pub fn load(root: &Path) -> Self {
        io::load_json_or_default(&paths::model_path(root, paths::RISK_KEYWORDS_FILE))
    }

    pub fn save(&self, root: &Path) -> Result<()> {
        io::write_json(&paths::model_path(root, paths::RISK_KEYWORDS_FILE), self)
    }

    /// Sum of the learned weights of every keyword in `labels`.
    pub fn score(&self, labels: &str) -> i32 {
        keywords(labels)
            .iter()
            .filter_map(|k| self.keywords.get(k))
            .sum()
    }
}

/// Lowercase, keep only `[a-z0-9-]`.
pub fn normalize(token: &str) -> String {
    token
        .chars()
        .flat_map(char::to_lowercase)
        .filter(|c| c.is_ascii_alphanumeric() || *c == '-')
        .collect()
}

/// Normalized keywords of a label string, split on commas and whitespace.
pub fn keywords(labels: &str) -> Vec<String> {
    labels
        .split(|c: char| c == ',' || c.is_whitespace())
        .map(normalize)
        .filter(|k| k.len() >= MIN_KEYWORD_LEN)
        .collect()
}

/// `clamp(round(old * 0.95 + delta), -50, 50)`.
pub fn reinforce(old: i32, delta: i32) -> i32 {
    let v = (old as f64 * DECAY + delta as f64).round() as i32;
    v.clamp(-WEIGHT_BOUND, WEIGHT_BOUND)
}

/// Replay the outcome log into a fresh keyword table.
pub fn learn(outcomes: &[OutcomeRecord], now: DateTime<Utc>) -> RiskKeywordTable {
    let mut table: BTreeMap<String, i32> = BTreeMap::new();
    for r in outcomes {
        let delta = if r.result.is_failure() {
            FAILURE_DELTA
        } else if r.result.is_success() {
            SUCCESS_DELTA
        } else {
            continue;
        };
        for keyword in keywords(&r.labels) {
            let w = table.entry(keyword).or_insert(0);
            *w = reinforce(*w, delta);
        }
    }
    let before = table.len();
    table.retain(|_, w| *w != 0);
    tracing::info!(
        keywords = table.len(),
        dropped = before - table.len(),
        "risk keywords learned"
    );
    RiskKeywordTable {
        keywords: table,
        updated_at: Some(now),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outcome::tests::record;

    #[test]
    fn reinforcement_sequence() {
        let w = reinforce(0, FAILURE_DELTA);
        assert_eq!(w, 5);
        let w = reinforce(w, FAILURE_DELTA);
        assert_eq!(w, 10);
        let w = reinforce(w, SUCCESS_DELTA);
        assert_eq!(w, 8);
    }

    #[test]
    fn weights_are_bounded() {
        let mut w = 0;
        for _ in 0..500 {
            w = reinforce(w, FAILURE_DELTA);
        }
        assert!(w <= 50);
        let mut w = 0;
        for _ in 0..500 {
            w = reinforce(w, SUCCESS_DELTA);
        }
        assert!(w >= -50);
    }

    #[test]
    fn keywords_are_normalized() {
        assert_eq!(
            keywords("Auth, DB_migration  ui,api-gw!"),
            vec!["auth", "dbmigration", "api-gw"]
        );
    }

    #[test]
    fn learn_replays_log() {
        let log = vec![
            record("t", "auth", "failure"),
            record("t", "auth", "error"),
            record("t", "auth", "success"),
            record("t", "docs", "unknown"),
        ];
        let table = learn(&log, Utc::now());
        assert_eq!(table.keywords.get("auth"), Some(&8));
        assert!(!table.keywords.contains_key("docs"));
        assert_eq!(table.score("auth, docs"), 8);
    }

    #[test]
    fn zero_weights_are_removed() {
        // -2, 3, 1
        let log = vec![
            record("t", "flaky", "success"),
            record("t", "flaky", "failure"),
            record("t", "flaky", "success"),
        ];
        let table = learn(&log, Utc::now());
        assert_eq!(table.keywords.get("flaky"), Some(&1));

        // ... -1, 4, 2, 0
        let mut log = log;
        log.extend([
            record("t", "flaky", "success"),
            record("t", "flaky", "failure"),
            record("t", "flaky", "success"),
            record("t", "flaky", "success"),
        ]);
        let table = learn(&log, Utc::now());
        assert!(!table.keywords.contains_key("flaky"));
    }
}
