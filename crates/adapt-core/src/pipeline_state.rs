//! Parser for the pipeline state description written by the pipeline runner.
//!
//! ```text
//! ---
//! issue: 42
//! template: standard
//! status: complete
//! iteration: 4
//! cost: $1.25
//! stages:
//!   intake: complete
//!   build: failed
//! ---
//! ```
//!
//! Every numeric field is coerced here, once: absent or malformed values
//! become `0`, absent strings become `unknown`.

use crate::outcome::{OutcomeRecord, PipelineResult, StageResult};
use chrono::{DateTime, Utc};
use regex::Regex;
use std::sync::OnceLock;

static KEY_VALUE_RE: OnceLock<Regex> = OnceLock::new();

fn key_value_re() -> &'static Regex {
    KEY_VALUE_RE.get_or_init(|| {
        Regex::new(r"^(\s*)([A-Za-z0-9_.\-]+)\s*:\s*(.*)$").unwrap()
    })
}

/// Raw fields of a pipeline state description.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PipelineState {
    pub issue_id: Option<String>,
    pub template: Option<String>,
    pub result: Option<String>,
    pub model: Option<String>,
    pub labels: Option<String>,
    pub iterations: Option<u32>,
    pub cost: Option<f64>,
    pub complexity: Option<u32>,
    pub stages: Vec<StageResult>,
}

fn unquote(v: &str) -> &str {
    let v = v.trim();
    for q in ['"', '\''] {
        if v.len() >= 2 && v.starts_with(q) && v.ends_with(q) {
            return &v[1..v.len() - 1];
        }
    }
    v
}

fn non_empty(v: &str) -> Option<String> {
    let v = unquote(v);
    if v.is_empty() {
        None
    } else {
        Some(v.to_string())
    }
}

fn parse_cost(v: &str) -> Option<f64> {
    let v = unquote(v);
    v.trim_start_matches('$')
        .parse::<f64>()
        .ok()
        .filter(|c| c.is_finite() && *c >= 0.0)
}

impl PipelineState {
    pub fn parse(text: &str) -> Self {
        let mut state = PipelineState::default();
        let mut in_stages = false;
        let mut seen_content = false;

        for line in text.lines() {
            if line.trim() == "---" {
                if seen_content {
                    break;
                }
                continue;
            }
            if line.trim().is_empty() || line.trim_start().starts_with('#') {
                continue;
            }
            seen_content = true;

            let Some(caps) = key_value_re().captures(line) else {
                continue;
            };
            let indented = !caps[1].is_empty();
            let key = caps[2].to_ascii_lowercase();
            let value = caps[3].trim();

            if in_stages && indented {
                state.stages.push(StageResult {
                    name: caps[2].to_string(),
                    status: unquote(value).to_string(),
                });
                continue;
            }
            in_stages = false;

            match key.as_str() {
                "stages" => in_stages = true,
                "issue" | "issue_id" => state.issue_id = non_empty(value),
                "template" | "pipeline" => state.template = non_empty(value),
                "status" | "result" => state.result = non_empty(value),
                "model" => state.model = non_empty(value),
                "labels" => state.labels = non_empty(value),
                "iterations" | "iteration" => state.iterations = unquote(value).parse().ok(),
                "cost" | "total_cost" => state.cost = parse_cost(value),
                "complexity" => state.complexity = unquote(value).parse().ok(),
                _ => {}
            }
        }
        state
    }

    /// Convert to an outcome record, substituting defaults for absent fields.
    pub fn into_record(self, ts: DateTime<Utc>) -> OutcomeRecord {
        OutcomeRecord {
            ts,
            issue_id: self.issue_id.unwrap_or_else(|| "unknown".to_string()),
            template: self.template.unwrap_or_else(|| "unknown".to_string()),
            result: self
                .result
                .map(|r| PipelineResult::parse(&r))
                .unwrap_or(PipelineResult::Unknown),
            model: self.model.unwrap_or_else(|| "unknown".to_string()),
            labels: self.labels.unwrap_or_default(),
            iterations: self.iterations.unwrap_or(0),
            cost: self.cost.unwrap_or(0.0),
            complexity: self.complexity.unwrap_or(0),
            stages: self.stages,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "---
issue: \"42\"
pipeline: standard
status: complete
model: sonnet
labels: auth, api
iteration: 4
total_cost: $1.25
complexity: 6
stages:
  intake: complete
  plan: complete
  build: failed
---
# Log
status: ignored
";

    #[test]
    fn parses_full_state() {
        let s = PipelineState::parse(SAMPLE);
        assert_eq!(s.issue_id.as_deref(), Some("42"));
        assert_eq!(s.template.as_deref(), Some("standard"));
        assert_eq!(s.result.as_deref(), Some("complete"));
        assert_eq!(s.labels.as_deref(), Some("auth, api"));
        assert_eq!(s.iterations, Some(4));
        assert_eq!(s.cost, Some(1.25));
        assert_eq!(s.complexity, Some(6));
        assert_eq!(s.stages.len(), 3);
        assert_eq!(s.stages[2].name, "build");
        assert_eq!(s.stages[2].status, "failed");
    }

    #[test]
    fn content_after_terminator_is_ignored() {
        let s = PipelineState::parse(SAMPLE);
        assert_eq!(s.result.as_deref(), Some("complete"));
    }

    #[test]
    fn malformed_numbers_default_to_zero() {
        let s = PipelineState::parse("iterations: lots\ncost: free\ncomplexity: -3\n");
        let r = s.into_record(Utc::now());
        assert_eq!(r.iterations, 0);
        assert_eq!(r.cost, 0.0);
        assert_eq!(r.complexity, 0);
    }

    #[test]
    fn absent_fields_become_unknown() {
        let r = PipelineState::parse("").into_record(Utc::now());
        assert_eq!(r.issue_id, "unknown");
        assert_eq!(r.template, "unknown");
        assert_eq!(r.result, PipelineResult::Unknown);
        assert_eq!(r.labels, "");
        assert!(r.stages.is_empty());
    }

    #[test]
    fn top_level_key_ends_stage_block() {
        let s = PipelineState::parse("stages:\n  build: complete\nmodel: opus\n");
        assert_eq!(s.stages.len(), 1);
        assert_eq!(s.model.as_deref(), Some("opus"));
    }
}
