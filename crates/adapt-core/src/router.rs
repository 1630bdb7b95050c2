//! Per-stage model routing.
//!
//! Each stage result in the outcome log is attributed to the model its
//! pipeline ran on. Only the configured cheap and expensive models are
//! considered; the cheap one is recommended once it has proven itself.

use crate::config::RoutingConfig;
use crate::error::Result;
use crate::outcome::OutcomeRecord;
use crate::{io, paths};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageRoute {
    pub recommended_model: String,
    pub confidence: f64,
    /// Percentage of completed stage runs, per model.
    #[serde(default)]
    pub success_rate_per_model: BTreeMap<String, f64>,
    #[serde(default)]
    pub sample_count_per_model: BTreeMap<String, usize>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelRoutingTable {
    #[serde(default)]
    pub stages: BTreeMap<String, StageRoute>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl ModelRoutingTable {
    pub fn load(root: &Path) -> Self {
        io::load_json_or_default(&paths::model_path(root, paths::MODEL_ROUTING_FILE))
    }

    pub fn save(&self, root: &Path) -> Result<()> {
        io::write_json(&paths::model_path(root, paths::MODEL_ROUTING_FILE), self)
    }

    /// Recommended model for a stage; the expensive model when unknown.
    pub fn route<'a>(&'a self, stage: &str, cfg: &'a RoutingConfig) -> &'a str {
        self.stages
            .get(stage)
            .map(|r| r.recommended_model.as_str())
            .unwrap_or(cfg.expensive_model.as_str())
    }
}

fn confidence_for(samples: usize) -> f64 {
    match samples {
        n if n >= 10 => 0.9,
        n if n >= 5 => 0.7,
        _ => 0.5,
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct StageCount {
    completed: usize,
    total: usize,
}

/// Rebuild the routing table. Returns the table and the stages that switched
/// to the cheap model relative to `previous`.
pub fn build(
    outcomes: &[OutcomeRecord],
    previous: &ModelRoutingTable,
    cfg: &RoutingConfig,
    now: DateTime<Utc>,
) -> (ModelRoutingTable, Vec<String>) {
    // stage → model → counts
    let mut counts: BTreeMap<String, BTreeMap<String, StageCount>> = BTreeMap::new();
    for r in outcomes {
        if r.model != cfg.cheap_model && r.model != cfg.expensive_model {
            continue;
        }
        for stage in &r.stages {
            let c = counts
                .entry(stage.name.clone())
                .or_default()
                .entry(r.model.clone())
                .or_default();
            c.total += 1;
            if stage.is_completed() {
                c.completed += 1;
            }
        }
    }

    let mut stages = BTreeMap::new();
    let mut switched = Vec::new();
    for (stage, per_model) in counts {
        let success_rate_per_model: BTreeMap<String, f64> = per_model
            .iter()
            .map(|(m, c)| (m.clone(), c.completed as f64 / c.total as f64 * 100.0))
            .collect();
        let sample_count_per_model: BTreeMap<String, usize> = per_model
            .iter()
            .map(|(m, c)| (m.clone(), c.total))
            .collect();

        let cheap_samples = sample_count_per_model
            .get(&cfg.cheap_model)
            .copied()
            .unwrap_or(0);
        let cheap_rate = success_rate_per_model
            .get(&cfg.cheap_model)
            .copied()
            .unwrap_or(0.0);
        let recommended_model = if cheap_samples >= cfg.min_cheap_samples
            && cheap_rate >= cfg.cheap_success_threshold
        {
            cfg.cheap_model.clone()
        } else {
            cfg.expensive_model.clone()
        };

        let was_cheap = previous
            .stages
            .get(&stage)
            .is_some_and(|r| r.recommended_model == cfg.cheap_model);
        if recommended_model == cfg.cheap_model && !was_cheap {
            tracing::info!(stage = %stage, cheap_rate, cheap_samples, "stage routed to cheap model");
            switched.push(stage.clone());
        }

        let total: usize = sample_count_per_model.values().sum();
        stages.insert(
            stage,
            StageRoute {
                recommended_model,
                confidence: confidence_for(total),
                success_rate_per_model,
                sample_count_per_model,
            },
        );
    }

    (
        ModelRoutingTable {
            stages,
            updated_at: Some(now),
        },
        switched,
    )
}
