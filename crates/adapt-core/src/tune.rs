//! One tuning pass over every model.
//!
//! Steps run in a fixed order and are isolated from one another: a failing
//! step is logged and recorded in the summary, and the next step still runs.
//! Models flow between steps as plain values.

use crate::buckets::{self, ComplexityBuckets};
use crate::config::TuningConfig;
use crate::error::Result;
use crate::memory::{self, EvolutionReport};
use crate::predictor::{self, IterationModel};
use crate::risk;
use crate::router::{self, ModelRoutingTable};
use crate::template::{self, TemplateWeightModel};
use crate::{events, outcome, validation};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::Path;

pub const STEP_TEMPLATES: &str = "template-weights";
pub const STEP_BUCKETS: &str = "complexity-buckets";
pub const STEP_PREDICTOR: &str = "iteration-model";
pub const STEP_BIAS: &str = "bias-correction";
pub const STEP_ROUTING: &str = "model-routing";
pub const STEP_RISK: &str = "risk-keywords";
pub const STEP_MEMORY: &str = "memory-evolution";

#[derive(Debug, Clone, Serialize)]
pub struct StepOutcome {
    pub step: &'static str,
    pub ok: bool,
    pub detail: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct TuneSummary {
    pub outcomes: usize,
    pub steps: Vec<StepOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory: Option<EvolutionReport>,
}

impl TuneSummary {
    pub fn failed(&self) -> impl Iterator<Item = &StepOutcome> {
        self.steps.iter().filter(|s| !s.ok)
    }

    fn record(&mut self, step: &'static str, result: Result<String>) {
        let outcome = match result {
            Ok(detail) => StepOutcome {
                step,
                ok: true,
                detail,
            },
            Err(e) => {
                tracing::warn!(step, error = %e, "tuning step failed, continuing");
                StepOutcome {
                    step,
                    ok: false,
                    detail: e.to_string(),
                }
            }
        };
        self.steps.push(outcome);
    }
}

/// Run every tuning step against the state under `root`.
///
/// `memory_dir` overrides `cfg.memory.dir` when given.
pub fn run_tuning_pass(
    root: &Path,
    cfg: &TuningConfig,
    memory_dir: Option<&Path>,
    now: DateTime<Utc>,
) -> TuneSummary {
    let outcomes = outcome::load_outcomes(root);
    let mut summary = TuneSummary {
        outcomes: outcomes.len(),
        ..TuneSummary::default()
    };
    tracing::info!(outcomes = outcomes.len(), "starting tuning pass");

    // Template weights
    let result = {
        let previous = TemplateWeightModel::load(root);
        let (model, report) = template::tune(&outcomes, &previous, &cfg.template, now);
        model.save(root).map(|_| {
            format!(
                "{} pairs, {} updated, avg rate {:.1}%",
                report.pairs_seen, report.pairs_updated, report.avg_rate
            )
        })
    };
    summary.record(STEP_TEMPLATES, result);

    // Complexity buckets
    let mut bucket_model = ComplexityBuckets::load(root);
    let result = match buckets::rebucket(&outcomes, cfg.buckets.min_samples, now) {
        Some(updated) => {
            bucket_model = updated;
            bucket_model.save(root).map(|_| {
                format!(
                    "low <= {}, medium <= {} from {} samples",
                    bucket_model.low_max, bucket_model.med_max, bucket_model.samples
                )
            })
        }
        None => Ok(format!(
            "unchanged (low <= {}, medium <= {})",
            bucket_model.low_max, bucket_model.med_max
        )),
    };
    summary.record(STEP_BUCKETS, result);

    // Iteration model
    let mut iteration_model: IterationModel = predictor::build(&outcomes, &bucket_model, now);
    let result = iteration_model.save(root).map(|_| {
        format!(
            "caps low {} / medium {} / high {}",
            iteration_model.low.max_iterations,
            iteration_model.medium.max_iterations,
            iteration_model.high.max_iterations
        )
    });
    summary.record(STEP_PREDICTOR, result);

    // Bias correction
    let result = (|| -> Result<String> {
        let entries = validation::load_recent(root, cfg.validation.window);
        let applied = predictor::apply_bias_correction(
            &mut iteration_model,
            &entries,
            &bucket_model,
            &cfg.validation,
        );
        if !applied.is_empty() {
            iteration_model.save(root)?;
        }
        validation::rotate(root, cfg.validation.max_entries)?;
        Ok(format!(
            "{} entries, {} tiers corrected",
            entries.len(),
            applied.len()
        ))
    })();
    summary.record(STEP_BIAS, result);

    // Model routing
    let result = {
        let previous = ModelRoutingTable::load(root);
        let (table, switched) = router::build(&outcomes, &previous, &cfg.routing, now);
        table.save(root).map(|_| {
            for stage in &switched {
                events::emit_best_effort(
                    root,
                    events::ROUTING_SWITCHED_TO_CHEAP,
                    serde_json::json!({
                        "stage": stage,
                        "model": cfg.routing.cheap_model,
                    }),
                );
            }
            format!(
                "{} stages, {} switched to {}",
                table.stages.len(),
                switched.len(),
                cfg.routing.cheap_model
            )
        })
    };
    summary.record(STEP_ROUTING, result);

    // Risk keywords
    let result = {
        let table = risk::learn(&outcomes, now);
        table
            .save(root)
            .map(|_| format!("{} keywords", table.keywords.len()))
    };
    summary.record(STEP_RISK, result);

    // Memory evolution
    let result = (|| -> Result<String> {
        let dir = match memory_dir {
            Some(d) => d.to_path_buf(),
            None => cfg.memory.resolve_dir()?,
        };
        let report = memory::evolve(&dir, &cfg.memory, now)?;
        for pattern in &report.promoted {
            events::emit_best_effort(
                root,
                events::PATTERN_PROMOTED,
                serde_json::json!({ "pattern": pattern }),
            );
        }
        let pruned: usize = report.repos.iter().map(|r| r.pruned).sum();
        let detail = format!(
            "{} repos, {} pruned, {} promoted",
            report.repos.len(),
            pruned,
            report.promoted.len()
        );
        summary.memory = Some(report);
        Ok(detail)
    })();
    summary.record(STEP_MEMORY, result);

    tracing::info!(
        failed = summary.failed().count(),
        "tuning pass complete"
    );
    summary
}
