//! Per-tier iteration prediction and its bias correction.
//!
//! The model is rebuilt from the outcome log on every pass. The bias
//! correction is the exception: it adjusts the stored `mean` in place from
//! the prediction-validation log, so each application nudges it again.

use crate::buckets::{ComplexityBuckets, Tier};
use crate::config::ValidationConfig;
use crate::error::Result;
use crate::outcome::OutcomeRecord;
use crate::validation::ValidationEntry;
use crate::{io, paths};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

impl Tier {
    /// Lowest iteration cap ever recommended for the tier.
    pub fn floor(self) -> u32 {
        match self {
            Tier::Low => 5,
            Tier::Medium => 10,
            Tier::High => 15,
        }
    }

    /// Cap used when the tier has no samples.
    pub fn fallback(self) -> u32 {
        match self {
            Tier::Low => 10,
            Tier::Medium => 20,
            Tier::High => 30,
        }
    }
}

// ---------------------------------------------------------------------------
// Model
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TierPrediction {
    pub max_iterations: u32,
    pub confidence: f64,
    pub mean: f64,
    pub stddev: f64,
    pub samples: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bias_correction: Option<f64>,
}

impl TierPrediction {
    pub fn fallback(tier: Tier) -> Self {
        Self {
            max_iterations: tier.fallback(),
            confidence: confidence_for(0),
            mean: 0.0,
            stddev: 0.0,
            samples: 0,
            bias_correction: None,
        }
    }

    /// Build a tier prediction from its iteration counts.
    pub fn from_samples(tier: Tier, iterations: &[u32]) -> Self {
        if iterations.is_empty() {
            return Self::fallback(tier);
        }
        let n = iterations.len() as f64;
        let mean = iterations.iter().map(|&i| i as f64).sum::<f64>() / n;
        let stddev = if iterations.len() < 2 {
            0.0
        } else {
            let var = iterations
                .iter()
                .map(|&i| (i as f64 - mean).powi(2))
                .sum::<f64>()
                / n;
            var.sqrt()
        };
        Self::from_stats(tier, mean, stddev, iterations.len())
    }

    pub fn from_stats(tier: Tier, mean: f64, stddev: f64, samples: usize) -> Self {
        let cap = (mean + stddev).floor().max(0.0) as u32;
        Self {
            max_iterations: cap.max(tier.floor()),
            confidence: confidence_for(samples),
            mean,
            stddev,
            samples,
            bias_correction: None,
        }
    }
}

fn confidence_for(samples: usize) -> f64 {
    match samples {
        n if n >= 10 => 0.8,
        n if n >= 5 => 0.6,
        _ => 0.4,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IterationModel {
    pub low: TierPrediction,
    pub medium: TierPrediction,
    pub high: TierPrediction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Default for IterationModel {
    fn default() -> Self {
        Self {
            low: TierPrediction::fallback(Tier::Low),
            medium: TierPrediction::fallback(Tier::Medium),
            high: TierPrediction::fallback(Tier::High),
            updated_at: None,
        }
    }
}

impl IterationModel {
    pub fn load(root: &Path) -> Self {
        io::load_json_or_default(&paths::model_path(root, paths::ITERATION_MODEL_FILE))
    }

    pub fn save(&self, root: &Path) -> Result<()> {
        io::write_json(&paths::model_path(root, paths::ITERATION_MODEL_FILE), self)
    }

    pub fn tier(&self, tier: Tier) -> &TierPrediction {
        match tier {
            Tier::Low => &self.low,
            Tier::Medium => &self.medium,
            Tier::High => &self.high,
        }
    }

    pub fn tier_mut(&mut self, tier: Tier) -> &mut TierPrediction {
        match tier {
            Tier::Low => &mut self.low,
            Tier::Medium => &mut self.medium,
            Tier::High => &mut self.high,
        }
    }

    /// Prediction for a prospective pipeline of the given complexity.
    pub fn predict(&self, buckets: &ComplexityBuckets, complexity: u32) -> (Tier, &TierPrediction) {
        let tier = buckets.tier_for(complexity as f64);
        (tier, self.tier(tier))
    }
}

/// Rebuild the iteration model from every outcome with `iterations > 0`.
pub fn build(
    outcomes: &[OutcomeRecord],
    buckets: &ComplexityBuckets,
    now: DateTime<Utc>,
) -> IterationModel {
    let mut by_tier: [Vec<u32>; 3] = Default::default();
    for r in outcomes.iter().filter(|r| r.iterations > 0) {
        let idx = buckets.tier_for(r.complexity as f64) as usize;
        by_tier[idx].push(r.iterations);
    }

    let mut model = IterationModel {
        updated_at: Some(now),
        ..IterationModel::default()
    };
    for tier in Tier::all() {
        let prediction = TierPrediction::from_samples(tier, &by_tier[tier as usize]);
        tracing::debug!(
            tier = %tier,
            samples = prediction.samples,
            mean = prediction.mean,
            max_iterations = prediction.max_iterations,
            "tier prediction"
        );
        *model.tier_mut(tier) = prediction;
    }
    model
}

// ---------------------------------------------------------------------------
// Bias correction
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct BiasCorrection {
    pub tier: Tier,
    pub samples: usize,
    pub mean_delta: f64,
    pub correction: f64,
}

/// Nudge tier means toward observed reality using validation entries.
///
/// For every tier with at least `min_samples` entries whose mean delta
/// exceeds `threshold` in magnitude, `-mean_delta * factor` is added to the
/// stored mean and accumulated into `bias_correction`.
pub fn apply_bias_correction(
    model: &mut IterationModel,
    entries: &[ValidationEntry],
    buckets: &ComplexityBuckets,
    cfg: &ValidationConfig,
) -> Vec<BiasCorrection> {
    let mut deltas: [Vec<f64>; 3] = Default::default();
    for e in entries.iter().filter(|e| e.delta.is_finite()) {
        deltas[buckets.tier_for(e.predicted_complexity) as usize].push(e.delta);
    }

    let mut applied = Vec::new();
    for tier in Tier::all() {
        let d = &deltas[tier as usize];
        if d.len() < cfg.min_samples || d.is_empty() {
            continue;
        }
        let mean_delta = d.iter().sum::<f64>() / d.len() as f64;
        if mean_delta.abs() <= cfg.threshold {
            continue;
        }
        let correction = -mean_delta * cfg.factor;
        let prediction = model.tier_mut(tier);
        prediction.mean += correction;
        prediction.bias_correction = Some(prediction.bias_correction.unwrap_or(0.0) + correction);
        tracing::info!(tier = %tier, mean_delta, correction, "bias correction applied");
        applied.push(BiasCorrection {
            tier,
            samples: d.len(),
            mean_delta,
            correction,
        });
    }
    applied
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
