//! Template weight tuning.
//!
//! Every `(template, label)` pair observed in the outcome log carries a weight
//! in `[weight_min, weight_max]`. Each pass multiplies the persisted weight by
//! the pair's success rate relative to the flat average rate, so weights keep
//! moving on repeated passes whenever a pair's rate differs from the average.

use crate::config::TemplateConfig;
use crate::error::Result;
use crate::outcome::OutcomeRecord;
use crate::{io, paths};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

pub const NEUTRAL_WEIGHT: f64 = 1.0;

// ---------------------------------------------------------------------------
// Model
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TemplateStats {
    /// Mean of this template's pair weights.
    pub success_rate: f64,
    /// Number of labeled outcome observations for this template.
    pub sample_size: usize,
    /// `"template|label"` → weight.
    #[serde(default)]
    pub raw_weights: BTreeMap<String, f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TemplateWeightModel {
    #[serde(default)]
    pub templates: BTreeMap<String, TemplateStats>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

pub fn pair_key(template: &str, label: &str) -> String {
    format!("{template}|{label}")
}

impl TemplateWeightModel {
    pub fn load(root: &Path) -> Self {
        io::load_json_or_default(&paths::model_path(root, paths::TEMPLATE_WEIGHTS_FILE))
    }

    pub fn save(&self, root: &Path) -> Result<()> {
        io::write_json(
            &paths::model_path(root, paths::TEMPLATE_WEIGHTS_FILE),
            self,
        )
    }

    /// Persisted weight for a pair, if any.
    pub fn weight(&self, template: &str, label: &str) -> Option<f64> {
        self.templates
            .get(template)?
            .raw_weights
            .get(&pair_key(template, label))
            .copied()
    }

    /// Template with the highest mean weight over `labels`. Unknown pairs
    /// count as neutral. With no labels, the template's overall
    /// `success_rate` is used.
    pub fn recommend(&self, labels: &[&str]) -> Option<(String, f64)> {
        self.templates
            .iter()
            .map(|(name, stats)| {
                let score = if labels.is_empty() {
                    stats.success_rate
                } else {
                    labels
                        .iter()
                        .map(|l| self.weight(name, l).unwrap_or(NEUTRAL_WEIGHT))
                        .sum::<f64>()
                        / labels.len() as f64
                };
                (name.clone(), score)
            })
            .max_by(|a, b| a.1.total_cmp(&b.1))
    }
}

// ---------------------------------------------------------------------------
// Tuning
// ---------------------------------------------------------------------------

/// `clamp(old * rate / avg_rate, min, max)`. An inverted range yields `max`.
pub fn update_weight(old: f64, rate: f64, avg_rate: f64, min: f64, max: f64) -> f64 {
    (old * (rate / avg_rate)).max(min).min(max)
}

#[derive(Debug, Default, Clone, Copy)]
struct PairCount {
    successes: usize,
    total: usize,
}

impl PairCount {
    fn rate(&self) -> f64 {
        self.successes as f64 / self.total as f64 * 100.0
    }
}

/// Summary of one tuning pass.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TemplateTuneReport {
    pub pairs_seen: usize,
    pub pairs_updated: usize,
    pub avg_rate: f64,
}

/// Recompute the template weight model from the outcome log, starting from
/// the previously persisted weights.
pub fn tune(
    outcomes: &[OutcomeRecord],
    previous: &TemplateWeightModel,
    cfg: &TemplateConfig,
    now: DateTime<Utc>,
) -> (TemplateWeightModel, TemplateTuneReport) {
    let (weight_min, weight_max) = cfg.weight_bounds();
    if (weight_min, weight_max) != (cfg.weight_min, cfg.weight_max) {
        tracing::warn!(
            weight_min = cfg.weight_min,
            weight_max = cfg.weight_max,
            "invalid template weight bounds, using defaults"
        );
    }

    // (template, label) → counts; BTreeMap keeps output stable.
    let mut pairs: BTreeMap<(String, String), PairCount> = BTreeMap::new();
    let mut observations = 0usize;
    let mut successes = 0usize;

    for r in outcomes {
        for label in r.label_list() {
            let c = pairs
                .entry((r.template.clone(), label.to_string()))
                .or_default();
            c.total += 1;
            observations += 1;
            if r.result.is_success() {
                c.successes += 1;
                successes += 1;
            }
        }
    }

    let avg_rate = if observations == 0 {
        0.0
    } else {
        successes as f64 / observations as f64 * 100.0
    };

    // Start from every persisted pair so pairs that aged out of the log keep
    // their weight.
    let mut weights: BTreeMap<String, BTreeMap<String, f64>> = previous
        .templates
        .iter()
        .map(|(t, s)| (t.clone(), s.raw_weights.clone()))
        .collect();
    let mut sample_sizes: BTreeMap<String, usize> = BTreeMap::new();
    let mut updated = 0usize;

    for ((template, label), count) in &pairs {
        *sample_sizes.entry(template.clone()).or_default() += count.total;
        let old = previous.weight(template, label).unwrap_or(NEUTRAL_WEIGHT);
        let new = if count.total >= cfg.min_samples && avg_rate > 0.0 {
            updated += 1;
            update_weight(old, count.rate(), avg_rate, weight_min, weight_max)
        } else {
            old
        };
        tracing::debug!(template = %template, label = %label, rate = count.rate(), old, new, "pair weight");
        weights
            .entry(template.clone())
            .or_default()
            .insert(pair_key(template, label), new);
    }

    let templates = weights
        .into_iter()
        .map(|(template, raw_weights)| {
            let success_rate = if raw_weights.is_empty() {
                NEUTRAL_WEIGHT
            } else {
                raw_weights.values().sum::<f64>() / raw_weights.len() as f64
            };
            let sample_size = sample_sizes.get(&template).copied().unwrap_or(0);
            (
                template,
                TemplateStats {
                    success_rate,
                    sample_size,
                    raw_weights,
                },
            )
        })
        .collect();

    let report = TemplateTuneReport {
        pairs_seen: pairs.len(),
        pairs_updated: updated,
        avg_rate,
    };
    tracing::info!(
        pairs = report.pairs_seen,
        updated = report.pairs_updated,
        avg_rate = report.avg_rate,
        "template weights tuned"
    );
    (
        TemplateWeightModel {
            templates,
            updated_at: Some(now),
        },
        report,
    )
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outcome::tests::record;

    fn cfg() -> TemplateConfig {
        TemplateConfig::default()
    }

    #[test]
    fn update_weight_examples() {
        assert!((update_weight(1.0, 80.0, 50.0, 0.1, 2.0) - 1.6).abs() < 1e-9);
        assert!((update_weight(1.0, 10.0, 50.0, 0.1, 2.0) - 0.2).abs() < 1e-9);
    }

    #[test]
    fn update_weight_is_clamped() {
        assert_eq!(update_weight(1.5, 100.0, 20.0, 0.1, 2.0), 2.0);
        assert_eq!(update_weight(0.2, 0.0, 50.0, 0.1, 2.0), 0.1);
    }

    fn auth_log() -> Vec<OutcomeRecord> {
        let mut log = Vec::new();
        for _ in 0..5 {
            log.push(record("A", "auth", "failure"));
        }
        log.push(record("A", "auth", "success"));
        for _ in 0..6 {
            log.push(record("B", "auth", "success"));
        }
        log
    }

    #[test]
    fn better_template_gains_weight() {
        let (model, report) = tune(
            &auth_log(),
            &TemplateWeightModel::default(),
            &cfg(),
            Utc::now(),
        );
        let a = model.weight("A", "auth").unwrap();
        let b = model.weight("B", "auth").unwrap();
        assert!(b > 1.0, "B weight {b}");
        assert!(a < 1.0, "A weight {a}");
        assert_eq!(report.pairs_updated, 2);
        assert_eq!(model.templates["A"].sample_size, 6);
        assert_eq!(
            model.recommend(&["auth"]).map(|(t, _)| t),
            Some("B".to_string())
        );
    }

    #[test]
    fn update_weight_with_inverted_range_does_not_panic() {
        assert_eq!(update_weight(1.0, 80.0, 50.0, 3.0, 2.0), 2.0);
    }

    #[test]
    fn inverted_bounds_fall_back_to_defaults() {
        let cfg = TemplateConfig {
            weight_min: 3.0,
            ..TemplateConfig::default()
        };
        let (model, report) = tune(&auth_log(), &TemplateWeightModel::default(), &cfg, Utc::now());
        assert_eq!(report.pairs_updated, 2);
        let a = model.weight("A", "auth").unwrap();
        let b = model.weight("B", "auth").unwrap();
        assert!((0.1..1.0).contains(&a), "A weight {a}");
        assert!(b > 1.0 && b <= 2.0, "B weight {b}");
    }

    #[test]
    fn repeated_pass_keeps_drifting() {
        let log = auth_log();
        let (first, _) = tune(&log, &TemplateWeightModel::default(), &cfg(), Utc::now());
        let (second, _) = tune(&log, &first, &cfg(), Utc::now());
        assert!(second.weight("A", "auth").unwrap() < first.weight("A", "auth").unwrap());
        // B is already at the cap.
        assert!(second.weight("B", "auth").unwrap() <= 2.0);
    }

    #[test]
    fn small_pairs_are_untouched() {
        let log = vec![
            record("A", "ui", "failure"),
            record("A", "ui", "failure"),
        ];
        let mut previous = TemplateWeightModel::default();
        previous.templates.insert(
            "A".to_string(),
            TemplateStats {
                success_rate: 1.3,
                sample_size: 0,
                raw_weights: BTreeMap::from([("A|ui".to_string(), 1.3)]),
            },
        );
        let (model, report) = tune(&log, &previous, &cfg(), Utc::now());
        assert_eq!(report.pairs_updated, 0);
        assert_eq!(model.weight("A", "ui"), Some(1.3));
    }

    #[test]
    fn unlabeled_rows_are_ignored() {
        let log = vec![record("A", "", "success"); 10];
        let (model, report) = tune(&log, &TemplateWeightModel::default(), &cfg(), Utc::now());
        assert_eq!(report.pairs_seen, 0);
        assert!(model.templates.is_empty());
    }

    #[test]
    fn zero_average_rate_leaves_weights() {
        let log = vec![record("A", "auth", "failure"); 6];
        let (model, report) = tune(&log, &TemplateWeightModel::default(), &cfg(), Utc::now());
        assert_eq!(report.pairs_updated, 0);
        assert_eq!(model.weight("A", "auth"), Some(1.0));
    }

    #[test]
    fn success_rate_is_mean_of_pair_weights() {
        let mut log = auth_log();
        for _ in 0..5 {
            log.push(record("B", "db", "success"));
        }
        let (model, _) = tune(&log, &TemplateWeightModel::default(), &cfg(), Utc::now());
        let b = &model.templates["B"];
        let mean = b.raw_weights.values().sum::<f64>() / 2.0;
        assert!((b.success_rate - mean).abs() < 1e-9);
        assert_eq!(b.sample_size, 11);
    }

    #[test]
    fn save_and_load() {
        let dir = tempfile::TempDir::new().unwrap();
        let (model, _) = tune(&auth_log(), &TemplateWeightModel::default(), &cfg(), Utc::now());
        model.save(dir.path()).unwrap();
        assert_eq!(TemplateWeightModel::load(dir.path()), model);
    }
}
