//! Rolling summary of recent outcomes and the current tuning models.
//! Read-only.

use crate::buckets::{ComplexityBuckets, Tier};
use crate::outcome::{self, OutcomeRecord};
use crate::predictor::IterationModel;
use crate::risk::RiskKeywordTable;
use crate::router::ModelRoutingTable;
use crate::template::TemplateWeightModel;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::fmt::Write as _;
use std::path::Path;

pub const WINDOW_DAYS: i64 = 7;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct OutcomeSummary {
    pub window_days: i64,
    pub runs: usize,
    /// Percentage, 0-100.
    pub success_rate: f64,
    pub avg_cost: f64,
    pub avg_iterations: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub generated_at: DateTime<Utc>,
    pub summary: OutcomeSummary,
    pub template_weights: TemplateWeightModel,
    pub iteration_model: IterationModel,
    pub model_routing: ModelRoutingTable,
    pub risk_keywords: RiskKeywordTable,
    pub complexity_buckets: ComplexityBuckets,
}

pub fn summarize(outcomes: &[OutcomeRecord], now: DateTime<Utc>) -> OutcomeSummary {
    let cutoff = now - Duration::days(WINDOW_DAYS);
    let recent: Vec<&OutcomeRecord> = outcomes.iter().filter(|r| r.ts >= cutoff).collect();
    let runs = recent.len();
    if runs == 0 {
        return OutcomeSummary {
            window_days: WINDOW_DAYS,
            ..OutcomeSummary::default()
        };
    }
    let n = runs as f64;
    let successes = recent.iter().filter(|r| r.result.is_success()).count();
    OutcomeSummary {
        window_days: WINDOW_DAYS,
        runs,
        success_rate: successes as f64 / n * 100.0,
        avg_cost: recent.iter().map(|r| r.cost).sum::<f64>() / n,
        avg_iterations: recent.iter().map(|r| r.iterations as f64).sum::<f64>() / n,
    }
}

/// Build a report from the persisted state under `root`.
pub fn build(root: &Path, now: DateTime<Utc>) -> Report {
    Report {
        generated_at: now,
        summary: summarize(&outcome::load_outcomes(root), now),
        template_weights: TemplateWeightModel::load(root),
        iteration_model: IterationModel::load(root),
        model_routing: ModelRoutingTable::load(root),
        risk_keywords: RiskKeywordTable::load(root),
        complexity_buckets: ComplexityBuckets::load(root),
    }
}

/// Plain-text rendering.
pub fn render(report: &Report) -> String {
    let mut out = String::new();
    let s = &report.summary;
    let _ = writeln!(out, "Outcomes (last {} days)", s.window_days);
    let _ = writeln!(
        out,
        "  runs: {}   success: {:.1}%   avg cost: ${:.2}   avg iterations: {:.1}",
        s.runs, s.success_rate, s.avg_cost, s.avg_iterations
    );

    out.push_str("\nTemplate weights\n");
    if report.template_weights.templates.is_empty() {
        out.push_str("  (none)\n");
    }
    for (name, stats) in &report.template_weights.templates {
        let _ = writeln!(
            out,
            "  {:<20} weight {:.2}  samples {}",
            name, stats.success_rate, stats.sample_size
        );
    }

    let b = &report.complexity_buckets;
    let _ = writeln!(
        out,
        "\nComplexity tiers: low <= {}, medium <= {}, high > {} ({} samples)",
        b.low_max, b.med_max, b.med_max, b.samples
    );

    out.push_str("\nIteration model\n");
    for tier in Tier::all() {
        let p = report.iteration_model.tier(tier);
        let _ = write!(
            out,
            "  {:<8} max {:>3}  mean {:.1}  stddev {:.1}  samples {:>4}  confidence {:.1}",
            tier.as_str(),
            p.max_iterations,
            p.mean,
            p.stddev,
            p.samples,
            p.confidence
        );
        if let Some(c) = p.bias_correction {
            let _ = write!(out, "  bias {c:+.2}");
        }
        out.push('\n');
    }

    out.push_str("\nModel routing\n");
    if report.model_routing.stages.is_empty() {
        out.push_str("  (none)\n");
    }
    for (stage, route) in &report.model_routing.stages {
        let _ = writeln!(
            out,
            "  {:<16} {:<10} confidence {:.1}",
            stage, route.recommended_model, route.confidence
        );
    }

    out.push_str("\nRisk keywords\n");
    if report.risk_keywords.keywords.is_empty() {
        out.push_str("  (none)\n");
    }
    let mut keywords: Vec<(&String, &i32)> = report.risk_keywords.keywords.iter().collect();
    keywords.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));
    for (k, w) in keywords {
        let _ = writeln!(out, "  {k:<20} {w:+}");
    }
    out
}
