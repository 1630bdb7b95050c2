use super::Context;
use crate::output::print_json;
use adapt_core::ci::{CiMetricsSource, HttpCiSource};
use adapt_core::recorder;
use anyhow::Context as _;
use std::path::Path;

pub fn run(ctx: &Context, state_file: &Path) -> anyhow::Result<()> {
    let cfg = ctx.config();

    let ci = match HttpCiSource::from_config(&cfg.ci) {
        Ok(source) => source,
        Err(e) => {
            tracing::warn!(error = %e, "CI metrics disabled");
            None
        }
    };
    let ci_ref = ci.as_ref().map(|s| s as &dyn CiMetricsSource);

    let recorded = recorder::record_outcome(&ctx.root, &cfg, state_file, ci_ref)
        .with_context(|| format!("failed to record outcome from {}", state_file.display()))?;

    if ctx.json {
        return print_json(&serde_json::json!({
            "outcome": recorded.record,
            "ci": recorded.ci,
        }));
    }

    let r = &recorded.record;
    println!(
        "Recorded {}: {} (template {}, model {}, {} iterations, ${:.2})",
        r.issue_id,
        r.result,
        r.template,
        r.model,
        r.iterations,
        r.cost
    );
    if let Some(ci) = &recorded.ci {
        println!(
            "CI: {:.1}% success, avg {:.0}s",
            ci.ci_success_rate, ci.ci_avg_duration_s
        );
    }
    Ok(())
}
