use super::Context;
use crate::output::{print_json, print_table};
use adapt_core::{report, tune};
use chrono::Utc;

pub fn run(ctx: &Context) -> anyhow::Result<()> {
    let cfg = ctx.config();
    let now = Utc::now();

    // Memory root falls back to config inside the memory step.
    let summary = tune::run_tuning_pass(&ctx.root, &cfg, ctx.memory_dir.as_deref(), now);
    let report = report::build(&ctx.root, now);

    if ctx.json {
        return print_json(&serde_json::json!({
            "tune": summary,
            "report": report,
        }));
    }

    println!("Tuning pass over {} outcomes", summary.outcomes);
    let rows = summary
        .steps
        .iter()
        .map(|s| {
            vec![
                s.step.to_string(),
                if s.ok { "ok" } else { "FAILED" }.to_string(),
                s.detail.clone(),
            ]
        })
        .collect();
    print_table(&["STEP", "STATUS", "DETAIL"], rows);
    println!();
    print!("{}", report::render(&report));
    Ok(())
}
