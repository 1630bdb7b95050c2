use super::Context;
use crate::output::{print_json, print_table};
use adapt_core::{events, memory};
use anyhow::Context as _;
use chrono::Utc;

pub fn run(ctx: &Context) -> anyhow::Result<()> {
    let cfg = ctx.config();
    let dir = ctx.memory_dir(&cfg)?;

    let report = memory::evolve(&dir, &cfg.memory, Utc::now())
        .with_context(|| format!("failed to evolve memory in {}", dir.display()))?;
    for pattern in &report.promoted {
        events::emit_best_effort(
            &ctx.root,
            events::PATTERN_PROMOTED,
            serde_json::json!({ "pattern": pattern }),
        );
    }

    if ctx.json {
        return print_json(&report);
    }

    if report.repos.is_empty() {
        println!("No failure stores under {}", dir.display());
    } else {
        let rows = report
            .repos
            .iter()
            .map(|r| {
                vec![
                    r.repo.clone(),
                    r.pruned.to_string(),
                    r.strengthened.to_string(),
                    r.remaining.to_string(),
                ]
            })
            .collect();
        print_table(&["REPO", "PRUNED", "STRENGTHENED", "REMAINING"], rows);
    }
    for repo in &report.skipped {
        println!("skipped {repo}: unreadable store");
    }
    for repo in &report.failed {
        println!("failed {repo}: store could not be written");
    }
    if report.promoted.is_empty() {
        println!("No patterns promoted.");
    } else {
        println!("Promoted {} pattern(s):", report.promoted.len());
        for p in &report.promoted {
            println!("  {p}");
        }
    }
    Ok(())
}
