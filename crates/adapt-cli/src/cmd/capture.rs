use super::Context;
use crate::output::print_json;
use adapt_core::memory;
use anyhow::Context as _;
use chrono::Utc;
use std::path::Path;

pub fn run(ctx: &Context, repo: &str, stage: &str, error_file: &Path) -> anyhow::Result<()> {
    if repo.is_empty() || repo.contains(['/', '\\']) || repo == "." || repo == ".." {
        anyhow::bail!("invalid repository name '{repo}'");
    }
    let cfg = ctx.config();
    let dir = ctx.memory_dir(&cfg)?;

    let error = std::fs::read_to_string(error_file)
        .with_context(|| format!("cannot read {}", error_file.display()))?;
    let entry = memory::capture_failure(&dir, repo, stage, &error, Utc::now())
        .with_context(|| format!("failed to capture failure for {repo}"))?;

    match entry {
        Some(entry) if ctx.json => print_json(&entry),
        Some(entry) => {
            println!(
                "Captured [{}] {} (seen {}x)",
                entry.stage, entry.pattern, entry.seen_count
            );
            Ok(())
        }
        None => anyhow::bail!("{} contains no error text", error_file.display()),
    }
}
