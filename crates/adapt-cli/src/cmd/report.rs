use super::Context;
use crate::output::print_json;
use adapt_core::report;
use chrono::Utc;

pub fn run(ctx: &Context) -> anyhow::Result<()> {
    let report = report::build(&ctx.root, Utc::now());
    if ctx.json {
        return print_json(&report);
    }
    print!("{}", report::render(&report));
    Ok(())
}
