use super::Context;
use crate::output::{print_json, print_table};
use adapt_core::buckets::ComplexityBuckets;
use adapt_core::predictor::IterationModel;
use adapt_core::risk::RiskKeywordTable;
use adapt_core::router::ModelRoutingTable;
use adapt_core::template::TemplateWeightModel;
use serde::Serialize;

#[derive(Serialize)]
struct Recommendation {
    labels: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    template: Option<TemplatePick>,
    #[serde(skip_serializing_if = "Option::is_none")]
    iterations: Option<IterationPick>,
    routes: Vec<RoutePick>,
    risk_score: i32,
}

#[derive(Serialize)]
struct TemplatePick {
    name: String,
    score: f64,
}

#[derive(Serialize)]
struct IterationPick {
    complexity: u32,
    tier: String,
    max_iterations: u32,
    confidence: f64,
}

#[derive(Serialize)]
struct RoutePick {
    stage: String,
    model: String,
}

pub fn run(ctx: &Context, labels: &str, complexity: Option<u32>) -> anyhow::Result<()> {
    let cfg = ctx.config();
    let label_list: Vec<&str> = labels
        .split(',')
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect();

    let template = TemplateWeightModel::load(&ctx.root)
        .recommend(&label_list)
        .map(|(name, score)| TemplatePick { name, score });

    let iterations = complexity.map(|c| {
        let buckets = ComplexityBuckets::load(&ctx.root);
        let model = IterationModel::load(&ctx.root);
        let (tier, p) = model.predict(&buckets, c);
        IterationPick {
            complexity: c,
            tier: tier.to_string(),
            max_iterations: p.max_iterations,
            confidence: p.confidence,
        }
    });

    let routing = ModelRoutingTable::load(&ctx.root);
    let routes = routing
        .stages
        .keys()
        .map(|stage| RoutePick {
            stage: stage.clone(),
            model: routing.route(stage, &cfg.routing).to_string(),
        })
        .collect();

    let rec = Recommendation {
        labels: label_list.iter().map(|l| l.to_string()).collect(),
        template,
        iterations,
        routes,
        risk_score: RiskKeywordTable::load(&ctx.root).score(labels),
    };

    if ctx.json {
        return print_json(&rec);
    }

    match &rec.template {
        Some(t) => println!("Template:   {} (score {:.2})", t.name, t.score),
        None => println!("Template:   (no weights yet)"),
    }
    if let Some(i) = &rec.iterations {
        println!(
            "Iterations: {} (complexity {} -> {} tier, confidence {:.1})",
            i.max_iterations, i.complexity, i.tier, i.confidence
        );
    }
    println!("Risk score: {:+}", rec.risk_score);
    if !rec.routes.is_empty() {
        println!();
        let rows = rec
            .routes
            .iter()
            .map(|r| vec![r.stage.clone(), r.model.clone()])
            .collect();
        print_table(&["STAGE", "MODEL"], rows);
    }
    Ok(())
}
