mod args;

use anyhow::{bail, Context, Result};
use args::Args;
use clap::Parser;
use coco_challenge_eval::challenge::evaluate_with_metric;
use std::fs;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn main() -> Result<()> {
    // stdout carries the JSON result
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();

    let metadata = match &args.metadata {
        Some(path) => {
            let text = fs::read_to_string(path)
                .with_context(|| format!("reading metadata {}", path.display()))?;
            serde_json::from_str(&text)
                .with_context(|| format!("parsing metadata {}", path.display()))?
        }
        None => serde_json::Value::Object(Default::default()),
    };

    let output = evaluate_with_metric(
        &args.annotations,
        &args.submission,
        &args.phase,
        &metadata,
        args.metric,
    )
    .with_context(|| {
        format!(
            "evaluating {} against {}",
            args.submission.display(),
            args.annotations.display()
        )
    })?;

    let json = serde_json::to_string_pretty(&output)?;
    match &args.output {
        Some(path) => {
            fs::write(path, &json).with_context(|| format!("writing {}", path.display()))?;
            info!(path = %path.display(), "result written");
        }
        None => println!("{}", json),
    }

    if !output.is_scored() {
        bail!("unsupported phase {:?}, expected \"dev\" or \"test\"", args.phase);
    }
    Ok(())
}
