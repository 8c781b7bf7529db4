use std::env;
use std::path::PathBuf;
use std::process;

use anyhow::{Context, Result, bail};
use fake_news_detector::classification::{ClassificationError, PredictionService};
use fake_news_detector::classification::summary::lead_summary;
use fake_news_detector::observability::{TracingSettings, init_tracing};

const DEFAULT_MODEL_DIR: &str = "models";

fn main() -> Result<()> {
    let (model_dir, text) = parse_args()?;
    init_tracing(&TracingSettings::from_env())?;

    let service = match PredictionService::load(&model_dir) {
        Ok(service) => service,
        Err(error @ ClassificationError::ArtifactsNotFound { .. }) => {
            eprintln!("{error}. Run train_model first.");
            process::exit(2);
        }
        Err(error) => {
            return Err(error)
                .with_context(|| format!("failed to load model from {}", model_dir.display()));
        }
    };

    let result = service.predict(&text).context("prediction failed")?;
    println!("Prediction: {}", result.label);
    println!("Probability (FAKE): {:.3}", result.probability_fake);
    println!("Confidence: {:.3}", result.confidence);
    println!("Summary: {}", lead_summary(&text));
    for contribution in service.explain(&text, 5) {
        println!(
            "  {:<24} {:+.4}",
            contribution.term, contribution.contribution
        );
    }
    Ok(())
}

fn parse_args() -> Result<(PathBuf, String)> {
    let mut model_dir = None;
    let mut words = Vec::new();

    let mut args = env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--model-dir" => {
                let value = args.next().context("--model-dir requires a path argument")?;
                model_dir = Some(PathBuf::from(value));
            }
            "--help" => {
                print_usage();
                process::exit(0);
            }
            _ => words.push(arg),
        }
    }

    let text = words.join(" ");
    if text.trim().is_empty() {
        print_usage();
        bail!("article text is required");
    }
    let model_dir = model_dir
        .or_else(|| env::var("FAKE_NEWS_MODEL_DIR").ok().map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_MODEL_DIR));
    Ok((model_dir, text))
}

fn print_usage() {
    eprintln!("Usage: predict_news [--model-dir <dir>] <article text...>");
}
