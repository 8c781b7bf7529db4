use std::env;
use std::path::PathBuf;
use std::process;

use anyhow::{Context, Result, bail};
use fake_news_detector::classification::{EstimatorKind, train_from_csv};
use fake_news_detector::config::Config;
use fake_news_detector::observability::{TracingSettings, init_tracing};

struct TrainArgs {
    dataset: Option<PathBuf>,
    out_dir: Option<PathBuf>,
    test_size: Option<f64>,
    seed: Option<u64>,
    estimator: Option<EstimatorKind>,
}

fn main() -> Result<()> {
    let args = parse_args()?;
    init_tracing(&TracingSettings::from_env())?;

    let config = Config::from_env().context("failed to load configuration")?;
    let mut training = config.training_config();
    if let Some(test_size) = args.test_size {
        training.test_size = test_size;
    }
    if let Some(seed) = args.seed {
        training.seed = seed;
    }
    if let Some(estimator) = args.estimator {
        training.classifier.estimator = estimator;
    }
    let dataset = args
        .dataset
        .unwrap_or_else(|| config.dataset_path().to_path_buf());
    let out_dir = args
        .out_dir
        .unwrap_or_else(|| config.model_dir().to_path_buf());

    match train_from_csv(&dataset, &out_dir, &training) {
        Ok(report) => {
            println!("{report}");
            println!("artifacts written to {}", out_dir.display());
            Ok(())
        }
        Err(error) if error.is_input_error() => {
            eprintln!("training rejected {}: {error}", dataset.display());
            process::exit(2);
        }
        Err(error) => {
            Err(error).with_context(|| format!("training failed for {}", dataset.display()))
        }
    }
}

fn parse_args() -> Result<TrainArgs> {
    let mut parsed = TrainArgs {
        dataset: None,
        out_dir: None,
        test_size: None,
        seed: None,
        estimator: None,
    };

    let mut args = env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--dataset" => {
                let value = args.next().context("--dataset requires a path argument")?;
                parsed.dataset = Some(PathBuf::from(value));
            }
            "--out-dir" => {
                let value = args.next().context("--out-dir requires a path argument")?;
                parsed.out_dir = Some(PathBuf::from(value));
            }
            "--test-size" => {
                let value = args.next().context("--test-size requires a fraction")?;
                let fraction = value
                    .parse::<f64>()
                    .context("--test-size must be a number")?;
                if !(fraction > 0.0 && fraction < 1.0) {
                    bail!("--test-size must be in (0, 1), got {fraction}");
                }
                parsed.test_size = Some(fraction);
            }
            "--seed" => {
                let value = args.next().context("--seed requires an integer")?;
                parsed.seed = Some(value.parse::<u64>().context("--seed must be an integer")?);
            }
            "--estimator" => {
                let value = args
                    .next()
                    .context("--estimator requires logistic or linear_svm")?;
                let estimator = EstimatorKind::from_name(&value)
                    .with_context(|| format!("unknown estimator: {value}"))?;
                parsed.estimator = Some(estimator);
            }
            "--help" => {
                print_usage();
                process::exit(0);
            }
            _ => {
                bail!("unknown argument: {}", arg);
            }
        }
    }

    Ok(parsed)
}

fn print_usage() {
    eprintln!(
        "Usage: train_model [--dataset <csv>] [--out-dir <dir>] [--test-size <f>] [--seed <n>] [--estimator logistic|linear_svm]\n\n\
         Defaults come from FAKE_NEWS_DATASET_PATH, FAKE_NEWS_MODEL_DIR and the other FAKE_NEWS_* variables."
    );
}
