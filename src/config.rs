use std::{env, net::SocketAddr, num::NonZeroUsize, path::PathBuf};

use thiserror::Error;

use crate::classification::features::{DEFAULT_MAX_DF, DEFAULT_MAX_FEATURES};
use crate::classification::model::{DEFAULT_MAX_ITER, DEFAULT_REGULARIZATION_C};
use crate::classification::split::{DEFAULT_SEED, DEFAULT_TEST_SIZE};
use crate::classification::{ClassifierConfig, EstimatorKind, TrainingConfig, VectorizerConfig};

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    http_bind: SocketAddr,
    model_dir: PathBuf,
    dataset_path: PathBuf,
    test_size: f64,
    split_seed: u64,
    max_features: NonZeroUsize,
    max_df: f64,
    max_iter: NonZeroUsize,
    regularization_c: f64,
    estimator: EstimatorKind,
    class_weight_balanced: bool,
    explain_top_k: usize,
    otel_exporter_endpoint: Option<String>,
    otel_sampling_ratio: f64,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {name}: {source}")]
    Invalid {
        name: &'static str,
        #[source]
        source: anyhow::Error,
    },
}

impl Config {
    /// 環境変数から設定値を読み込み、検証する。すべての値に既定値がある。
    ///
    /// # Errors
    /// 数値／アドレスのパースに失敗した場合や範囲外の値の場合は [`ConfigError::Invalid`] を返す。
    pub fn from_env() -> Result<Self, ConfigError> {
        let http_bind = parse_socket_addr("FAKE_NEWS_HTTP_BIND", "0.0.0.0:9010")?;
        let model_dir = parse_path("FAKE_NEWS_MODEL_DIR", "models");
        let dataset_path = parse_path("FAKE_NEWS_DATASET_PATH", "data/train.csv");

        // Training settings
        let test_size = parse_f64("FAKE_NEWS_TEST_SIZE", DEFAULT_TEST_SIZE)?;
        ensure_range("FAKE_NEWS_TEST_SIZE", test_size, |v| v > 0.0 && v < 1.0, "(0, 1)")?;
        let split_seed = parse_u64("FAKE_NEWS_SPLIT_SEED", DEFAULT_SEED)?;
        let max_features = parse_non_zero_usize("FAKE_NEWS_MAX_FEATURES", DEFAULT_MAX_FEATURES)?;
        let max_df = parse_f64("FAKE_NEWS_MAX_DF", DEFAULT_MAX_DF)?;
        ensure_range("FAKE_NEWS_MAX_DF", max_df, |v| v > 0.0 && v <= 1.0, "(0, 1]")?;
        let max_iter = parse_non_zero_usize("FAKE_NEWS_MAX_ITER", DEFAULT_MAX_ITER)?;
        let regularization_c = parse_f64("FAKE_NEWS_REGULARIZATION_C", DEFAULT_REGULARIZATION_C)?;
        ensure_range(
            "FAKE_NEWS_REGULARIZATION_C",
            regularization_c,
            |v| v > 0.0 && v.is_finite(),
            "(0, inf)",
        )?;
        let estimator = parse_estimator("FAKE_NEWS_ESTIMATOR", "logistic")?;
        let class_weight_balanced = parse_bool("FAKE_NEWS_CLASS_WEIGHT_BALANCED", true)?;

        // Prediction settings
        let explain_top_k = parse_usize("FAKE_NEWS_EXPLAIN_TOP_K", 5)?;

        // OpenTelemetry settings
        let otel_exporter_endpoint = env::var("OTEL_EXPORTER_OTLP_ENDPOINT")
            .ok()
            .filter(|value| !value.trim().is_empty());
        let otel_sampling_ratio = parse_f64("OTEL_SAMPLING_RATIO", 1.0)?;

        Ok(Self {
            http_bind,
            model_dir,
            dataset_path,
            test_size,
            split_seed,
            max_features,
            max_df,
            max_iter,
            regularization_c,
            estimator,
            class_weight_balanced,
            explain_top_k,
            otel_exporter_endpoint,
            otel_sampling_ratio,
        })
    }

    #[must_use]
    pub fn http_bind(&self) -> SocketAddr {
        self.http_bind
    }

    #[must_use]
    pub fn model_dir(&self) -> &std::path::Path {
        &self.model_dir
    }

    #[must_use]
    pub fn dataset_path(&self) -> &std::path::Path {
        &self.dataset_path
    }

    #[must_use]
    pub fn estimator(&self) -> EstimatorKind {
        self.estimator
    }

    #[must_use]
    pub fn explain_top_k(&self) -> usize {
        self.explain_top_k
    }

    #[must_use]
    pub fn otel_exporter_endpoint(&self) -> Option<&str> {
        self.otel_exporter_endpoint.as_deref()
    }

    #[must_use]
    pub fn otel_sampling_ratio(&self) -> f64 {
        self.otel_sampling_ratio
    }

    /// 再学習で使う学習設定。
    #[must_use]
    pub fn training_config(&self) -> TrainingConfig {
        TrainingConfig {
            vectorizer: VectorizerConfig {
                max_features: self.max_features.get(),
                max_df: self.max_df,
                ..VectorizerConfig::default()
            },
            classifier: ClassifierConfig {
                estimator: self.estimator,
                c: self.regularization_c,
                max_iter: self.max_iter.get(),
                balanced_class_weight: self.class_weight_balanced,
                ..ClassifierConfig::default()
            },
            test_size: self.test_size,
            seed: self.split_seed,
        }
    }
}

fn parse_path(name: &'static str, default: &str) -> PathBuf {
    env::var(name)
        .ok()
        .filter(|value| !value.trim().is_empty())
        .map_or_else(|| PathBuf::from(default), PathBuf::from)
}

fn parse_socket_addr(name: &'static str, default: &str) -> Result<SocketAddr, ConfigError> {
    let raw = env::var(name).unwrap_or_else(|_| default.to_string());

    raw.parse().map_err(|error| ConfigError::Invalid {
        name,
        source: anyhow::Error::new(error),
    })
}

fn parse_non_zero_usize(name: &'static str, default: usize) -> Result<NonZeroUsize, ConfigError> {
    let parsed = parse_usize(name, default)?;
    NonZeroUsize::new(parsed).ok_or_else(|| ConfigError::Invalid {
        name,
        source: anyhow::anyhow!("must be greater than zero"),
    })
}

fn parse_usize(name: &'static str, default: usize) -> Result<usize, ConfigError> {
    let raw = env::var(name).unwrap_or_else(|_| default.to_string());
    raw.trim().parse::<usize>().map_err(|error| ConfigError::Invalid {
        name,
        source: anyhow::Error::new(error),
    })
}

fn parse_u64(name: &'static str, default: u64) -> Result<u64, ConfigError> {
    let raw = env::var(name).unwrap_or_else(|_| default.to_string());
    raw.trim().parse::<u64>().map_err(|error| ConfigError::Invalid {
        name,
        source: anyhow::Error::new(error),
    })
}

fn parse_f64(name: &'static str, default: f64) -> Result<f64, ConfigError> {
    let raw = env::var(name).unwrap_or_else(|_| default.to_string());
    raw.trim().parse::<f64>().map_err(|error| ConfigError::Invalid {
        name,
        source: anyhow::Error::new(error),
    })
}

fn ensure_range(
    name: &'static str,
    value: f64,
    accept: impl Fn(f64) -> bool,
    range: &str,
) -> Result<(), ConfigError> {
    if accept(value) {
        Ok(())
    } else {
        Err(ConfigError::Invalid {
            name,
            source: anyhow::anyhow!("value {value} must be in {range}"),
        })
    }
}

fn parse_bool(name: &'static str, default: bool) -> Result<bool, ConfigError> {
    let raw = env::var(name).unwrap_or_else(|_| default.to_string());
    match raw.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::Invalid {
            name,
            source: anyhow::anyhow!("invalid boolean value: {raw}"),
        }),
    }
}

fn parse_estimator(name: &'static str, default: &str) -> Result<EstimatorKind, ConfigError> {
    let raw = env::var(name).unwrap_or_else(|_| default.to_string());
    EstimatorKind::from_name(&raw).ok_or_else(|| ConfigError::Invalid {
        name,
        source: anyhow::anyhow!("unknown estimator: {raw} (expected logistic or linear_svm)"),
    })
}
