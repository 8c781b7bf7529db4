//! 学習済み成果物を使った推論。
use std::path::{Path, PathBuf};

use serde::Serialize;
use uuid::Uuid;

use super::Label;
use super::artifacts::{ArtifactManifest, ArtifactStore};
use super::error::Result;
use super::features::Vocabulary;
use super::model::{EstimatorKind, ModelParameters};

/// この確率以上で FAKE と判定する。
pub const DECISION_THRESHOLD: f64 = 0.5;
const DEFAULT_MODEL_DIR: &str = "models";
const MODEL_DIR_ENV: &str = "FAKE_NEWS_MODEL_DIR";

/// 確率から判定ラベルを決める。境界 0.5 は FAKE 側。
#[must_use]
pub fn decide(probability_fake: f64) -> Label {
    if probability_fake >= DECISION_THRESHOLD {
        Label::Fake
    } else {
        Label::Real
    }
}

/// `|p - 0.5| × 2` を [0, 1] に収めたもの。
#[must_use]
pub fn confidence(probability_fake: f64) -> f64 {
    ((probability_fake - DECISION_THRESHOLD).abs() * 2.0).clamp(0.0, 1.0)
}

fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PredictionResult {
    pub label: Label,
    pub probability_fake: f64,
    pub confidence: f64,
}

/// 判定に寄与した語。`contribution = tfidf × weight`、正なら FAKE 寄り。
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureContribution {
    pub term: String,
    pub weight: f64,
    pub contribution: f64,
}

/// 読み込み済みの推論器。読み込み後は不変なので `Arc` で共有できる。
#[derive(Debug, Clone)]
pub struct PredictionService {
    store: ArtifactStore,
    manifest: ArtifactManifest,
    vocabulary: Vocabulary,
    parameters: ModelParameters,
}

impl PredictionService {
    /// # Errors
    /// 成果物が無い、または互換性が無い場合。
    pub fn load(dir: impl Into<PathBuf>) -> Result<Self> {
        let store = ArtifactStore::new(dir);
        let loaded = store.load()?;
        tracing::info!(
            dir = %store.dir().display(),
            version = %loaded.manifest.version,
            vocabulary_size = loaded.vocabulary.len(),
            "prediction service loaded"
        );
        Ok(Self {
            store,
            manifest: loaded.manifest,
            vocabulary: loaded.vocabulary,
            parameters: loaded.parameters,
        })
    }

    /// 再学習後に成果物を読み直す。失敗時は現在の状態を保つ。
    ///
    /// # Errors
    /// [`PredictionService::load`] と同じ。
    pub fn reload(&mut self) -> Result<()> {
        *self = Self::load(self.store.dir().to_path_buf())?;
        Ok(())
    }

    #[must_use]
    pub fn model_dir(&self) -> &Path {
        self.store.dir()
    }

    #[must_use]
    pub fn version(&self) -> Uuid {
        self.manifest.version
    }

    #[must_use]
    pub fn estimator(&self) -> EstimatorKind {
        self.parameters.estimator()
    }

    /// # Errors
    /// 語彙と重みの次元が食い違う場合（読み込み時に検証済み）。
    pub fn predict(&self, text: &str) -> Result<PredictionResult> {
        let vector = self.vocabulary.transform_one(text);
        let probability = self.parameters.predict_proba(&vector)?;
        let result = PredictionResult {
            label: decide(probability),
            probability_fake: round3(probability),
            confidence: round3(confidence(probability)),
        };
        tracing::debug!(
            label = %result.label,
            probability_fake = result.probability_fake,
            known_terms = vector.nnz(),
            "prediction"
        );
        Ok(result)
    }

    /// 入力に現れた語のうち寄与の絶対値が大きい順に `top_k` 件。
    #[must_use]
    pub fn explain(&self, text: &str, top_k: usize) -> Vec<FeatureContribution> {
        let vector = self.vocabulary.transform_one(text);
        let weights = self.parameters.weights();
        let mut contributions: Vec<FeatureContribution> = vector
            .iter()
            .filter_map(|(idx, value)| {
                let term = self.vocabulary.term(idx)?;
                let weight = *weights.get(idx)?;
                Some(FeatureContribution {
                    term: term.to_string(),
                    weight,
                    contribution: value * weight,
                })
            })
            .collect();
        contributions.sort_by(|a, b| {
            b.contribution
                .abs()
                .total_cmp(&a.contribution.abs())
                .then_with(|| a.term.cmp(&b.term))
        });
        contributions.truncate(top_k);
        contributions
    }
}

/// 既定のモデルディレクトリ（`FAKE_NEWS_MODEL_DIR`、未設定なら `models`）から読み込んで判定する。
///
/// # Errors
/// 成果物が無い場合は [`super::ClassificationError::ArtifactsNotFound`]。
pub fn predict_news(text: &str) -> Result<PredictionResult> {
    let dir = std::env::var(MODEL_DIR_ENV).unwrap_or_else(|_| DEFAULT_MODEL_DIR.to_string());
    PredictionService::load(dir)?.predict(text)
}
