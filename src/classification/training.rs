//! 学習パイプライン: 分割 → TF-IDF 学習 → 分類器学習 → 評価 → 保存。
use std::fmt;
use std::path::Path;

use serde::Serialize;
use uuid::Uuid;

use super::artifacts::{ArtifactManifest, ArtifactStore};
use super::dataset::load_csv;
use super::error::{ClassificationError, Result};
use super::features::{TfidfVectorizer, VectorizerConfig};
use super::model::{ClassifierConfig, LinearClassifier};
use super::predict::decide;
use super::split::{DEFAULT_SEED, DEFAULT_TEST_SIZE, stratified_split};
use super::{Label, LabeledExample};
use crate::evaluation::{ClassificationMetrics, MetricsCalculator};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrainingConfig {
    pub vectorizer: VectorizerConfig,
    pub classifier: ClassifierConfig,
    pub test_size: f64,
    pub seed: u64,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            vectorizer: VectorizerConfig::default(),
            classifier: ClassifierConfig::default(),
            test_size: DEFAULT_TEST_SIZE,
            seed: DEFAULT_SEED,
        }
    }
}

/// 学習結果のサマリ。
#[derive(Debug, Clone, Serialize)]
pub struct TrainingReport {
    pub version: Uuid,
    pub train_size: usize,
    pub test_size: usize,
    pub vocabulary_size: usize,
    pub metrics: ClassificationMetrics,
}

impl TrainingReport {
    #[must_use]
    pub fn accuracy(&self) -> f64 {
        self.metrics.accuracy
    }
}

impl fmt::Display for TrainingReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "model version: {}", self.version)?;
        writeln!(
            f,
            "train: {}  test: {}  vocabulary: {}",
            self.train_size, self.test_size, self.vocabulary_size
        )?;
        writeln!(f, "Accuracy: {:.4}", self.metrics.accuracy)?;
        writeln!(f)?;
        write!(f, "{}", self.metrics)
    }
}

#[derive(Debug, Clone, Default)]
pub struct TrainingPipeline {
    config: TrainingConfig,
}

impl TrainingPipeline {
    #[must_use]
    pub fn new(config: TrainingConfig) -> Self {
        Self { config }
    }

    #[must_use]
    pub fn config(&self) -> &TrainingConfig {
        &self.config
    }

    /// 学習して `out_dir` に成果物ペアを書き出す。
    ///
    /// いずれかの段階で失敗した場合、成果物は一切書き込まれない。
    ///
    /// # Errors
    /// ラベルが1種類、分割不能、語彙が空、保存失敗の場合。
    pub fn train(&self, examples: &[LabeledExample], out_dir: &Path) -> Result<TrainingReport> {
        let labels: Vec<Label> = examples.iter().map(|example| example.label).collect();
        let distinct = Label::ALL
            .iter()
            .filter(|class| labels.contains(*class))
            .count();
        if distinct < 2 {
            return Err(ClassificationError::LabelCardinality { found: distinct });
        }

        let split = stratified_split(&labels, self.config.test_size, self.config.seed)?;
        let train_texts: Vec<&str> = split
            .train
            .iter()
            .map(|&idx| examples[idx].text.as_str())
            .collect();
        let train_labels: Vec<Label> = split.train.iter().map(|&idx| labels[idx]).collect();

        tracing::info!(
            rows = examples.len(),
            train = split.train.len(),
            test = split.test.len(),
            seed = self.config.seed,
            "starting training"
        );

        let vocabulary = TfidfVectorizer::new(self.config.vectorizer).fit(&train_texts)?;
        let train_vectors = vocabulary.transform(&train_texts);
        let parameters =
            LinearClassifier::new(self.config.classifier).fit(&train_vectors, &train_labels)?;

        let test_texts: Vec<&str> = split
            .test
            .iter()
            .map(|&idx| examples[idx].text.as_str())
            .collect();
        let mut calculator = MetricsCalculator::new();
        for (vector, &idx) in vocabulary.transform(&test_texts).iter().zip(&split.test) {
            let probability = parameters.predict_proba(vector)?;
            calculator.push(labels[idx], decide(probability));
        }
        let metrics = calculator.finalize();

        let manifest = ArtifactManifest::new(&vocabulary);
        ArtifactStore::new(out_dir).save(&manifest, &vocabulary, &parameters)?;

        let report = TrainingReport {
            version: manifest.version,
            train_size: split.train.len(),
            test_size: split.test.len(),
            vocabulary_size: vocabulary.len(),
            metrics,
        };
        tracing::info!(
            version = %report.version,
            accuracy = report.metrics.accuracy,
            macro_f1 = report.metrics.macro_avg.f1,
            "training finished"
        );
        tracing::info!("classification report\n{}", report.metrics);
        Ok(report)
    }
}

/// CSV を読み込んで学習する。
///
/// # Errors
/// 読み込み・学習・保存のいずれかに失敗した場合。
pub fn train_from_csv(
    dataset_path: &Path,
    out_dir: &Path,
    config: &TrainingConfig,
) -> Result<TrainingReport> {
    let examples = load_csv(dataset_path)?;
    TrainingPipeline::new(*config).train(&examples, out_dir)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classification::dataset::sample_dataset;
    use tempfile::TempDir;

    #[test]
    fn single_label_dataset_fails_before_split() {
        let dir = TempDir::new().expect("tempdir");
        let examples = vec![
            LabeledExample::new("isro launches satellite", Label::Real),
            LabeledExample::new("metro line opens", Label::Real),
            LabeledExample::new("budget announced", Label::Real),
        ];
        let err = TrainingPipeline::default()
            .train(&examples, dir.path())
            .expect_err("one label");
        assert!(matches!(
            err,
            ClassificationError::LabelCardinality { found: 1 }
        ));
        assert!(!ArtifactStore::new(dir.path()).exists());
    }

    #[test]
    fn sample_training_reports_holdout_sizes() {
        let dir = TempDir::new().expect("tempdir");
        let report = TrainingPipeline::default()
            .train(&sample_dataset(), dir.path())
            .expect("train");
        assert_eq!(report.train_size, 14);
        assert_eq!(report.test_size, 6);
        assert_eq!(report.metrics.total, 6);
        assert!(report.vocabulary_size > 0);
        assert!(ArtifactStore::new(dir.path()).exists());
        assert!(report.to_string().contains("Accuracy:"));
    }
}
