//! 線形二値分類器（ロジスティック回帰 / 線形 SVM）。
use ndarray::Array1;
use serde::{Deserialize, Serialize};

use super::Label;
use super::error::{ClassificationError, Result};
use super::features::FeatureVector;

pub const DEFAULT_MAX_ITER: usize = 2000;
pub const DEFAULT_REGULARIZATION_C: f64 = 1.0;
const DEFAULT_TOLERANCE: f64 = 1e-6;

/// 推定器が確率を直接出せるかどうか。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    SupportsProbability,
    ScoreOnly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EstimatorKind {
    LogisticRegression,
    LinearSvm,
}

impl EstimatorKind {
    #[must_use]
    pub fn capability(self) -> Capability {
        match self {
            Self::LogisticRegression => Capability::SupportsProbability,
            Self::LinearSvm => Capability::ScoreOnly,
        }
    }

    /// `logistic` / `linear_svm` を解釈する。
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_lowercase().as_str() {
            "logistic" | "logistic_regression" | "lr" => Some(Self::LogisticRegression),
            "linear_svm" | "svm" => Some(Self::LinearSvm),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClassifierConfig {
    pub estimator: EstimatorKind,
    /// 正則化の逆数（大きいほど弱い正則化）。
    pub c: f64,
    pub max_iter: usize,
    pub tolerance: f64,
    pub balanced_class_weight: bool,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            estimator: EstimatorKind::LogisticRegression,
            c: DEFAULT_REGULARIZATION_C,
            max_iter: DEFAULT_MAX_ITER,
            tolerance: DEFAULT_TOLERANCE,
            balanced_class_weight: true,
        }
    }
}

/// スコアのみの推定器向けのロジスティック変換 `1 / (1 + e^-score)`。
#[must_use]
pub fn logistic_squash(score: f64) -> f64 {
    1.0 / (1.0 + (-score).exp())
}

/// オーバーフローしないシグモイド。
fn sigmoid(z: f64) -> f64 {
    if z >= 0.0 {
        1.0 / (1.0 + (-z).exp())
    } else {
        let exp_z = z.exp();
        exp_z / (1.0 + exp_z)
    }
}

/// 学習済みパラメータ。`positive_label` の確率を返す。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelParameters {
    estimator: EstimatorKind,
    positive_label: Label,
    weights: Vec<f64>,
    bias: f64,
}

impl ModelParameters {
    #[must_use]
    pub fn estimator(&self) -> EstimatorKind {
        self.estimator
    }

    #[must_use]
    pub fn capability(&self) -> Capability {
        self.estimator.capability()
    }

    #[must_use]
    pub fn positive_label(&self) -> Label {
        self.positive_label
    }

    #[must_use]
    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    #[must_use]
    pub fn bias(&self) -> f64 {
        self.bias
    }

    #[must_use]
    pub fn dim(&self) -> usize {
        self.weights.len()
    }

    /// `w·x + b`
    ///
    /// # Errors
    /// ベクトルの次元が重みと一致しない場合は [`ClassificationError::DimensionMismatch`]。
    pub fn decision_score(&self, vector: &FeatureVector) -> Result<f64> {
        if vector.dim() != self.weights.len() {
            return Err(ClassificationError::DimensionMismatch {
                expected: self.weights.len(),
                got: vector.dim(),
            });
        }
        Ok(vector.dot_dense(&self.weights) + self.bias)
    }

    /// FAKE である確率。スコアのみの推定器は [`logistic_squash`] で確率化する。
    ///
    /// # Errors
    /// 次元不一致の場合はエラーを返す。
    pub fn predict_proba(&self, vector: &FeatureVector) -> Result<f64> {
        let score = self.decision_score(vector)?;
        Ok(match self.capability() {
            Capability::SupportsProbability => sigmoid(score),
            Capability::ScoreOnly => logistic_squash(score),
        })
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.positive_label != Label::Fake {
            return Err(ClassificationError::ArtifactMismatch(format!(
                "model positive label must be FAKE, found {}",
                self.positive_label
            )));
        }
        if self.weights.iter().any(|w| !w.is_finite()) || !self.bias.is_finite() {
            return Err(ClassificationError::ArtifactMismatch(
                "model contains non-finite weights".to_string(),
            ));
        }
        Ok(())
    }
}

/// 線形分類器の学習器。
#[derive(Debug, Clone, Default)]
pub struct LinearClassifier {
    config: ClassifierConfig,
}

impl LinearClassifier {
    #[must_use]
    pub fn new(config: ClassifierConfig) -> Self {
        Self { config }
    }

    /// 正則化付き損失を最小化してパラメータを得る。
    ///
    /// # Errors
    /// 件数・次元の不一致、もしくはラベルが1種類しかない場合はエラーを返す。
    pub fn fit(&self, vectors: &[FeatureVector], labels: &[Label]) -> Result<ModelParameters> {
        if vectors.len() != labels.len() {
            return Err(ClassificationError::DimensionMismatch {
                expected: vectors.len(),
                got: labels.len(),
            });
        }
        let fake_count = labels.iter().filter(|label| **label == Label::Fake).count();
        let real_count = labels.len() - fake_count;
        let distinct = usize::from(fake_count > 0) + usize::from(real_count > 0);
        if distinct < 2 {
            return Err(ClassificationError::LabelCardinality { found: distinct });
        }

        let dim = vectors[0].dim();
        if let Some(bad) = vectors.iter().find(|v| v.dim() != dim) {
            return Err(ClassificationError::DimensionMismatch {
                expected: dim,
                got: bad.dim(),
            });
        }

        let targets: Vec<f64> = labels
            .iter()
            .map(|label| if *label == Label::Fake { 1.0 } else { -1.0 })
            .collect();
        let sample_weights = self.sample_weights(labels, fake_count, real_count);

        let (weights, bias, iterations, loss) = match self.config.estimator {
            EstimatorKind::LogisticRegression => {
                self.fit_logistic(vectors, &targets, &sample_weights, dim)
            }
            EstimatorKind::LinearSvm => self.fit_svm(vectors, &targets, &sample_weights, dim),
        };

        tracing::info!(
            estimator = ?self.config.estimator,
            samples = vectors.len(),
            features = dim,
            iterations,
            loss,
            "linear classifier fitted"
        );

        Ok(ModelParameters {
            estimator: self.config.estimator,
            positive_label: Label::Fake,
            weights: weights.to_vec(),
            bias,
        })
    }

    fn sample_weights(&self, labels: &[Label], fake_count: usize, real_count: usize) -> Vec<f64> {
        if !self.config.balanced_class_weight {
            return vec![1.0; labels.len()];
        }
        // n_samples / (n_classes * count_c)
        #[allow(clippy::cast_precision_loss)]
        let n = labels.len() as f64;
        #[allow(clippy::cast_precision_loss)]
        let fake_weight = n / (2.0 * fake_count as f64);
        #[allow(clippy::cast_precision_loss)]
        let real_weight = n / (2.0 * real_count as f64);
        labels
            .iter()
            .map(|label| match label {
                Label::Fake => fake_weight,
                Label::Real => real_weight,
            })
            .collect()
    }

    /// `(1/N)(½‖w‖² + C Σ sᵢ log(1 + e^{-yᵢ(w·xᵢ+b)}))` を勾配降下で最小化する。
    fn fit_logistic(
        &self,
        vectors: &[FeatureVector],
        targets: &[f64],
        sample_weights: &[f64],
        dim: usize,
    ) -> (Array1<f64>, f64, usize, f64) {
        #[allow(clippy::cast_precision_loss)]
        let n = vectors.len() as f64;
        let c = self.config.c;

        // 平滑性の上界: C Σ sᵢ (‖xᵢ‖² + 1) / (4N) + 1/N
        let curvature: f64 = vectors
            .iter()
            .zip(sample_weights)
            .map(|(x, s)| s * (x.squared_norm() + 1.0))
            .sum();
        let lipschitz = c * curvature / (4.0 * n) + 1.0 / n;
        let step = 1.0 / lipschitz;

        let mut weights = Array1::<f64>::zeros(dim);
        let mut bias = 0.0;
        let mut iterations = 0;

        for iter in 0..self.config.max_iter {
            iterations = iter + 1;
            let mut grad_w = &weights / n;
            let mut grad_b = 0.0;
            for ((x, y), s) in vectors.iter().zip(targets).zip(sample_weights) {
                let margin = y * (x.dot_dense(weights.as_slice().unwrap_or(&[])) + bias);
                // d/dm log(1 + e^{-m}) = -σ(-m)
                let coef = -c * s * y * sigmoid(-margin) / n;
                for (idx, value) in x.iter() {
                    grad_w[idx] += coef * value;
                }
                grad_b += coef;
            }

            let grad_norm = (grad_w.dot(&grad_w) + grad_b * grad_b).sqrt();
            weights.scaled_add(-step, &grad_w);
            bias -= step * grad_b;
            if grad_norm < self.config.tolerance {
                break;
            }
        }

        let loss = logistic_objective(vectors, targets, sample_weights, &weights, bias, c);
        (weights, bias, iterations, loss)
    }

    /// `½‖w‖² + C Σ sᵢ max(0, 1 - yᵢ(w·xᵢ+b))` を減衰ステップの劣勾配法で最小化する。
    fn fit_svm(
        &self,
        vectors: &[FeatureVector],
        targets: &[f64],
        sample_weights: &[f64],
        dim: usize,
    ) -> (Array1<f64>, f64, usize, f64) {
        #[allow(clippy::cast_precision_loss)]
        let n = vectors.len() as f64;
        let c = self.config.c;

        let mut weights = Array1::<f64>::zeros(dim);
        let mut bias = 0.0;
        let mut best = (weights.clone(), bias, f64::INFINITY);
        let mut iterations = 0;

        for iter in 0..self.config.max_iter {
            iterations = iter + 1;
            let mut grad_w = &weights / n;
            let mut grad_b = 0.0;
            for ((x, y), s) in vectors.iter().zip(targets).zip(sample_weights) {
                let margin = y * (x.dot_dense(weights.as_slice().unwrap_or(&[])) + bias);
                if margin < 1.0 {
                    let coef = -c * s * y / n;
                    for (idx, value) in x.iter() {
                        grad_w[idx] += coef * value;
                    }
                    grad_b += coef;
                }
            }

            #[allow(clippy::cast_precision_loss)]
            let step = 1.0 / (1.0 + iter as f64).sqrt();
            weights.scaled_add(-step, &grad_w);
            bias -= step * grad_b;

            let objective = hinge_objective(vectors, targets, sample_weights, &weights, bias, c);
            if objective < best.2 {
                best = (weights.clone(), bias, objective);
            }
            let grad_norm = (grad_w.dot(&grad_w) + grad_b * grad_b).sqrt();
            if grad_norm < self.config.tolerance {
                break;
            }
        }

        let (weights, bias, loss) = best;
        (weights, bias, iterations, loss)
    }
}

fn logistic_objective(
    vectors: &[FeatureVector],
    targets: &[f64],
    sample_weights: &[f64],
    weights: &Array1<f64>,
    bias: f64,
    c: f64,
) -> f64 {
    let data_loss: f64 = vectors
        .iter()
        .zip(targets)
        .zip(sample_weights)
        .map(|((x, y), s)| {
            let margin = y * (x.dot_dense(weights.as_slice().unwrap_or(&[])) + bias);
            // log(1 + e^{-m}) の安定形
            s * (if margin > 0.0 {
                (-margin).exp().ln_1p()
            } else {
                -margin + margin.exp().ln_1p()
            })
        })
        .sum();
    0.5 * weights.dot(weights) + c * data_loss
}

fn hinge_objective(
    vectors: &[FeatureVector],
    targets: &[f64],
    sample_weights: &[f64],
    weights: &Array1<f64>,
    bias: f64,
    c: f64,
) -> f64 {
    let data_loss: f64 = vectors
        .iter()
        .zip(targets)
        .zip(sample_weights)
        .map(|((x, y), s)| {
            let margin = y * (x.dot_dense(weights.as_slice().unwrap_or(&[])) + bias);
            s * (1.0 - margin).max(0.0)
        })
        .sum();
    0.5 * weights.dot(weights) + c * data_loss
}
