//! REAL/FAKE ニュース分類のための高水準API。
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub mod artifacts;
pub mod dataset;
mod error;
pub mod features;
pub mod model;
pub mod predict;
pub mod split;
mod stopwords;
pub mod summary;
pub mod tokenizer;
pub mod training;

pub use artifacts::{ArtifactStore, MODEL_FILE, VECTORIZER_FILE};
pub use error::{ClassificationError, Result};
pub use features::{FeatureVector, TfidfVectorizer, VectorizerConfig, Vocabulary};
pub use model::{
    Capability, ClassifierConfig, EstimatorKind, LinearClassifier, ModelParameters,
    logistic_squash,
};
pub use predict::{
    DECISION_THRESHOLD, FeatureContribution, PredictionResult, PredictionService, confidence,
    decide, predict_news,
};
pub use training::{TrainingConfig, TrainingPipeline, TrainingReport, train_from_csv};

/// 記事のラベル。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Label {
    Real,
    Fake,
}

impl Label {
    pub const ALL: [Label; 2] = [Label::Real, Label::Fake];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Real => "REAL",
            Self::Fake => "FAKE",
        }
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Label {
    type Err = String;

    /// 前後の空白を除いて大文字化し、REAL/FAKE のみ受け付ける。
    fn from_str(raw: &str) -> std::result::Result<Self, Self::Err> {
        match raw.trim().to_uppercase().as_str() {
            "REAL" => Ok(Self::Real),
            "FAKE" => Ok(Self::Fake),
            _ => Err(raw.to_string()),
        }
    }
}

/// 学習データの1行。`text` はタイトルと本文を結合済み。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabeledExample {
    pub text: String,
    pub label: Label,
}

impl LabeledExample {
    #[must_use]
    pub fn new(text: impl Into<String>, label: Label) -> Self {
        Self {
            text: text.into(),
            label,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("REAL", Label::Real)]
    #[case(" fake ", Label::Fake)]
    #[case("Real", Label::Real)]
    fn label_parses_case_insensitively(#[case] raw: &str, #[case] expected: Label) {
        assert_eq!(raw.parse::<Label>(), Ok(expected));
    }

    #[test]
    fn label_rejects_unknown_values() {
        assert_eq!("satire".parse::<Label>(), Err("satire".to_string()));
        assert!("".parse::<Label>().is_err());
    }

    #[test]
    fn label_serializes_uppercase() {
        assert_eq!(
            serde_json::to_string(&Label::Fake).expect("serialize"),
            "\"FAKE\""
        );
    }
}
