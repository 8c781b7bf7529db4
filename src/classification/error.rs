//! 分類パイプラインのエラー型。
use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClassificationError {
    /// 予測時にモデル成果物が揃っていない。
    #[error(
        "model or vectorizer not found in {}; please train the model first",
        dir.display()
    )]
    ArtifactsNotFound { dir: PathBuf },
    #[error("corpus is empty or no terms survived vocabulary pruning")]
    EmptyCorpus,
    #[error("training requires both REAL and FAKE labels, found {found} distinct label(s)")]
    LabelCardinality { found: usize },
    #[error("dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },
    #[error("invalid label {value:?} at row {row}; expected REAL or FAKE")]
    InvalidLabel { row: usize, value: String },
    #[error("dataset is missing required column: {0}")]
    MissingColumn(&'static str),
    #[error("invalid train/test split: {0}")]
    InvalidSplit(String),
    /// 2つの成果物が同じ学習ランで作られていない。
    #[error("artifact pair is incompatible: {0}")]
    ArtifactMismatch(String),
    #[error("artifact I/O failed for {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to read dataset: {0}")]
    Csv(#[from] csv::Error),
    #[error("failed to (de)serialize artifact {}: {source}", path.display())]
    Serialization {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl ClassificationError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// 学習データ起因のエラーかどうか（HTTP 422 相当）。
    #[must_use]
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            Self::EmptyCorpus
                | Self::LabelCardinality { .. }
                | Self::DimensionMismatch { .. }
                | Self::InvalidLabel { .. }
                | Self::MissingColumn(_)
                | Self::InvalidSplit(_)
                | Self::Csv(_)
        )
    }
}

pub type Result<T, E = ClassificationError> = std::result::Result<T, E>;
