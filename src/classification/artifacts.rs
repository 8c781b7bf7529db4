//! ベクトライザとモデルの成果物ペアの保存・読み込み。
//!
//! 2ファイルは同じ学習ランの `version` を持ち、読み込み時に対応を検証する。
//! 書き込みは「両方成功」か「どちらも変更なし」のどちらかになる。
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde::de::DeserializeOwned;
use tempfile::NamedTempFile;
use uuid::Uuid;

use super::error::{ClassificationError, Result};
use super::features::Vocabulary;
use super::model::ModelParameters;

pub const VECTORIZER_FILE: &str = "vectorizer.json";
pub const MODEL_FILE: &str = "model.json";
const BACKUP_SUFFIX: &str = "prev";

/// 成果物ヘッダ。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactManifest {
    pub version: Uuid,
    pub created_at: DateTime<Utc>,
    pub vocabulary_fingerprint: u64,
}

impl ArtifactManifest {
    #[must_use]
    pub fn new(vocabulary: &Vocabulary) -> Self {
        Self {
            version: Uuid::now_v7(),
            created_at: Utc::now(),
            vocabulary_fingerprint: vocabulary.fingerprint(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct VectorizerArtifact {
    manifest: ArtifactManifest,
    vocabulary: Vocabulary,
}

#[derive(Debug, Serialize, Deserialize)]
struct ModelArtifact {
    manifest: ArtifactManifest,
    parameters: ModelParameters,
}

/// 読み込み済みの成果物ペア。
#[derive(Debug, Clone)]
pub struct LoadedArtifacts {
    pub manifest: ArtifactManifest,
    pub vocabulary: Vocabulary,
    pub parameters: ModelParameters,
}

/// 成果物ディレクトリ。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactStore {
    dir: PathBuf,
}

impl ArtifactStore {
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    #[must_use]
    pub fn vectorizer_path(&self) -> PathBuf {
        self.dir.join(VECTORIZER_FILE)
    }

    #[must_use]
    pub fn model_path(&self) -> PathBuf {
        self.dir.join(MODEL_FILE)
    }

    /// 両方のファイルが存在するか。
    #[must_use]
    pub fn exists(&self) -> bool {
        self.vectorizer_path().is_file() && self.model_path().is_file()
    }

    /// 成果物ペアを読み込み、互換性を検証する。
    ///
    /// # Errors
    /// どちらかが無ければ [`ClassificationError::ArtifactsNotFound`]、
    /// バージョン・語彙・次元が食い違えば [`ClassificationError::ArtifactMismatch`]。
    pub fn load(&self) -> Result<LoadedArtifacts> {
        if !self.exists() {
            return Err(ClassificationError::ArtifactsNotFound {
                dir: self.dir.clone(),
            });
        }
        let vectorizer: VectorizerArtifact = read_json(&self.vectorizer_path())?;
        let model: ModelArtifact = read_json(&self.model_path())?;

        let vocabulary = vectorizer.vocabulary;
        vocabulary.validate()?;
        model.parameters.validate()?;

        if vectorizer.manifest.version != model.manifest.version {
            return Err(ClassificationError::ArtifactMismatch(format!(
                "vectorizer version {} does not match model version {}",
                vectorizer.manifest.version, model.manifest.version
            )));
        }
        if vectorizer.manifest.vocabulary_fingerprint != vocabulary.fingerprint()
            || model.manifest.vocabulary_fingerprint != vocabulary.fingerprint()
        {
            return Err(ClassificationError::ArtifactMismatch(
                "vocabulary fingerprint does not match".to_string(),
            ));
        }
        if model.parameters.dim() != vocabulary.len() {
            return Err(ClassificationError::ArtifactMismatch(format!(
                "model has {} weights but vocabulary has {} terms",
                model.parameters.dim(),
                vocabulary.len()
            )));
        }

        Ok(LoadedArtifacts {
            manifest: model.manifest,
            vocabulary,
            parameters: model.parameters,
        })
    }

    /// 成果物ペアを保存する。
    ///
    /// 両方を一時ファイルへ書き出してから、既存ペアを `*.prev` に退避し、
    /// 一時ファイルを所定の名前へ移動する。途中で失敗した場合は退避を戻す。
    ///
    /// # Errors
    /// ディレクトリ作成・書き込み・リネームに失敗した場合。
    pub fn save(
        &self,
        manifest: &ArtifactManifest,
        vocabulary: &Vocabulary,
        parameters: &ModelParameters,
    ) -> Result<()> {
        self.save_with(manifest, vocabulary, parameters, persist_file)
    }

    /// `persist` で一時ファイルを所定の場所へ移す。2つ目で失敗した場合も含め、
    /// エラー時はディレクトリを保存前の状態に戻す。
    fn save_with(
        &self,
        manifest: &ArtifactManifest,
        vocabulary: &Vocabulary,
        parameters: &ModelParameters,
        persist: impl Fn(NamedTempFile, &Path) -> std::io::Result<()>,
    ) -> Result<()> {
        fs::create_dir_all(&self.dir).map_err(|source| ClassificationError::io(&self.dir, source))?;

        let staged_vectorizer = self.stage(
            &self.vectorizer_path(),
            &VectorizerArtifact {
                manifest: manifest.clone(),
                vocabulary: vocabulary.clone(),
            },
        )?;
        let staged_model = self.stage(
            &self.model_path(),
            &ModelArtifact {
                manifest: manifest.clone(),
                parameters: parameters.clone(),
            },
        )?;

        let targets = [self.vectorizer_path(), self.model_path()];
        let backups = self.backup_existing(&targets)?;

        let mut installed: Vec<&PathBuf> = Vec::new();
        for (staged, target) in [staged_vectorizer, staged_model].into_iter().zip(&targets) {
            if let Err(error) = persist(staged, target) {
                for path in installed {
                    if let Err(remove_error) = fs::remove_file(path) {
                        tracing::warn!(
                            path = %path.display(),
                            error = %remove_error,
                            "failed to remove partially installed artifact"
                        );
                    }
                }
                restore_backups(&backups);
                return Err(ClassificationError::io(target, error));
            }
            installed.push(target);
        }

        for (backup, _) in &backups {
            if let Err(error) = fs::remove_file(backup) {
                tracing::warn!(path = %backup.display(), %error, "failed to remove artifact backup");
            }
        }

        tracing::info!(
            dir = %self.dir.display(),
            version = %manifest.version,
            "model artifacts saved"
        );
        Ok(())
    }

    fn stage<T: Serialize>(&self, target: &Path, value: &T) -> Result<NamedTempFile> {
        let mut staged = NamedTempFile::new_in(&self.dir)
            .map_err(|source| ClassificationError::io(&self.dir, source))?;
        serde_json::to_writer(staged.as_file_mut(), value).map_err(|source| {
            ClassificationError::Serialization {
                path: target.to_path_buf(),
                source,
            }
        })?;
        staged
            .as_file_mut()
            .flush()
            .and_then(|()| staged.as_file().sync_all())
            .map_err(|source| ClassificationError::io(target, source))?;
        Ok(staged)
    }

    /// 既存ファイルを `*.prev` に移し、`(退避先, 元の場所)` を返す。
    fn backup_existing(&self, targets: &[PathBuf]) -> Result<Vec<(PathBuf, PathBuf)>> {
        let mut backups = Vec::new();
        for target in targets {
            if !target.exists() {
                continue;
            }
            let backup = target.with_extension(format!("json.{BACKUP_SUFFIX}"));
            if let Err(source) = fs::rename(target, &backup) {
                restore_backups(&backups);
                return Err(ClassificationError::io(target, source));
            }
            backups.push((backup, target.clone()));
        }
        Ok(backups)
    }
}

fn persist_file(staged: NamedTempFile, target: &Path) -> std::io::Result<()> {
    staged.persist(target).map(drop).map_err(|error| error.error)
}

fn restore_backups(backups: &[(PathBuf, PathBuf)]) {
    for (backup, original) in backups {
        if let Err(error) = fs::rename(backup, original) {
            tracing::error!(
                backup = %backup.display(),
                original = %original.display(),
                %error,
                "failed to restore artifact backup"
            );
        }
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let raw = fs::read(path).map_err(|source| ClassificationError::io(path, source))?;
    serde_json::from_slice(&raw).map_err(|source| ClassificationError::Serialization {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classification::{
        Label, LinearClassifier, TfidfVectorizer, VectorizerConfig,
    };
    use tempfile::TempDir;

    fn trained() -> (Vocabulary, ModelParameters) {
        let corpus = ["isro satellite orbit", "taj mahal mall hoax"];
        let vocabulary = TfidfVectorizer::new(VectorizerConfig {
            max_df: 1.0,
            ..VectorizerConfig::default()
        })
        .fit(&corpus)
        .expect("fit");
        let parameters = LinearClassifier::default()
            .fit(&vocabulary.transform(&corpus), &[Label::Real, Label::Fake])
            .expect("fit");
        (vocabulary, parameters)
    }

    #[test]
    fn load_without_files_is_not_found() {
        let dir = TempDir::new().expect("tempdir");
        let err = ArtifactStore::new(dir.path()).load().expect_err("missing");
        assert!(matches!(err, ClassificationError::ArtifactsNotFound { .. }));
    }

    #[test]
    fn save_then_load_round_trips_and_creates_directories() {
        let dir = TempDir::new().expect("tempdir");
        let store = ArtifactStore::new(dir.path().join("nested").join("models"));
        let (vocabulary, parameters) = trained();
        let manifest = ArtifactManifest::new(&vocabulary);

        store.save(&manifest, &vocabulary, &parameters).expect("save");
        let loaded = store.load().expect("load");

        assert_eq!(loaded.manifest, manifest);
        assert_eq!(loaded.vocabulary.terms(), vocabulary.terms());
        assert_eq!(loaded.parameters, parameters);
        assert!(!store.vectorizer_path().with_extension("json.prev").exists());
    }

    #[test]
    fn only_one_file_present_is_not_found() {
        let dir = TempDir::new().expect("tempdir");
        let store = ArtifactStore::new(dir.path());
        let (vocabulary, parameters) = trained();
        store
            .save(&ArtifactManifest::new(&vocabulary), &vocabulary, &parameters)
            .expect("save");
        fs::remove_file(store.model_path()).expect("remove model");

        assert!(matches!(
            store.load(),
            Err(ClassificationError::ArtifactsNotFound { .. })
        ));
    }

    #[test]
    fn mismatched_versions_are_rejected() {
        let first = TempDir::new().expect("tempdir");
        let second = TempDir::new().expect("tempdir");
        let (vocabulary, parameters) = trained();
        let store_a = ArtifactStore::new(first.path());
        let store_b = ArtifactStore::new(second.path());
        store_a
            .save(&ArtifactManifest::new(&vocabulary), &vocabulary, &parameters)
            .expect("save a");
        store_b
            .save(&ArtifactManifest::new(&vocabulary), &vocabulary, &parameters)
            .expect("save b");
        fs::copy(store_b.model_path(), store_a.model_path()).expect("swap model");

        assert!(matches!(
            store_a.load(),
            Err(ClassificationError::ArtifactMismatch(_))
        ));
    }

    #[test]
    fn failed_model_install_restores_previous_pair() {
        let dir = TempDir::new().expect("tempdir");
        let store = ArtifactStore::new(dir.path());
        let (vocabulary, parameters) = trained();
        let previous = ArtifactManifest::new(&vocabulary);
        store.save(&previous, &vocabulary, &parameters).expect("save previous");

        let model_path = store.model_path();
        let err = store
            .save_with(
                &ArtifactManifest::new(&vocabulary),
                &vocabulary,
                &parameters,
                |staged, target| {
                    if target == model_path.as_path() {
                        return Err(std::io::Error::new(
                            std::io::ErrorKind::PermissionDenied,
                            "read-only target",
                        ));
                    }
                    persist_file(staged, target)
                },
            )
            .expect_err("model install fails");
        assert!(matches!(err, ClassificationError::Io { .. }), "{err:?}");

        let loaded = store.load().expect("previous pair still loads");
        assert_eq!(loaded.manifest.version, previous.version);

        let mut entries: Vec<String> = fs::read_dir(dir.path())
            .expect("read dir")
            .map(|entry| entry.expect("entry").file_name().to_string_lossy().into_owned())
            .collect();
        entries.sort();
        assert_eq!(entries, [MODEL_FILE, VECTORIZER_FILE]);
    }
}
