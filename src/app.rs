use std::sync::Arc;

use anyhow::Result;
use axum::Router;
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use crate::{
    api,
    classification::{ClassificationError, PredictionService},
    config::Config,
    observability::{Telemetry, TracingSettings},
};

/// 学習済み成果物。未学習の間は `None`。
pub(crate) type SharedPredictor = Arc<RwLock<Option<PredictionService>>>;

#[derive(Clone)]
pub(crate) struct AppState {
    registry: Arc<ComponentRegistry>,
}

pub struct ComponentRegistry {
    config: Arc<Config>,
    telemetry: Telemetry,
    predictor: SharedPredictor,
    retrain_guard: Arc<Mutex<()>>,
}

impl AppState {
    pub(crate) fn new(registry: ComponentRegistry) -> Self {
        Self {
            registry: Arc::new(registry),
        }
    }

    pub(crate) fn telemetry(&self) -> &Telemetry {
        &self.registry.telemetry
    }

    pub(crate) fn config(&self) -> &Config {
        &self.registry.config
    }

    pub(crate) fn predictor(&self) -> &SharedPredictor {
        &self.registry.predictor
    }

    /// 再学習の排他用。`try_lock_owned` で取れなければ実行中。
    pub(crate) fn retrain_guard(&self) -> Arc<Mutex<()>> {
        Arc::clone(&self.registry.retrain_guard)
    }

    /// 再学習後に推論器を読み直す。既に読み込み済みなら `reload` する。
    pub(crate) async fn refresh_predictor(&self) -> Result<Uuid, ClassificationError> {
        let mut slot = self.predictor().write().await;
        if let Some(service) = slot.as_mut() {
            service.reload()?;
            return Ok(service.version());
        }
        let service = PredictionService::load(self.config().model_dir())?;
        let version = service.version();
        *slot = Some(service);
        self.telemetry().metrics().set_model_loaded(true);
        Ok(version)
    }
}

impl ComponentRegistry {
    /// 構成情報と依存をまとめて初期化し、アプリケーションの共有レジストリを構築する。
    ///
    /// 成果物が無い場合でも起動は続け、推論は再学習まで 503 を返す。
    ///
    /// # Errors
    /// Telemetry の初期化に失敗した場合はエラーを返す。
    pub fn build(config: Config) -> Result<Self> {
        let telemetry = Telemetry::new(&TracingSettings::from_config(&config))?;
        let config = Arc::new(config);

        let predictor = match PredictionService::load(config.model_dir()) {
            Ok(service) => Some(service),
            Err(error @ ClassificationError::ArtifactsNotFound { .. }) => {
                tracing::warn!(%error, "starting without a trained model");
                None
            }
            Err(error) => {
                tracing::error!(%error, "failed to load model artifacts");
                None
            }
        };
        telemetry.metrics().set_model_loaded(predictor.is_some());

        Ok(Self {
            config,
            telemetry,
            predictor: Arc::new(RwLock::new(predictor)),
            retrain_guard: Arc::new(Mutex::new(())),
        })
    }

    #[must_use]
    pub fn config(&self) -> Arc<Config> {
        Arc::clone(&self.config)
    }

    /// 再学習の排他ロック。保持している間 `/admin/retrain` は 409 を返す。
    #[must_use]
    pub fn retrain_guard(&self) -> Arc<Mutex<()>> {
        Arc::clone(&self.retrain_guard)
    }

    /// 起動時点で推論器が読み込めているか。
    pub async fn model_loaded(&self) -> bool {
        self.predictor.read().await.is_some()
    }
}

pub fn build_router(registry: ComponentRegistry) -> Router {
    let state = AppState::new(registry);
    api::router(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classification::{TrainingPipeline, dataset::sample_dataset};
    use tempfile::TempDir;

    fn config_for(dir: &std::path::Path) -> Config {
        temp_env::with_vars(
            [
                ("FAKE_NEWS_MODEL_DIR", Some(dir.as_os_str())),
                ("OTEL_EXPORTER_OTLP_ENDPOINT", None),
            ],
            Config::from_env,
        )
        .expect("config loads")
    }

    #[tokio::test]
    async fn component_registry_builds_without_artifacts() {
        let dir = TempDir::new().expect("tempdir");
        let registry = ComponentRegistry::build(config_for(dir.path())).expect("registry builds");
        assert!(!registry.model_loaded().await);
    }

    #[tokio::test]
    async fn refresh_loads_then_reloads() {
        let dir = TempDir::new().expect("tempdir");
        let registry = ComponentRegistry::build(config_for(dir.path())).expect("registry builds");
        let state = AppState::new(registry);

        let first = TrainingPipeline::default()
            .train(&sample_dataset(), dir.path())
            .expect("train");
        assert_eq!(state.refresh_predictor().await.expect("load"), first.version);

        let second = TrainingPipeline::default()
            .train(&sample_dataset(), dir.path())
            .expect("retrain");
        assert_eq!(state.refresh_predictor().await.expect("reload"), second.version);
        assert_ne!(first.version, second.version);
    }
}
