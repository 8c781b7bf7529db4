use std::time::Instant;

use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use tokio::task::JoinError;
use tracing::{error, info, warn};

use crate::{
    api::ErrorResponse,
    app::AppState,
    classification::{ClassificationError, TrainingReport, train_from_csv},
};

#[derive(Debug, Serialize)]
struct RetrainResponse {
    status: &'static str,
    accuracy: f64,
    #[serde(flatten)]
    report: TrainingReport,
}

#[derive(Debug)]
enum RetrainFailure {
    Training(ClassificationError),
    Aborted(JoinError),
    Reload(ClassificationError),
}

impl IntoResponse for RetrainFailure {
    fn into_response(self) -> Response {
        match self {
            Self::Training(training_error) => error_response(
                StatusCode::UNPROCESSABLE_ENTITY,
                training_error.to_string(),
            ),
            Self::Aborted(_) => {
                error_response(StatusCode::INTERNAL_SERVER_ERROR, "retrain task aborted")
            }
            Self::Reload(load_error) => {
                error_response(StatusCode::INTERNAL_SERVER_ERROR, load_error.to_string())
            }
        }
    }
}

/// 既定のデータセットで再学習し、推論器を差し替える。実行中の再学習があれば 409。
///
/// 学習と読み直しは別タスクで走り、排他ロックもそのタスクが持つ。
/// クライアントが切断しても、完了までは次の再学習を受け付けない。
pub(crate) async fn retrain(State(state): State<AppState>) -> Response {
    let Ok(running) = state.retrain_guard().try_lock_owned() else {
        warn!("retrain rejected: another retrain is in progress");
        return error_response(StatusCode::CONFLICT, "retrain already in progress");
    };
    state.telemetry().record_retrain_invocation();
    state.telemetry().metrics().retrain_total.inc();

    let task_state = state.clone();
    let task = tokio::spawn(async move {
        let _running = running;
        run_retrain(task_state).await
    });

    match task.await {
        Ok(Ok(report)) => {
            let body = RetrainResponse {
                status: "trained",
                accuracy: report.accuracy(),
                report,
            };
            (StatusCode::OK, Json(body)).into_response()
        }
        Ok(Err(failure)) => failure.into_response(),
        Err(join_error) => {
            error!(error = %join_error, "retrain task panicked");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "retrain task aborted")
        }
    }
}

async fn run_retrain(state: AppState) -> Result<TrainingReport, RetrainFailure> {
    let metrics = state.telemetry().metrics();
    let dataset_path = state.config().dataset_path().to_path_buf();
    let model_dir = state.config().model_dir().to_path_buf();
    let training = state.config().training_config();

    let started = Instant::now();
    let outcome = tokio::task::spawn_blocking(move || {
        train_from_csv(&dataset_path, &model_dir, &training)
    })
    .await;
    metrics
        .training_duration
        .observe(started.elapsed().as_secs_f64());

    let report = match outcome {
        Ok(Ok(report)) => report,
        Ok(Err(training_error)) => {
            metrics.retrain_failed.inc();
            warn!(error = %training_error, "retrain failed");
            return Err(RetrainFailure::Training(training_error));
        }
        Err(join_error) => {
            metrics.retrain_failed.inc();
            error!(error = %join_error, "retrain task panicked");
            return Err(RetrainFailure::Aborted(join_error));
        }
    };

    if let Err(load_error) = state.refresh_predictor().await {
        metrics.retrain_failed.inc();
        error!(error = %load_error, "failed to load freshly trained artifacts");
        return Err(RetrainFailure::Reload(load_error));
    }

    info!(version = %report.version, accuracy = report.accuracy(), "retrain completed");
    Ok(report)
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::time::Duration;

    use axum::{
        Router,
        body::Body,
        http::{Request, StatusCode},
    };
    use tempfile::TempDir;
    use tower::ServiceExt;

    use crate::{
        api,
        app::{AppState, ComponentRegistry},
        classification::dataset::SAMPLE_CSV,
        config::Config,
    };

    fn state_for(dir: &std::path::Path) -> AppState {
        let dataset = dir.join("train.csv");
        fs::write(&dataset, SAMPLE_CSV).expect("write dataset");
        let model_dir = dir.join("models");
        let config = temp_env::with_vars(
            [
                ("FAKE_NEWS_MODEL_DIR", Some(model_dir.as_os_str())),
                ("FAKE_NEWS_DATASET_PATH", Some(dataset.as_os_str())),
                ("OTEL_EXPORTER_OTLP_ENDPOINT", None),
            ],
            Config::from_env,
        )
        .expect("config loads");
        AppState::new(ComponentRegistry::build(config).expect("registry builds"))
    }

    fn retrain_request() -> Request<Body> {
        Request::post("/admin/retrain")
            .body(Body::empty())
            .expect("request builds")
    }

    async fn status_of(router: &Router) -> StatusCode {
        router
            .clone()
            .oneshot(retrain_request())
            .await
            .expect("request succeeds")
            .status()
    }

    #[tokio::test]
    async fn dropped_request_keeps_retrain_exclusive_until_reload_finishes() {
        let dir = TempDir::new().expect("tempdir");
        let state = state_for(dir.path());
        let router = api::router(state.clone());

        // 読み直しを止めておき、学習タスクが完了できない状態にする
        let slot = state.predictor().write().await;

        let first = tokio::time::timeout(
            Duration::from_millis(50),
            router.clone().oneshot(retrain_request()),
        )
        .await;
        assert!(first.is_err(), "first retrain should still be running");

        assert_eq!(status_of(&router).await, StatusCode::CONFLICT);

        drop(slot);
        let _finished = state.retrain_guard().lock_owned().await;
        assert!(state.predictor().read().await.is_some());
    }
}
