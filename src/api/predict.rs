use std::time::Instant;

use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use serde::{Deserialize, Serialize};
use tracing::error;
use uuid::Uuid;

use crate::{
    api::ErrorResponse,
    app::AppState,
    classification::{
        ClassificationError, FeatureContribution, Label, summary::lead_summary,
    },
};

#[derive(Debug, Deserialize)]
pub(crate) struct PredictRequest {
    text: String,
    #[serde(default)]
    explain_top_k: Option<usize>,
}

#[derive(Debug, Serialize)]
struct PredictResponse {
    label: Label,
    probability_fake: f64,
    confidence: f64,
    summary: String,
    explanation: Vec<FeatureContribution>,
    model_version: Uuid,
}

pub(crate) async fn predict(
    State(state): State<AppState>,
    Json(payload): Json<PredictRequest>,
) -> impl IntoResponse {
    if payload.text.trim().is_empty() {
        let body = Json(ErrorResponse {
            error: "text must not be empty".into(),
        });
        return (StatusCode::BAD_REQUEST, body).into_response();
    }

    let guard = state.predictor().read().await;
    let Some(service) = guard.as_ref() else {
        let missing = ClassificationError::ArtifactsNotFound {
            dir: state.config().model_dir().to_path_buf(),
        };
        let body = Json(ErrorResponse {
            error: missing.to_string(),
        });
        return (StatusCode::SERVICE_UNAVAILABLE, body).into_response();
    };

    let started = Instant::now();
    let result = match service.predict(&payload.text) {
        Ok(result) => result,
        Err(prediction_error) => {
            error!(error = %prediction_error, "prediction failed");
            let body = Json(ErrorResponse {
                error: prediction_error.to_string(),
            });
            return (StatusCode::INTERNAL_SERVER_ERROR, body).into_response();
        }
    };
    state
        .telemetry()
        .metrics()
        .record_prediction(result.label, started.elapsed().as_secs_f64());

    let top_k = payload
        .explain_top_k
        .unwrap_or_else(|| state.config().explain_top_k());
    let body = Json(PredictResponse {
        label: result.label,
        probability_fake: result.probability_fake,
        confidence: result.confidence,
        summary: lead_summary(&payload.text),
        explanation: service.explain(&payload.text, top_k),
        model_version: service.version(),
    });
    (StatusCode::OK, body).into_response()
}
