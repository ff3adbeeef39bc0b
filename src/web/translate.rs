//! `POST /api/translate`

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::response::Json;
use serde::{Deserialize, Serialize};
use tracing::error;

use crate::state::AppState;
use crate::web::error::ApiError;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranslateRequest {
    pub texts: Vec<String>,
    #[serde(default)]
    pub target_language: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct TranslateResponse {
    pub translations: Vec<String>,
}

pub(super) async fn translate(
    State(state): State<AppState>,
    payload: Result<Json<TranslateRequest>, JsonRejection>,
) -> Result<Json<TranslateResponse>, ApiError> {
    let Json(request) = payload.map_err(|rejection| ApiError::bad_request(rejection.body_text()))?;

    if request.texts.is_empty() {
        return Err(ApiError::bad_request("texts must be a non-empty list"));
    }

    let target_language = request
        .target_language
        .map(|lang| lang.trim().to_string())
        .filter(|lang| !lang.is_empty())
        .unwrap_or_else(|| state.default_target_language.to_string());

    // Run detached so a client disconnect cannot abort retries mid-batch, and a
    // panic inside the gateway still yields a full-length answer.
    let gateway = state.gateway.clone();
    let texts = request.texts.clone();
    let result =
        tokio::spawn(async move { gateway.translate_batch(&texts, &target_language).await }).await;

    match result {
        Ok(Ok(translations)) => Ok(Json(TranslateResponse { translations })),
        Ok(Err(e)) => Err(e.into()),
        Err(e) => {
            error!(error = %e, "Translation task failed");
            Err(ApiError::translation_failed(request.texts))
        }
    }
}
