//! JSON error responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde::Serialize;

use crate::gateway::GatewayError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ApiErrorCode {
    InvalidInput,
    NotConfigured,
    TranslationFailed,
}

impl ApiErrorCode {
    fn status(self) -> StatusCode {
        match self {
            ApiErrorCode::InvalidInput => StatusCode::BAD_REQUEST,
            ApiErrorCode::NotConfigured | ApiErrorCode::TranslationFailed => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ApiError {
    pub code: ApiErrorCode,
    pub message: String,
    /// Best-effort result attached to failures past input validation, so
    /// callers are never left without one string per input.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub translations: Option<Vec<String>>,
}

impl ApiError {
    pub fn new(code: ApiErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            translations: None,
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(ApiErrorCode::InvalidInput, message)
    }

    /// Generic failure carrying the untranslated inputs as the result.
    pub fn translation_failed(texts: Vec<String>) -> Self {
        Self {
            translations: Some(texts),
            ..Self::new(ApiErrorCode::TranslationFailed, "Translation failed")
        }
    }
}

impl From<GatewayError> for ApiError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::EmptyBatch | GatewayError::InvalidLanguage(_) => {
                Self::bad_request(err.to_string())
            }
            GatewayError::NotConfigured => Self::new(ApiErrorCode::NotConfigured, err.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.code.status(), Json(self)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn gateway_errors_map_to_codes() {
        assert_eq!(ApiError::from(GatewayError::EmptyBatch).code, ApiErrorCode::InvalidInput);
        assert_eq!(
            ApiError::from(GatewayError::InvalidLanguage("x:y".into())).code,
            ApiErrorCode::InvalidInput
        );
        assert_eq!(
            ApiError::from(GatewayError::NotConfigured).code,
            ApiErrorCode::NotConfigured
        );
    }

    #[test]
    fn failure_body_carries_translations() {
        let err = ApiError::translation_failed(vec!["a".into()]);
        let body = serde_json::to_value(&err).unwrap();
        assert_eq!(body["code"], json!("TRANSLATION_FAILED"));
        assert_eq!(body["translations"], json!(["a"]));

        let plain = serde_json::to_value(ApiError::bad_request("nope")).unwrap();
        assert!(plain.get("translations").is_none());
    }

    #[test]
    fn status_codes() {
        assert_eq!(ApiErrorCode::InvalidInput.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            ApiErrorCode::NotConfigured.status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
