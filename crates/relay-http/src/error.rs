use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Errors surfaced by the HTTP front door.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Bot not ready")]
    NotReady,

    #[error("Unauthorized")]
    Unauthorized,

    #[error("No data provided")]
    NoData,

    #[error("invalid JSON body: {0}")]
    InvalidJson(String),

    #[error("Processing timeout")]
    Timeout,

    #[error("EarthMC monitoring is disabled")]
    MonitorDisabled,

    #[error("EarthMC monitor is not running")]
    MonitorNotRunning,

    #[error("{0}")]
    Internal(String),
}

impl From<relay_core::Error> for ApiError {
    fn from(e: relay_core::Error) -> Self {
        ApiError::Internal(e.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let message = self.to_string();
        let (status, body) = match &self {
            ApiError::NotReady => (
                StatusCode::SERVICE_UNAVAILABLE,
                json!({ "error": message, "status": "starting" }),
            ),
            ApiError::Timeout => (
                StatusCode::GATEWAY_TIMEOUT,
                json!({ "error": message, "status": "timeout" }),
            ),
            ApiError::Unauthorized => (StatusCode::UNAUTHORIZED, json!({ "error": message })),
            ApiError::NoData | ApiError::InvalidJson(_) | ApiError::MonitorDisabled => {
                (StatusCode::BAD_REQUEST, json!({ "error": message }))
            }
            ApiError::MonitorNotRunning => {
                (StatusCode::SERVICE_UNAVAILABLE, json!({ "error": message }))
            }
            ApiError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, json!({ "error": message })),
        };
        (status, Json(body)).into_response()
    }
}
