//! `POST /relay` (and the legacy `POST /message`): hand one message to the dispatcher.

use axum::{body::Bytes, extract::State, http::HeaderMap, Json};
use relay_core::messaging::inbound::InboundMessage;
use serde_json::{json, Value};
use tracing::{error, info, warn};

use crate::{auth::authorize, error::ApiError, AppState};

/// Responses:
/// - 200 `{"status": "success"}` when every destination took the message
/// - 200 `{"status": "partial_success", "message": <summary>}` otherwise,
///   including when nothing could be sent
/// - 400 empty or invalid body
/// - 401 bad `Authorization`
/// - 503 bot not ready
/// - 504 the dispatch did not finish within the request deadline
pub async fn relay_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    let ctx = state.context();
    if !ctx.is_ready() {
        return Err(ApiError::NotReady);
    }
    let cfg = ctx.config();
    authorize(&cfg, &headers, "relay")?;

    let inbound = parse_inbound(&body)?;
    info!(channel = %inbound.channel_id, "received relay message");

    // Detached so the dispatch finishes even if the caller stops waiting.
    let dispatcher = ctx.dispatcher().clone();
    let task = tokio::spawn(async move { dispatcher.process(&inbound).await });

    let report = match tokio::time::timeout(cfg.limits.request_timeout(), task).await {
        Err(_) => {
            warn!("relay processing exceeded the request deadline");
            return Err(ApiError::Timeout);
        }
        Ok(Err(e)) => {
            error!(error = %e, "relay task failed");
            return Err(ApiError::Internal(e.to_string()));
        }
        Ok(Ok(report)) => report,
    };

    if report.success && report.delivered == report.attempted {
        Ok(Json(json!({ "status": "success" })))
    } else {
        Ok(Json(json!({
            "status": "partial_success",
            "message": report.summary,
        })))
    }
}

fn parse_inbound(body: &[u8]) -> Result<InboundMessage, ApiError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Err(ApiError::NoData);
    }
    let value: Value =
        serde_json::from_slice(body).map_err(|e| ApiError::InvalidJson(e.to_string()))?;
    match &value {
        Value::Object(obj) if !obj.is_empty() => {}
        _ => return Err(ApiError::NoData),
    }
    serde_json::from_value(value).map_err(|e| ApiError::InvalidJson(e.to_string()))
}
