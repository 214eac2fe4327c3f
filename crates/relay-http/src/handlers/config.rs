use axum::{extract::State, http::HeaderMap, Json};
use serde_json::{json, Value};
use tracing::error;

use crate::{auth::authorize, error::ApiError, AppState};

/// `POST /reload-config`: re-read the config file and restart the monitor.
pub async fn reload_config_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Value>, ApiError> {
    let ctx = state.context();
    authorize(&ctx.config(), &headers, "reload-config")?;

    ctx.reload_config().await.map_err(|e| {
        error!(error = %e, "configuration reload failed");
        ApiError::from(e)
    })?;

    Ok(Json(json!({
        "status": "success",
        "message": "Configuration reloaded",
    })))
}
