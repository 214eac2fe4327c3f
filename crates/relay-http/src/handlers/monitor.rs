use axum::{extract::State, http::HeaderMap, http::StatusCode, Json};
use relay_core::domain::Population;
use serde_json::{json, Value};

use crate::{auth::authorize, error::ApiError, AppState};

/// `GET /earthmc/status`
pub async fn monitor_status_handler(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    let ctx = state.context();
    let cfg = ctx.config();
    if !cfg.earthmc.enabled {
        return (
            StatusCode::OK,
            Json(json!({
                "enabled": false,
                "message": "EarthMC monitoring is disabled",
            })),
        );
    }

    let status = ctx.monitor().status().await;
    (
        StatusCode::OK,
        Json(json!({
            "enabled": true,
            "status": if status.running { "running" } else { "stopped" },
            "phase": status.phase,
            "towns_tracked": status.towns_tracked,
            "nations_tracked": status.nations_tracked,
            "last_cycle": status.last_cycle,
            "poll_interval": cfg.earthmc.poll_interval,
            "relay_groups": {
                "towns": cfg.relay_groups.subscribed_groups(Population::Town),
                "nations": cfg.relay_groups.subscribed_groups(Population::Nation),
            },
        })),
    )
}

/// `POST /earthmc/force-check`: abandon the current wait and poll now.
pub async fn force_check_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Value>, ApiError> {
    let ctx = state.context();
    let cfg = ctx.config();
    authorize(&cfg, &headers, "earthmc/force-check")?;

    if !cfg.earthmc.enabled {
        return Err(ApiError::MonitorDisabled);
    }
    if !ctx.monitor().force_check().await {
        return Err(ApiError::MonitorNotRunning);
    }

    Ok(Json(json!({
        "status": "success",
        "message": "Force check initiated",
    })))
}
