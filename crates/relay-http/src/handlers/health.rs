//! Liveness and readiness.

use axum::{extract::State, http::StatusCode, Json};
use serde_json::{json, Value};

use crate::AppState;

pub async fn index_handler(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "running",
        "service": "Discord Message Relay Bot",
        "version": env!("CARGO_PKG_VERSION"),
        "bot_ready": state.context().is_ready(),
    }))
}

/// 503 until the bot identity is known, then counts for groups, destinations
/// and (when enabled) tracked entities.
pub async fn health_handler(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    let ctx = state.context();
    let Some(bot_user) = ctx.bot_name() else {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({
                "status": "starting",
                "message": "Discord bot not ready yet",
            })),
        );
    };

    let cfg = ctx.config();
    let status = ctx.monitor().status().await;
    let mut earthmc = json!({
        "enabled": cfg.earthmc.enabled,
        "monitoring": status.running,
    });
    if cfg.earthmc.enabled {
        earthmc["towns_tracked"] = json!(status.towns_tracked);
        earthmc["nations_tracked"] = json!(status.nations_tracked);
    }

    (
        StatusCode::OK,
        Json(json!({
            "status": "healthy",
            "bot_ready": true,
            "bot_user": bot_user,
            "relay_groups": cfg.relay_groups.group_count(),
            "total_destinations": cfg.relay_groups.destination_count(),
            "earthmc": earthmc,
        })),
    )
}
