use axum::http::HeaderMap;
use relay_core::config::Config;
use tracing::warn;

use crate::error::ApiError;

/// The `Authorization` header must equal the configured token verbatim.
/// With no token configured every request is accepted.
pub fn authorize(cfg: &Config, headers: &HeaderMap, endpoint: &str) -> Result<(), ApiError> {
    if cfg.auth_token.is_empty() {
        return Ok(());
    }
    let presented = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    if presented != cfg.auth_token {
        warn!(endpoint, "unauthorized request");
        return Err(ApiError::Unauthorized);
    }
    Ok(())
}
