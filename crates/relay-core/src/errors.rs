use std::path::PathBuf;

/// Core error type for the relay.
///
/// Adapter crates map their specific errors into this type so the core can tell a
/// dead webhook (evict and recreate) from a permission problem (skip the channel)
/// from a plain transient failure (report and move on).
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("invalid input: {0}")]
    Validation(String),

    #[error("permission denied: {0}")]
    Permission(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("remote error: {0}")]
    Remote(String),

    #[error("persistence error: {path}: {reason}")]
    Persistence { path: PathBuf, reason: String },

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Whether a failed send means the cached webhook for that channel is unusable.
    pub fn evicts_handle(&self) -> bool {
        matches!(self, Error::NotFound(_) | Error::Permission(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
