#[derive(Debug, thiserror::Error)]
pub enum TrackerError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("State backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("State corrupt: {0}")]
    StateCorrupt(String),

    #[error("State pointer conflict: {0}")]
    Conflict(String),

    #[error("Transient backend failure: {0}")]
    Transient(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

impl TrackerError {
    /// Whether a retry of the same operation could reasonably succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            TrackerError::Transient(_) => true,
            TrackerError::Http(e) => {
                e.is_timeout()
                    || e.is_connect()
                    || e.status()
                        .map(|s| s.is_server_error() || s.as_u16() == 429)
                        .unwrap_or(false)
            }
            TrackerError::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::Interrupted
                    | std::io::ErrorKind::TimedOut
                    | std::io::ErrorKind::WouldBlock
            ),
            _ => false,
        }
    }

    /// Fold transport-level failures into `BackendUnavailable`, leaving
    /// corrupt/conflict/config errors as they are.
    pub fn into_backend_error(self) -> TrackerError {
        match self {
            TrackerError::Http(e) => TrackerError::BackendUnavailable(e.to_string()),
            TrackerError::Io(e) => TrackerError::BackendUnavailable(e.to_string()),
            TrackerError::Transient(msg) => TrackerError::BackendUnavailable(msg),
            other => other,
        }
    }
}

pub type Result<T> = std::result::Result<T, TrackerError>;
