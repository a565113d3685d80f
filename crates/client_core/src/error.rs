use reqwest::StatusCode;
use shared::domain::RowKey;
use thiserror::Error;

/// Outcome of a failed remote call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("network error: {0}")]
    Network(String),
    #[error("http status {status}: {}", .message.as_deref().unwrap_or("no details"))]
    Http {
        status: u16,
        message: Option<String>,
    },
    #[error("invalid response payload: {0}")]
    InvalidPayload(String),
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("request cancelled")]
    Cancelled,
}

impl FetchError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, FetchError::Cancelled)
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            FetchError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Human-readable reason without the status code.
    pub fn reason(&self) -> String {
        match self {
            FetchError::Network(message)
            | FetchError::InvalidPayload(message)
            | FetchError::InvalidRequest(message) => message.clone(),
            FetchError::Http {
                message: Some(message),
                ..
            } => message.clone(),
            FetchError::Http {
                status,
                message: None,
            } => StatusCode::from_u16(*status)
                .ok()
                .and_then(|s| s.canonical_reason())
                .map(str::to_string)
                .unwrap_or_else(|| format!("request failed with status code {status}")),
            FetchError::Cancelled => "request cancelled".to_string(),
        }
    }

    /// Banner text: `"<prefix> (<status>): <reason>"`, the status part only
    /// when the server answered.
    pub fn describe(&self, prefix: &str) -> String {
        match self.status() {
            Some(status) => format!("{prefix} ({status}): {}", self.reason()),
            None => format!("{prefix}: {}", self.reason()),
        }
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(value: reqwest::Error) -> Self {
        if value.is_decode() {
            FetchError::InvalidPayload(value.to_string())
        } else {
            FetchError::Network(value.to_string())
        }
    }
}

/// Misuse of a controller, reported synchronously to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ControllerError {
    #[error("list view has been shut down")]
    ShutDown,
    #[error("unknown action '{0}'")]
    UnknownAction(String),
    #[error("unknown batch job '{0}'")]
    UnknownBatch(String),
    #[error("unknown screen '{0}'")]
    UnknownScreen(String),
    #[error("action '{action}' already pending for row {row_key}")]
    ActionPending { row_key: RowKey, action: String },
    #[error("batch job '{0}' already running")]
    BatchRunning(String),
}
