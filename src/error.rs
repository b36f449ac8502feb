#[derive(Debug, thiserror::Error)]
pub enum PortalError {
    #[error("HTTP {status} from {url}")]
    Http { url: String, status: u16 },

    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl PortalError {
    /// Server-side failures worth retrying later; client errors are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            PortalError::Http { status, .. } => *status >= 500 || *status == 429,
            PortalError::Request(e) => e.is_timeout() || e.is_connect(),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, PortalError>;
