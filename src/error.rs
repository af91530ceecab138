use thiserror::Error;

/// Common result type used across the SDK.
pub type Result<T> = std::result::Result<T, ChromiumError>;

/// Unified error enum surfaced by all public APIs.
///
/// Categories mirror the server's HTTP error contract: each variant carries
/// enough of the original response to let callers decide whether a retry is
/// meaningful without inspecting raw status codes.
#[derive(Error, Debug)]
pub enum ChromiumError {
    #[error("invalid argument: {message}")]
    InvalidArgument {
        message: String,
        http_status: Option<u16>,
        server_identifier: Option<String>,
    },

    #[error("not found: {message}")]
    NotFound {
        message: String,
        http_status: Option<u16>,
        server_identifier: Option<String>,
    },

    #[error("conflict: {message}")]
    Conflict {
        message: String,
        http_status: Option<u16>,
        server_identifier: Option<String>,
    },

    #[error("invalid collection: {message}")]
    InvalidCollection {
        message: String,
        http_status: Option<u16>,
        server_identifier: Option<String>,
    },

    #[error("transport error: {message}")]
    Transport {
        message: String,
        #[source]
        cause: Option<anyhow::Error>,
    },

    #[error("server error: {message}")]
    Server {
        message: String,
        http_status: Option<u16>,
    },

    #[error("client error: {0}")]
    Client(String),

    #[error("builder validation failed: {0}")]
    ValidationFailure(String),

    #[error("unsupported on this server version: {0}")]
    Unsupported(String),

    #[error("integrity check failed: {0}")]
    Corrupted(String),

    #[error("artifact exceeds declared size limit: {0}")]
    IntegrityLimit(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ChromiumError {
    pub fn client(message: impl Into<String>) -> Self {
        ChromiumError::Client(message.into())
    }

    pub fn validation(message: impl Into<String>) -> Self {
        ChromiumError::ValidationFailure(message.into())
    }

    /// True if a caller may reasonably retry this error.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ChromiumError::Transport { .. } | ChromiumError::Server { .. })
    }

    pub fn http_status(&self) -> Option<u16> {
        match self {
            ChromiumError::InvalidArgument { http_status, .. }
            | ChromiumError::NotFound { http_status, .. }
            | ChromiumError::Conflict { http_status, .. }
            | ChromiumError::InvalidCollection { http_status, .. } => *http_status,
            ChromiumError::Server { http_status, .. } => *http_status,
            _ => None,
        }
    }
}

impl From<reqwest::Error> for ChromiumError {
    fn from(value: reqwest::Error) -> Self {
        if value.is_timeout() || value.is_connect() || value.is_request() {
            return ChromiumError::Transport {
                message: value.to_string(),
                cause: Some(anyhow::Error::new(value)),
            };
        }
        match value.status() {
            Some(status) if status.is_server_error() => ChromiumError::Server {
                message: value.to_string(),
                http_status: Some(status.as_u16()),
            },
            Some(status) => ChromiumError::Transport {
                message: format!("unexpected status {status}: {value}"),
                cause: Some(anyhow::Error::new(value)),
            },
            None => ChromiumError::Transport {
                message: value.to_string(),
                cause: Some(anyhow::Error::new(value)),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_categories() {
        let transport = ChromiumError::Transport {
            message: "boom".into(),
            cause: None,
        };
        assert!(transport.is_retryable());

        let invalid = ChromiumError::InvalidArgument {
            message: "bad".into(),
            http_status: Some(400),
            server_identifier: None,
        };
        assert!(!invalid.is_retryable());
    }
}
