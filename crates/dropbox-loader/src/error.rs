//! Error types for the Dropbox loader

use std::fmt;
use thiserror::Error;

/// Result type alias for loader operations
pub type Result<T> = std::result::Result<T, Error>;

/// Loader errors
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// OAuth token refresh failed
    #[error("Authentication error: {0}")]
    Auth(String),

    /// Dropbox API returned an error response
    #[error("Dropbox API error: {0}")]
    Api(DropboxApiError),

    /// File parsing error
    #[error("Failed to parse file '{filename}': {message}")]
    FileParse { filename: String, message: String },

    /// Unsupported file type
    #[error("Unsupported file type: {0}")]
    UnsupportedFileType(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP transport error
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a config error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create an auth error
    pub fn auth(message: impl Into<String>) -> Self {
        Self::Auth(message.into())
    }

    /// Create a file parse error
    pub fn file_parse(filename: impl Into<String>, message: impl Into<String>) -> Self {
        Self::FileParse {
            filename: filename.into(),
            message: message.into(),
        }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Dropbox error tag, when the API supplied one
    pub fn api_tag(&self) -> Option<&str> {
        match self {
            Self::Api(err) => err.tag.as_deref(),
            _ => None,
        }
    }
}

/// Error body returned by a Dropbox endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DropboxApiError {
    /// HTTP status code
    pub status: u16,
    /// `error_summary` from the response, or the raw body for non-JSON errors
    pub summary: String,
    /// Top-level `.tag` of the `error` union, e.g. `path` or `expired_access_token`
    pub tag: Option<String>,
}

impl DropboxApiError {
    /// Build from a status code and response body
    pub fn from_body(status: u16, body: &str) -> Self {
        #[derive(serde::Deserialize)]
        struct Envelope {
            error_summary: Option<String>,
            error: Option<serde_json::Value>,
        }

        match serde_json::from_str::<Envelope>(body) {
            Ok(envelope) => {
                let tag = envelope
                    .error
                    .as_ref()
                    .and_then(|e| e.get(".tag"))
                    .and_then(|t| t.as_str())
                    .map(str::to_string);
                let summary = envelope
                    .error_summary
                    .or_else(|| tag.clone())
                    .unwrap_or_else(|| body.trim().to_string());
                Self { status, summary, tag }
            }
            Err(_) => Self {
                status,
                summary: body.trim().to_string(),
                tag: None,
            },
        }
    }

    /// Rate limited by Dropbox
    pub fn is_rate_limited(&self) -> bool {
        self.status == 429
    }

    /// Access token has expired and can be refreshed
    pub fn is_expired_token(&self) -> bool {
        self.status == 401 && self.tag.as_deref() == Some("expired_access_token")
    }

    /// Server-side failure worth retrying
    pub fn is_server_error(&self) -> bool {
        self.status >= 500
    }
}

impl fmt::Display for DropboxApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (HTTP {})", self.summary, self.status)
    }
}
