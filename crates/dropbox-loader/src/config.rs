//! Configuration for the Dropbox loader

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{Error, Result};

/// Main loader configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoaderConfig {
    /// Dropbox API configuration
    #[serde(default)]
    pub dropbox: DropboxConfig,
    /// Text extraction configuration
    #[serde(default)]
    pub parser: ParserConfig,
}

impl LoaderConfig {
    /// Parse configuration from a TOML string
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(format!("Invalid config: {}", e)))
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Failed to read config {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&content)
    }
}

/// Dropbox API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DropboxConfig {
    /// Base URL for RPC endpoints (listing)
    #[serde(default = "default_api_url")]
    pub api_url: String,
    /// Base URL for content endpoints (download)
    #[serde(default = "default_content_url")]
    pub content_url: String,
    /// OAuth2 token endpoint used for refresh
    #[serde(default = "default_oauth_url")]
    pub oauth_url: String,
    /// Request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    /// Number of retries for rate-limited or failed requests
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Base delay between retries when no Retry-After is given
    #[serde(default = "default_retry_backoff")]
    pub retry_backoff_ms: u64,
    /// Page size hint for folder listing (Dropbox default when unset)
    #[serde(default)]
    pub list_limit: Option<u32>,
}

fn default_api_url() -> String { "https://api.dropboxapi.com".to_string() }
fn default_content_url() -> String { "https://content.dropboxapi.com".to_string() }
fn default_oauth_url() -> String { "https://api.dropboxapi.com/oauth2/token".to_string() }
fn default_timeout() -> u64 { 120 }
fn default_max_retries() -> u32 { 2 }
fn default_retry_backoff() -> u64 { 500 }

impl Default for DropboxConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            content_url: default_content_url(),
            oauth_url: default_oauth_url(),
            timeout_secs: default_timeout(),
            max_retries: default_max_retries(),
            retry_backoff_ms: default_retry_backoff(),
            list_limit: None,
        }
    }
}

impl DropboxConfig {
    /// Point every endpoint at one base URL (used against mock servers)
    pub fn with_base_url(base: impl Into<String>) -> Self {
        let base = base.into();
        let base = base.trim_end_matches('/');
        Self {
            api_url: base.to_string(),
            content_url: base.to_string(),
            oauth_url: format!("{}/oauth2/token", base),
            ..Self::default()
        }
    }
}

/// Text extraction configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParserConfig {
    /// Timeout for PDF text extraction in seconds
    #[serde(default = "default_pdf_timeout")]
    pub pdf_timeout_secs: u64,
    /// Emit one document per PDF page instead of one per file
    #[serde(default)]
    pub split_pdf_pages: bool,
}

fn default_pdf_timeout() -> u64 { 60 }

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            pdf_timeout_secs: default_pdf_timeout(),
            split_pdf_pages: false,
        }
    }
}
