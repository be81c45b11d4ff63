//! Dropbox HTTP API v2 client
//!
//! Implements listing and download over the RPC and content endpoints, with
//! bearer auth from the token manager, one refresh on an expired token, and
//! retries for rate limiting and server errors.

use async_trait::async_trait;
use reqwest::header::RETRY_AFTER;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;

use super::auth::{AppCredentials, DropboxAuth, TokenManager};
use crate::config::DropboxConfig;
use crate::error::{DropboxApiError, Error, Result};
use crate::providers::dropbox_api::{DownloadedFile, DropboxApi, FileMetadata, ListFolderResult};

const API_ARG_HEADER: &str = "Dropbox-API-Arg";
const API_RESULT_HEADER: &str = "Dropbox-API-Result";

/// Dropbox API client
pub struct DropboxClient {
    http: reqwest::Client,
    config: DropboxConfig,
    tokens: TokenManager,
}

#[derive(Serialize)]
struct ListFolderArg<'a> {
    path: &'a str,
    recursive: bool,
    include_deleted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    limit: Option<u32>,
}

#[derive(Serialize)]
struct ListFolderContinueArg<'a> {
    cursor: &'a str,
}

#[derive(Serialize)]
struct DownloadArg<'a> {
    path: &'a str,
}

impl DropboxClient {
    /// Create a new client
    pub fn new(
        auth: &DropboxAuth,
        app: Option<AppCredentials>,
        config: DropboxConfig,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| Error::Config(format!("Failed to build HTTP client: {}", e)))?;

        let tokens = TokenManager::new(auth, app, config.oauth_url.clone(), http.clone())?;

        Ok(Self {
            http,
            config,
            tokens,
        })
    }

    /// Send a request built by `build` for the current token, handling token
    /// expiry and retryable failures
    async fn send<F>(&self, route: &str, build: F) -> Result<reqwest::Response>
    where
        F: Fn(&str) -> reqwest::RequestBuilder + Send + Sync,
    {
        let mut attempt = 0u32;
        let mut refreshed = false;

        loop {
            let token = self.tokens.access_token().await?;
            tracing::debug!(route, attempt, "Dropbox request");

            let response = build(&token).send().await?;
            let status = response.status();
            if status.is_success() {
                return Ok(response);
            }

            let retry_after = response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok());
            let body = response.text().await.unwrap_or_default();
            let err = DropboxApiError::from_body(status.as_u16(), &body);

            if err.is_expired_token() && !refreshed && self.tokens.can_refresh() {
                tracing::info!(route, "Access token expired, refreshing");
                self.tokens.refresh().await?;
                refreshed = true;
                continue;
            }

            if (err.is_rate_limited() || err.is_server_error()) && attempt < self.config.max_retries {
                attempt += 1;
                let delay = retry_after
                    .map(Duration::from_secs)
                    .unwrap_or_else(|| {
                        Duration::from_millis(self.config.retry_backoff_ms * u64::from(attempt))
                    });
                tracing::warn!(
                    route,
                    status = err.status,
                    attempt,
                    "Dropbox request failed, retrying in {:?}",
                    delay
                );
                tokio::time::sleep(delay).await;
                continue;
            }

            return Err(Error::Api(err));
        }
    }

    /// Call an RPC endpoint with a JSON body and JSON response
    async fn rpc<B, T>(&self, route: &str, arg: &B) -> Result<T>
    where
        B: Serialize + Sync,
        T: DeserializeOwned,
    {
        let url = format!("{}/2/{}", self.config.api_url, route);
        let response = self
            .send(route, |token| self.http.post(&url).bearer_auth(token).json(arg))
            .await?;

        Ok(response.json::<T>().await?)
    }
}

#[async_trait]
impl DropboxApi for DropboxClient {
    async fn list_folder(
        &self,
        path: &str,
        recursive: bool,
        include_deleted: bool,
    ) -> Result<ListFolderResult> {
        let arg = ListFolderArg {
            path: normalize_path(path),
            recursive,
            include_deleted,
            limit: self.config.list_limit,
        };
        self.rpc("files/list_folder", &arg).await
    }

    async fn list_folder_continue(&self, cursor: &str) -> Result<ListFolderResult> {
        self.rpc("files/list_folder/continue", &ListFolderContinueArg { cursor })
            .await
    }

    async fn download(&self, path: &str) -> Result<DownloadedFile> {
        let url = format!("{}/2/files/download", self.config.content_url);
        let arg = header_safe_json(&DownloadArg { path })?;

        let response = self
            .send("files/download", |token| {
                self.http
                    .post(&url)
                    .bearer_auth(token)
                    .header(API_ARG_HEADER, arg.as_str())
            })
            .await?;

        let metadata = response
            .headers()
            .get(API_RESULT_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| serde_json::from_str::<FileMetadata>(v).ok());

        let data = response.bytes().await?.to_vec();
        tracing::debug!(path, bytes = data.len(), "Downloaded file");

        Ok(DownloadedFile { metadata, data })
    }
}

/// Dropbox addresses the account root as "" rather than "/"
fn normalize_path(path: &str) -> &str {
    if path == "/" {
        ""
    } else {
        path
    }
}

/// Serialize to JSON with non-ASCII characters escaped as `\uXXXX`, as
/// required for the `Dropbox-API-Arg` header
fn header_safe_json<T: Serialize>(value: &T) -> Result<String> {
    let json = serde_json::to_string(value)?;
    let mut escaped = String::with_capacity(json.len());
    for c in json.chars() {
        if c.is_ascii() {
            escaped.push(c);
        } else {
            let mut units = [0u16; 2];
            for unit in c.encode_utf16(&mut units) {
                escaped.push_str(&format!("\\u{:04x}", unit));
            }
        }
    }
    Ok(escaped)
}
