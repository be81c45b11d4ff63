//! Dropbox OAuth2 credentials and token refresh
//!
//! Holds the access token handed over by the caller and, when a refresh token
//! plus app key/secret are available, mints new access tokens before they expire.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use tokio::sync::RwLock;

use crate::error::{Error, Result};

/// Auth record produced by the Dropbox OAuth flow
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DropboxAuth {
    /// Access token
    pub access: String,
    /// Refresh token (offline access)
    #[serde(default)]
    pub refresh: Option<String>,
    /// OpenID token, carried but not used
    #[serde(default)]
    pub id_token: Option<String>,
    /// Access token expiry
    #[serde(
        default,
        deserialize_with = "deserialize_expiry",
        skip_serializing_if = "Option::is_none"
    )]
    pub expire: Option<DateTime<Utc>>,
}

impl DropboxAuth {
    /// Auth record holding only an access token
    pub fn from_access_token(access: impl Into<String>) -> Self {
        Self {
            access: access.into(),
            ..Self::default()
        }
    }

    /// Parse an auth record from JSON
    pub fn from_json(content: &str) -> Result<Self> {
        serde_json::from_str(content)
            .map_err(|e| Error::Config(format!("Invalid auth record: {}", e)))
    }
}

/// App key and secret used to refresh tokens
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppCredentials {
    pub app_key: String,
    pub app_secret: String,
}

impl AppCredentials {
    pub fn new(app_key: impl Into<String>, app_secret: impl Into<String>) -> Self {
        Self {
            app_key: app_key.into(),
            app_secret: app_secret.into(),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawExpiry {
    Seconds(i64),
    Fractional(f64),
    Text(String),
}

/// Accepts unix seconds (number or numeric string) or RFC 3339. Anything else
/// is treated as an unknown expiry rather than a hard error.
fn deserialize_expiry<'de, D>(deserializer: D) -> std::result::Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<RawExpiry>::deserialize(deserializer)?;
    Ok(raw.and_then(|raw| match raw {
        RawExpiry::Seconds(secs) => DateTime::from_timestamp(secs, 0),
        RawExpiry::Fractional(secs) => DateTime::from_timestamp(secs as i64, 0),
        RawExpiry::Text(text) => parse_expiry_text(&text),
    }))
}

fn parse_expiry_text(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim();
    if let Ok(secs) = text.parse::<i64>() {
        return DateTime::from_timestamp(secs, 0);
    }
    if let Ok(secs) = text.parse::<f64>() {
        return DateTime::from_timestamp(secs as i64, 0);
    }
    DateTime::parse_from_rfc3339(text)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

#[derive(Clone)]
struct CachedToken {
    access_token: String,
    expires_at: Option<DateTime<Utc>>,
}

impl CachedToken {
    /// Empty, expired, or expiring within 60 seconds
    fn needs_refresh(&self, now: DateTime<Utc>) -> bool {
        if self.access_token.is_empty() {
            return true;
        }
        self.expires_at
            .map(|expires_at| expires_at <= now + Duration::seconds(60))
            .unwrap_or(false)
    }
}

/// Dropbox access token manager
pub struct TokenManager {
    http: reqwest::Client,
    oauth_url: String,
    refresh_token: Option<String>,
    app: Option<AppCredentials>,
    token: RwLock<CachedToken>,
}

impl TokenManager {
    /// Create from an auth record and optional app credentials
    pub fn new(
        auth: &DropboxAuth,
        app: Option<AppCredentials>,
        oauth_url: impl Into<String>,
        http: reqwest::Client,
    ) -> Result<Self> {
        let refresh_token = auth.refresh.clone().filter(|r| !r.is_empty());

        if app.is_some() && refresh_token.is_none() {
            return Err(Error::config(
                "a refresh token is required when app key and secret are supplied",
            ));
        }
        if auth.access.is_empty() && app.is_none() {
            return Err(Error::config("access token is empty"));
        }

        Ok(Self {
            http,
            oauth_url: oauth_url.into(),
            refresh_token,
            app,
            token: RwLock::new(CachedToken {
                access_token: auth.access.clone(),
                expires_at: auth.expire,
            }),
        })
    }

    /// Whether new access tokens can be minted
    pub fn can_refresh(&self) -> bool {
        self.refresh_token.is_some() && self.app.is_some()
    }

    /// Get a valid access token (refreshing if needed and possible)
    pub async fn access_token(&self) -> Result<String> {
        {
            let token = self.token.read().await;
            if !self.can_refresh() || !token.needs_refresh(Utc::now()) {
                return Ok(token.access_token.clone());
            }
        }

        self.refresh().await
    }

    /// Exchange the refresh token for a new access token
    pub async fn refresh(&self) -> Result<String> {
        let (Some(refresh_token), Some(app)) = (&self.refresh_token, &self.app) else {
            return Err(Error::auth(
                "token refresh needs a refresh token, app key and app secret",
            ));
        };

        tracing::debug!("Refreshing Dropbox access token");

        let response = self
            .http
            .post(&self.oauth_url)
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token.as_str()),
                ("client_id", app.app_key.as_str()),
                ("client_secret", app.app_secret.as_str()),
            ])
            .send()
            .await
            .map_err(|e| Error::auth(format!("Token refresh request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::auth(format!(
                "Token refresh failed ({}): {}",
                status,
                body.trim()
            )));
        }

        #[derive(Deserialize)]
        struct TokenResponse {
            access_token: String,
            #[serde(default)]
            expires_in: Option<i64>,
        }

        let token_response: TokenResponse = response
            .json()
            .await
            .map_err(|e| Error::auth(format!("Failed to parse token response: {}", e)))?;

        let expires_at = token_response
            .expires_in
            .map(|secs| Utc::now() + Duration::seconds(secs));

        {
            let mut token = self.token.write().await;
            *token = CachedToken {
                access_token: token_response.access_token.clone(),
                expires_at,
            };
        }

        tracing::info!("Dropbox access token refreshed");
        Ok(token_response.access_token)
    }
}
