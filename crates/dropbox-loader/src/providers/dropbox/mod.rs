//! Dropbox provider implementation
//!
//! - OAuth2 access/refresh token handling
//! - HTTP API v2 client for folder listing and file download

mod auth;
mod client;

pub use auth::{AppCredentials, DropboxAuth, TokenManager};
pub use client::DropboxClient;
