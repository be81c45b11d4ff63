//! dropbox-loader: Load text documents from a Dropbox account
//!
//! Lists a folder (or takes explicit file paths), downloads each supported
//! file through the Dropbox HTTP API v2 and extracts its plain text. Files
//! with unsupported extensions and per-folder/per-file failures are collected
//! on the loader instead of aborting the load.

pub mod config;
pub mod error;
pub mod ingestion;
pub mod loader;
pub mod providers;
pub mod types;

pub use config::LoaderConfig;
pub use error::{Error, Result};
pub use loader::{DropboxLoader, LoadSource};
pub use providers::dropbox::{AppCredentials, DropboxAuth, DropboxClient};
pub use providers::dropbox_api::DropboxApi;
pub use types::{Document, DocumentMetadata, FileType, LoadError, ALLOWED_EXTENSIONS};
