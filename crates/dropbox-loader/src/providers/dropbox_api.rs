//! Dropbox files API trait and wire types

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Entry returned by `files/list_folder`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = ".tag", rename_all = "lowercase")]
pub enum Metadata {
    /// A file
    File(FileMetadata),
    /// A folder
    Folder(FolderMetadata),
    /// A deleted entry (only listed when `include_deleted` is set)
    Deleted(DeletedMetadata),
}

/// File entry metadata
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct FileMetadata {
    /// Last path component
    pub name: String,
    /// Dropbox file ID
    #[serde(default)]
    pub id: String,
    /// Lowercased full path
    #[serde(default)]
    pub path_lower: Option<String>,
    /// Full path with the user's casing
    #[serde(default)]
    pub path_display: Option<String>,
    /// Size in bytes
    #[serde(default)]
    pub size: u64,
    /// Modification time set by the client
    #[serde(default)]
    pub client_modified: Option<String>,
    /// Last time the file changed on Dropbox
    #[serde(default)]
    pub server_modified: Option<String>,
    /// Revision
    #[serde(default)]
    pub rev: Option<String>,
}

/// Folder entry metadata
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct FolderMetadata {
    pub name: String,
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub path_lower: Option<String>,
    #[serde(default)]
    pub path_display: Option<String>,
}

/// Deleted entry metadata
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct DeletedMetadata {
    pub name: String,
    #[serde(default)]
    pub path_lower: Option<String>,
    #[serde(default)]
    pub path_display: Option<String>,
}

/// One page of a folder listing
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListFolderResult {
    /// Entries in this page
    pub entries: Vec<Metadata>,
    /// Cursor for `files/list_folder/continue`
    pub cursor: String,
    /// More entries are available
    pub has_more: bool,
}

/// Downloaded file contents
#[derive(Debug, Clone)]
pub struct DownloadedFile {
    /// Metadata from the `Dropbox-API-Result` header, when present
    pub metadata: Option<FileMetadata>,
    /// Raw file bytes
    pub data: Vec<u8>,
}

/// Trait for the subset of the Dropbox files API the loader needs
///
/// Implementations:
/// - `DropboxClient`: Dropbox HTTP API v2
#[async_trait]
pub trait DropboxApi: Send + Sync {
    /// List a folder (first page)
    async fn list_folder(
        &self,
        path: &str,
        recursive: bool,
        include_deleted: bool,
    ) -> Result<ListFolderResult>;

    /// Fetch the next page of a listing
    async fn list_folder_continue(&self, cursor: &str) -> Result<ListFolderResult>;

    /// Download a file by path
    async fn download(&self, path: &str) -> Result<DownloadedFile>;
}
