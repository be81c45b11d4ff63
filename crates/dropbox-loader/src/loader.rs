//! Dropbox document loader
//!
//! Walks a folder (or a list of file paths), downloads every supported file,
//! extracts its text and collects per-path failures instead of aborting.

use std::time::Instant;

use crate::config::LoaderConfig;
use crate::error::{Error, Result};
use crate::ingestion::{hash_content, FileParser, ParsedDocument};
use crate::providers::dropbox::{AppCredentials, DropboxAuth, DropboxClient};
use crate::providers::dropbox_api::{DropboxApi, FileMetadata, Metadata};
use crate::types::{Document, DocumentMetadata, FileType, LoadError};

/// What to load
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadSource {
    /// Every supported file under a folder, recursively
    Folder(String),
    /// Explicit file paths, loaded in order
    Files(Vec<String>),
    /// A single file path
    File(String),
}

/// Loads text documents from a Dropbox account
pub struct DropboxLoader {
    auth: DropboxAuth,
    app: Option<AppCredentials>,
    source: LoadSource,
    config: LoaderConfig,
    invalid_files: Vec<String>,
    errors: Vec<LoadError>,
}

impl DropboxLoader {
    /// Create a loader for `source`
    pub fn new(auth: DropboxAuth, source: LoadSource) -> Self {
        Self {
            auth,
            app: None,
            source,
            config: LoaderConfig::default(),
            invalid_files: Vec::new(),
            errors: Vec::new(),
        }
    }

    /// Loader for every supported file under `folder`
    pub fn for_folder(auth: DropboxAuth, folder: impl Into<String>) -> Self {
        Self::new(auth, LoadSource::Folder(folder.into()))
    }

    /// Loader for a single file
    pub fn for_file(auth: DropboxAuth, path: impl Into<String>) -> Self {
        Self::new(auth, LoadSource::File(path.into()))
    }

    /// Loader for a list of files
    pub fn for_files<I, S>(auth: DropboxAuth, paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(
            auth,
            LoadSource::Files(paths.into_iter().map(Into::into).collect()),
        )
    }

    /// App key and secret used to refresh expired access tokens
    pub fn with_app_credentials(
        mut self,
        app_key: impl Into<String>,
        app_secret: impl Into<String>,
    ) -> Self {
        self.app = Some(AppCredentials::new(app_key, app_secret));
        self
    }

    /// Replace the endpoint and parser configuration
    pub fn with_config(mut self, config: LoaderConfig) -> Self {
        self.config = config;
        self
    }

    pub fn source(&self) -> &LoadSource {
        &self.source
    }

    /// Paths skipped because their extension is not supported (last load)
    pub fn invalid_files(&self) -> &[String] {
        &self.invalid_files
    }

    /// Folder and file failures (last load)
    pub fn errors(&self) -> &[LoadError] {
        &self.errors
    }

    /// Connect to Dropbox and load every document from the source
    ///
    /// Never fails: problems end up in [`errors`](Self::errors) and
    /// [`invalid_files`](Self::invalid_files).
    pub async fn load(&mut self) -> Vec<Document> {
        let client =
            match DropboxClient::new(&self.auth, self.app.clone(), self.config.dropbox.clone()) {
                Ok(client) => client,
                Err(e) => {
                    tracing::error!("Failed to create Dropbox client: {}", e);
                    self.reset();
                    self.errors.push(LoadError::session(e.to_string()));
                    return Vec::new();
                }
            };

        self.load_with(&client).await
    }

    /// Load every document from the source through `api`
    pub async fn load_with(&mut self, api: &dyn DropboxApi) -> Vec<Document> {
        self.reset();
        let start = Instant::now();
        let parser = FileParser::new(self.config.parser.clone());

        let documents = match self.source.clone() {
            LoadSource::Folder(folder) => self.load_folder(api, &parser, &folder).await,
            LoadSource::Files(paths) => self.load_paths(api, &parser, &paths).await,
            LoadSource::File(path) => self.load_file(api, &parser, &path).await,
        };

        tracing::info!(
            documents = documents.len(),
            invalid_files = self.invalid_files.len(),
            errors = self.errors.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Dropbox load finished"
        );

        documents
    }

    fn reset(&mut self) {
        self.invalid_files.clear();
        self.errors.clear();
    }

    async fn load_folder(
        &mut self,
        api: &dyn DropboxApi,
        parser: &FileParser,
        folder: &str,
    ) -> Vec<Document> {
        tracing::info!("Listing Dropbox folder '{}'", folder);

        let mut page = match api.list_folder(folder, true, false).await {
            Ok(page) => page,
            Err(e) => return self.folder_failed(folder, e),
        };

        let mut queued = Vec::new();
        loop {
            for entry in &page.entries {
                let Metadata::File(file) = entry else {
                    continue;
                };
                if FileType::from_path(&file.name).is_supported() {
                    queued.push(load_path(file));
                } else {
                    self.invalid_files.push(display_path(file));
                }
            }

            if !page.has_more {
                break;
            }
            page = match api.list_folder_continue(&page.cursor).await {
                Ok(next) => next,
                Err(e) => return self.folder_failed(folder, e),
            };
        }

        tracing::debug!(
            "Folder '{}': {} files queued, {} unsupported",
            folder,
            queued.len(),
            self.invalid_files.len()
        );

        self.load_paths(api, parser, &queued).await
    }

    fn folder_failed(&mut self, folder: &str, error: Error) -> Vec<Document> {
        tracing::warn!(tag = error.api_tag(), "Failed to list folder '{}': {}", folder, error);
        self.errors
            .push(LoadError::folder(error_message(&error), folder));
        Vec::new()
    }

    async fn load_paths(
        &mut self,
        api: &dyn DropboxApi,
        parser: &FileParser,
        paths: &[String],
    ) -> Vec<Document> {
        let mut documents = Vec::new();
        for path in paths {
            documents.extend(self.load_file(api, parser, path).await);
        }
        documents
    }

    async fn load_file(
        &mut self,
        api: &dyn DropboxApi,
        parser: &FileParser,
        path: &str,
    ) -> Vec<Document> {
        if !FileType::from_path(path).is_supported() {
            tracing::debug!("Skipping unsupported file '{}'", path);
            self.invalid_files.push(path.to_string());
            return Vec::new();
        }

        let downloaded = match api.download(path).await {
            Ok(file) => file,
            Err(e) => {
                tracing::warn!(tag = e.api_tag(), "Failed to download '{}': {}", path, e);
                self.errors.push(LoadError::file(error_message(&e), path));
                return Vec::new();
            }
        };

        let size = downloaded.data.len();
        let parsed = match parse_blocking(parser, path, downloaded.data).await {
            Ok(parsed) => parsed,
            Err(e) => {
                tracing::warn!("Failed to parse '{}': {}", path, e);
                self.errors.push(LoadError::file(e.to_string(), path));
                return Vec::new();
            }
        };

        let documents = build_documents(
            path,
            &parsed,
            downloaded.metadata.as_ref(),
            self.config.parser.split_pdf_pages,
        );
        tracing::debug!(
            "Loaded '{}' ({}, {} bytes, {} chars, {} documents)",
            path,
            parsed.file_type.display_name(),
            size,
            parsed.content.len(),
            documents.len()
        );
        documents
    }
}

/// Run the (CPU-bound) parser off the async runtime
async fn parse_blocking(parser: &FileParser, path: &str, data: Vec<u8>) -> Result<ParsedDocument> {
    let parser = parser.clone();
    let path = path.to_string();
    tokio::task::spawn_blocking(move || parser.parse(&path, &data))
        .await
        .map_err(|e| Error::internal(format!("Parser task failed: {}", e)))?
}

/// Path used to download a listed file
fn load_path(file: &FileMetadata) -> String {
    file.path_lower
        .clone()
        .unwrap_or_else(|| display_path(file))
}

/// Path reported for a listed file
fn display_path(file: &FileMetadata) -> String {
    file.path_display
        .clone()
        .or_else(|| file.path_lower.clone())
        .unwrap_or_else(|| file.name.clone())
}

/// Dropbox API failures carry their own summary; everything else uses Display
fn error_message(error: &Error) -> String {
    match error {
        Error::Api(api) => api.summary.clone(),
        other => other.to_string(),
    }
}

fn build_documents(
    path: &str,
    parsed: &ParsedDocument,
    remote: Option<&FileMetadata>,
    split_pages: bool,
) -> Vec<Document> {
    let metadata_for = |content_hash: String| {
        let mut metadata = DocumentMetadata::file(path, parsed.file_type, content_hash);
        metadata.total_pages = parsed.total_pages;
        if let Some(remote) = remote {
            if !remote.name.is_empty() {
                metadata.file_name = remote.name.clone();
            }
            metadata.size = Some(remote.size);
            metadata.server_modified = remote.server_modified.clone();
        }
        metadata
    };

    if split_pages && parsed.file_type == FileType::Pdf && !parsed.pages.is_empty() {
        return parsed
            .pages
            .iter()
            .map(|page| {
                let mut metadata = metadata_for(hash_content(&page.content));
                metadata.page = Some(page.page_number.saturating_sub(1));
                Document {
                    page_content: page.content.clone(),
                    metadata,
                }
            })
            .collect();
    }

    vec![Document {
        page_content: parsed.content.clone(),
        metadata: metadata_for(parsed.content_hash.clone()),
    }]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DropboxConfig;
    use crate::error::DropboxApiError;
    use crate::ingestion::PageContent;
    use crate::providers::dropbox_api::{DownloadedFile, FolderMetadata, ListFolderResult};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// In-memory Dropbox: folder listings split into pages, files by path
    #[derive(Default)]
    struct FakeDropbox {
        listings: HashMap<String, Vec<Vec<Metadata>>>,
        files: HashMap<String, Vec<u8>>,
        failing_cursors: Vec<String>,
        downloads: Mutex<Vec<String>>,
    }

    impl FakeDropbox {
        fn with_listing(mut self, folder: &str, pages: Vec<Vec<Metadata>>) -> Self {
            self.listings.insert(folder.to_string(), pages);
            self
        }

        fn with_file(mut self, path: &str, data: &[u8]) -> Self {
            self.files.insert(path.to_string(), data.to_vec());
            self
        }

        fn downloaded(&self) -> Vec<String> {
            self.downloads.lock().unwrap().clone()
        }

        fn page(&self, folder: &str, index: usize) -> Result<ListFolderResult> {
            let pages = self.listings.get(folder).ok_or_else(|| not_found("path/not_found/"))?;
            let entries = pages.get(index).cloned().unwrap_or_default();
            Ok(ListFolderResult {
                entries,
                cursor: format!("{}#{}", folder, index + 1),
                has_more: index + 1 < pages.len(),
            })
        }
    }

    fn not_found(summary: &str) -> Error {
        Error::Api(DropboxApiError {
            status: 409,
            summary: summary.to_string(),
            tag: Some("path".to_string()),
        })
    }

    #[async_trait]
    impl DropboxApi for FakeDropbox {
        async fn list_folder(
            &self,
            path: &str,
            recursive: bool,
            include_deleted: bool,
        ) -> Result<ListFolderResult> {
            assert!(recursive);
            assert!(!include_deleted);
            self.page(path, 0)
        }

        async fn list_folder_continue(&self, cursor: &str) -> Result<ListFolderResult> {
            if self.failing_cursors.iter().any(|c| c == cursor) {
                return Err(Error::Api(DropboxApiError {
                    status: 409,
                    summary: "reset/".to_string(),
                    tag: Some("reset".to_string()),
                }));
            }
            let (folder, index) = cursor.rsplit_once('#').unwrap();
            self.page(folder, index.parse().unwrap())
        }

        async fn download(&self, path: &str) -> Result<DownloadedFile> {
            self.downloads.lock().unwrap().push(path.to_string());
            let data = self
                .files
                .get(path)
                .cloned()
                .ok_or_else(|| not_found("path/not_found/.."))?;
            Ok(DownloadedFile {
                metadata: None,
                data,
            })
        }
    }

    fn file(path_display: &str) -> Metadata {
        let name = path_display.rsplit('/').next().unwrap().to_string();
        Metadata::File(FileMetadata {
            name,
            id: format!("id:{}", path_display),
            path_lower: Some(path_display.to_lowercase()),
            path_display: Some(path_display.to_string()),
            size: 1,
            ..Default::default()
        })
    }

    fn folder(path_display: &str) -> Metadata {
        Metadata::Folder(FolderMetadata {
            name: path_display.rsplit('/').next().unwrap().to_string(),
            id: format!("id:{}", path_display),
            path_lower: Some(path_display.to_lowercase()),
            path_display: Some(path_display.to_string()),
        })
    }

    fn auth() -> DropboxAuth {
        DropboxAuth::from_access_token("tok")
    }

    #[tokio::test]
    async fn test_folder_load_follows_cursor_and_collects_failures() {
        let api = FakeDropbox::default()
            .with_listing(
                "/Docs",
                vec![
                    vec![folder("/Docs/Sub"), file("/Docs/Notes.txt"), file("/Docs/photo.PNG")],
                    vec![file("/Docs/Sub/Page.HTML"), file("/Docs/Sub/gone.md")],
                ],
            )
            .with_file("/docs/notes.txt", b"meeting notes")
            .with_file("/docs/sub/page.html", b"<html><body><p>Hello</p></body></html>");

        let mut loader = DropboxLoader::for_folder(auth(), "/Docs");
        let docs = loader.load_with(&api).await;

        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].page_content, "meeting notes");
        assert_eq!(docs[0].metadata.source, "/docs/notes.txt");
        assert_eq!(docs[0].metadata.kind, "file");
        assert_eq!(docs[0].metadata.page, None);
        assert_eq!(docs[1].page_content, "Hello");
        assert_eq!(docs[1].metadata.file_type, FileType::Html);

        assert_eq!(loader.invalid_files(), ["/Docs/photo.PNG"]);
        assert_eq!(
            loader.errors(),
            [LoadError::file("path/not_found/..", "/docs/sub/gone.md")]
        );
        assert!(!api.downloaded().contains(&"/docs/photo.png".to_string()));
    }

    #[tokio::test]
    async fn test_listing_failure_loads_nothing() {
        let api = FakeDropbox::default().with_file("/missing/a.txt", b"a");

        let mut loader = DropboxLoader::for_folder(auth(), "/missing");
        let docs = loader.load_with(&api).await;

        assert!(docs.is_empty());
        assert_eq!(
            loader.errors(),
            [LoadError::folder("path/not_found/", "/missing")]
        );
        assert!(loader.invalid_files().is_empty());
        assert!(api.downloaded().is_empty());
    }

    #[tokio::test]
    async fn test_failure_on_later_page_loads_nothing() {
        let mut api = FakeDropbox::default()
            .with_listing(
                "/Docs",
                vec![
                    vec![file("/Docs/a.txt"), file("/Docs/b.exe")],
                    vec![file("/Docs/c.txt")],
                ],
            )
            .with_file("/docs/a.txt", b"a");
        api.failing_cursors.push("/Docs#1".to_string());

        let mut loader = DropboxLoader::for_folder(auth(), "/Docs");
        let docs = loader.load_with(&api).await;

        assert!(docs.is_empty());
        assert_eq!(loader.errors().len(), 1);
        assert_eq!(loader.errors()[0].folder.as_deref(), Some("/Docs"));
        assert_eq!(loader.invalid_files(), ["/Docs/b.exe"]);
        assert!(api.downloaded().is_empty());
    }

    #[tokio::test]
    async fn test_file_list_mixes_outcomes() {
        let api = FakeDropbox::default()
            .with_file("/a.txt", b"alpha")
            .with_file("/c.pdf", b"definitely not a pdf")
            .with_file("/d.md", b"# Title\n\nBody text");

        let mut loader =
            DropboxLoader::for_files(auth(), ["/a.txt", "/b.exe", "/c.pdf", "/d.md"]);
        let docs = loader.load_with(&api).await;

        let contents: Vec<&str> = docs.iter().map(|d| d.page_content.as_str()).collect();
        assert_eq!(contents, ["alpha", "Title\nBody text"]);
        assert_eq!(loader.invalid_files(), ["/b.exe"]);
        assert_eq!(loader.errors().len(), 1);
        assert_eq!(loader.errors()[0].file.as_deref(), Some("/c.pdf"));
        assert_eq!(api.downloaded(), ["/a.txt", "/c.pdf", "/d.md"]);
    }

    #[tokio::test]
    async fn test_single_unsupported_file_is_not_downloaded() {
        let api = FakeDropbox::default().with_file("/archive.zip", b"PK");

        let mut loader = DropboxLoader::for_file(auth(), "/archive.zip");
        let docs = loader.load_with(&api).await;

        assert!(docs.is_empty());
        assert_eq!(loader.invalid_files(), ["/archive.zip"]);
        assert!(loader.errors().is_empty());
        assert!(api.downloaded().is_empty());
    }

    #[tokio::test]
    async fn test_repeated_load_resets_state() {
        let api = FakeDropbox::default();

        let mut loader = DropboxLoader::for_files(auth(), ["/x.exe", "/y.txt"]);
        loader.load_with(&api).await;
        loader.load_with(&api).await;

        assert_eq!(loader.invalid_files(), ["/x.exe"]);
        assert_eq!(loader.errors().len(), 1);
    }

    #[test]
    fn test_split_pdf_pages_gives_zero_based_pages() {
        let parsed = ParsedDocument {
            file_type: FileType::Pdf,
            content: "one\n\ntwo".to_string(),
            content_hash: hash_content("one\n\ntwo"),
            total_pages: Some(2),
            pages: vec![
                PageContent {
                    page_number: 1,
                    content: "one".to_string(),
                },
                PageContent {
                    page_number: 2,
                    content: "two".to_string(),
                },
            ],
        };
        let remote = FileMetadata {
            name: "Report.pdf".to_string(),
            size: 2048,
            server_modified: Some("2024-03-01T10:00:00Z".to_string()),
            ..Default::default()
        };

        let split = build_documents("/reports/report.pdf", &parsed, Some(&remote), true);
        assert_eq!(split.len(), 2);
        assert_eq!(split[0].metadata.page, Some(0));
        assert_eq!(split[1].metadata.page, Some(1));
        assert_eq!(split[1].page_content, "two");
        assert_eq!(split[1].metadata.file_name, "Report.pdf");
        assert_eq!(split[1].metadata.size, Some(2048));
        assert_eq!(split[1].metadata.total_pages, Some(2));
        assert_ne!(split[0].metadata.content_hash, split[1].metadata.content_hash);

        let whole = build_documents("/reports/report.pdf", &parsed, None, false);
        assert_eq!(whole.len(), 1);
        assert_eq!(whole[0].metadata.page, None);
        assert_eq!(whole[0].metadata.file_name, "report.pdf");
        assert_eq!(whole[0].metadata.size, None);
    }

    #[tokio::test]
    async fn test_split_pdf_pages_through_loader() {
        use crate::ingestion::fixtures::build_pdf;

        let pdf = build_pdf(&["Hello page one", "Second page"]);
        let api = FakeDropbox::default()
            .with_file("/reports/q1.pdf", &pdf)
            .with_file("/reports/notes.txt", b"plain");

        let mut config = LoaderConfig::default();
        config.parser.split_pdf_pages = true;
        let mut loader =
            DropboxLoader::for_files(auth(), ["/reports/q1.pdf", "/reports/notes.txt"])
                .with_config(config);
        let docs = loader.load_with(&api).await;

        assert!(loader.errors().is_empty());
        assert_eq!(docs.len(), 3);
        assert_eq!(docs[0].page_content, "Hello page one");
        assert_eq!(docs[0].metadata.page, Some(0));
        assert_eq!(docs[1].page_content, "Second page");
        assert_eq!(docs[1].metadata.page, Some(1));
        assert_eq!(docs[1].metadata.source, "/reports/q1.pdf");
        assert_eq!(docs[1].metadata.total_pages, Some(2));
        // Only PDFs are split
        assert_eq!(docs[2].page_content, "plain");
        assert_eq!(docs[2].metadata.page, None);

        let mut whole = DropboxLoader::for_file(auth(), "/reports/q1.pdf");
        let docs = whole.load_with(&api).await;
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].page_content, "Hello page one\n\nSecond page");
        assert_eq!(docs[0].metadata.page, None);
    }

    #[tokio::test]
    async fn test_client_construction_failure_is_session_error() {
        // App credentials but no refresh token: the client cannot be built
        let mut loader = DropboxLoader::for_folder(auth(), "/Docs")
            .with_app_credentials("key", "secret");
        let docs = loader.load().await;

        assert!(docs.is_empty());
        assert_eq!(loader.errors().len(), 1);
        assert!(loader.errors()[0].folder.is_none());
        assert!(loader.errors()[0].file.is_none());
    }

    #[tokio::test]
    async fn test_load_against_http_api() {
        use wiremock::matchers::{body_json, header, method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/2/files/list_folder"))
            .and(header("Authorization", "Bearer tok"))
            .and(body_json(serde_json::json!({
                "path": "",
                "recursive": true,
                "include_deleted": false
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "entries": [
                    {".tag": "file", "name": "Readme.txt", "id": "id:1",
                     "path_lower": "/readme.txt", "path_display": "/Readme.txt", "size": 5},
                    {".tag": "file", "name": "song.mp3", "id": "id:2",
                     "path_lower": "/song.mp3", "path_display": "/song.mp3", "size": 9}
                ],
                "cursor": "c1",
                "has_more": false
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/2/files/download"))
            .and(header("Dropbox-API-Arg", r#"{"path":"/readme.txt"}"#))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header(
                        "Dropbox-API-Result",
                        r#"{"name": "Readme.txt", "id": "id:1", "path_lower": "/readme.txt", "size": 5}"#,
                    )
                    .set_body_bytes(b"hello".to_vec()),
            )
            .mount(&server)
            .await;

        let config = LoaderConfig {
            dropbox: DropboxConfig {
                retry_backoff_ms: 0,
                ..DropboxConfig::with_base_url(server.uri())
            },
            ..LoaderConfig::default()
        };
        let mut loader = DropboxLoader::for_folder(auth(), "/").with_config(config);
        let docs = loader.load().await;

        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].page_content, "hello");
        assert_eq!(docs[0].metadata.source, "/readme.txt");
        assert_eq!(docs[0].metadata.file_name, "Readme.txt");
        assert_eq!(docs[0].metadata.size, Some(5));
        assert_eq!(loader.invalid_files(), ["/song.mp3"]);
        assert!(loader.errors().is_empty());
    }
}
