//! Document, file type and load-report types

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Extensions the loader knows how to turn into text
pub const ALLOWED_EXTENSIONS: &[&str] = &[
    "md", "htm", "html", "docx", "xls", "xlsx", "pptx", "pdf", "rtf", "txt",
];

/// Supported file types
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FileType {
    /// Markdown file
    Markdown,
    /// HTML document
    Html,
    /// Microsoft Word document (.docx)
    Docx,
    /// Old Excel spreadsheet (.xls)
    Xls,
    /// Excel spreadsheet (.xlsx)
    Xlsx,
    /// Microsoft PowerPoint presentation (.pptx)
    Pptx,
    /// PDF document
    Pdf,
    /// Rich Text Format
    Rtf,
    /// Plain text file
    Txt,
    /// Anything else
    Unknown,
}

impl FileType {
    /// Detect file type from extension
    pub fn from_extension(ext: &str) -> Self {
        match ext.to_lowercase().as_str() {
            "md" => Self::Markdown,
            "htm" | "html" => Self::Html,
            "docx" => Self::Docx,
            "xls" => Self::Xls,
            "xlsx" => Self::Xlsx,
            "pptx" => Self::Pptx,
            "pdf" => Self::Pdf,
            "rtf" => Self::Rtf,
            "txt" => Self::Txt,
            _ => Self::Unknown,
        }
    }

    /// Detect file type from the extension of a Dropbox path or file name
    pub fn from_path(path: &str) -> Self {
        Path::new(path)
            .extension()
            .and_then(|e| e.to_str())
            .map(Self::from_extension)
            .unwrap_or(Self::Unknown)
    }

    /// Check if this is a supported file type
    pub fn is_supported(&self) -> bool {
        !matches!(self, Self::Unknown)
    }

    /// Get display name
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Markdown => "Markdown",
            Self::Html => "HTML",
            Self::Docx => "Word Document (.docx)",
            Self::Xls => "Excel Spreadsheet (.xls)",
            Self::Xlsx => "Excel Spreadsheet (.xlsx)",
            Self::Pptx => "PowerPoint (.pptx)",
            Self::Pdf => "PDF",
            Self::Rtf => "Rich Text Format",
            Self::Txt => "Text File",
            Self::Unknown => "Unknown",
        }
    }
}

/// A loaded document: extracted text plus where it came from
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    /// Extracted plain text
    pub page_content: String,
    /// Source information
    pub metadata: DocumentMetadata,
}

/// Metadata attached to every loaded document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentMetadata {
    /// Dropbox path the text was loaded from
    pub source: String,
    /// Always "file"
    pub kind: String,
    /// Page index (0-based) when a PDF is split per page
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
    /// Last path component
    pub file_name: String,
    /// File type
    pub file_type: FileType,
    /// SHA-256 of the extracted text
    pub content_hash: String,
    /// Total pages, sheets or slides (if applicable)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_pages: Option<u32>,
    /// File size in bytes as reported by Dropbox
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    /// Server modification time as reported by Dropbox
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_modified: Option<String>,
}

impl DocumentMetadata {
    /// Metadata for a file at `source`
    pub fn file(source: impl Into<String>, file_type: FileType, content_hash: String) -> Self {
        let source = source.into();
        let file_name = source.rsplit('/').next().unwrap_or_default().to_string();
        Self {
            source,
            kind: "file".to_string(),
            page: None,
            file_name,
            file_type,
            content_hash,
            total_pages: None,
            size: None,
            server_modified: None,
        }
    }
}

/// One failed folder or file operation
///
/// Serializes to `{"message": ..., "folder": ...}`, `{"message": ..., "file": ...}`
/// or just `{"message": ...}` for failures that happen before any path is touched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadError {
    /// Human-readable failure description
    pub message: String,
    /// Folder being listed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub folder: Option<String>,
    /// File being downloaded or parsed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
}

impl LoadError {
    /// Folder-level failure
    pub fn folder(message: impl Into<String>, folder: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            folder: Some(folder.into()),
            file: None,
        }
    }

    /// File-level failure
    pub fn file(message: impl Into<String>, file: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            folder: None,
            file: Some(file.into()),
        }
    }

    /// Failure not tied to a path (e.g. the client could not be built)
    pub fn session(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            folder: None,
            file: None,
        }
    }
}
