//! Core types for the loader

pub mod document;

pub use document::{Document, DocumentMetadata, FileType, LoadError, ALLOWED_EXTENSIONS};
