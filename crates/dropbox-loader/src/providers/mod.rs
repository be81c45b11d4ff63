//! Dropbox API abstraction and its HTTP implementation
//!
//! The loader only talks to [`DropboxApi`]; [`dropbox::DropboxClient`] is the
//! production backend.

pub mod dropbox;
pub mod dropbox_api;

pub use dropbox_api::DropboxApi;
