//! Text extraction with multi-format parsing

#[cfg(test)]
pub(crate) mod fixtures;
mod parser;
mod rtf;

pub(crate) use parser::hash_content;
pub use parser::{FileParser, PageContent, ParsedDocument};
pub use rtf::rtf_to_text;
