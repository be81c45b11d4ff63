//! Multi-format file parser

use calamine::Reader;
use sha2::{Digest, Sha256};

use super::rtf::rtf_to_text;
use crate::config::ParserConfig;
use crate::error::{Error, Result};
use crate::types::FileType;

/// Glyph names some PDF fonts leak into extracted text
const GLYPH_NAMES: &[(&str, char)] = &[
    ("uni2010", '\u{2010}'),
    ("uni2011", '\u{2011}'),
    ("uni2013", '\u{2013}'),
    ("uni2014", '\u{2014}'),
    ("uni2018", '\u{2018}'),
    ("uni2019", '\u{2019}'),
    ("uni201C", '\u{201C}'),
    ("uni201D", '\u{201D}'),
    ("uni2022", '\u{2022}'),
    ("uni2026", '\u{2026}'),
    ("uni00A0", '\u{00A0}'),
    ("uni2212", '\u{2212}'),
    ("uni20AC", '\u{20AC}'),
];

/// Clean up PDF text: resolve leaked glyph names, flatten typographic
/// characters and ligatures, drop NULs and blank lines
fn cleanup_pdf_text(text: &str) -> String {
    let mut result = text.replace('\0', "");

    for (glyph_name, char_value) in GLYPH_NAMES {
        if result.contains(glyph_name) {
            result = result.replace(glyph_name, &char_value.to_string());
        }
    }

    result = result
        .replace(['\u{2010}', '\u{2011}', '\u{2013}'], "-")
        .replace('\u{2014}', "--")
        .replace(['\u{2018}', '\u{2019}'], "'")
        .replace(['\u{201C}', '\u{201D}'], "\"")
        .replace('\u{2022}', "* ")
        .replace('\u{2026}', "...")
        .replace('\u{00A0}', " ")
        .replace('\u{FB01}', "fi")
        .replace('\u{FB02}', "fl")
        .replace('\u{FB00}', "ff")
        .replace('\u{FB03}', "ffi")
        .replace('\u{FB04}', "ffl");

    result
        .lines()
        .map(|l| l.trim())
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Trim line ends, collapse runs of blank lines, trim the whole text
fn normalize_lines(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut blank_run = 0usize;

    for line in text.lines() {
        let line = line.trim_end();
        if line.trim().is_empty() {
            blank_run += 1;
            if blank_run > 1 {
                continue;
            }
        } else {
            blank_run = 0;
        }
        out.push_str(line);
        out.push('\n');
    }

    out.trim().to_string()
}

/// Parsed document with extracted text
#[derive(Debug, Clone)]
pub struct ParsedDocument {
    /// File type
    pub file_type: FileType,
    /// Extracted text content
    pub content: String,
    /// Content hash for deduplication
    pub content_hash: String,
    /// Total pages, sheets or slides (if applicable)
    pub total_pages: Option<u32>,
    /// Page-level content (PDF pages, sheets, slides)
    pub pages: Vec<PageContent>,
}

impl ParsedDocument {
    fn new(file_type: FileType, content: String) -> Self {
        Self {
            file_type,
            content_hash: hash_content(&content),
            content,
            total_pages: None,
            pages: Vec::new(),
        }
    }
}

/// Content from a single page
#[derive(Debug, Clone)]
pub struct PageContent {
    /// Page number (1-indexed)
    pub page_number: u32,
    /// Text content of the page
    pub content: String,
}

/// Multi-format file parser
#[derive(Debug, Clone)]
pub struct FileParser {
    config: ParserConfig,
}

impl FileParser {
    /// Create a parser
    pub fn new(config: ParserConfig) -> Self {
        Self { config }
    }

    /// Parse a file based on its extension
    pub fn parse(&self, filename: &str, data: &[u8]) -> Result<ParsedDocument> {
        let file_type = FileType::from_path(filename);

        match file_type {
            FileType::Txt => Ok(Self::parse_text(data)),
            FileType::Markdown => Ok(Self::parse_markdown(data)),
            FileType::Html => Ok(Self::parse_html(data)),
            FileType::Rtf => Ok(Self::parse_rtf(data)),
            FileType::Docx => Self::parse_docx(filename, data),
            FileType::Xls | FileType::Xlsx => Self::parse_spreadsheet(filename, data, file_type),
            FileType::Pptx => Self::parse_pptx(filename, data),
            FileType::Pdf => self.parse_pdf(filename, data),
            FileType::Unknown => Err(Error::UnsupportedFileType(filename.to_string())),
        }
    }

    /// Parse plain text
    fn parse_text(data: &[u8]) -> ParsedDocument {
        let text = String::from_utf8_lossy(data);
        let content = text.trim_start_matches('\u{feff}').trim().to_string();
        ParsedDocument::new(FileType::Txt, content)
    }

    /// Parse markdown into plain text
    fn parse_markdown(data: &[u8]) -> ParsedDocument {
        use pulldown_cmark::{Event, Parser, TagEnd};

        let text = String::from_utf8_lossy(data);
        let mut content = String::new();

        for event in Parser::new(&text) {
            match event {
                Event::Text(t) | Event::Code(t) => content.push_str(&t),
                Event::SoftBreak | Event::HardBreak => content.push('\n'),
                Event::End(
                    TagEnd::Paragraph | TagEnd::Heading(_) | TagEnd::Item | TagEnd::CodeBlock,
                ) => content.push('\n'),
                _ => {}
            }
        }

        ParsedDocument::new(FileType::Markdown, normalize_lines(&content))
    }

    /// Parse HTML: text nodes outside script/style, joined by spaces
    fn parse_html(data: &[u8]) -> ParsedDocument {
        let html = String::from_utf8_lossy(data);
        let document = scraper::Html::parse_document(&html);
        let mut parts: Vec<String> = Vec::new();

        for node in document.root_element().descendants() {
            let scraper::Node::Text(text) = node.value() else {
                continue;
            };

            let hidden = node
                .parent()
                .and_then(|parent| parent.value().as_element())
                .map(|el| matches!(el.name(), "script" | "style" | "noscript" | "template"))
                .unwrap_or(false);
            if hidden {
                continue;
            }

            let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
            if !collapsed.is_empty() {
                parts.push(collapsed);
            }
        }

        ParsedDocument::new(FileType::Html, parts.join(" "))
    }

    /// Parse Rich Text Format
    fn parse_rtf(data: &[u8]) -> ParsedDocument {
        let rtf = String::from_utf8_lossy(data);
        ParsedDocument::new(FileType::Rtf, normalize_lines(&rtf_to_text(&rtf)))
    }

    /// Parse DOCX document: paragraphs and table cells, one line each
    fn parse_docx(filename: &str, data: &[u8]) -> Result<ParsedDocument> {
        let doc = docx_rs::read_docx(data)
            .map_err(|e| Error::file_parse(filename, e.to_string()))?;

        let mut lines = Vec::new();
        for child in &doc.document.children {
            match child {
                docx_rs::DocumentChild::Paragraph(p) => lines.push(docx_paragraph_text(p)),
                docx_rs::DocumentChild::Table(table) => docx_table_lines(table, &mut lines),
                _ => {}
            }
        }

        Ok(ParsedDocument::new(
            FileType::Docx,
            normalize_lines(&lines.join("\n")),
        ))
    }

    /// Parse Excel spreadsheet (.xls or .xlsx), one page per sheet
    fn parse_spreadsheet(filename: &str, data: &[u8], file_type: FileType) -> Result<ParsedDocument> {
        let cursor = std::io::Cursor::new(data);
        let mut workbook = calamine::open_workbook_auto_from_rs(cursor)
            .map_err(|e| Error::file_parse(filename, e.to_string()))?;

        let mut content = String::new();
        let mut pages = Vec::new();
        let mut page_number = 0u32;

        for sheet_name in workbook.sheet_names().to_vec() {
            page_number += 1;

            match workbook.worksheet_range(&sheet_name) {
                Ok(range) => {
                    let mut sheet_content = format!("Sheet: {}\n", sheet_name);

                    for row in range.rows() {
                        let cells: Vec<String> = row
                            .iter()
                            .map(|cell| match cell {
                                calamine::Data::Empty => String::new(),
                                calamine::Data::String(s) => s.clone(),
                                calamine::Data::Float(f) => f.to_string(),
                                calamine::Data::Int(i) => i.to_string(),
                                calamine::Data::Bool(b) => b.to_string(),
                                calamine::Data::DateTime(dt) => dt.to_string(),
                                calamine::Data::DateTimeIso(s) | calamine::Data::DurationIso(s) => {
                                    s.clone()
                                }
                                _ => String::new(),
                            })
                            .filter(|text| !text.is_empty())
                            .collect();

                        if !cells.is_empty() {
                            sheet_content.push_str(&cells.join(" | "));
                            sheet_content.push('\n');
                        }
                    }

                    content.push_str(&sheet_content);
                    content.push('\n');

                    pages.push(PageContent {
                        page_number,
                        content: sheet_content.trim_end().to_string(),
                    });
                }
                Err(e) => {
                    tracing::debug!("Skipping sheet '{}' in {}: {}", sheet_name, filename, e);
                }
            }
        }

        let mut parsed = ParsedDocument::new(file_type, content.trim().to_string());
        parsed.total_pages = Some(page_number);
        parsed.pages = pages;
        Ok(parsed)
    }

    /// Parse PowerPoint presentation (.pptx)
    fn parse_pptx(filename: &str, data: &[u8]) -> Result<ParsedDocument> {
        use std::io::Read;

        let cursor = std::io::Cursor::new(data);
        let mut archive = zip::ZipArchive::new(cursor)
            .map_err(|e| Error::file_parse(filename, e.to_string()))?;

        // ppt/slides/slide1.xml, slide2.xml, ... sorted numerically
        let mut slide_names: Vec<(u32, String)> = archive
            .file_names()
            .filter(|name| name.starts_with("ppt/slides/slide") && name.ends_with(".xml"))
            .filter_map(|name| {
                name.trim_start_matches("ppt/slides/slide")
                    .trim_end_matches(".xml")
                    .parse::<u32>()
                    .ok()
                    .map(|n| (n, name.to_string()))
            })
            .collect();
        slide_names.sort_by_key(|(n, _)| *n);

        let mut content = String::new();
        let mut pages = Vec::new();
        let mut slide_number = 0u32;

        for (_, slide_name) in slide_names {
            slide_number += 1;

            let mut xml_content = String::new();
            let read = archive
                .by_name(&slide_name)
                .map_err(|e| e.to_string())
                .and_then(|mut file| {
                    file.read_to_string(&mut xml_content)
                        .map_err(|e| e.to_string())
                });
            if let Err(e) = read {
                tracing::debug!("Skipping {} in {}: {}", slide_name, filename, e);
                continue;
            }

            let slide_text = extract_text_from_pptx_xml(&xml_content);
            if !slide_text.is_empty() {
                content.push_str(&format!("Slide {}:\n{}\n\n", slide_number, slide_text));
                pages.push(PageContent {
                    page_number: slide_number,
                    content: slide_text,
                });
            }
        }

        let mut parsed = ParsedDocument::new(FileType::Pptx, content.trim().to_string());
        parsed.total_pages = (slide_number > 0).then_some(slide_number);
        parsed.pages = pages;
        Ok(parsed)
    }

    /// Parse PDF document page by page
    fn parse_pdf(&self, filename: &str, data: &[u8]) -> Result<ParsedDocument> {
        let raw_pages = self.extract_pdf_pages_with_timeout(filename, data)?;

        let pages: Vec<PageContent> = raw_pages
            .iter()
            .enumerate()
            .map(|(i, text)| PageContent {
                page_number: i as u32 + 1,
                content: cleanup_pdf_text(text),
            })
            .collect();

        let content = pages
            .iter()
            .map(|p| p.content.as_str())
            .filter(|c| !c.is_empty())
            .collect::<Vec<_>>()
            .join("\n\n");

        if content.trim().is_empty() {
            return Err(Error::file_parse(
                filename,
                "No text content could be extracted from PDF",
            ));
        }

        let mut parsed = ParsedDocument::new(FileType::Pdf, content);
        parsed.total_pages = Some(pages.len() as u32);
        parsed.pages = pages;
        Ok(parsed)
    }

    /// Extract PDF page texts on a worker thread so problematic fonts cannot
    /// hang the load; falls back to lopdf on failure or timeout
    fn extract_pdf_pages_with_timeout(&self, filename: &str, data: &[u8]) -> Result<Vec<String>> {
        use std::sync::mpsc;
        use std::thread;
        use std::time::Duration;

        let data_vec = data.to_vec();
        let (tx, rx) = mpsc::channel();

        let handle = thread::spawn(move || {
            let result = pdf_extract::extract_text_from_mem_by_pages(&data_vec);
            let _ = tx.send(result);
        });

        match rx.recv_timeout(Duration::from_secs(self.config.pdf_timeout_secs)) {
            Ok(Ok(pages)) => {
                let _ = handle.join();
                Ok(pages)
            }
            Ok(Err(e)) => {
                let _ = handle.join();
                tracing::warn!("pdf-extract failed for {}: {}, trying fallback", filename, e);
                Self::extract_pdf_pages_fallback(filename, data)
            }
            Err(mpsc::RecvTimeoutError::Timeout) => {
                // The worker cannot be killed; leave it detached
                tracing::error!(
                    "PDF extraction timeout after {}s for {}",
                    self.config.pdf_timeout_secs,
                    filename
                );
                Self::extract_pdf_pages_fallback(filename, data)
            }
            Err(mpsc::RecvTimeoutError::Disconnected) => {
                tracing::error!("PDF extraction thread crashed for {}", filename);
                Self::extract_pdf_pages_fallback(filename, data)
            }
        }
    }

    /// Fallback PDF text extraction using lopdf directly
    fn extract_pdf_pages_fallback(filename: &str, data: &[u8]) -> Result<Vec<String>> {
        let doc = lopdf::Document::load_mem(data)
            .map_err(|e| Error::file_parse(filename, format!("Failed to load PDF: {}", e)))?;

        let mut texts = Vec::new();
        for page_num in doc.get_pages().keys() {
            match doc.extract_text(&[*page_num]) {
                Ok(text) => texts.push(text),
                Err(e) => {
                    tracing::debug!("Could not extract page {} of {}: {}", page_num, filename, e);
                    texts.push(String::new());
                }
            }
        }

        Ok(texts)
    }
}

impl Default for FileParser {
    fn default() -> Self {
        Self::new(ParserConfig::default())
    }
}

fn docx_paragraph_text(paragraph: &docx_rs::Paragraph) -> String {
    let mut text = String::new();
    for child in &paragraph.children {
        if let docx_rs::ParagraphChild::Run(run) = child {
            for run_child in &run.children {
                match run_child {
                    docx_rs::RunChild::Text(t) => text.push_str(&t.text),
                    docx_rs::RunChild::Tab(_) => text.push('\t'),
                    docx_rs::RunChild::Break(_) => text.push('\n'),
                    _ => {}
                }
            }
        }
    }
    text
}

/// One line per table row, cells separated by " | "
#[allow(irrefutable_let_patterns)]
fn docx_table_lines(table: &docx_rs::Table, lines: &mut Vec<String>) {
    for row in &table.rows {
        let docx_rs::TableChild::TableRow(row) = row else {
            continue;
        };

        let mut cells = Vec::new();
        for cell in &row.cells {
            let docx_rs::TableRowChild::TableCell(cell) = cell else {
                continue;
            };

            let cell_text = cell
                .children
                .iter()
                .filter_map(|content| match content {
                    docx_rs::TableCellContent::Paragraph(p) => Some(docx_paragraph_text(p)),
                    _ => None,
                })
                .collect::<Vec<_>>()
                .join(" ");
            cells.push(cell_text.trim().to_string());
        }

        if cells.iter().any(|c| !c.is_empty()) {
            lines.push(cells.join(" | "));
        }
    }
}

/// Extract text from PowerPoint slide XML (`<a:t>` elements)
fn extract_text_from_pptx_xml(xml: &str) -> String {
    use quick_xml::events::Event;
    use quick_xml::Reader;

    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut text_parts = Vec::new();
    let mut in_text_element = false;
    let mut current_text = String::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                if e.local_name().as_ref() == b"t" {
                    in_text_element = true;
                    current_text.clear();
                }
            }
            Ok(Event::Text(e)) => {
                if in_text_element {
                    if let Ok(text) = e.unescape() {
                        current_text.push_str(&text);
                    }
                }
            }
            Ok(Event::End(e)) => {
                let name = e.local_name();
                if name.as_ref() == b"t" && in_text_element {
                    if !current_text.trim().is_empty() {
                        text_parts.push(current_text.trim().to_string());
                    }
                    in_text_element = false;
                }
                // Line break after paragraphs
                if name.as_ref() == b"p" && !text_parts.is_empty() {
                    text_parts.push("\n".to_string());
                }
            }
            Ok(Event::Eof) => break,
            Err(_) => break,
            _ => {}
        }
    }

    text_parts
        .join(" ")
        .lines()
        .map(|l| l.trim())
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Hash content for deduplication
pub(crate) fn hash_content(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}
