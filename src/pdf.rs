//! Text-layer boundary for uploaded documents.
//!
//! The ingestion pipeline never touches document bytes directly; it works
//! against [`PageLayer`], which exposes the first page's text, substring
//! search, and table recovery. [`TextPage`] is the concrete layer used for
//! both PDF uploads (via lopdf text extraction) and plain-text uploads.

use anyhow::Context;

/// One extracted table: rows of cells, header row included. A missing cell
/// is `None`.
pub type Table = Vec<Vec<Option<String>>>;

pub trait PageLayer {
    fn text(&self) -> &str;
    /// An empty match set means "not found".
    fn search(&self, needle: &str) -> bool;
    /// `None` when no tabular region can be recovered from the page.
    fn extract_table(&self) -> Option<Table>;
}

/// A page reduced to its text layer. Table recovery treats the largest
/// contiguous block of multi-cell lines as the mark table; cells within a
/// line are separated by tabs or runs of two-plus spaces (single spaces stay
/// inside a cell, e.g. "Data Structures").
pub struct TextPage {
    text: String,
}

impl TextPage {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }

    pub fn from_utf8(bytes: &[u8]) -> anyhow::Result<Self> {
        let text = std::str::from_utf8(bytes).context("document is not valid UTF-8 text")?;
        Ok(Self::new(text))
    }
}

impl PageLayer for TextPage {
    fn text(&self) -> &str {
        &self.text
    }

    fn search(&self, needle: &str) -> bool {
        self.text.contains(needle)
    }

    fn extract_table(&self) -> Option<Table> {
        let mut best: Vec<Vec<String>> = Vec::new();
        let mut current: Vec<Vec<String>> = Vec::new();

        for line in self.text.lines() {
            let cells = split_cells(line);
            if cells.len() >= 2 {
                current.push(cells);
            } else {
                if current.len() > best.len() {
                    best = std::mem::take(&mut current);
                }
                current.clear();
            }
        }
        if current.len() > best.len() {
            best = current;
        }

        if best.is_empty() {
            return None;
        }
        Some(
            best.into_iter()
                .map(|row| row.into_iter().map(Some).collect())
                .collect(),
        )
    }
}

fn split_cells(line: &str) -> Vec<String> {
    line.replace('\t', "  ")
        .split("  ")
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .map(str::to_string)
        .collect()
}

/// Opens an uploaded document and reduces its first page to a [`TextPage`].
/// PDF uploads go through lopdf's text extraction; anything else is decoded
/// as UTF-8 (deployments may configure a non-PDF expected document type).
pub fn open_first_page(file_name: &str, bytes: &[u8]) -> anyhow::Result<TextPage> {
    let is_pdf = file_name
        .rsplit('.')
        .next()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"));
    if !is_pdf {
        return TextPage::from_utf8(bytes);
    }
    let doc = lopdf::Document::load_mem(bytes).context("parse pdf document")?;
    // Page numbers are 1-based in lopdf.
    let text = doc.extract_text(&[1]).context("extract first page text")?;
    Ok(TextPage::new(text))
}
