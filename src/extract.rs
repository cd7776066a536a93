//! Page-level text extraction for uploaded documents.
//!
//! PDFs are parsed page by page with `pdf-extract`; plain-text and Markdown
//! files become a single page. The document type comes from the file
//! extension, falling back to the `%PDF-` header when there is none.

use std::panic::{self, AssertUnwindSafe};
use std::path::Path;

use thiserror::Error;

use crate::models::Page;

const PDF_MAGIC: &[u8] = b"%PDF-";

/// File extensions [`extract_pages`] accepts, lowercase.
pub const SUPPORTED_EXTENSIONS: [&str; 4] = ["pdf", "txt", "md", "markdown"];

/// Extraction error. The ingest pipeline turns it into a request failure.
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("unsupported document type: {0}")]
    UnsupportedType(String),
    #[error("failed to read document: {0}")]
    Io(#[from] std::io::Error),
    #[error("PDF extraction failed: {0}")]
    Pdf(String),
    #[error("document is not valid UTF-8 text")]
    Encoding,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DocumentKind {
    Pdf,
    PlainText,
}

fn detect_kind(extension: Option<&str>, bytes: &[u8]) -> Result<DocumentKind, ExtractError> {
    match extension.map(|e| e.to_ascii_lowercase()).as_deref() {
        Some("pdf") => Ok(DocumentKind::Pdf),
        Some("txt") | Some("md") | Some("markdown") => Ok(DocumentKind::PlainText),
        Some(other) => Err(ExtractError::UnsupportedType(other.to_string())),
        None if bytes.starts_with(PDF_MAGIC) => Ok(DocumentKind::Pdf),
        None => Err(ExtractError::UnsupportedType("unknown".to_string())),
    }
}

/// Read the document at `path` and return its pages in order.
pub fn extract_pages(path: &Path) -> Result<Vec<Page>, ExtractError> {
    let bytes = std::fs::read(path)?;
    let extension = path.extension().and_then(|e| e.to_str());
    extract_pages_from_mem(&bytes, extension)
}

/// Same as [`extract_pages`] for an in-memory document.
pub fn extract_pages_from_mem(
    bytes: &[u8],
    extension: Option<&str>,
) -> Result<Vec<Page>, ExtractError> {
    let texts = match detect_kind(extension, bytes)? {
        DocumentKind::Pdf => extract_pdf(bytes)?,
        DocumentKind::PlainText => {
            let text = std::str::from_utf8(bytes).map_err(|_| ExtractError::Encoding)?;
            vec![text.to_string()]
        }
    };

    Ok(texts
        .into_iter()
        .enumerate()
        .map(|(i, text)| Page {
            number: i + 1,
            text,
        })
        .collect())
}

fn extract_pdf(bytes: &[u8]) -> Result<Vec<String>, ExtractError> {
    // pdf-extract panics on some malformed inputs instead of returning an error.
    match panic::catch_unwind(AssertUnwindSafe(|| {
        pdf_extract::extract_text_from_mem_by_pages(bytes)
    })) {
        Ok(Ok(pages)) => Ok(pages),
        Ok(Err(e)) => Err(ExtractError::Pdf(e.to_string())),
        Err(_) => Err(ExtractError::Pdf("parser panicked on malformed input".to_string())),
    }
}
