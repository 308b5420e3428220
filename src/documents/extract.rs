//! Plain text extraction from uploaded documents.
//!
//! Only PDF and DOCX are supported. There is no OCR and no attempt to
//! preserve layout: DOCX yields one line per top level paragraph and
//! PDF yields the text of each page, without the blank lines around
//! it, followed by a newline.

use std::path::Path;

use docx_rs::{DocumentChild, ParagraphChild, Run, RunChild};
use thiserror::Error;

pub const PDF_MIME: &str = "application/pdf";
pub const DOCX_MIME: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document";

#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("unsupported document type: {0}")]
    Unsupported(String),

    #[error("failed to read document: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse PDF: {0}")]
    Pdf(String),

    #[error("failed to parse DOCX: {0}")]
    Docx(String),

    #[error("document extraction task failed: {0}")]
    Task(String),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DocumentKind {
    Pdf,
    Docx,
}

impl DocumentKind {
    /// Select the extractor from a declared MIME type.
    pub fn from_mime(mime: &str) -> Result<Self, ExtractionError> {
        match mime.trim().to_lowercase().as_str() {
            PDF_MIME => Ok(DocumentKind::Pdf),
            DOCX_MIME => Ok(DocumentKind::Docx),
            other => Err(ExtractionError::Unsupported(other.to_string())),
        }
    }

    /// Select the extractor from a file extension, for documents read
    /// straight from disk.
    pub fn from_path(path: &Path) -> Result<Self, ExtractionError> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())
            .unwrap_or_default();
        match ext.as_str() {
            "pdf" => Ok(DocumentKind::Pdf),
            "docx" => Ok(DocumentKind::Docx),
            _ => Err(ExtractionError::Unsupported(path.display().to_string())),
        }
    }
}

/// A document as handed over by the user, before extraction.
#[derive(Clone, Debug)]
pub struct UploadedFile {
    pub filename: String,
    pub bytes: Vec<u8>,
    pub kind: DocumentKind,
}

impl UploadedFile {
    pub fn new(filename: &str, bytes: Vec<u8>, kind: DocumentKind) -> Self {
        Self {
            filename: filename.to_string(),
            bytes,
            kind,
        }
    }

    /// Build an upload from a declared MIME type. Anything other than
    /// PDF or DOCX is rejected here rather than at extraction time.
    pub fn with_mime(filename: &str, bytes: Vec<u8>, mime: &str) -> Result<Self, ExtractionError> {
        Ok(Self::new(filename, bytes, DocumentKind::from_mime(mime)?))
    }

    pub fn from_path(path: &Path) -> Result<Self, ExtractionError> {
        let kind = DocumentKind::from_path(path)?;
        let bytes = std::fs::read(path)?;
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| path.display().to_string());
        Ok(Self::new(&filename, bytes, kind))
    }
}

pub fn extract(bytes: &[u8], kind: DocumentKind) -> Result<String, ExtractionError> {
    match kind {
        DocumentKind::Pdf => extract_pdf(bytes),
        DocumentKind::Docx => extract_docx(bytes),
    }
}

/// Runs `extract` on the blocking thread pool.
///
/// Parsing is CPU bound and the PDF parser is known to panic on some
/// malformed input. A panic on the blocking thread comes back as a
/// `JoinError` so it surfaces as an `ExtractionError` instead of
/// taking the session down.
pub async fn extract_blocking(bytes: Vec<u8>, kind: DocumentKind) -> Result<String, ExtractionError> {
    tokio::task::spawn_blocking(move || extract(&bytes, kind))
        .await
        .map_err(|e| ExtractionError::Task(e.to_string()))?
}

fn extract_pdf(bytes: &[u8]) -> Result<String, ExtractionError> {
    let pages = pdf_extract::extract_text_from_mem_by_pages(bytes)
        .map_err(|e| ExtractionError::Pdf(e.to_string()))?;

    // Blank lines pdf-extract puts around each page are dropped
    let mut text = String::new();
    for page in pages.iter() {
        text.push_str(page.trim_matches(|c| c == '\n' || c == '\r'));
        text.push('\n');
    }
    Ok(text)
}

fn extract_docx(bytes: &[u8]) -> Result<String, ExtractionError> {
    let docx = docx_rs::read_docx(bytes).map_err(|e| ExtractionError::Docx(e.to_string()))?;

    // Only top level body paragraphs count, table contents are skipped
    let mut text = String::new();
    for child in docx.document.children.iter() {
        if let DocumentChild::Paragraph(paragraph) = child {
            push_paragraph_children(&paragraph.children, &mut text);
            text.push('\n');
        }
    }
    Ok(text)
}

fn push_paragraph_children(children: &[ParagraphChild], out: &mut String) {
    for child in children.iter() {
        match child {
            ParagraphChild::Run(run) => push_run(run, out),
            ParagraphChild::Hyperlink(link) => push_paragraph_children(&link.children, out),
            _ => {}
        }
    }
}

fn push_run(run: &Run, out: &mut String) {
    for child in run.children.iter() {
        match child {
            RunChild::Text(t) => out.push_str(&t.text),
            RunChild::Tab(_) => out.push('\t'),
            RunChild::Break(_) => out.push('\n'),
            _ => {}
        }
    }
}
