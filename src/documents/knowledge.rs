//! The knowledge base: extracted text from every uploaded document,
//! concatenated in upload order with a header naming its source.

use super::extract::{ExtractionError, UploadedFile, extract_blocking};

/// Text extracted from a single uploaded document.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExtractedDocument {
    pub filename: String,
    pub text: String,
}

impl ExtractedDocument {
    pub fn new(filename: &str, text: &str) -> Self {
        Self {
            filename: filename.to_string(),
            text: text.to_string(),
        }
    }
}

pub fn build(documents: &[ExtractedDocument]) -> String {
    documents
        .iter()
        .map(|d| format!("\n--- Content from {} ---\n{}\n", d.filename, d.text))
        .collect()
}

/// What happened to the knowledge base after the uploaded file set
/// changed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KnowledgeUpdate {
    Rebuilt { files: usize, chars: usize },
    /// The file set shrank. Partial removal isn't supported so
    /// everything is dropped until the next upload.
    Cleared,
    Unchanged,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct KnowledgeBase {
    text: String,
    file_count: usize,
}

impl KnowledgeBase {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    /// Number of files in the last recorded upload set.
    pub fn file_count(&self) -> usize {
        self.file_count
    }

    /// Replace the contents with already extracted documents.
    pub fn replace(&mut self, documents: &[ExtractedDocument]) {
        self.text = build(documents);
        self.file_count = documents.len();
    }

    /// Recompute from the full uploaded file set.
    ///
    /// Any decrease in the number of files clears the text entirely.
    /// Extraction is all or nothing: if one file fails the knowledge
    /// base and the recorded set are left exactly as they were.
    pub async fn update(&mut self, files: &[UploadedFile]) -> Result<KnowledgeUpdate, ExtractionError> {
        if files.len() < self.file_count {
            self.text.clear();
            self.file_count = files.len();
            return Ok(KnowledgeUpdate::Cleared);
        }

        if files.is_empty() {
            return Ok(KnowledgeUpdate::Unchanged);
        }

        let mut documents = Vec::with_capacity(files.len());
        for file in files.iter() {
            let text = extract_blocking(file.bytes.clone(), file.kind)
                .await
                .inspect_err(|e| {
                    tracing::warn!(filename = %file.filename, error = %e, "Document extraction failed")
                })?;
            documents.push(ExtractedDocument::new(&file.filename, &text));
        }

        self.replace(&documents);

        Ok(KnowledgeUpdate::Rebuilt {
            files: documents.len(),
            chars: self.text.chars().count(),
        })
    }
}
