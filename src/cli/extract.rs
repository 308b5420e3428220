use std::path::Path;

use anyhow::Result;

use crate::documents::{UploadedFile, extract_blocking};

/// Print the text of a document exactly as it would be merged into
/// the knowledge base.
pub async fn run(path: &Path) -> Result<()> {
    let file = UploadedFile::from_path(path)?;
    tracing::debug!(filename = %file.filename, kind = ?file.kind, bytes = file.bytes.len(), "Extracting");
    let text = extract_blocking(file.bytes, file.kind).await?;
    print!("{}", text);
    Ok(())
}
