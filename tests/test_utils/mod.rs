//! Test utilities for integration tests
use std::fs;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use docx_rs::{Docx, Paragraph, Run};

use assessbot::openai::{CompletionClient, CompletionError, Message};

/// A request as the completion client received it.
#[derive(Clone, Debug)]
pub struct RecordedRequest {
    pub api_key: String,
    pub model: String,
    pub messages: Vec<Message>,
}

/// Completion client that answers from a fixed script and records
/// every request it receives.
#[derive(Clone, Default)]
pub struct ScriptedClient {
    replies: Arc<Mutex<Vec<Result<String, String>>>>,
    pub requests: Arc<Mutex<Vec<RecordedRequest>>>,
}

impl ScriptedClient {
    pub fn new(replies: Vec<Result<&str, &str>>) -> Self {
        let replies = replies
            .into_iter()
            .rev()
            .map(|r| r.map(String::from).map_err(String::from))
            .collect();
        Self {
            replies: Arc::new(Mutex::new(replies)),
            requests: Arc::default(),
        }
    }
}

#[async_trait]
impl CompletionClient for ScriptedClient {
    async fn complete(
        &self,
        api_key: &str,
        model: &str,
        messages: &[Message],
    ) -> Result<String, CompletionError> {
        self.requests.lock().unwrap().push(RecordedRequest {
            api_key: api_key.to_string(),
            model: model.to_string(),
            messages: messages.to_vec(),
        });
        self.replies
            .lock()
            .unwrap()
            .pop()
            .unwrap_or(Err("script exhausted".to_string()))
            .map_err(CompletionError::Api)
    }
}

/// Bytes of a DOCX document with one paragraph per entry.
pub fn docx_bytes(paragraphs: &[&str]) -> Vec<u8> {
    let mut docx = Docx::new();
    for text in paragraphs.iter() {
        docx = docx.add_paragraph(Paragraph::new().add_run(Run::new().add_text(*text)));
    }
    let mut buf = Cursor::new(Vec::new());
    docx.build()
        .pack(&mut buf)
        .expect("Failed to pack docx");
    buf.into_inner()
}

/// Writes a DOCX document into `dir` and returns its path.
pub fn write_docx(dir: &Path, filename: &str, paragraphs: &[&str]) -> PathBuf {
    let path = dir.join(filename);
    fs::write(&path, docx_bytes(paragraphs)).expect("Failed to write docx");
    path
}
