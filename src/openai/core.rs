use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use thiserror::Error;

#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Eq)]
pub enum Role {
    #[serde(rename = "system")]
    System,
    #[serde(rename = "assistant")]
    Assistant,
    #[serde(rename = "user")]
    User,
}

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, Eq)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn new(role: Role, content: &str) -> Self {
        Message {
            role,
            content: content.to_string(),
        }
    }
}

#[derive(Debug, Error)]
pub enum CompletionError {
    #[error("request to the completion API failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Error description returned by the API itself, e.g. an invalid key.
    #[error("{0}")]
    Api(String),

    #[error("no message received. Resp: {0}")]
    ResponseParse(String),
}

/// Anything that can turn a list of chat messages into the next
/// assistant reply.
///
/// The session only ever needs a single reply per request so the
/// contract is deliberately narrow. Implementations own their own
/// transport concerns (timeouts, hostnames).
#[async_trait]
pub trait CompletionClient: Send + Sync {
    async fn complete(
        &self,
        api_key: &str,
        model: &str,
        messages: &[Message],
    ) -> Result<String, CompletionError>;
}

pub type BoxedCompletionClient = Box<dyn CompletionClient + 'static>;

pub async fn completion(
    messages: &[Message],
    api_hostname: &str,
    api_key: &str,
    model: &str,
) -> Result<Value, CompletionError> {
    let payload = json!({
        "model": model,
        "messages": messages,
    });
    let url = format!("{}/v1/chat/completions", api_hostname.trim_end_matches("/"));
    let response: Value = reqwest::Client::new()
        .post(url)
        .bearer_auth(api_key)
        .header("Content-Type", "application/json")
        .timeout(Duration::from_secs(60 * 10))
        .json(&payload)
        .send()
        .await?
        .json()
        .await?;

    // OpenAI compatible APIs report failures in the body, usually
    // alongside a non-2xx status
    if let Some(err) = response.get("error").filter(|e| !e.is_null()) {
        let description = err["message"]
            .as_str()
            .map(String::from)
            .unwrap_or_else(|| err.to_string());
        return Err(CompletionError::Api(description));
    }

    Ok(response)
}

/// Pull the assistant's reply out of a chat completion response.
pub fn reply_content(resp: &Value) -> Result<String, CompletionError> {
    resp["choices"][0]["message"]["content"]
        .as_str()
        .map(String::from)
        .ok_or_else(|| CompletionError::ResponseParse(resp.to_string()))
}

/// `CompletionClient` backed by an OpenAI compatible HTTP API.
#[derive(Clone, Debug)]
pub struct OpenAiClient {
    api_hostname: String,
}

impl OpenAiClient {
    pub fn new(api_hostname: &str) -> Self {
        Self {
            api_hostname: api_hostname.to_string(),
        }
    }
}

#[async_trait]
impl CompletionClient for OpenAiClient {
    async fn complete(
        &self,
        api_key: &str,
        model: &str,
        messages: &[Message],
    ) -> Result<String, CompletionError> {
        let resp = completion(messages, &self.api_hostname, api_key, model).await?;
        reply_content(&resp)
    }
}
