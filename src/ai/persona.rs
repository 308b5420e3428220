//! The assistant's persona: title, system role, greeting and context
//! template, plus an optional API key supplied alongside them.
//!
//! A persona either comes from the built-in prompts or from a JSON
//! payload. Payloads are validated once, here, and are accepted whole
//! or not at all.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use super::prompt::{
    DEFAULT_CONTEXT_TEMPLATE, DEFAULT_INITIAL_CONVERSATION, DEFAULT_SYSTEM_ROLE, DEFAULT_TITLE,
    TemplateError, validate_template,
};

#[derive(Debug, Error)]
pub enum PersonaError {
    #[error("failed to read persona file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse persona: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("persona is missing required field `{0}`")]
    MissingField(&'static str),

    #[error("invalid context template: {0}")]
    Template(#[from] TemplateError),
}

#[derive(Clone, PartialEq, Eq)]
pub struct PersonaConfig {
    pub title: String,
    pub system_role: String,
    pub initial_conversation: String,
    pub context_template: String,
    api_key: Option<String>,
}

impl Default for PersonaConfig {
    fn default() -> Self {
        Self {
            title: DEFAULT_TITLE.to_string(),
            system_role: DEFAULT_SYSTEM_ROLE.to_string(),
            initial_conversation: DEFAULT_INITIAL_CONVERSATION.to_string(),
            context_template: DEFAULT_CONTEXT_TEMPLATE.to_string(),
            api_key: None,
        }
    }
}

// Never print the key
impl fmt::Debug for PersonaConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PersonaConfig")
            .field("title", &self.title)
            .field("system_role", &self.system_role)
            .field("initial_conversation", &self.initial_conversation)
            .field("context_template", &self.context_template)
            .field(
                "api_key",
                &self.api_key.as_ref().map(|_| "[REDACTED]"),
            )
            .finish()
    }
}

/// Loosely typed shape of a persona payload before validation.
#[derive(Deserialize)]
struct PersonaPayload {
    title: Option<String>,
    system_role: Option<String>,
    initial_conversation: Option<String>,
    context_template: Option<String>,
    api_key: Option<String>,
}

impl TryFrom<PersonaPayload> for PersonaConfig {
    type Error = PersonaError;

    fn try_from(payload: PersonaPayload) -> Result<Self, Self::Error> {
        let title = payload.title.ok_or(PersonaError::MissingField("title"))?;
        let system_role = payload
            .system_role
            .ok_or(PersonaError::MissingField("system_role"))?;
        let initial_conversation = payload
            .initial_conversation
            .ok_or(PersonaError::MissingField("initial_conversation"))?;
        let context_template = payload
            .context_template
            .ok_or(PersonaError::MissingField("context_template"))?;
        validate_template(&context_template)?;

        let api_key = payload.api_key.filter(|k| !k.trim().is_empty());

        Ok(Self {
            title,
            system_role,
            initial_conversation,
            context_template,
            api_key,
        })
    }
}

impl PersonaConfig {
    pub fn from_json(payload: &str) -> Result<Self, PersonaError> {
        let payload: PersonaPayload = serde_json::from_str(payload)?;
        Self::try_from(payload)
    }

    pub fn load(path: &Path) -> Result<Self, PersonaError> {
        let payload = std::fs::read_to_string(path).map_err(|source| PersonaError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&payload)
    }

    /// Key supplied with the persona. When set it wins over a key
    /// entered by hand.
    pub fn api_key(&self) -> Option<&str> {
        self.api_key.as_deref()
    }
}

/// Where the active persona comes from.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum PersonaSource {
    #[default]
    BuiltIn,
    File(PathBuf),
}

impl PersonaSource {
    pub fn from_path(path: Option<&Path>) -> Self {
        match path {
            Some(p) => PersonaSource::File(p.to_path_buf()),
            None => PersonaSource::BuiltIn,
        }
    }

    pub fn load(&self) -> Result<PersonaConfig, PersonaError> {
        match self {
            PersonaSource::BuiltIn => Ok(PersonaConfig::default()),
            PersonaSource::File(path) => PersonaConfig::load(path),
        }
    }
}
