//! The core models for managing a stateful chat with an LLM.
use std::fmt;
use std::str::FromStr;

use thiserror::Error;

use crate::ai::persona::PersonaConfig;
use crate::documents::KnowledgeBase;
use crate::openai::{Message, Role};

/// The chat history shown to the user. System messages never live
/// here, the persona's system role is only added when a request is
/// sent.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Transcript(Vec<Message>);

impl Transcript {
    /// A fresh transcript opened by the assistant's greeting.
    pub fn with_greeting(greeting: &str) -> Self {
        Self(vec![Message::new(Role::Assistant, greeting)])
    }

    pub fn messages(&self) -> &[Message] {
        &self.0
    }

    pub fn push_user(&mut self, content: &str) {
        self.0.push(Message::new(Role::User, content))
    }

    pub fn push_assistant(&mut self, content: &str) {
        self.0.push(Message::new(Role::Assistant, content))
    }

    pub fn last(&self) -> Option<&Message> {
        self.0.last()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Message> {
        self.0.iter()
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("unknown model `{0}`")]
pub struct UnknownModel(pub String);

/// The models a user can pick from.
#[derive(clap::ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ModelId {
    #[default]
    #[value(name = "gpt-3.5-turbo")]
    Gpt35Turbo,
    #[value(name = "gpt-4o")]
    Gpt4o,
    #[value(name = "gpt-4o-mini")]
    Gpt4oMini,
    #[value(name = "gpt-4")]
    Gpt4,
    #[value(name = "gpt-4-turbo")]
    Gpt4Turbo,
}

impl ModelId {
    pub const ALL: [ModelId; 5] = [
        ModelId::Gpt35Turbo,
        ModelId::Gpt4o,
        ModelId::Gpt4oMini,
        ModelId::Gpt4,
        ModelId::Gpt4Turbo,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ModelId::Gpt35Turbo => "gpt-3.5-turbo",
            ModelId::Gpt4o => "gpt-4o",
            ModelId::Gpt4oMini => "gpt-4o-mini",
            ModelId::Gpt4 => "gpt-4",
            ModelId::Gpt4Turbo => "gpt-4-turbo",
        }
    }
}

impl fmt::Display for ModelId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModelId {
    type Err = UnknownModel;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        ModelId::ALL
            .into_iter()
            .find(|m| m.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| UnknownModel(s.to_string()))
    }
}

/// Everything a single session remembers.
#[derive(Clone, Debug)]
pub struct ConversationState {
    transcript: Transcript,
    knowledge_base: KnowledgeBase,
    persona: PersonaConfig,
    selected_model: ModelId,
}

impl ConversationState {
    pub fn new(persona: PersonaConfig, selected_model: ModelId) -> Self {
        Self {
            transcript: Transcript::with_greeting(&persona.initial_conversation),
            knowledge_base: KnowledgeBase::new(),
            persona,
            selected_model,
        }
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub fn messages(&self) -> &[Message] {
        self.transcript.messages()
    }

    pub fn knowledge_base(&self) -> &KnowledgeBase {
        &self.knowledge_base
    }

    pub fn knowledge_base_mut(&mut self) -> &mut KnowledgeBase {
        &mut self.knowledge_base
    }

    pub fn persona(&self) -> &PersonaConfig {
        &self.persona
    }

    /// Swap in a new persona. The transcript is left alone, the new
    /// greeting only shows up after a restart.
    pub fn set_persona(&mut self, persona: PersonaConfig) {
        self.persona = persona;
    }

    pub fn selected_model(&self) -> ModelId {
        self.selected_model
    }

    pub fn select_model(&mut self, model: ModelId) {
        self.selected_model = model;
    }

    pub fn push_user(&mut self, content: &str) {
        self.transcript.push_user(content)
    }

    pub fn push_assistant(&mut self, content: &str) {
        self.transcript.push_assistant(content)
    }

    /// Back to just the greeting. Uploaded knowledge and the selected
    /// model survive a restart.
    pub fn restart(&mut self) {
        self.transcript = Transcript::with_greeting(&self.persona.initial_conversation);
    }
}
