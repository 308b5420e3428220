use thiserror::Error;
use uuid::Uuid;

use super::export;
use super::models::{ConversationState, ModelId};
use crate::ai::persona::{PersonaConfig, PersonaError, PersonaSource};
use crate::ai::prompt::{self, TemplateError};
use crate::documents::{ExtractionError, KnowledgeUpdate, UploadedFile};
use crate::openai::{BoxedCompletionClient, CompletionClient, CompletionError, Message, Role};

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("missing API key, enter one with /key or set it in the persona config")]
    MissingCredential,

    #[error(transparent)]
    Template(#[from] TemplateError),

    #[error(transparent)]
    Completion(#[from] CompletionError),

    #[error(transparent)]
    Extraction(#[from] ExtractionError),

    #[error(transparent)]
    Persona(#[from] PersonaError),

    #[error("no uploaded document named {0}")]
    UnknownUpload(String),
}

/// A single interactive conversation with an LLM, optionally grounded
/// in uploaded documents.
///
/// Turns are processed one at a time: `next_msg` holds the session
/// mutably until the completion API answers or fails, so there is
/// never more than one request in flight for the same conversation.
///
/// Use `Session::builder()` to construct a valid `Session`.
pub struct Session {
    state: ConversationState,
    client: BoxedCompletionClient,
    manual_api_key: Option<String>,
    uploads: Vec<UploadedFile>,
    pub session_id: String,
}

impl Session {
    pub fn builder(client: impl CompletionClient + 'static) -> SessionBuilder {
        SessionBuilder::new(client)
    }

    pub fn state(&self) -> &ConversationState {
        &self.state
    }

    pub fn messages(&self) -> &[Message] {
        self.state.messages()
    }

    pub fn persona(&self) -> &PersonaConfig {
        self.state.persona()
    }

    /// The key used for the next request. One supplied with the
    /// persona takes precedence over one entered by hand.
    pub fn credential(&self) -> Option<&str> {
        self.state
            .persona()
            .api_key()
            .or(self.manual_api_key.as_deref())
    }

    /// Set the manually entered key. An empty key clears it.
    pub fn set_api_key(&mut self, api_key: &str) {
        let api_key = api_key.trim();
        self.manual_api_key = if api_key.is_empty() {
            None
        } else {
            Some(api_key.to_string())
        };
    }

    pub fn select_model(&mut self, model: ModelId) {
        tracing::info!(session_id = %self.session_id, model = %model, "Model selected");
        self.state.select_model(model);
    }

    /// Messages for the next request: the persona's system role, the
    /// transcript so far, then the current turn with any knowledge
    /// base merged in. The raw user input is not part of the request,
    /// only its context augmented form.
    fn outbound_messages(&self, context: &str) -> Vec<Message> {
        let mut messages = Vec::with_capacity(self.state.messages().len() + 2);
        messages.push(Message::new(Role::System, &self.state.persona().system_role));
        messages.extend(self.state.messages().iter().cloned());
        messages.push(Message::new(Role::User, context));
        messages
    }

    /// Runs the next turn in chat and returns the assistant's reply.
    ///
    /// The user's input is stored in the transcript as typed. When the
    /// completion API fails the input stays in the transcript without
    /// an answer and the session is ready for the next turn. Nothing
    /// is stored when the turn is blocked before a request is sent
    /// (no key, bad template).
    pub async fn next_msg(&mut self, user_input: &str) -> Result<String, SessionError> {
        let api_key = self
            .credential()
            .ok_or(SessionError::MissingCredential)?
            .to_string();

        let context = prompt::assemble(
            &self.state.persona().context_template,
            self.state.knowledge_base().text(),
            user_input,
        )?;
        let messages = self.outbound_messages(&context);
        let model = self.state.selected_model();

        self.state.push_user(user_input);

        tracing::info!(
            session_id = %self.session_id,
            model = %model,
            messages = messages.len(),
            grounded = !self.state.knowledge_base().is_empty(),
            "Sending turn"
        );

        match self.client.complete(&api_key, model.as_str(), &messages).await {
            Ok(reply) => {
                self.state.push_assistant(&reply);
                tracing::debug!(session_id = %self.session_id, "Received reply");
                Ok(reply)
            }
            Err(e) => {
                tracing::error!(session_id = %self.session_id, error = %e, "Turn failed");
                Err(e.into())
            }
        }
    }

    /// Start the conversation over from the persona's greeting.
    pub fn restart(&mut self) {
        tracing::info!(session_id = %self.session_id, "Restarting conversation");
        self.state.restart();
    }

    pub fn export(&self) -> String {
        export::render(self.state.messages())
    }

    /// Names of the uploaded documents in upload order.
    pub fn uploads(&self) -> Vec<&str> {
        self.uploads.iter().map(|f| f.filename.as_str()).collect()
    }

    /// Replace the uploaded file set and recompute the knowledge base.
    /// On failure both the set and the knowledge base are unchanged.
    pub async fn set_uploads(
        &mut self,
        files: Vec<UploadedFile>,
    ) -> Result<KnowledgeUpdate, SessionError> {
        let update = self.state.knowledge_base_mut().update(&files).await?;
        self.uploads = files;

        match update {
            KnowledgeUpdate::Rebuilt { files, chars } => {
                tracing::info!(session_id = %self.session_id, files, chars, "Knowledge base rebuilt")
            }
            KnowledgeUpdate::Cleared => {
                tracing::info!(session_id = %self.session_id, "Knowledge base cleared")
            }
            KnowledgeUpdate::Unchanged => {}
        }

        Ok(update)
    }

    /// Add documents to the uploaded set. A file with the same name as
    /// an existing upload replaces it in place.
    pub async fn upload(
        &mut self,
        files: Vec<UploadedFile>,
    ) -> Result<KnowledgeUpdate, SessionError> {
        let mut next = self.uploads.clone();
        for file in files.into_iter() {
            match next.iter_mut().find(|f| f.filename == file.filename) {
                Some(existing) => *existing = file,
                None => next.push(file),
            }
        }
        self.set_uploads(next).await
    }

    /// Drop one document from the uploaded set, which clears the
    /// knowledge base until the next upload.
    pub async fn remove_upload(&mut self, filename: &str) -> Result<KnowledgeUpdate, SessionError> {
        if !self.uploads.iter().any(|f| f.filename == filename) {
            return Err(SessionError::UnknownUpload(filename.to_string()));
        }
        let next = self
            .uploads
            .iter()
            .filter(|f| f.filename != filename)
            .cloned()
            .collect();
        self.set_uploads(next).await
    }

    /// Load a persona, keeping the current one if it fails validation.
    pub fn load_persona(&mut self, source: &PersonaSource) -> Result<(), SessionError> {
        match source.load() {
            Ok(persona) => {
                tracing::info!(session_id = %self.session_id, title = %persona.title, "Persona loaded");
                self.state.set_persona(persona);
                Ok(())
            }
            Err(e) => {
                tracing::warn!(session_id = %self.session_id, error = %e, "Persona rejected");
                Err(e.into())
            }
        }
    }
}

pub struct SessionBuilder {
    client: BoxedCompletionClient,
    persona: PersonaConfig,
    model: ModelId,
    api_key: Option<String>,
    session_id: Option<String>,
}

impl SessionBuilder {
    pub fn new(client: impl CompletionClient + 'static) -> Self {
        Self {
            client: Box::new(client),
            persona: PersonaConfig::default(),
            model: ModelId::default(),
            api_key: None,
            session_id: None,
        }
    }

    pub fn build(self) -> Session {
        let mut session = Session {
            state: ConversationState::new(self.persona, self.model),
            client: self.client,
            manual_api_key: None,
            uploads: Vec::new(),
            session_id: self
                .session_id
                .unwrap_or_else(|| Uuid::new_v4().to_string()),
        };
        if let Some(key) = self.api_key {
            session.set_api_key(&key);
        }
        session
    }

    pub fn persona(mut self, persona: PersonaConfig) -> Self {
        self.persona = persona;
        self
    }

    pub fn model(mut self, model: ModelId) -> Self {
        self.model = model;
        self
    }

    /// Manually entered key, e.g. from the environment at startup.
    pub fn api_key(mut self, api_key: Option<&str>) -> Self {
        self.api_key = api_key.map(String::from);
        self
    }

    pub fn session_id(mut self, session_id: &str) -> Self {
        self.session_id = Some(session_id.to_string());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::openai::OpenAiClient;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::{Arc, Mutex};

    /// Records every request and answers from a fixed script.
    #[derive(Clone, Default)]
    struct ScriptedClient {
        replies: Arc<Mutex<Vec<Result<String, String>>>>,
        requests: Arc<Mutex<Vec<(String, String, Vec<Message>)>>>,
    }

    impl ScriptedClient {
        fn new(replies: Vec<Result<&str, &str>>) -> Self {
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
            self.requests.lock().unwrap().push((
                api_key.to_string(),
                model.to_string(),
                messages.to_vec(),
            ));
            self.replies
                .lock()
                .unwrap()
                .pop()
                .unwrap_or(Err("script exhausted".to_string()))
                .map_err(CompletionError::Api)
        }
    }

    #[test]
    fn test_builder_defaults() {
        let session = Session::builder(ScriptedClient::default()).build();

        assert_eq!(session.persona(), &PersonaConfig::default());
        assert_eq!(session.state().selected_model(), ModelId::Gpt35Turbo);
        assert_eq!(session.messages().len(), 1);
        assert!(session.credential().is_none());
        assert!(!session.session_id.is_empty());
    }

    #[test]
    fn test_builder_chaining() {
        let session = Session::builder(ScriptedClient::default())
            .model(ModelId::Gpt4oMini)
            .api_key(Some("sk-env"))
            .session_id("test-session")
            .build();

        assert_eq!(session.state().selected_model(), ModelId::Gpt4oMini);
        assert_eq!(session.credential(), Some("sk-env"));
        assert_eq!(session.session_id, "test-session");
    }

    #[test]
    fn test_persona_key_takes_precedence() {
        let persona = PersonaConfig::from_json(
            &json!({
                "title": "t",
                "system_role": "s",
                "initial_conversation": "i",
                "context_template": "{user_input}",
                "api_key": "sk-persona"
            })
            .to_string(),
        )
        .unwrap();
        let mut session = Session::builder(ScriptedClient::default())
            .persona(persona)
            .build();
        session.set_api_key("sk-manual");

        assert_eq!(session.credential(), Some("sk-persona"));
    }

    #[test]
    fn test_set_api_key_blank_clears() {
        let mut session = Session::builder(ScriptedClient::default())
            .api_key(Some("sk-env"))
            .build();
        session.set_api_key("  ");
        assert!(session.credential().is_none());
    }

    #[tokio::test]
    async fn test_next_msg_success_appends_two_messages() {
        let client = ScriptedClient::new(vec![Ok("Tell me more.")]);
        let requests = client.requests.clone();
        let mut session = Session::builder(client).api_key(Some("sk-test")).build();

        let reply = session.next_msg("I feel tired.").await.unwrap();

        assert_eq!(reply, "Tell me more.");
        assert_eq!(session.messages().len(), 3);
        assert_eq!(session.messages()[1], Message::new(Role::User, "I feel tired."));
        assert_eq!(session.messages()[2], Message::new(Role::Assistant, "Tell me more."));

        let requests = requests.lock().unwrap();
        let (api_key, model, messages) = &requests[0];
        assert_eq!(api_key, "sk-test");
        assert_eq!(model, "gpt-3.5-turbo");
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[0].role, Role::System);
        assert_eq!(messages[0].content, PersonaConfig::default().system_role);
        assert_eq!(messages[1].role, Role::Assistant);
        assert_eq!(messages[2], Message::new(Role::User, "I feel tired."));
    }

    #[tokio::test]
    async fn test_next_msg_failure_keeps_user_message() {
        let client = ScriptedClient::new(vec![Err("Rate limit reached"), Ok("Welcome back.")]);
        let mut session = Session::builder(client).api_key(Some("sk-test")).build();

        let err = session.next_msg("Hello?").await.unwrap_err();
        assert!(matches!(err, SessionError::Completion(_)));
        assert_eq!(err.to_string(), "Rate limit reached");
        assert_eq!(session.messages().len(), 2);
        assert_eq!(session.messages()[1].role, Role::User);

        // Still usable for the next turn
        let reply = session.next_msg("Hello again?").await.unwrap();
        assert_eq!(reply, "Welcome back.");
        assert_eq!(session.messages().len(), 4);
    }

    #[tokio::test]
    async fn test_next_msg_missing_credential_sends_nothing() {
        let client = ScriptedClient::new(vec![Ok("unused")]);
        let requests = client.requests.clone();
        let mut session = Session::builder(client).build();

        let err = session.next_msg("Hi").await.unwrap_err();

        assert!(matches!(err, SessionError::MissingCredential));
        assert_eq!(session.messages().len(), 1);
        assert!(requests.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_next_msg_uses_augmented_context_only_in_request() {
        let client = ScriptedClient::new(vec![Ok("First."), Ok("Second.")]);
        let requests = client.requests.clone();
        let mut session = Session::builder(client).api_key(Some("sk-test")).build();
        session
            .state
            .knowledge_base_mut()
            .replace(&[crate::documents::ExtractedDocument::new("notes.docx", "Sleeps badly.")]);

        session.next_msg("Question one").await.unwrap();
        session.next_msg("Question two").await.unwrap();

        let requests = requests.lock().unwrap();
        let (_, _, second) = &requests[1];
        // system, greeting, raw question one, reply, augmented question two
        assert_eq!(second.len(), 5);
        assert_eq!(second[2], Message::new(Role::User, "Question one"));
        assert!(second[4].content.contains("Sleeps badly."));
        assert!(second[4].content.ends_with("User Input: Question two"));
        // The transcript keeps what the user typed
        assert_eq!(session.messages()[3], Message::new(Role::User, "Question two"));
    }

    #[tokio::test]
    async fn test_next_msg_default_template_with_knowledge() {
        let client = ScriptedClient::new(vec![Ok("ok")]);
        let requests = client.requests.clone();
        let mut session = Session::builder(client).api_key(Some("sk-test")).build();
        session.state.knowledge_base_mut().replace(&[
            crate::documents::ExtractedDocument::new("notes.docx", "Patient reports insomnia."),
        ]);

        session.next_msg("What should I know?").await.unwrap();

        let requests = requests.lock().unwrap();
        let (_, _, messages) = &requests[0];
        assert_eq!(
            messages.last().unwrap().content,
            "Based on the following knowledge:\n\n--- Content from notes.docx ---\nPatient reports insomnia.\n\n\nUser Input: What should I know?"
        );
    }

    #[tokio::test]
    async fn test_next_msg_bad_template_rejected_before_any_change() {
        let client = ScriptedClient::new(vec![Ok("unused")]);
        let requests = client.requests.clone();
        let mut persona = PersonaConfig::default();
        persona.context_template = "{knowledge_base} for {patient}: {user_input}".to_string();
        let mut session = Session::builder(client)
            .persona(persona)
            .api_key(Some("sk-test"))
            .build();
        session.state.knowledge_base_mut().replace(&[
            crate::documents::ExtractedDocument::new("notes.docx", "Sleeps badly."),
        ]);
        let before = session.messages().to_vec();

        let err = session.next_msg("What should I know?").await.unwrap_err();

        assert!(matches!(
            err,
            SessionError::Template(TemplateError::UnknownPlaceholder(ref name)) if name == "patient"
        ));
        assert_eq!(session.messages(), before.as_slice());
        assert!(requests.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_select_model_is_sent() {
        let client = ScriptedClient::new(vec![Ok("ok")]);
        let requests = client.requests.clone();
        let mut session = Session::builder(client).api_key(Some("sk-test")).build();

        session.select_model(ModelId::Gpt4Turbo);
        session.next_msg("Hi").await.unwrap();

        assert_eq!(requests.lock().unwrap()[0].1, "gpt-4-turbo");
    }

    #[tokio::test]
    async fn test_restart_after_turns() {
        let client = ScriptedClient::new(vec![Ok("a"), Ok("b")]);
        let mut session = Session::builder(client)
            .api_key(Some("sk-test"))
            .model(ModelId::Gpt4)
            .build();
        session.next_msg("1").await.unwrap();
        session.next_msg("2").await.unwrap();

        session.restart();

        assert_eq!(
            session.messages(),
            &[Message::new(Role::Assistant, &PersonaConfig::default().initial_conversation)]
        );
        assert_eq!(session.state().selected_model(), ModelId::Gpt4);
    }

    #[test]
    fn test_load_persona_rejection_keeps_previous() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("persona.json");
        std::fs::write(
            &path,
            json!({
                "title": "Half a persona",
                "system_role": "s",
                "initial_conversation": "i"
            })
            .to_string(),
        )
        .unwrap();
        let mut session = Session::builder(ScriptedClient::default()).build();
        let before = session.persona().clone();

        let err = session
            .load_persona(&PersonaSource::File(path))
            .unwrap_err();

        assert!(matches!(
            err,
            SessionError::Persona(PersonaError::MissingField("context_template"))
        ));
        assert_eq!(session.persona(), &before);
    }

    #[tokio::test]
    async fn test_remove_unknown_upload() {
        let mut session = Session::builder(ScriptedClient::default()).build();
        let err = session.remove_upload("ghost.pdf").await.unwrap_err();
        assert!(matches!(err, SessionError::UnknownUpload(_)));
    }

    #[tokio::test]
    async fn test_next_msg_against_openai_api() {
        let mut server = mockito::Server::new_async().await;

        let mock = server
            .mock("POST", "/v1/chat/completions")
            .match_header("authorization", "Bearer sk-test")
            .match_body(mockito::Matcher::Json(json!({
                "model": "gpt-4o",
                "messages": [
                    {"role": "system", "content": PersonaConfig::default().system_role},
                    {"role": "assistant", "content": PersonaConfig::default().initial_conversation},
                    {"role": "user", "content": "I keep waking up at 3am."}
                ]
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"choices": [{"index": 0, "message": {"role": "assistant", "content": "How long has this been happening?"}, "finish_reason": "stop"}]}"#)
            .create_async()
            .await;

        let mut session = Session::builder(OpenAiClient::new(&server.url()))
            .api_key(Some("sk-test"))
            .model(ModelId::Gpt4o)
            .build();
        let reply = session.next_msg("I keep waking up at 3am.").await.unwrap();

        mock.assert_async().await;
        assert_eq!(reply, "How long has this been happening?");
        assert_eq!(session.messages().len(), 3);
    }
}
