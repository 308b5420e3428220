use std::env;
use std::fmt;
use std::path::PathBuf;

use crate::ai::chat::ModelId;

#[derive(Clone)]
pub struct AppConfig {
    pub openai_api_hostname: String,
    pub openai_api_key: Option<String>,
    pub openai_model: ModelId,
    pub persona_path: Option<PathBuf>,
    pub export_path: PathBuf,
}

impl Default for AppConfig {
    fn default() -> Self {
        let openai_api_hostname = env::var("ASSESSBOT_LLM_HOST")
            .unwrap_or_else(|_| "https://api.openai.com".to_string());
        let openai_api_key = env::var("OPENAI_API_KEY")
            .ok()
            .filter(|k| !k.trim().is_empty());
        let openai_model = env::var("ASSESSBOT_MODEL")
            .ok()
            .and_then(|m| {
                m.parse::<ModelId>()
                    .inspect_err(|e| tracing::warn!("Ignoring ASSESSBOT_MODEL: {}", e))
                    .ok()
            })
            .unwrap_or_default();
        let persona_path = env::var("ASSESSBOT_PERSONA_PATH").ok().map(PathBuf::from);
        let export_path = env::var("ASSESSBOT_EXPORT_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./"));

        Self {
            openai_api_hostname,
            openai_api_key,
            openai_model,
            persona_path,
            export_path,
        }
    }
}

impl fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppConfig")
            .field("openai_api_hostname", &self.openai_api_hostname)
            .field(
                "openai_api_key",
                &self.openai_api_key.as_ref().map(|_| "[REDACTED]"),
            )
            .field("openai_model", &self.openai_model)
            .field("persona_path", &self.persona_path)
            .field("export_path", &self.export_path)
            .finish()
    }
}
