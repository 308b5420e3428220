use std::path::Path;

use anyhow::Result;
use serde_json::json;

use crate::ai::persona::{PersonaConfig, PersonaSource};

fn describe(persona: &PersonaConfig) -> serde_json::Value {
    json!({
        "title": persona.title,
        "system_role": persona.system_role,
        "initial_conversation": persona.initial_conversation,
        "context_template": persona.context_template,
        "has_api_key": persona.api_key().is_some(),
    })
}

/// Validate a persona file and print it, or print the built-in
/// persona when no path is given. The key itself is never printed.
pub fn run(path: Option<&Path>) -> Result<()> {
    let persona = PersonaSource::from_path(path).load()?;
    println!("{}", serde_json::to_string_pretty(&describe(&persona))?);
    Ok(())
}
