//! Built-in prompts and the context template used to merge the
//! knowledge base into the current turn.
//!
//! Context templates use single brace placeholders,
//! `{knowledge_base}` and `{user_input}`. Substitution is literal:
//! nothing is escaped or truncated. A doubled brace (`{{` or `}}`)
//! renders as a single literal brace, and any other placeholder is an
//! error.

use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;

pub const DEFAULT_TITLE: &str = "AssessmentBot (DSM-5)";

pub const DEFAULT_SYSTEM_ROLE: &str = "\
As a compassionate and eclectic mental health professional, provide a diagnosis to the user \
interacting with you as your client. Ensure that you engage in differential diagnosis during your \
interaction, and create bespoke responses and questions for your client based on their \
conversational style and the documents provided. The conversation should flow as it naturally \
would in a therapy session. Adhere to ethical guidelines and boundaries, ensuring that you do not \
provide medical advice or treatment but rather suggest potential diagnoses. Be culturally \
competent and sensitive to the client's background, beliefs, and values. Use evidence-based \
practices and only reference the documents provided for diagnoses. Engage in risk assessment if \
required, clearly define the limitations of your capabilities, and ensure that the users \
understand that you are not a substitute for professional mental health services. Ask one \
question at a time, unless it is extremely necessary to ask more questions altogether.";

pub const DEFAULT_INITIAL_CONVERSATION: &str = "Hello, I'm here to help you understand your mental health better. \
Can you tell me a bit about what brings you here today?";

pub const DEFAULT_CONTEXT_TEMPLATE: &str =
    "Based on the following knowledge:\n{knowledge_base}\n\nUser Input: {user_input}";

const KNOWLEDGE_BASE: &str = "knowledge_base";
const USER_INPUT: &str = "user_input";

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{|\}\}|\{([^{}]*)\}").expect("Failed to compile placeholder pattern")
});

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TemplateError {
    #[error("unknown placeholder `{{{0}}}` in context template")]
    UnknownPlaceholder(String),
}

/// Build the content sent to the model for the current turn.
///
/// With no knowledge base the user's input goes through untouched and
/// the template is ignored entirely.
pub fn assemble(
    template: &str,
    knowledge_base: &str,
    user_input: &str,
) -> Result<String, TemplateError> {
    if knowledge_base.is_empty() {
        return Ok(user_input.to_string());
    }
    render(template, knowledge_base, user_input)
}

/// Check a template only references known placeholders.
pub fn validate_template(template: &str) -> Result<(), TemplateError> {
    render(template, "", "").map(|_| ())
}

fn render(template: &str, knowledge_base: &str, user_input: &str) -> Result<String, TemplateError> {
    let mut out = String::with_capacity(template.len() + knowledge_base.len() + user_input.len());
    let mut last = 0;

    for caps in PLACEHOLDER.captures_iter(template) {
        let Some(whole) = caps.get(0) else {
            continue;
        };
        out.push_str(&template[last..whole.start()]);

        match (whole.as_str(), caps.get(1).map(|name| name.as_str())) {
            ("{{", _) => out.push('{'),
            ("}}", _) => out.push('}'),
            (_, Some(KNOWLEDGE_BASE)) => out.push_str(knowledge_base),
            (_, Some(USER_INPUT)) => out.push_str(user_input),
            (_, Some(other)) => return Err(TemplateError::UnknownPlaceholder(other.to_string())),
            (literal, None) => out.push_str(literal),
        }

        last = whole.end();
    }
    out.push_str(&template[last..]);

    Ok(out)
}
