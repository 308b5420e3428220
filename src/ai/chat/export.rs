//! Plain text export of a conversation.
use chrono::{DateTime, TimeZone};

use crate::openai::{Message, Role};

pub const EXPORT_TITLE: &str = "Mental Health Assessment Conversation";

/// Render the transcript as a flat text document.
pub fn render(messages: &[Message]) -> String {
    let mut out = format!("{}\n{}\n\n", EXPORT_TITLE, "=".repeat(50));
    for message in messages.iter() {
        let label = match message.role {
            Role::Assistant => "Assistant",
            _ => "User",
        };
        out.push_str(&format!("{}:\n{}\n\n", label, message.content));
    }
    out
}

/// File name for an export captured at `timestamp`, e.g.
/// `conversation_20250128_141502.txt`.
pub fn filename<Tz: TimeZone>(timestamp: &DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    format!("conversation_{}.txt", timestamp.format("%Y%m%d_%H%M%S"))
}
