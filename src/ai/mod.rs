pub mod chat;
pub mod persona;
pub mod prompt;
