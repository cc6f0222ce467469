//! Chat session and interactive front end.
//!
//! This module provides the chat session controller plus the pieces the
//! `coastie-chat` REPL is built from:
//!
//! - [`config`]: CLI argument parsing and configuration
//! - [`session`]: transcript state and the request lifecycle
//! - [`commands`]: slash command parsing

mod commands;
mod config;
mod session;

pub use crate::render::{PlainTextRenderer, Renderer};
pub use commands::{ChatCommand, help_text, parse_command};
pub use config::{ChatArgs, CoastieConfig, DEFAULT_HISTORY_PATH, ENDPOINT_ENV_VAR};
pub use session::{
    ChatMessage, ChatResult, ChatSession, ChatUiState, Interrupter, NO_REPLY_PLACEHOLDER, Role,
    SendOutcome, SessionPhase,
};
