// Public modules
pub mod app;
pub mod attachment;
pub mod chat;
pub mod client;
pub mod error;
pub mod export;
pub mod history;
pub mod render;
pub mod scenario;
pub mod screen;
pub mod utils;

mod observability;

// Re-exports
pub use app::AppContext;
pub use attachment::{Attachment, AttachmentMeta, AttachmentSource, FileSource, MemorySource};
pub use client::{ChatBackend, Coastie, ExtractedReply, ReplyFallback, extract_reply};
pub use error::{Error, Result};
pub use export::{ExportFormat, ExportState, ExportStore};
pub use history::{HistoryEntry, HistoryStore, NewHistoryEntry};
pub use observability::register_biometrics;
pub use scenario::{PendingPrompt, PromptDesk, Scenario};
pub use screen::{Navigator, Screen};
