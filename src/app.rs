//! Application-wide state shared by every screen.

use tokio_util::sync::CancellationToken;

use crate::chat::{ChatSession, CoastieConfig};
use crate::client::ChatBackend;
use crate::error::Result;
use crate::export::ExportStore;
use crate::history::HistoryStore;
use crate::scenario::PromptDesk;

/// Owns the stores every chat session writes to.
///
/// Cloning yields another handle to the same stores. Sessions created from a
/// context are cancelled when the context is shut down.
#[derive(Clone)]
pub struct AppContext {
    history: HistoryStore,
    exports: ExportStore,
    prompts: PromptDesk,
    shutdown: CancellationToken,
}

impl AppContext {
    /// Creates a context around an already opened history store.
    pub fn new(history: HistoryStore) -> Self {
        Self {
            history,
            exports: ExportStore::new(),
            prompts: PromptDesk::new(),
            shutdown: CancellationToken::new(),
        }
    }

    /// Opens the history database named by `config`.
    pub fn open(config: &CoastieConfig) -> Result<Self> {
        let history = HistoryStore::open(&config.history_path)?;
        tracing::debug!(path = %config.history_path.display(), "opened history store");
        Ok(Self::new(history))
    }

    /// A context backed by in-memory SQLite.
    pub fn in_memory() -> Result<Self> {
        Ok(Self::new(HistoryStore::in_memory()?))
    }

    pub fn history(&self) -> &HistoryStore {
        &self.history
    }

    pub fn exports(&self) -> &ExportStore {
        &self.exports
    }

    pub fn prompts(&self) -> &PromptDesk {
        &self.prompts
    }

    /// Starts a chat session whose requests end when this context shuts down.
    pub fn session<B: ChatBackend>(&self, backend: B) -> ChatSession<B> {
        ChatSession::new(self, backend)
    }

    /// Token cancelled by [`AppContext::shutdown`].
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.shutdown
    }

    /// Cancels every session created from this context.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    pub fn is_shut_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }
}
