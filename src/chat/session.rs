//! Core chat session management.
//!
//! This module provides the `ChatSession` struct which holds the transcript
//! and pending input, dispatches each prompt to a [`ChatBackend`], and fans
//! completed exchanges out to the history and export stores.

use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::app::AppContext;
use crate::attachment::{Attachment, AttachmentMeta};
use crate::client::ChatBackend;
use crate::error::Result;
use crate::export::ExportStore;
use crate::history::{HistoryStore, NewHistoryEntry};
use crate::observability::{SESSION_CANCELLED, SESSION_SENDS};
use crate::scenario::{PendingPrompt, PromptDesk};

/// Assistant text shown when the backend returned nothing usable.
pub const NO_REPLY_PLACEHOLDER: &str = "[No reply]";

/// Who wrote a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One line of the transcript.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub text: String,
}

impl ChatMessage {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            text: text.into(),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            text: text.into(),
        }
    }
}

/// Outcome of one exchange as the UI sees it.
///
/// The two fields are independent; a successful exchange normally carries
/// only `reply` and a failed one only `error`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChatResult {
    pub reply: Option<String>,
    pub error: Option<String>,
}

impl From<Result<String>> for ChatResult {
    fn from(result: Result<String>) -> Self {
        match result {
            Ok(reply) => Self {
                reply: Some(reply),
                error: None,
            },
            Err(err) => Self {
                reply: None,
                error: Some(err.to_string()),
            },
        }
    }
}

/// Coarse session state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Idle,
    Sending,
    IdleWithError,
}

/// Everything a chat screen renders.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChatUiState {
    /// Text waiting to be sent.
    pub input: String,
    /// True while a request is in flight.
    pub is_loading: bool,
    /// Transcript, oldest first.
    pub messages: Vec<ChatMessage>,
    /// Error from the most recent exchange.
    pub error: Option<String>,
    /// Descriptor of the pending attachment.
    pub attachment: Option<AttachmentMeta>,
    /// Scenario the current prompt came from.
    pub scenario_title: Option<String>,
}

impl ChatUiState {
    pub fn phase(&self) -> SessionPhase {
        if self.is_loading {
            SessionPhase::Sending
        } else if self.error.is_some() {
            SessionPhase::IdleWithError
        } else {
            SessionPhase::Idle
        }
    }
}

/// What [`ChatSession::send`] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    /// The input was blank; nothing changed.
    Skipped,
    /// The backend answered or failed.
    Completed(ChatResult),
    /// The request was abandoned before it finished.
    Cancelled,
}

/// Cancels the request a session currently has in flight.
///
/// Safe to call from any thread, including a signal handler.
#[derive(Clone, Debug, Default)]
pub struct Interrupter {
    in_flight: Arc<Mutex<Option<CancellationToken>>>,
}

impl Interrupter {
    /// Cancels the in-flight request. Returns false when nothing was running.
    pub fn interrupt(&self) -> bool {
        let guard = match self.in_flight.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        match guard.as_ref() {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    fn set(&self, token: Option<CancellationToken>) {
        let mut guard = match self.in_flight.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *guard = token;
    }
}

/// A chat session bound to one backend.
///
/// The session owns a cancellation token derived from its [`AppContext`];
/// closing or dropping the session abandons any request still in flight so
/// a late reply can never reach the transcript or the stores.
pub struct ChatSession<B: ChatBackend> {
    backend: B,
    history: HistoryStore,
    exports: ExportStore,
    prompts: PromptDesk,
    token: CancellationToken,
    interrupter: Interrupter,
    attachment: Option<Attachment>,
    state: watch::Sender<ChatUiState>,
    pending_writes: Vec<JoinHandle<()>>,
}

impl<B: ChatBackend> ChatSession<B> {
    /// Creates a session writing to `app`'s stores.
    pub fn new(app: &AppContext, backend: B) -> Self {
        let (state, _) = watch::channel(ChatUiState::default());
        Self {
            backend,
            history: app.history().clone(),
            exports: app.exports().clone(),
            prompts: app.prompts().clone(),
            token: app.cancellation_token().child_token(),
            interrupter: Interrupter::default(),
            attachment: None,
            state,
            pending_writes: Vec::new(),
        }
    }

    /// Replaces the pending input.
    pub fn set_input(&mut self, text: impl Into<String>) {
        let text = text.into();
        self.state.send_modify(|state| state.input = text);
    }

    /// Sets the file to send with the next prompt. Only its descriptor is
    /// kept in the UI state; the bytes are read when the request is built.
    pub fn set_attachment(&mut self, attachment: Attachment) {
        let meta = attachment.meta().clone();
        self.attachment = Some(attachment);
        self.state.send_modify(|state| state.attachment = Some(meta));
    }

    pub fn clear_attachment(&mut self) {
        self.attachment = None;
        self.state.send_modify(|state| state.attachment = None);
    }

    /// Sets the scenario title recorded with later exchanges.
    pub fn set_scenario_title(&mut self, title: Option<String>) {
        self.state.send_modify(|state| state.scenario_title = title);
    }

    /// Loads `pending` as the next prompt.
    pub fn load(&mut self, pending: PendingPrompt) {
        self.state.send_modify(|state| {
            state.input = pending.prompt;
            state.scenario_title = Some(pending.title);
        });
    }

    /// Takes the prompt waiting on the shared prompt desk, if any.
    pub fn load_pending(&mut self) -> Option<PendingPrompt> {
        let pending = self.prompts.take()?;
        self.load(pending.clone());
        Some(pending)
    }

    /// Sends the pending input.
    ///
    /// Blank input is a no-op. Otherwise the user message is shown at once,
    /// the prompt goes out as JSON (or multipart when an attachment is set),
    /// and the answer, or `[No reply]`, is appended. Completed exchanges are
    /// written to history in the background and replace the export slot.
    pub async fn send(&mut self) -> SendOutcome {
        let prompt = self.state.borrow().input.trim().to_string();
        if prompt.is_empty() {
            return SendOutcome::Skipped;
        }
        if self.token.is_cancelled() {
            return SendOutcome::Cancelled;
        }
        SESSION_SENDS.click();

        let attachment = self.attachment.clone();
        self.state.send_modify(|state| {
            state.input.clear();
            state.is_loading = true;
            state.error = None;
            state.messages.push(ChatMessage::user(prompt.clone()));
        });

        let request = self.token.child_token();
        let mut in_flight = InFlight::start(&self.state, &self.interrupter, request.clone());
        let result = tokio::select! {
            biased;
            _ = request.cancelled() => None,
            result = dispatch(&self.backend, &prompt, attachment.as_ref()) => Some(result),
        };
        let Some(result) = result else {
            return SendOutcome::Cancelled;
        };
        in_flight.complete();
        drop(in_flight);

        let result = ChatResult::from(result);
        let reply = result
            .reply
            .as_deref()
            .map(str::trim)
            .filter(|reply| !reply.is_empty())
            .unwrap_or(NO_REPLY_PLACEHOLDER)
            .to_string();

        self.attachment = None;
        let mut scenario_title = None;
        self.state.send_modify(|state| {
            state.is_loading = false;
            state.attachment = None;
            state.error = result.error.clone();
            state.messages.push(ChatMessage::assistant(reply.clone()));
            scenario_title = state.scenario_title.clone();
        });

        self.exports.update(prompt.clone(), reply.clone());
        let entry = NewHistoryEntry::new(prompt, reply)
            .with_scenario_title(scenario_title)
            .with_attachment(attachment.map(|attachment| attachment.meta().clone()));
        self.persist(entry);

        SendOutcome::Completed(result)
    }

    /// Waits for every background history write started so far.
    pub async fn flush(&mut self) {
        for handle in self.pending_writes.drain(..) {
            if let Err(err) = handle.await {
                tracing::warn!(error = %err, "history write task failed");
            }
        }
    }

    /// Empties the transcript and clears the last error.
    pub fn clear_messages(&mut self) {
        self.state.send_modify(|state| {
            state.messages.clear();
            state.error = None;
        });
    }

    /// Abandons any in-flight request; later sends return `Cancelled`.
    pub fn close(&self) {
        self.token.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Handle that cancels only the current request.
    pub fn interrupter(&self) -> Interrupter {
        self.interrupter.clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<ChatUiState> {
        self.state.subscribe()
    }

    pub fn state(&self) -> ChatUiState {
        self.state.borrow().clone()
    }

    pub fn phase(&self) -> SessionPhase {
        self.state.borrow().phase()
    }

    /// Returns the backend.
    pub fn backend(&self) -> &B {
        &self.backend
    }

    fn persist(&mut self, entry: NewHistoryEntry) {
        self.pending_writes.retain(|handle| !handle.is_finished());
        let history = self.history.clone();
        self.pending_writes.push(tokio::spawn(async move {
            if let Err(err) = history.insert(entry).await {
                tracing::warn!(error = %err, "failed to record chat history");
            }
        }));
    }
}

impl<B: ChatBackend> Drop for ChatSession<B> {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

/// Tracks one request from the optimistic update until it completes.
///
/// Dropped without [`InFlight::complete`], whether because the request was
/// cancelled or because the `send` future itself was dropped, it cancels the
/// request and clears the loading flag.
struct InFlight<'a> {
    state: &'a watch::Sender<ChatUiState>,
    interrupter: &'a Interrupter,
    request: CancellationToken,
    completed: bool,
}

impl<'a> InFlight<'a> {
    fn start(
        state: &'a watch::Sender<ChatUiState>,
        interrupter: &'a Interrupter,
        request: CancellationToken,
    ) -> Self {
        interrupter.set(Some(request.clone()));
        Self {
            state,
            interrupter,
            request,
            completed: false,
        }
    }

    fn complete(&mut self) {
        self.completed = true;
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.interrupter.set(None);
        if self.completed {
            return;
        }
        self.request.cancel();
        SESSION_CANCELLED.click();
        tracing::debug!("chat request cancelled before completion");
        self.state.send_modify(|state| state.is_loading = false);
    }
}

async fn dispatch<B: ChatBackend>(
    backend: &B,
    prompt: &str,
    attachment: Option<&Attachment>,
) -> Result<String> {
    match attachment {
        Some(attachment) => backend.send_multipart(prompt, attachment).await,
        None => backend.send_json(prompt).await,
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::error::Error;
    use crate::scenario::Scenario;

    #[derive(Debug, Clone, PartialEq)]
    struct Call {
        message: String,
        attachment: Option<AttachmentMeta>,
    }

    /// Answers every request with the same result, or hangs on prompts
    /// containing "hang".
    #[derive(Clone)]
    struct Scripted {
        reply: Result<String>,
        calls: Arc<Mutex<Vec<Call>>>,
    }

    impl Scripted {
        fn new(reply: Result<String>) -> Self {
            Self {
                reply,
                calls: Arc::default(),
            }
        }

        fn calls(&self) -> Vec<Call> {
            self.calls.lock().unwrap().clone()
        }

        async fn answer(&self, message: &str, attachment: Option<AttachmentMeta>) -> Result<String> {
            self.calls.lock().unwrap().push(Call {
                message: message.to_string(),
                attachment,
            });
            if message.contains("hang") {
                futures::future::pending::<()>().await;
            }
            self.reply.clone()
        }
    }

    #[async_trait::async_trait]
    impl ChatBackend for Scripted {
        async fn send_json(&self, message: &str) -> Result<String> {
            self.answer(message, None).await
        }

        async fn send_multipart(&self, message: &str, attachment: &Attachment) -> Result<String> {
            self.answer(message, Some(attachment.meta().clone())).await
        }
    }

    fn app() -> AppContext {
        AppContext::in_memory().unwrap()
    }

    #[tokio::test]
    async fn blank_input_is_a_no_op() {
        let app = app();
        let backend = Scripted::new(Ok("unused".into()));
        let mut session = app.session(backend.clone());
        session.set_input("   \n\t ");
        let before = session.state();

        assert_eq!(session.send().await, SendOutcome::Skipped);
        assert_eq!(session.state(), before);
        assert!(backend.calls().is_empty());
    }

    #[tokio::test]
    async fn reply_is_trimmed_and_recorded() {
        let app = app();
        let backend = Scripted::new(Ok("  Here you go \n".into()));
        let mut session = app.session(backend.clone());
        session.set_input("  Fix this  ");

        let outcome = session.send().await;
        assert!(matches!(outcome, SendOutcome::Completed(ChatResult { error: None, .. })));

        let state = session.state();
        assert_eq!(state.input, "");
        assert!(!state.is_loading);
        assert_eq!(
            state.messages,
            vec![ChatMessage::user("Fix this"), ChatMessage::assistant("Here you go")]
        );
        assert_eq!(session.phase(), SessionPhase::Idle);
        assert_eq!(backend.calls()[0].message, "Fix this");

        session.flush().await;
        let entries = app.history().entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].prompt, "Fix this");
        assert_eq!(entries[0].response, "Here you go");
        assert_eq!(entries[0].scenario_title, None);

        let export = app.exports().snapshot();
        assert_eq!(export.prompt(), "Fix this");
        assert_eq!(export.reply(), "Here you go");
    }

    #[tokio::test]
    async fn empty_reply_shows_placeholder() {
        let app = app();
        let mut session = app.session(Scripted::new(Ok(" \n ".into())));
        session.set_input("hello");
        session.send().await;
        assert_eq!(
            session.state().messages.last(),
            Some(&ChatMessage::assistant(NO_REPLY_PLACEHOLDER))
        );
    }

    #[tokio::test]
    async fn errors_surface_in_state() {
        let app = app();
        let mut session = app.session(Scripted::new(Err(Error::api(503, "busy"))));
        session.set_input("hello");

        let outcome = session.send().await;
        assert_eq!(
            outcome,
            SendOutcome::Completed(ChatResult {
                reply: None,
                error: Some("HTTP 503: busy".to_string()),
            })
        );
        let state = session.state();
        assert_eq!(state.error.as_deref(), Some("HTTP 503: busy"));
        assert_eq!(state.messages[1], ChatMessage::assistant(NO_REPLY_PLACEHOLDER));
        assert_eq!(session.phase(), SessionPhase::IdleWithError);

        session.set_input("again");
        session.send().await;
        assert_eq!(session.state().messages.len(), 4);
    }

    #[tokio::test]
    async fn attachment_goes_multipart_and_is_cleared() {
        let app = app();
        let backend = Scripted::new(Ok("read it".into()));
        let mut session = app.session(backend.clone());
        let attachment = Attachment::from_bytes("quiz.txt", "text/plain", b"Q1".to_vec());
        session.set_attachment(attachment);
        assert_eq!(
            session.state().attachment.as_ref().map(|meta| meta.name.as_str()),
            Some("quiz.txt")
        );
        session.set_input("review this quiz");
        session.send().await;

        let calls = backend.calls();
        assert_eq!(calls[0].attachment.as_ref().unwrap().size_bytes, Some(2));
        assert!(session.state().attachment.is_none());

        session.flush().await;
        let entry = &app.history().entries()[0];
        assert_eq!(entry.attachment.as_ref().unwrap().mime_type, "text/plain");

        session.set_input("follow up");
        session.send().await;
        assert!(backend.calls()[1].attachment.is_none());
    }

    #[tokio::test]
    async fn shutdown_discards_late_reply() {
        let app = app();
        let mut session = app.session(Scripted::new(Ok("too late".into())));
        session.set_input("please hang");

        let token = app.cancellation_token().clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            token.cancel();
        });

        assert_eq!(session.send().await, SendOutcome::Cancelled);
        let state = session.state();
        assert!(!state.is_loading);
        assert_eq!(state.messages, vec![ChatMessage::user("please hang")]);

        session.flush().await;
        assert!(app.history().entries().is_empty());
        assert!(!app.exports().snapshot().has_reply());

        session.set_input("anything");
        assert_eq!(session.send().await, SendOutcome::Cancelled);
    }

    #[tokio::test]
    async fn interrupt_cancels_only_current_request() {
        let app = app();
        let mut session = app.session(Scripted::new(Ok("ok".into())));
        let interrupter = session.interrupter();
        assert!(!interrupter.interrupt());

        session.set_input("hang on");
        let handle = interrupter.clone();
        tokio::spawn(async move {
            while !handle.interrupt() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        });
        assert_eq!(session.send().await, SendOutcome::Cancelled);

        session.set_input("next question");
        assert!(matches!(session.send().await, SendOutcome::Completed(_)));
        assert!(!session.is_closed());
    }

    #[tokio::test]
    async fn scenario_prompt_edited_then_sent() {
        let app = app();
        let mut session = app.session(Scripted::new(Ok("rubric".into())));

        let pending = app.prompts().choose(Scenario::RubricIntegrity);
        assert_eq!(pending.prompt, Scenario::RubricIntegrity.prompt());
        app.prompts().edit("Rubric for a lab report, 4 levels").unwrap();

        let loaded = session.load_pending().unwrap();
        assert_eq!(session.state().input, loaded.prompt);
        assert!(matches!(session.send().await, SendOutcome::Completed(_)));
        session.flush().await;

        let entry = &app.history().entries()[0];
        assert_eq!(entry.scenario_title.as_deref(), Some(Scenario::RubricIntegrity.title()));
        assert_eq!(entry.prompt, "Rubric for a lab report, 4 levels");
        assert!(app.prompts().pending().is_none());
    }

    #[tokio::test]
    async fn clear_messages_resets_transcript() {
        let app = app();
        let mut session = app.session(Scripted::new(Err(Error::connection("refused", None))));
        session.set_input("hi");
        session.send().await;
        session.clear_messages();
        let state = session.state();
        assert!(state.messages.is_empty());
        assert_eq!(state.phase(), SessionPhase::Idle);
    }

    #[tokio::test]
    async fn dropped_send_future_resets_session() {
        let app = app();
        let mut session = app.session(Scripted::new(Ok("never".into())));
        let interrupter = session.interrupter();
        session.set_input("hang around");

        let timed_out = tokio::time::timeout(Duration::from_millis(20), session.send()).await;
        assert!(timed_out.is_err());

        let state = session.state();
        assert!(!state.is_loading);
        assert_eq!(session.phase(), SessionPhase::Idle);
        assert_eq!(state.messages, vec![ChatMessage::user("hang around")]);
        assert!(!interrupter.interrupt());

        session.set_input("still there?");
        assert!(matches!(session.send().await, SendOutcome::Completed(_)));
    }

    #[tokio::test]
    async fn history_failure_does_not_hide_the_exchange() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.sqlite3");
        let app = AppContext::new(HistoryStore::open(&path).unwrap());
        let mut session = app.session(Scripted::new(Ok("re: hi".into())));

        let other = rusqlite::Connection::open(&path).unwrap();
        other.execute("DROP TABLE history_entries", []).unwrap();
        drop(other);

        session.set_input("hi");
        assert_eq!(
            session.send().await,
            SendOutcome::Completed(ChatResult {
                reply: Some("re: hi".to_string()),
                error: None,
            })
        );
        session.flush().await;

        let state = session.state();
        assert_eq!(state.error, None);
        assert_eq!(state.messages.len(), 2);
        assert_eq!(app.exports().snapshot().reply(), "re: hi");
        assert!(app.history().entries().is_empty());
    }

    #[tokio::test]
    async fn close_is_local_to_the_session() {
        let app = app();
        let mut closed = app.session(Scripted::new(Ok("x".into())));
        let mut open = app.session(Scripted::new(Ok("y".into())));
        closed.close();
        assert!(closed.is_closed());
        assert!(!app.is_shut_down());

        closed.set_input("hi");
        open.set_input("hi");
        assert_eq!(closed.send().await, SendOutcome::Cancelled);
        assert!(closed.state().messages.is_empty());
        assert!(matches!(open.send().await, SendOutcome::Completed(_)));
    }
}
