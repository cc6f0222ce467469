//! Export formats for the most recent exchange.
//!
//! [`ExportStore`] holds the latest prompt/reply pair in memory; the
//! `format_*` functions turn a pair into text an instructor can paste
//! elsewhere. Nothing here is persisted.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::error::{Error, Result};
use crate::utils::time::now_epoch_ms;

/// The latest completed exchange.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportState {
    /// Prompt of the most recent exchange.
    pub last_user_prompt: Option<String>,
    /// Reply of the most recent exchange.
    pub last_assistant_reply: Option<String>,
    /// When the slot was last written; zero if never.
    pub updated_at_epoch_ms: i64,
}

impl ExportState {
    /// Trimmed prompt, or empty.
    pub fn prompt(&self) -> &str {
        self.last_user_prompt.as_deref().unwrap_or_default().trim()
    }

    /// Trimmed reply, or empty.
    pub fn reply(&self) -> &str {
        self.last_assistant_reply.as_deref().unwrap_or_default().trim()
    }

    /// Returns true when there is a reply to export.
    pub fn has_reply(&self) -> bool {
        !self.reply().is_empty()
    }

    /// Renders the slot in `format`, or `None` when there is nothing to export yet.
    pub fn render(&self, format: ExportFormat) -> Option<String> {
        if !self.has_reply() {
            return None;
        }
        Some(render(format, self.prompt(), self.reply()))
    }
}

/// Shared handle to the single latest-exchange slot.
///
/// Clones share the slot. Each application context creates its own.
#[derive(Debug, Clone)]
pub struct ExportStore {
    state: Arc<watch::Sender<ExportState>>,
}

impl ExportStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        let (state, _) = watch::channel(ExportState::default());
        Self {
            state: Arc::new(state),
        }
    }

    /// Overwrites the slot with a new exchange.
    pub fn update(&self, prompt: impl Into<String>, reply: impl Into<String>) {
        self.state.send_replace(ExportState {
            last_user_prompt: Some(prompt.into()),
            last_assistant_reply: Some(reply.into()),
            updated_at_epoch_ms: now_epoch_ms(),
        });
    }

    /// Empties the slot.
    pub fn clear(&self) {
        self.state.send_replace(ExportState::default());
    }

    /// The current contents.
    pub fn snapshot(&self) -> ExportState {
        self.state.borrow().clone()
    }

    /// A receiver notified on every update.
    pub fn subscribe(&self) -> watch::Receiver<ExportState> {
        self.state.subscribe()
    }
}

impl Default for ExportStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Available export formats.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportFormat {
    /// Prompt and reply as labelled plain text.
    #[default]
    Plain,
    /// An HTML page for the Canvas page editor.
    CanvasHtml,
    /// A course announcement draft.
    Announcement,
}

impl ExportFormat {
    /// Every format, in picker order.
    pub const ALL: [ExportFormat; 3] = [
        ExportFormat::Plain,
        ExportFormat::CanvasHtml,
        ExportFormat::Announcement,
    ];

    /// Human-readable label.
    pub fn label(self) -> &'static str {
        match self {
            ExportFormat::Plain => "Plain text",
            ExportFormat::CanvasHtml => "Canvas-ready HTML",
            ExportFormat::Announcement => "Announcement",
        }
    }

    /// Short name accepted by [`FromStr`].
    pub fn as_str(self) -> &'static str {
        match self {
            ExportFormat::Plain => "plain",
            ExportFormat::CanvasHtml => "canvas",
            ExportFormat::Announcement => "announcement",
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExportFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "plain" | "text" => Ok(ExportFormat::Plain),
            "canvas" | "html" | "canvas_html" => Ok(ExportFormat::CanvasHtml),
            "announcement" | "announce" => Ok(ExportFormat::Announcement),
            other => Err(Error::validation(
                format!("unknown export format: {other}"),
                Some("format".to_string()),
            )),
        }
    }
}

/// Renders `prompt` and `reply` in `format`.
pub fn render(format: ExportFormat, prompt: &str, reply: &str) -> String {
    match format {
        ExportFormat::Plain => format_plain(prompt, reply),
        ExportFormat::CanvasHtml => format_canvas_html(prompt, reply),
        ExportFormat::Announcement => format_announcement(prompt, reply),
    }
}

/// `Prompt:` and `Coastie Reply:` sections; the prompt section is dropped when blank.
pub fn format_plain(prompt: &str, reply: &str) -> String {
    let mut out = String::new();
    if !prompt.trim().is_empty() {
        out.push_str("Prompt:\n");
        out.push_str(prompt);
        out.push_str("\n\n");
    }
    out.push_str("Coastie Reply:\n");
    out.push_str(reply);
    out
}

/// A minimal HTML page with the escaped prompt and reply.
pub fn format_canvas_html(prompt: &str, reply: &str) -> String {
    let prompt = if prompt.trim().is_empty() {
        "Instructor request not captured."
    } else {
        prompt
    };
    let safe_prompt = escape_html(prompt);
    let safe_reply = escape_html(reply);
    format!(
        r#"<!DOCTYPE html>
<html>
<head>
  <meta charset="UTF-8" />
  <title>Coastie Export</title>
</head>
<body>
  <h2>Overview</h2>
  <p><strong>Instructor request:</strong> {safe_prompt}</p>

  <h2>Draft Content</h2>
  <p>{safe_reply}</p>

  <hr />
  <p style="font-size: 12px; color: #666;">
    Generated with Coastie (COASTAL CTL demo). Review for accuracy, accessibility, and policy alignment.
  </p>
</body>
</html>"#
    )
}

/// A course announcement draft with `Context`, `Message` and `Closing` sections.
pub fn format_announcement(prompt: &str, reply: &str) -> String {
    let context = if prompt.trim().is_empty() {
        "(No prompt captured.)"
    } else {
        prompt
    };
    let text = format!(
        "Course Announcement (Draft)\n\n\
         Context:\n{context}\n\n\
         Message:\n{}\n\n\
         Closing:\n\
         If you have questions or need support, please reach out. The CTL team is happy to help.",
        reply.trim()
    );
    text.trim().to_string()
}

/// Escapes `& < > " '` and turns newlines into `<br/>`.
pub fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            '\n' => out.push_str("<br/>"),
            c => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_format() {
        assert_eq!(
            format_plain("Fix this", "Here you go"),
            "Prompt:\nFix this\n\nCoastie Reply:\nHere you go"
        );
        assert_eq!(format_plain("  ", "Only reply"), "Coastie Reply:\nOnly reply");
    }

    #[test]
    fn canvas_html_escapes_inputs() {
        let html = format_canvas_html("a < b & c", "x > y\nnext 'line' \"q\"");
        assert!(html.starts_with("<!DOCTYPE html>"));
        assert!(html.ends_with("</html>"));
        assert!(html.contains("a &lt; b &amp; c"));
        assert!(html.contains("x &gt; y<br/>next &#39;line&#39; &quot;q&quot;"));
        assert!(!html.contains("a < b"));
    }

    #[test]
    fn canvas_html_blank_prompt_placeholder() {
        let html = format_canvas_html("", "reply");
        assert!(html.contains("<strong>Instructor request:</strong> Instructor request not captured."));
    }

    #[test]
    fn announcement_format() {
        let text = format_announcement("", "  Welcome back!  ");
        assert_eq!(
            text,
            "Course Announcement (Draft)\n\nContext:\n(No prompt captured.)\n\n\
             Message:\nWelcome back!\n\nClosing:\n\
             If you have questions or need support, please reach out. The CTL team is happy to help."
        );
    }

    #[test]
    fn format_names_parse() {
        for format in ExportFormat::ALL {
            assert_eq!(format.as_str().parse::<ExportFormat>().unwrap(), format);
        }
        assert_eq!("HTML".parse::<ExportFormat>().unwrap(), ExportFormat::CanvasHtml);
        assert!("pdf".parse::<ExportFormat>().unwrap_err().is_validation());
        assert_eq!(ExportFormat::CanvasHtml.label(), "Canvas-ready HTML");
    }

    #[test]
    fn store_keeps_only_latest() {
        let store = ExportStore::new();
        assert!(store.snapshot().render(ExportFormat::Plain).is_none());

        let handle = store.clone();
        handle.update("first", "one");
        store.update(" second ", " two ");

        let state = store.snapshot();
        assert_eq!(state.prompt(), "second");
        assert_eq!(state.reply(), "two");
        assert!(state.updated_at_epoch_ms > 0);
        assert_eq!(
            state.render(ExportFormat::Plain).unwrap(),
            "Prompt:\nsecond\n\nCoastie Reply:\ntwo"
        );

        store.clear();
        assert!(!handle.snapshot().has_reply());
    }

    #[test]
    fn blank_reply_is_not_exportable() {
        let store = ExportStore::new();
        store.update("prompt", "   ");
        assert!(store.snapshot().render(ExportFormat::Announcement).is_none());
    }

    #[tokio::test]
    async fn subscribers_are_notified() {
        let store = ExportStore::new();
        let mut rx = store.subscribe();
        store.update("p", "r");
        rx.changed().await.unwrap();
        assert_eq!(rx.borrow().reply(), "r");
    }
}
