//! Terminal output for the chat binary.
//!
//! This module provides a trait-based rendering abstraction so the REPL can
//! print with or without ANSI styling.

use std::io::{self, Stdout, Write};

use crate::attachment::AttachmentMeta;
use crate::history::HistoryEntry;
use crate::utils::time::format_epoch_ms;

/// ANSI escape code for dim text (used for secondary details).
const ANSI_DIM: &str = "\x1b[2m";

/// ANSI escape code for bold text (used for headings).
const ANSI_BOLD: &str = "\x1b[1m";

/// ANSI escape code to reset all styling.
const ANSI_RESET: &str = "\x1b[0m";

/// ANSI escape code for cyan text (used for the assistant label).
const ANSI_CYAN: &str = "\x1b[36m";

/// ANSI escape code for red text (used for errors).
const ANSI_RED: &str = "\x1b[31m";

/// Trait for rendering chat output.
///
/// This abstraction allows for different rendering strategies:
/// - Plain text with ANSI styling
/// - Plain text without styling (for piping/redirecting)
pub trait Renderer: Send {
    /// Print the assistant's reply.
    fn print_reply(&mut self, reply: &str);

    /// Print an error message.
    fn print_error(&mut self, error: &str);

    /// Print an informational message.
    fn print_info(&mut self, info: &str);

    /// Print a section heading.
    fn print_heading(&mut self, heading: &str);

    /// Print secondary, de-emphasized text.
    fn print_detail(&mut self, detail: &str);

    /// Print a note that a request is in flight.
    fn print_waiting(&mut self) {
        self.print_detail("Coastie is thinking... (Ctrl-C to cancel)");
    }

    /// Print the pending attachment line.
    fn print_attachment(&mut self, meta: &AttachmentMeta) {
        self.print_detail(&format!("Attached: {} ({})", meta.name, meta.summary()));
    }

    /// Print one history card.
    fn print_history_entry(&mut self, entry: &HistoryEntry) {
        self.print_heading(&format!("#{} {}", entry.id, entry.title()));
        self.print_detail(&format_epoch_ms(entry.created_at_epoch_ms));
        self.print_info(&entry.preview());
        if let Some(meta) = &entry.attachment {
            self.print_detail(&format!("Attachment: {} ({})", meta.name, meta.summary()));
        }
    }

    /// Print one history entry in full, reply included.
    fn print_history_detail(&mut self, entry: &HistoryEntry) {
        self.print_heading(&format!("#{} {}", entry.id, entry.title()));
        self.print_detail(&format_epoch_ms(entry.created_at_epoch_ms));
        if let Some(meta) = &entry.attachment {
            self.print_detail(&format!("Attachment: {} ({})", meta.name, meta.summary()));
        }
        self.print_detail("Prompt:");
        self.print_info(&entry.prompt);
        self.print_detail("Reply:");
        self.print_info(&entry.response);
    }
}

/// Plain text renderer with optional ANSI styling.
///
/// Writes to stdout by default; errors always go to stderr.
pub struct PlainTextRenderer<W: Write + Send = Stdout> {
    out: W,
    use_color: bool,
}

impl PlainTextRenderer {
    /// Creates a new PlainTextRenderer with ANSI colors enabled.
    pub fn new() -> Self {
        Self::with_color(true)
    }

    /// Creates a new PlainTextRenderer with specified color setting.
    pub fn with_color(use_color: bool) -> Self {
        Self {
            out: io::stdout(),
            use_color,
        }
    }
}

impl<W: Write + Send> PlainTextRenderer<W> {
    /// Creates a renderer writing to `out`.
    pub fn with_writer(out: W, use_color: bool) -> Self {
        Self { out, use_color }
    }

    /// Returns the underlying writer.
    pub fn into_inner(self) -> W {
        self.out
    }

    fn styled(&mut self, style: &str, text: &str) {
        if self.use_color {
            let _ = writeln!(self.out, "{style}{text}{ANSI_RESET}");
        } else {
            let _ = writeln!(self.out, "{text}");
        }
        let _ = self.out.flush();
    }
}

impl Default for PlainTextRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl<W: Write + Send> Renderer for PlainTextRenderer<W> {
    fn print_reply(&mut self, reply: &str) {
        self.styled(ANSI_CYAN, "Coastie:");
        let _ = writeln!(self.out, "{reply}\n");
        let _ = self.out.flush();
    }

    fn print_error(&mut self, error: &str) {
        if self.use_color {
            eprintln!("{ANSI_RED}Error: {error}{ANSI_RESET}");
        } else {
            eprintln!("Error: {error}");
        }
    }

    fn print_info(&mut self, info: &str) {
        let _ = writeln!(self.out, "{info}");
        let _ = self.out.flush();
    }

    fn print_heading(&mut self, heading: &str) {
        self.styled(ANSI_BOLD, heading);
    }

    fn print_detail(&mut self, detail: &str) {
        self.styled(ANSI_DIM, detail);
    }
}
