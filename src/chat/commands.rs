//! Slash command parsing for the chat application.
//!
//! This module handles parsing of special commands that start with `/`,
//! allowing users to move between screens and manage history without
//! sending messages to the backend.

use crate::export::ExportFormat;
use crate::scenario::Scenario;
use crate::screen::Screen;

/// A parsed chat command.
///
/// These commands control the application and are not sent to the backend.
#[derive(Debug, Clone, PartialEq)]
pub enum ChatCommand {
    /// List the scenario cards.
    Scenarios,

    /// Pick a scenario and open its prompt in the editor.
    Scenario(Scenario),

    /// Replace the pending scenario prompt.
    Edit(String),

    /// Send the pending scenario prompt.
    Run,

    /// Attach a file to the next message.
    Attach(String),

    /// Drop the pending attachment.
    Detach,

    /// Show the latest exchange in an export format.
    Export(ExportFormat),

    /// List history entries.
    History,

    /// Show one history entry in full.
    View(i64),

    /// Delete one history entry.
    Delete(i64),

    /// Delete every history entry. Unconfirmed requests ask first.
    ClearHistory { confirmed: bool },

    /// Start a fresh transcript.
    New,

    /// Switch to a screen.
    Go(Screen),

    /// Return to the previous screen.
    Back,

    /// Display help information.
    Help,

    /// Exit the chat application.
    Quit,

    /// Report a parsing error back to the caller.
    Invalid(String),
}

/// Parses user input for slash commands.
///
/// Returns `Some(ChatCommand)` if the input is a valid command,
/// or `None` if it should be treated as a regular message.
///
/// # Examples
///
/// ```
/// # use coastie::chat::parse_command;
/// assert!(parse_command("/quit").is_some());
/// assert!(parse_command("/scenario rubric").is_some());
/// assert!(parse_command("Hello, Coastie!").is_none());
/// ```
pub fn parse_command(input: &str) -> Option<ChatCommand> {
    let input = input.trim();
    let rest = input.strip_prefix('/')?;

    let mut parts = rest.splitn(2, char::is_whitespace);
    let command = parts.next()?.to_lowercase();
    let argument = parts.next().map(|s| s.trim()).filter(|s| !s.is_empty());

    let result = match command.as_str() {
        "scenarios" => ChatCommand::Scenarios,
        "scenario" => match argument {
            Some(arg) => match arg.parse() {
                Ok(scenario) => ChatCommand::Scenario(scenario),
                Err(_) => ChatCommand::Invalid(format!(
                    "Unknown scenario: {arg} (use /scenarios to list them)"
                )),
            },
            None => ChatCommand::Invalid("/scenario requires a scenario id".to_string()),
        },
        "edit" => match argument {
            Some(text) => ChatCommand::Edit(text.to_string()),
            None => ChatCommand::Invalid("/edit requires the new prompt text".to_string()),
        },
        "run" => ChatCommand::Run,
        "attach" => match argument {
            Some(path) => ChatCommand::Attach(path.to_string()),
            None => ChatCommand::Invalid("/attach requires a file path".to_string()),
        },
        "detach" => ChatCommand::Detach,
        "export" => match argument {
            None => ChatCommand::Export(ExportFormat::default()),
            Some(arg) => match arg.parse() {
                Ok(format) => ChatCommand::Export(format),
                Err(_) => ChatCommand::Invalid(
                    "/export expects plain, canvas, or announcement".to_string(),
                ),
            },
        },
        "history" => ChatCommand::History,
        "view" => match argument.map(str::parse::<i64>) {
            Some(Ok(id)) => ChatCommand::View(id),
            Some(Err(_)) => ChatCommand::Invalid("/view expects a numeric id".to_string()),
            None => ChatCommand::Invalid("/view requires an entry id".to_string()),
        },
        "delete" => match argument.map(str::parse::<i64>) {
            Some(Ok(id)) => ChatCommand::Delete(id),
            Some(Err(_)) => ChatCommand::Invalid("/delete expects a numeric id".to_string()),
            None => ChatCommand::Invalid("/delete requires an entry id".to_string()),
        },
        "clear-history" => match argument {
            None => ChatCommand::ClearHistory { confirmed: false },
            Some(arg) if arg.eq_ignore_ascii_case("confirm") => {
                ChatCommand::ClearHistory { confirmed: true }
            }
            Some(arg) => ChatCommand::Invalid(format!(
                "Unexpected argument to /clear-history: {arg} (use confirm to skip the prompt)"
            )),
        },
        "new" | "clear" => ChatCommand::New,
        "go" => match argument {
            Some(route) => match Screen::from_route(route) {
                Ok(screen) => ChatCommand::Go(screen),
                Err(_) => ChatCommand::Invalid(format!("Unknown screen: {route}")),
            },
            None => ChatCommand::Invalid("/go requires a screen name".to_string()),
        },
        "back" => ChatCommand::Back,
        "help" | "?" => ChatCommand::Help,
        "quit" | "exit" | "q" => ChatCommand::Quit,
        _ => ChatCommand::Invalid(format!("Unknown command: /{}", command)),
    };

    Some(result)
}

/// Returns help text describing available commands.
pub fn help_text() -> &'static str {
    r#"Available commands:
  /scenarios             List the scenario prompts
  /scenario <id>         Pick a scenario (id or number) and open its prompt
  /edit <text>           Replace the pending scenario prompt
  /run                   Send the pending scenario prompt
  /attach <path>         Attach a file to the next message
  /detach                Remove the pending attachment
  /export [format]       Show the latest reply as plain, canvas, or announcement
  /history               List saved exchanges
  /view <id>             Show a saved exchange with its reply
  /delete <id>           Delete one saved exchange
  /clear-history         Delete every saved exchange (asks first)
  /new                   Start a new conversation
  /go <screen>           Switch to scenarios, chat, exports, or history
  /back                  Return to the previous screen
  /help                  Show this help message
  /quit                  Exit the chat"#
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_quit_commands() {
        assert_eq!(parse_command("/quit"), Some(ChatCommand::Quit));
        assert_eq!(parse_command("/exit"), Some(ChatCommand::Quit));
        assert_eq!(parse_command("/q"), Some(ChatCommand::Quit));
        assert_eq!(parse_command("  /quit  "), Some(ChatCommand::Quit));
    }

    #[test]
    fn parse_scenario() {
        assert_eq!(
            parse_command("/scenario accessibility"),
            Some(ChatCommand::Scenario(Scenario::Accessibility))
        );
        assert_eq!(
            parse_command("/SCENARIO 3"),
            Some(ChatCommand::Scenario(Scenario::RubricIntegrity))
        );
        assert!(matches!(
            parse_command("/scenario nope"),
            Some(ChatCommand::Invalid(msg)) if msg.contains("Unknown scenario")
        ));
        assert!(matches!(
            parse_command("/scenario"),
            Some(ChatCommand::Invalid(msg)) if msg.contains("requires")
        ));
    }

    #[test]
    fn parse_edit_keeps_text() {
        assert_eq!(
            parse_command("/edit  Check my   syllabus "),
            Some(ChatCommand::Edit("Check my   syllabus".to_string()))
        );
    }

    #[test]
    fn parse_export() {
        assert_eq!(
            parse_command("/export"),
            Some(ChatCommand::Export(ExportFormat::Plain))
        );
        assert_eq!(
            parse_command("/export canvas"),
            Some(ChatCommand::Export(ExportFormat::CanvasHtml))
        );
        assert!(matches!(
            parse_command("/export pdf"),
            Some(ChatCommand::Invalid(_))
        ));
    }

    #[test]
    fn parse_history_commands() {
        assert_eq!(parse_command("/history"), Some(ChatCommand::History));
        assert_eq!(parse_command("/delete 42"), Some(ChatCommand::Delete(42)));
        assert!(matches!(
            parse_command("/delete forty"),
            Some(ChatCommand::Invalid(msg)) if msg.contains("numeric")
        ));
        assert_eq!(parse_command("/view 7"), Some(ChatCommand::View(7)));
        assert!(matches!(
            parse_command("/view"),
            Some(ChatCommand::Invalid(msg)) if msg.contains("requires")
        ));
        assert_eq!(
            parse_command("/clear-history"),
            Some(ChatCommand::ClearHistory { confirmed: false })
        );
        assert_eq!(
            parse_command("/clear-history confirm"),
            Some(ChatCommand::ClearHistory { confirmed: true })
        );
        assert!(matches!(
            parse_command("/clear-history now"),
            Some(ChatCommand::Invalid(_))
        ));
    }

    #[test]
    fn parse_attach_and_go() {
        assert_eq!(
            parse_command("/attach ./quiz.docx"),
            Some(ChatCommand::Attach("./quiz.docx".to_string()))
        );
        assert_eq!(parse_command("/detach"), Some(ChatCommand::Detach));
        assert_eq!(
            parse_command("/go exports"),
            Some(ChatCommand::Go(Screen::Exports))
        );
        assert!(matches!(
            parse_command("/go settings"),
            Some(ChatCommand::Invalid(_))
        ));
        assert_eq!(parse_command("/back"), Some(ChatCommand::Back));
    }

    #[test]
    fn non_commands() {
        assert_eq!(parse_command("Hello, Coastie!"), None);
        assert_eq!(parse_command(""), None);
        assert_eq!(parse_command("  "), None);
    }

    #[test]
    fn help_text_lists_commands() {
        let help = help_text();
        for command in ["/scenario", "/export", "/history", "/view", "/back", "/attach", "/quit"] {
            assert!(help.contains(command), "missing {command}");
        }
    }
}
