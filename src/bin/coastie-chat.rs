//! Interactive Coastie assistant for instructors.
//!
//! This binary provides a REPL over the Coastie chat endpoint with scenario
//! prompts, exports, and a local history of exchanges.
//!
//! # Usage
//!
//! ```bash
//! # Basic usage with default settings
//! coastie-chat
//!
//! # Talk to a local backend and keep history elsewhere
//! coastie-chat --endpoint http://localhost:8888/chat --history /tmp/coastie.sqlite3
//!
//! # Disable colors (useful for piping output)
//! coastie-chat --no-color
//! ```
//!
//! # Commands
//!
//! While chatting, you can use slash commands:
//! - `/help` - Show available commands
//! - `/scenarios` - List scenario prompts
//! - `/export [format]` - Show the latest reply ready to paste
//! - `/history` - List saved exchanges
//! - `/view <id>` - Show a saved exchange with its reply
//! - `/quit` - Exit the application

use arrrg::CommandLine;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use tracing_subscriber::EnvFilter;

use coastie::chat::{
    ChatArgs, ChatCommand, ChatSession, CoastieConfig, PlainTextRenderer, Renderer, Role,
    SendOutcome, help_text, parse_command,
};
use coastie::{AppContext, Attachment, Coastie, ExportFormat, Navigator, Scenario, Screen};

/// Main entry point for the coastie-chat application.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let (args, _) = ChatArgs::from_command_line_relaxed("coastie-chat [OPTIONS]");
    let config = CoastieConfig::try_from(args)?;
    let use_color = config.use_color;

    let client = Coastie::new(&config)?;
    let app = AppContext::open(&config)?;
    let mut session = app.session(client);
    let mut navigator = Navigator::new();
    let mut renderer = PlainTextRenderer::with_color(use_color);
    let mut rl = DefaultEditor::new()?;

    // Ctrl+C while a request is in flight cancels just that request.
    let interrupter = session.interrupter();
    ctrlc::set_handler(move || {
        interrupter.interrupt();
    })?;

    println!("Coastie (endpoint: {})", session.backend().endpoint());
    println!("Type /help for commands, /quit to exit\n");
    show_screen(Screen::Scenarios, &app, &session, &mut renderer);

    loop {
        let readline = rl.readline(&format!("{}> ", navigator.current().route()));

        match readline {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }

                let _ = rl.add_history_entry(line);

                // Check for slash commands
                if let Some(cmd) = parse_command(line) {
                    match cmd {
                        ChatCommand::Quit => {
                            println!("Goodbye!");
                            break;
                        }
                        ChatCommand::Help => {
                            for line in help_text().lines() {
                                println!("    {}", line);
                            }
                        }
                        ChatCommand::Scenarios => {
                            navigator.navigate(Screen::Scenarios);
                            show_screen(Screen::Scenarios, &app, &session, &mut renderer);
                        }
                        ChatCommand::Scenario(scenario) => {
                            app.prompts().choose(scenario);
                            navigator.navigate(Screen::PromptEditor);
                            show_screen(Screen::PromptEditor, &app, &session, &mut renderer);
                        }
                        ChatCommand::Edit(text) => match app.prompts().edit(text) {
                            Ok(()) => {
                                navigator.navigate(Screen::PromptEditor);
                                show_screen(Screen::PromptEditor, &app, &session, &mut renderer);
                            }
                            Err(err) => renderer.print_error(&format!(
                                "{err}. Pick one with /scenario <id> first."
                            )),
                        },
                        ChatCommand::Run => {
                            if session.load_pending().is_none() {
                                renderer.print_error("No scenario prompt is pending.");
                                continue;
                            }
                            navigator.navigate(Screen::Chat);
                            send(&mut session, &mut renderer).await;
                        }
                        ChatCommand::Attach(path) => match Attachment::from_path(&path) {
                            Ok(attachment) => {
                                renderer.print_attachment(attachment.meta());
                                session.set_attachment(attachment);
                            }
                            Err(err) => renderer.print_error(&err.to_string()),
                        },
                        ChatCommand::Detach => {
                            session.clear_attachment();
                            renderer.print_info("Attachment removed.");
                        }
                        ChatCommand::Export(format) => {
                            navigator.navigate(Screen::Exports);
                            show_export(&app, format, &mut renderer);
                        }
                        ChatCommand::History => {
                            navigator.navigate(Screen::History);
                            show_screen(Screen::History, &app, &session, &mut renderer);
                        }
                        ChatCommand::View(id) => match app.history().get(id) {
                            Some(entry) => {
                                navigator.navigate(Screen::History);
                                renderer.print_history_detail(&entry);
                            }
                            None => renderer.print_error(&format!("No entry #{id}.")),
                        },
                        ChatCommand::Delete(id) => match app.history().delete_by_id(id).await {
                            Ok(true) => renderer.print_info(&format!("Deleted entry #{id}.")),
                            Ok(false) => renderer.print_error(&format!("No entry #{id}.")),
                            Err(err) => renderer.print_error(&err.to_string()),
                        },
                        ChatCommand::ClearHistory { confirmed } => {
                            let confirmed = confirmed
                                || matches!(
                                    rl.readline("Clear history? This deletes every saved exchange. [y/N] "),
                                    Ok(answer) if matches!(answer.trim(), "y" | "Y" | "yes")
                                );
                            if !confirmed {
                                renderer.print_info("History kept.");
                                continue;
                            }
                            match app.history().clear().await {
                                Ok(count) => {
                                    renderer.print_info(&format!("Cleared {count} entries."))
                                }
                                Err(err) => renderer.print_error(&err.to_string()),
                            }
                        }
                        ChatCommand::New => {
                            session.clear_messages();
                            session.clear_attachment();
                            session.set_scenario_title(None);
                            renderer.print_info("Started a new conversation.");
                        }
                        ChatCommand::Go(screen) => {
                            navigator.navigate(screen);
                            show_screen(screen, &app, &session, &mut renderer);
                        }
                        ChatCommand::Back => {
                            if navigator.back() {
                                show_screen(navigator.current(), &app, &session, &mut renderer);
                            } else {
                                renderer.print_info("Already at the first screen.");
                            }
                        }
                        ChatCommand::Invalid(message) => {
                            renderer.print_error(&message);
                        }
                    }
                    continue;
                }

                // Regular message - send to the backend
                navigator.navigate(Screen::Chat);
                session.set_input(line);
                send(&mut session, &mut renderer).await;
            }
            Err(ReadlineError::Interrupted) => {
                // Ctrl+C at prompt - soft interrupt
                println!();
                continue;
            }
            Err(ReadlineError::Eof) => {
                // Ctrl+D - exit
                println!("\nGoodbye!");
                break;
            }
            Err(err) => {
                renderer.print_error(&format!("Input error: {}", err));
                break;
            }
        }
    }

    session.flush().await;
    app.shutdown();
    Ok(())
}

async fn send(session: &mut ChatSession<Coastie>, renderer: &mut PlainTextRenderer) {
    if let Some(meta) = &session.state().attachment {
        renderer.print_attachment(meta);
    }
    renderer.print_waiting();
    match session.send().await {
        SendOutcome::Skipped => {}
        SendOutcome::Completed(result) => {
            if let Some(message) = session.state().messages.last() {
                renderer.print_reply(&message.text);
            }
            if let Some(error) = result.error {
                renderer.print_error(&error);
            }
        }
        SendOutcome::Cancelled => renderer.print_info("Request cancelled."),
    }
}

fn show_screen(
    screen: Screen,
    app: &AppContext,
    session: &ChatSession<Coastie>,
    renderer: &mut PlainTextRenderer,
) {
    match screen {
        Screen::Scenarios => {
            renderer.print_heading("Scenarios");
            for (index, scenario) in Scenario::ALL.iter().enumerate() {
                renderer.print_info(&format!(
                    "  {}. {} [{}]",
                    index + 1,
                    scenario.title(),
                    scenario.id()
                ));
                renderer.print_detail(&format!("     {}", scenario.subtitle()));
            }
            renderer.print_detail("Pick one with /scenario <id>, or just type a message.");
        }
        Screen::PromptEditor => match app.prompts().pending() {
            Some(pending) => {
                renderer.print_heading(&pending.title);
                renderer.print_info(&pending.prompt);
                renderer.print_detail("/edit <text> to rewrite it, /run to send it.");
            }
            None => renderer.print_info("No scenario selected. Use /scenarios to pick one."),
        },
        Screen::Chat => {
            let state = session.state();
            renderer.print_heading("Chat");
            if state.messages.is_empty() {
                renderer.print_detail("No messages yet.");
            }
            for message in &state.messages {
                match message.role {
                    Role::User => renderer.print_info(&format!("You: {}", message.text)),
                    Role::Assistant => renderer.print_reply(&message.text),
                }
            }
            if let Some(meta) = &state.attachment {
                renderer.print_attachment(meta);
            }
        }
        Screen::Exports => show_export(app, ExportFormat::default(), renderer),
        Screen::History => {
            let entries = app.history().entries();
            renderer.print_heading("History");
            if entries.is_empty() {
                renderer.print_detail("No saved exchanges yet.");
            }
            for entry in &entries {
                renderer.print_history_entry(entry);
            }
        }
    }
}

fn show_export(app: &AppContext, format: ExportFormat, renderer: &mut PlainTextRenderer) {
    renderer.print_heading(&format!("Exports: {}", format.label()));
    match app.exports().snapshot().render(format) {
        Some(text) => renderer.print_info(&text),
        None => {
            renderer.print_info("No reply to export yet.");
            renderer.print_detail("Send a message, then come back with /export.");
        }
    }
}
