//! Interactive chat with the portfolio assistant.
//!
//! # Usage
//!
//! ```bash
//! # Credential from ANTHROPIC_API_KEY, default model
//! chatfolio-chat
//!
//! # Specify a model and token limit
//! chatfolio-chat --model claude-haiku-4-5 --max-tokens 512
//!
//! # Read settings from a YAML file
//! chatfolio-chat --config chatfolio.yaml
//!
//! # Disable colors (useful for piping output)
//! chatfolio-chat --no-color
//! ```
//!
//! Set `RUST_LOG=chatfolio=debug` to see requests and retries on stderr.
//!
//! # Commands
//!
//! - `/help` - Show available commands
//! - `/clear` - Clear the conversation
//! - `/dismiss` - Dismiss the current error
//! - `/retry` - Send the last message again
//! - `/quit` - Exit the application

use std::sync::Arc;

use arrrg::CommandLine;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use tracing_subscriber::EnvFilter;

use chatfolio::chat::{
    ChatArgs, ChatCommand, ChatConfig, ChatSession, PlainTextRenderer, Renderer,
    SUGGESTED_PROMPTS, WELCOME_MESSAGE, help_text, parse_command,
};
use chatfolio::{ChatClient, ChatController};

/// Main entry point for the chatfolio-chat application.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let (args, _) = ChatArgs::from_command_line_relaxed("chatfolio-chat [OPTIONS]");
    let config = ChatConfig::from(args);
    let client = ChatClient::new(config.client_config()?)?;
    let model = client.config().model;
    let controller = Arc::new(ChatController::new(Arc::new(client)));
    let session = ChatSession::new(Arc::clone(&controller));
    let mut renderer = PlainTextRenderer::with_color(config.use_color);
    let mut rl = DefaultEditor::new()?;

    // Ctrl+C while a reply streams stops the reply, not the program.
    let interrupt = Arc::clone(&controller);
    ctrlc::set_handler(move || {
        interrupt.cancel();
    })?;

    println!("AI Chat Assistant (model: {model})");
    println!("Type /help for commands, /quit to exit\n");
    renderer.print_welcome(WELCOME_MESSAGE, &SUGGESTED_PROMPTS);

    loop {
        let readline = rl.readline("You: ");

        match readline {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }

                let _ = rl.add_history_entry(line);

                if let Some(cmd) = parse_command(line) {
                    match cmd {
                        ChatCommand::Quit => {
                            println!("Goodbye!");
                            break;
                        }
                        ChatCommand::Clear => {
                            session.clear();
                            renderer.print_info("Conversation cleared.");
                            renderer.print_welcome(WELCOME_MESSAGE, &SUGGESTED_PROMPTS);
                        }
                        ChatCommand::Dismiss => {
                            if !session.dismiss() {
                                renderer.print_info("No error to dismiss.");
                            }
                        }
                        ChatCommand::Retry => {
                            if session.retry(&mut renderer).await.is_none() {
                                renderer.print_info("Nothing to retry yet.");
                            }
                        }
                        ChatCommand::Help => {
                            for line in help_text().lines() {
                                println!("    {line}");
                            }
                        }
                        ChatCommand::Invalid(message) => {
                            renderer.print_error(&message);
                        }
                    }
                    continue;
                }

                println!("Assistant:");
                session.send(line, &mut renderer).await;
            }
            Err(ReadlineError::Interrupted) => {
                // Ctrl+C at the prompt
                println!();
                continue;
            }
            Err(ReadlineError::Eof) => {
                println!("\nGoodbye!");
                break;
            }
            Err(err) => {
                renderer.print_error(&format!("Input error: {err}"));
                break;
            }
        }
    }

    Ok(())
}
