//! Terminal front-end for the chat controller.
//!
//! This module provides a streaming REPL interface built on top of
//! [`ChatController`](crate::ChatController). It supports:
//!
//! - Streaming replies rendered as fragments arrive
//! - Slash commands for session control
//! - Configurable model and parameters from the command line or a YAML file
//!
//! # Architecture
//!
//! - [`config`]: CLI argument parsing and configuration
//! - [`session`]: Drives the controller and renders its state
//! - [`commands`]: Slash command parsing
//! - [`render`]: Output rendering

mod commands;
mod config;
mod render;
mod session;

pub use commands::{ChatCommand, help_text, parse_command};
pub use config::{ChatArgs, ChatConfig};
pub use render::{PlainTextRenderer, Renderer};
pub use session::{ChatSession, SUGGESTED_PROMPTS, WELCOME_MESSAGE};
