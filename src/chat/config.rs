//! Configuration types for the chat application.
//!
//! This module provides CLI argument parsing via `arrrg` and resolves the arguments into a
//! [`ClientConfig`].

use std::path::PathBuf;

use arrrg_derive::CommandLine;

use crate::config::{ClientConfig, ConfigUpdate};
use crate::error::{Error, Result};
use crate::types::Model;

/// Command-line arguments for the chatfolio-chat tool.
#[derive(CommandLine, Debug, Default, Eq, PartialEq)]
pub struct ChatArgs {
    /// Model to use for chat.
    #[arrrg(optional, "Model to use (default: claude-sonnet-4-5-20250929)", "MODEL")]
    pub model: Option<String>,

    /// Maximum tokens per response.
    #[arrrg(optional, "Max tokens per response (default: 1024)", "TOKENS")]
    pub max_tokens: Option<u32>,

    /// Sampling temperature.
    #[arrrg(optional, "Sampling temperature 0.0-1.0 (default: 1.0)", "TEMP")]
    pub temperature: Option<String>,

    /// YAML configuration file.
    #[arrrg(optional, "YAML file with api_key, model, max_tokens, temperature", "PATH")]
    pub config: Option<String>,

    /// Disable ANSI colors and styles.
    #[arrrg(flag, "Disable ANSI colors/styles")]
    pub no_color: bool,
}

/// Resolved settings for a chat session.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChatConfig {
    /// File to read the client configuration from instead of the environment.
    pub config_path: Option<PathBuf>,

    /// Overrides applied on top of the file or environment.
    pub overrides: ConfigUpdate,

    /// Sampling temperature as given on the command line; parsed by [`Self::client_config`].
    pub temperature: Option<String>,

    /// Whether to use ANSI colors and styles in output.
    pub use_color: bool,
}

impl ChatConfig {
    /// Builds the client configuration.
    ///
    /// The base comes from the YAML file when one was given, otherwise from the environment;
    /// command-line overrides win over both.
    pub fn client_config(&self) -> Result<ClientConfig> {
        let mut overrides = self.overrides.clone();
        if let Some(temperature) = &self.temperature {
            overrides.temperature = Some(parse_temperature(temperature)?);
        }
        let mut config = match &self.config_path {
            Some(path) => ClientConfig::from_yaml_file(path)?,
            None => ClientConfig::from_env()?,
        };
        config.apply(overrides);
        Ok(config)
    }
}

fn parse_temperature(text: &str) -> Result<f32> {
    match text.trim().parse::<f32>() {
        Ok(temperature) if (0.0..=1.0).contains(&temperature) => Ok(temperature),
        _ => Err(Error::configuration(
            format!("temperature must be a number between 0.0 and 1.0, got {text:?}"),
            Some("temperature".to_string()),
        )),
    }
}

impl From<ChatArgs> for ChatConfig {
    fn from(args: ChatArgs) -> Self {
        ChatConfig {
            config_path: args.config.map(PathBuf::from),
            overrides: ConfigUpdate {
                api_key: None,
                model: args.model.map(Model::from),
                max_tokens: args.max_tokens,
                temperature: None,
            },
            temperature: args.temperature,
            use_color: !args.no_color,
        }
    }
}
