//! Client configuration.
//!
//! [`ClientConfig`] is the explicit configuration object handed to
//! [`ChatClient`](crate::ChatClient).  It can be built in code, read from the environment once
//! at startup, or loaded from a YAML file.  The credential is validated for shape when the
//! client is constructed so that misconfiguration fails before any request is made.

use std::env;
use std::fmt;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::types::Model;

/// Environment variable holding the API credential.
pub const API_KEY_ENV: &str = "ANTHROPIC_API_KEY";

/// Environment variable that overrides the default model.
pub const MODEL_ENV: &str = "CHATFOLIO_MODEL";

/// Default maximum tokens per response.
pub const DEFAULT_MAX_TOKENS: u32 = 1024;

/// Default sampling temperature.
pub const DEFAULT_TEMPERATURE: f32 = 1.0;

/// Default number of attempts (the first try included) for a retried send.
pub const MAX_RETRY_ATTEMPTS: u32 = 3;

/// Default delay before the second attempt; each later attempt doubles it.
pub const RETRY_BASE_DELAY: Duration = Duration::from_millis(1000);

const API_KEY_PREFIX: &str = "sk-ant-";
const API_KEY_MIN_LEN: usize = 21;

///////////////////////////////////////////// ApiKey ////////////////////////////////////////////

/// An API credential that passed the shape check.
///
/// `Debug` and `Display` never print the secret.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiKey(String);

impl ApiKey {
    /// Checks an API key's shape without touching the network.
    ///
    /// A key must start with `sk-ant-` and be longer than 20 characters.
    pub fn is_valid(key: &str) -> bool {
        key.starts_with(API_KEY_PREFIX) && key.chars().count() >= API_KEY_MIN_LEN
    }

    /// Parses a key, failing with a configuration error if it is malformed.
    pub fn parse(key: impl Into<String>) -> Result<Self> {
        let key = key.into();
        if Self::is_valid(&key) {
            Ok(Self(key))
        } else {
            Err(Error::configuration(
                format!(
                    "API key must start with '{API_KEY_PREFIX}' and be longer than {} characters",
                    API_KEY_MIN_LEN - 1
                ),
                Some("api_key".to_string()),
            ))
        }
    }

    /// The raw secret, for use in request headers.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ApiKey({}…)", API_KEY_PREFIX)
    }
}

impl fmt::Display for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}…", API_KEY_PREFIX)
    }
}

////////////////////////////////////////// ClientConfig /////////////////////////////////////////

/// Configuration for a chat client.
///
/// Model, max tokens and temperature are fixed per client; the user cannot change them from
/// the chat.  Retry attempts and base delay control [`ChatClient::send_message_with_retry`].
///
/// [`ChatClient::send_message_with_retry`]: crate::ChatClient::send_message_with_retry
#[derive(Clone, Debug, PartialEq)]
pub struct ClientConfig {
    /// The API credential, unvalidated until the client is built.
    pub api_key: String,

    /// The model to use for generating responses.
    pub model: Model,

    /// Maximum tokens per response.
    pub max_tokens: u32,

    /// Sampling temperature.
    pub temperature: f32,

    /// Attempts per retried send, the first one included.
    pub max_retry_attempts: u32,

    /// Delay before the second attempt.
    pub retry_base_delay: Duration,
}

impl ClientConfig {
    /// Creates a configuration with default values and the given credential.
    ///
    /// Defaults:
    /// - Model: claude-sonnet-4-5-20250929
    /// - Max tokens: 1024
    /// - Temperature: 1.0
    /// - Retries: 3 attempts, 1 s base delay
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: Model::default(),
            max_tokens: DEFAULT_MAX_TOKENS,
            temperature: DEFAULT_TEMPERATURE,
            max_retry_attempts: MAX_RETRY_ATTEMPTS,
            retry_base_delay: RETRY_BASE_DELAY,
        }
    }

    /// Reads the credential (and optionally the model) from the environment.
    pub fn from_env() -> Result<Self> {
        let api_key = env::var(API_KEY_ENV).map_err(|_| {
            Error::configuration(
                format!("{API_KEY_ENV} environment variable not set"),
                Some("api_key".to_string()),
            )
        })?;
        let mut config = Self::new(api_key);
        if let Ok(model) = env::var(MODEL_ENV) {
            config.model = Model::from(model);
        }
        Ok(config)
    }

    /// Loads a configuration from a YAML file.
    ///
    /// Every field is optional.  A missing `api_key` is read from the environment.
    pub fn from_yaml_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|err| Error::io(format!("failed to read {}", path.display()), err))?;
        Self::from_yaml_str(&text)
    }

    /// Parses a configuration from YAML text.
    pub fn from_yaml_str(text: &str) -> Result<Self> {
        let file: ConfigFile = serde_yaml::from_str(text)?;
        let mut config = match file.api_key.clone() {
            Some(key) => Self::new(key),
            None => Self::from_env()?,
        };
        config.apply(file.into_update());
        Ok(config)
    }

    /// Sets the model to use.
    pub fn with_model(mut self, model: impl Into<Model>) -> Self {
        self.model = model.into();
        self
    }

    /// Sets the maximum tokens per response.
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Sets the sampling temperature.
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Sets the retry budget.
    pub fn with_retries(mut self, max_retry_attempts: u32, retry_base_delay: Duration) -> Self {
        self.max_retry_attempts = max_retry_attempts;
        self.retry_base_delay = retry_base_delay;
        self
    }

    /// Validates the configuration, returning the parsed credential.
    pub fn validate(&self) -> Result<ApiKey> {
        let key = ApiKey::parse(self.api_key.clone())?;
        if self.max_tokens == 0 {
            return Err(Error::configuration(
                "max_tokens must be positive",
                Some("max_tokens".to_string()),
            ));
        }
        if !(0.0..=1.0).contains(&self.temperature) {
            return Err(Error::configuration(
                format!("temperature {} is outside 0.0..=1.0", self.temperature),
                Some("temperature".to_string()),
            ));
        }
        if self.max_retry_attempts == 0 {
            return Err(Error::configuration(
                "max_retry_attempts must be at least 1",
                Some("max_retry_attempts".to_string()),
            ));
        }
        Ok(key)
    }

    /// Overrides the fields present in `update`.
    pub fn apply(&mut self, update: ConfigUpdate) {
        if let Some(api_key) = update.api_key {
            self.api_key = api_key;
        }
        if let Some(model) = update.model {
            self.model = model;
        }
        if let Some(max_tokens) = update.max_tokens {
            self.max_tokens = max_tokens;
        }
        if let Some(temperature) = update.temperature {
            self.temperature = temperature;
        }
    }

    /// The delay to wait after attempt `attempt` (1-based) fails.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.retry_base_delay.saturating_mul(1u32 << exponent)
    }
}

/// A partial configuration change.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ConfigUpdate {
    /// New credential.
    pub api_key: Option<String>,
    /// New model.
    pub model: Option<Model>,
    /// New response token limit.
    pub max_tokens: Option<u32>,
    /// New sampling temperature.
    pub temperature: Option<f32>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    api_key: Option<String>,
    model: Option<String>,
    max_tokens: Option<u32>,
    temperature: Option<f32>,
}

impl ConfigFile {
    fn into_update(self) -> ConfigUpdate {
        ConfigUpdate {
            api_key: None,
            model: self.model.map(Model::from),
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        }
    }
}
