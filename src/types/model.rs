use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// A model identifier.
///
/// Known models parse into [`KnownModel`]; anything else is carried verbatim so that new or
/// private models work without a release.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Model {
    /// A model this crate knows by name.
    Known(KnownModel),

    /// Any other model identifier.
    Custom(String),
}

/// Models known by name.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum KnownModel {
    /// Claude Sonnet 4.5 (2025-09-29 snapshot); the chat default.
    ClaudeSonnet4520250929,

    /// Claude Sonnet 4.5 (latest alias).
    ClaudeSonnet45,

    /// Claude Haiku 4.5 (latest alias).
    ClaudeHaiku45,

    /// Claude Opus 4.1 (latest alias).
    ClaudeOpus41,

    /// Claude Sonnet 4.0 (latest alias).
    ClaudeSonnet40,
}

impl KnownModel {
    const ALL: [KnownModel; 5] = [
        KnownModel::ClaudeSonnet4520250929,
        KnownModel::ClaudeSonnet45,
        KnownModel::ClaudeHaiku45,
        KnownModel::ClaudeOpus41,
        KnownModel::ClaudeSonnet40,
    ];

    /// The identifier the provider expects.
    pub fn as_str(&self) -> &'static str {
        match self {
            KnownModel::ClaudeSonnet4520250929 => "claude-sonnet-4-5-20250929",
            KnownModel::ClaudeSonnet45 => "claude-sonnet-4-5",
            KnownModel::ClaudeHaiku45 => "claude-haiku-4-5",
            KnownModel::ClaudeOpus41 => "claude-opus-4-1",
            KnownModel::ClaudeSonnet40 => "claude-sonnet-4-0",
        }
    }
}

impl Model {
    /// The identifier the provider expects.
    pub fn as_str(&self) -> &str {
        match self {
            Model::Known(known) => known.as_str(),
            Model::Custom(custom) => custom,
        }
    }
}

impl Default for Model {
    fn default() -> Self {
        Model::Known(KnownModel::ClaudeSonnet4520250929)
    }
}

impl fmt::Display for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for KnownModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Model {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(KnownModel::ALL
            .iter()
            .find(|known| known.as_str() == s)
            .map(|known| Model::Known(*known))
            .unwrap_or_else(|| Model::Custom(s.to_string())))
    }
}

impl From<KnownModel> for Model {
    fn from(model: KnownModel) -> Self {
        Model::Known(model)
    }
}

impl From<&str> for Model {
    fn from(model: &str) -> Self {
        match model.parse() {
            Ok(model) => model,
            Err(never) => match never {},
        }
    }
}

impl From<String> for Model {
    fn from(model: String) -> Self {
        Model::from(model.as_str())
    }
}

impl Serialize for Model {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Model {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(Model::from(s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_sonnet_snapshot() {
        assert_eq!(Model::default().to_string(), "claude-sonnet-4-5-20250929");
    }

    #[test]
    fn parse_known_and_custom() {
        assert_eq!(
            "claude-haiku-4-5".parse::<Model>().unwrap(),
            Model::Known(KnownModel::ClaudeHaiku45)
        );
        assert_eq!(
            Model::from("my-private-model"),
            Model::Custom("my-private-model".to_string())
        );
    }

    #[test]
    fn serde_uses_plain_strings() {
        let json = serde_json::to_string(&Model::Known(KnownModel::ClaudeOpus41)).unwrap();
        assert_eq!(json, r#""claude-opus-4-1""#);
        let model: Model = serde_json::from_str(r#""claude-next""#).unwrap();
        assert_eq!(model, Model::Custom("claude-next".to_string()));
    }
}
