//! LLM provider identity and per-call connection settings.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The four supported completion providers.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    #[default]
    OpenAi,
    OpenRouter,
    Gemini,
    /// Any OpenAI-compatible endpoint reached through a caller-supplied base URL.
    Custom,
}

/// Request/response envelope a provider speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireFormat {
    /// `{model, messages, ...}` in, `{choices:[{message:{content}}]}` out.
    ChatCompletions,
    /// `{contents, generationConfig}` in, `{candidates:[{content:{parts}}]}` out.
    GenerateContent,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown provider: {0} (expected openai, openrouter, gemini or custom)")]
pub struct ParseProviderKindError(String);

impl FromStr for ProviderKind {
    type Err = ParseProviderKindError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "openai" => Ok(Self::OpenAi),
            "openrouter" => Ok(Self::OpenRouter),
            "gemini" | "google" => Ok(Self::Gemini),
            "custom" => Ok(Self::Custom),
            _ => Err(ParseProviderKindError(s.to_string())),
        }
    }
}

impl ProviderKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::OpenRouter => "openrouter",
            Self::Gemini => "gemini",
            Self::Custom => "custom",
        }
    }

    #[must_use]
    pub const fn display_name(self) -> &'static str {
        match self {
            Self::OpenAi => "OpenAI",
            Self::OpenRouter => "OpenRouter",
            Self::Gemini => "Google Gemini",
            Self::Custom => "custom endpoint",
        }
    }

    #[must_use]
    pub const fn wire_format(self) -> WireFormat {
        match self {
            Self::Gemini => WireFormat::GenerateContent,
            Self::OpenAi | Self::OpenRouter | Self::Custom => WireFormat::ChatCompletions,
        }
    }

    /// Model used when the caller leaves the model blank.
    #[must_use]
    pub const fn default_model(self) -> &'static str {
        match self {
            Self::Gemini => "gemini-2.0-flash",
            Self::OpenAi | Self::OpenRouter | Self::Custom => "gpt-4o-mini",
        }
    }

    #[must_use]
    pub const fn requires_base_url(self) -> bool {
        matches!(self, Self::Custom)
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Connection settings for one provider call.
///
/// Supplied per call and never persisted by the libraries.
#[derive(Clone, PartialEq, Eq)]
pub struct ProviderConfig {
    pub provider: ProviderKind,
    pub model: String,
    pub api_key: String,
    /// Required for [`ProviderKind::Custom`], ignored otherwise.
    pub base_url: Option<String>,
}

impl ProviderConfig {
    #[must_use]
    pub fn new(provider: ProviderKind, api_key: impl Into<String>) -> Self {
        Self {
            provider,
            model: String::new(),
            api_key: api_key.into(),
            base_url: None,
        }
    }

    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    /// The configured model, or the provider default when blank.
    #[must_use]
    pub fn effective_model(&self) -> &str {
        let model = self.model.trim();
        if model.is_empty() {
            self.provider.default_model()
        } else {
            model
        }
    }
}

impl fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("provider", &self.provider)
            .field("model", &self.model)
            .field("api_key", &"<redacted>")
            .field("base_url", &self.base_url)
            .finish()
    }
}
