//! Read-only settings for `dl`: command-line flags, then the environment,
//! then a TOML file, then built-in defaults.

use std::fmt;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Args;
use dl_core::{ProviderConfig, ProviderKind, SanitizeConfig};
use serde::Deserialize;
use tracing::debug;

/// Looked up in the working directory when `--config` is not given.
pub const DEFAULT_SETTINGS_FILE: &str = "diagramlift.toml";

/// Environment variable holding the provider API key.
pub const API_KEY_ENV: &str = "DIAGRAMLIFT_API_KEY";

/// Contents of a settings file. Every field is optional.
#[derive(Clone, Default, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    pub provider: Option<ProviderKind>,
    pub model: Option<String>,
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub timeout_secs: Option<u64>,
    pub sanitize: SanitizeConfig,
}

impl fmt::Debug for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Settings")
            .field("provider", &self.provider)
            .field("model", &self.model)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("base_url", &self.base_url)
            .field("timeout_secs", &self.timeout_secs)
            .field("sanitize", &self.sanitize)
            .finish()
    }
}

impl Settings {
    /// Parse the settings file at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings file: {}", path.display()))?;
        let settings: Self =
            toml::from_str(&text).with_context(|| format!("Invalid settings file: {}", path.display()))?;
        debug!("Loaded settings from {}", path.display());
        Ok(settings)
    }

    /// An explicit path must exist; the default file is used only if present.
    pub fn discover(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load(path);
        }
        let fallback = Path::new(DEFAULT_SETTINGS_FILE);
        if fallback.is_file() {
            Self::load(fallback)
        } else {
            Ok(Self::default())
        }
    }

    /// Merge flags, the environment key and this file into one provider config.
    #[must_use]
    pub fn provider_config(&self, args: &ProviderArgs, env_key: Option<&str>) -> ProviderConfig {
        let provider = args.provider.or(self.provider).unwrap_or_default();
        let api_key = args
            .api_key
            .as_deref()
            .or(env_key.filter(|key| !key.trim().is_empty()))
            .or(self.api_key.as_deref())
            .unwrap_or_default();
        let model = args.model.as_deref().or(self.model.as_deref()).unwrap_or_default();

        let config = ProviderConfig::new(provider, api_key).with_model(model);
        match args.base_url.as_deref().or(self.base_url.as_deref()) {
            Some(base_url) => config.with_base_url(base_url),
            None => config,
        }
    }

    #[must_use]
    pub fn timeout(&self, args: &ProviderArgs, default: Duration) -> Duration {
        args.timeout_secs
            .or(self.timeout_secs)
            .map_or(default, Duration::from_secs)
    }
}

/// Provider flags shared by the network commands.
#[derive(Clone, Default, Args)]
pub struct ProviderArgs {
    /// Provider (openai, openrouter, gemini, custom)
    #[arg(short, long)]
    pub provider: Option<ProviderKind>,

    /// Model identifier; blank uses the provider default
    #[arg(short, long)]
    pub model: Option<String>,

    /// API key (overrides DIAGRAMLIFT_API_KEY and the settings file)
    #[arg(long)]
    pub api_key: Option<String>,

    /// Base URL of an OpenAI-compatible endpoint (custom provider only)
    #[arg(long)]
    pub base_url: Option<String>,

    /// Request timeout in seconds
    #[arg(long)]
    pub timeout_secs: Option<u64>,
}

impl fmt::Debug for ProviderArgs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderArgs")
            .field("provider", &self.provider)
            .field("model", &self.model)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("base_url", &self.base_url)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}
