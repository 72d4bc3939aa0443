//! Per-provider request builders.

use dl_core::{ProviderConfig, ProviderKind, WireFormat};
use serde::{Deserialize, Serialize};
use serde_json::json;
use url::Url;

use crate::error::CallError;
use crate::transport::HttpRequest;

pub const OPENAI_CHAT_ENDPOINT: &str = "https://api.openai.com/v1/chat/completions";
pub const OPENROUTER_CHAT_ENDPOINT: &str = "https://openrouter.ai/api/v1/chat/completions";
pub const OPENROUTER_MODELS_ENDPOINT: &str = "https://openrouter.ai/api/v1/models";
pub const GEMINI_MODELS_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/models";

/// Attribution headers OpenRouter asks clients to send.
pub const OPENROUTER_REFERER: &str = "https://github.com/diagramlift/diagramlift";
pub const OPENROUTER_TITLE: &str = "diagramlift";

/// Sampling settings sent with every completion request.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GenerationParams {
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            temperature: 0.3,
            max_tokens: 2048,
        }
    }
}

/// System instruction plus the user's text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Prompt<'a> {
    pub system: &'a str,
    pub user: &'a str,
}

/// Build the completion request for `config`.
///
/// # Errors
///
/// [`CallError::Config`] for a blank API key or prompt, a custom provider
/// without a base URL, or a base URL that does not parse.
pub fn build_request(
    config: &ProviderConfig,
    prompt: &Prompt<'_>,
    params: &GenerationParams,
) -> Result<HttpRequest, CallError> {
    let api_key = config.api_key.trim();
    if api_key.is_empty() {
        return Err(CallError::Config(format!(
            "no API key configured for {}",
            config.provider.display_name()
        )));
    }
    if prompt.user.trim().is_empty() {
        return Err(CallError::Config(String::from("the description is empty")));
    }

    let model = config.effective_model();
    match config.provider.wire_format() {
        WireFormat::ChatCompletions => {
            let body = json!({
                "model": model,
                "messages": [
                    { "role": "system", "content": prompt.system },
                    { "role": "user", "content": prompt.user },
                ],
                "temperature": params.temperature,
                "max_tokens": params.max_tokens,
            });
            let mut request = HttpRequest::post_json(chat_endpoint(config)?, &body)
                .header("Authorization", format!("Bearer {api_key}"));
            if config.provider == ProviderKind::OpenRouter {
                request = request
                    .header("HTTP-Referer", OPENROUTER_REFERER)
                    .header("X-Title", OPENROUTER_TITLE);
            }
            Ok(request)
        }
        WireFormat::GenerateContent => {
            let body = json!({
                "contents": [{
                    "role": "user",
                    "parts": [{ "text": format!("{}\n\n{}", prompt.system, prompt.user) }],
                }],
                "generationConfig": {
                    "temperature": params.temperature,
                    "maxOutputTokens": params.max_tokens,
                },
            });
            Ok(HttpRequest::post_json(gemini_endpoint(model, api_key)?, &body))
        }
    }
}

/// Chat-completions endpoint of an OpenAI-compatible provider.
///
/// # Errors
///
/// [`CallError::Config`] when a custom provider's base URL is missing or
/// invalid.
pub fn chat_endpoint(config: &ProviderConfig) -> Result<String, CallError> {
    match config.provider {
        ProviderKind::OpenAi => Ok(OPENAI_CHAT_ENDPOINT.to_string()),
        ProviderKind::OpenRouter => Ok(OPENROUTER_CHAT_ENDPOINT.to_string()),
        ProviderKind::Custom => {
            let base = config
                .base_url
                .as_deref()
                .map(str::trim)
                .filter(|base| !base.is_empty())
                .ok_or_else(|| CallError::Config(String::from("the custom provider needs a base URL")))?;
            let endpoint = format!("{}/chat/completions", base.trim_end_matches('/'));
            Url::parse(&endpoint)
                .map(String::from)
                .map_err(|err| CallError::Config(format!("invalid base URL {base:?}: {err}")))
        }
        ProviderKind::Gemini => Err(CallError::Config(String::from(
            "Gemini does not serve chat completions",
        ))),
    }
}

fn gemini_endpoint(model: &str, api_key: &str) -> Result<String, CallError> {
    let mut url = Url::parse(GEMINI_MODELS_BASE)
        .map_err(|err| CallError::Config(format!("invalid Gemini endpoint: {err}")))?;
    url.path_segments_mut()
        .map_err(|()| CallError::Config(String::from("invalid Gemini endpoint")))?
        .push(&format!("{model}:generateContent"));
    url.query_pairs_mut().append_pair("key", api_key);
    Ok(url.into())
}
