//! OpenRouter model catalogue and the picker's fuzzy filter.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::call::{CallOptions, send_within};
use crate::error::CallError;
use crate::request::OPENROUTER_MODELS_ENDPOINT;
use crate::response::error_message;
use crate::transport::{HttpRequest, Transport};

/// Most entries [`filter_models`] returns.
pub const MODEL_LIST_LIMIT: usize = 100;

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ModelInfo {
    pub id: String,
    pub name: String,
}

#[derive(Deserialize)]
struct ModelList {
    data: Vec<RawModel>,
}

#[derive(Deserialize)]
struct RawModel {
    id: String,
    #[serde(default)]
    name: Option<String>,
}

/// Fetch every model OpenRouter offers.
///
/// Only the timeout and cancel token of `options` apply.
///
/// # Errors
///
/// [`CallError::Config`] for a blank key, transport and HTTP failures as
/// for completions, and [`CallError::Http`] when the listing does not parse.
pub async fn list_openrouter_models<T: Transport>(
    transport: &T,
    api_key: &str,
    options: &CallOptions,
) -> Result<Vec<ModelInfo>, CallError> {
    let api_key = api_key.trim();
    if api_key.is_empty() {
        return Err(CallError::Config(String::from("no API key configured for OpenRouter")));
    }
    let request =
        HttpRequest::get(OPENROUTER_MODELS_ENDPOINT).header("Authorization", format!("Bearer {api_key}"));

    let response = send_within(transport, request, options).await?;
    if !response.is_success() {
        return Err(CallError::Http {
            status: response.status,
            message: error_message(&response.body)
                .unwrap_or_else(|| format!("API error: {}", response.status)),
        });
    }

    let list: ModelList = serde_json::from_str(&response.body).map_err(|err| CallError::Http {
        status: response.status,
        message: format!("unexpected model list: {err}"),
    })?;
    let models: Vec<ModelInfo> = list
        .data
        .into_iter()
        .map(|raw| {
            let name = raw.name.filter(|name| !name.trim().is_empty()).unwrap_or_else(|| raw.id.clone());
            ModelInfo { id: raw.id, name }
        })
        .collect();
    debug!("OpenRouter lists {} models", models.len());
    Ok(models)
}

/// Whether the characters of `query` appear in `text` in order,
/// ignoring case. A blank query matches everything.
#[must_use]
pub fn fuzzy_match(query: &str, text: &str) -> bool {
    let query = query.trim().to_lowercase();
    let text = text.to_lowercase();
    let mut haystack = text.chars();
    query.chars().all(|wanted| haystack.any(|c| c == wanted))
}

/// Models whose id or name fuzzily matches `query`, at most
/// [`MODEL_LIST_LIMIT`] of them, in catalogue order.
#[must_use]
pub fn filter_models<'a>(models: &'a [ModelInfo], query: &str) -> Vec<&'a ModelInfo> {
    models
        .iter()
        .filter(|model| fuzzy_match(query, &model.id) || fuzzy_match(query, &model.name))
        .take(MODEL_LIST_LIMIT)
        .collect()
}
