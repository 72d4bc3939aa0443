//! Best-effort extraction from provider response bodies.

use dl_core::WireFormat;
use serde_json::Value;

/// Completion text of a success body, or `None` when there is none worth
/// using (missing, not text, or blank).
///
/// Chat bodies may carry `content` either as a string or as an array of
/// `{type: "text", text}` parts; Gemini parts are joined in order.
#[must_use]
pub fn completion_text(format: WireFormat, body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    let text = match format {
        WireFormat::ChatCompletions => match value.pointer("/choices/0/message/content")? {
            Value::String(text) => text.clone(),
            Value::Array(parts) => join_text_parts(parts),
            _ => return None,
        },
        WireFormat::GenerateContent => {
            join_text_parts(value.pointer("/candidates/0/content/parts")?.as_array()?)
        }
    };
    if text.trim().is_empty() { None } else { Some(text) }
}

fn join_text_parts(parts: &[Value]) -> String {
    parts
        .iter()
        .filter_map(|part| part.get("text").and_then(Value::as_str))
        .collect()
}

/// Provider-supplied error message from a failure body, if one parses.
#[must_use]
pub fn error_message(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    let message = value
        .pointer("/error/message")
        .and_then(Value::as_str)
        .or_else(|| value.get("error").and_then(Value::as_str))
        .or_else(|| value.get("message").and_then(Value::as_str))?
        .trim();
    (!message.is_empty()).then(|| message.to_string())
}
