/// Content of the first fenced code block in `text`, or the trimmed text
/// when there is no complete fence.
///
/// A `mermaid` tag right after the opening fence is dropped.
#[must_use]
pub fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(open) = trimmed.find("```") else {
        return trimmed;
    };
    let after = &trimmed[open + 3..];
    let body = after.strip_prefix("mermaid").unwrap_or(after);
    match body.find("```") {
        Some(close) => body[..close].trim(),
        None => trimmed,
    }
}
