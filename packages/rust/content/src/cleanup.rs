//! Cleanup for raw model output.
//!
//! Models sometimes wrap HTML in Markdown fences or add chatter around it.
//! [`clean_response`] strips the fences and rejects output with no `<div`.

use std::sync::LazyLock;

use regex::Regex;

use leadflow_shared::{LeadflowError, Result};

/// Strip code fences and validate that the output is HTML.
pub fn clean_response(raw: &str) -> Result<String> {
    let text = strip_code_fences(raw.trim());
    let text = text.trim();

    if !text.to_ascii_lowercase().contains("<div") {
        return Err(LeadflowError::Generation(format!(
            "model returned non-HTML output ({} chars)",
            text.len()
        )));
    }
    Ok(text.to_string())
}

/// Remove a leading ```` ```html ```` / ```` ``` ```` fence and a trailing ```` ``` ````.
fn strip_code_fences(text: &str) -> &str {
    static OPEN_FENCE_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"(?i)^```[a-z]*[ \t]*\r?\n?").expect("valid regex"));
    static CLOSE_FENCE_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"\r?\n?```\s*$").expect("valid regex"));

    let text = match OPEN_FENCE_RE.find(text) {
        Some(m) => &text[m.end()..],
        None => text,
    };
    match CLOSE_FENCE_RE.find(text) {
        Some(m) => &text[..m.start()],
        None => text,
    }
}
