//! Helpers for parsing structured replies out of model text

use serde::de::DeserializeOwned;

use crate::error::{OrchestrationError, Result};

/// Parse a JSON object out of a model reply
///
/// Accepts bare JSON, JSON inside a fenced ```json block, or JSON embedded
/// in surrounding prose (first `{` to last `}`).
pub(crate) fn parse_json_reply<T: DeserializeOwned>(text: &str) -> Result<T> {
    let candidate = extract_json_candidate(text);
    serde_json::from_str(candidate).map_err(|err| {
        OrchestrationError::ManagerResponse(format!("{err}; reply was: {text:?}"))
    })
}

fn extract_json_candidate(text: &str) -> &str {
    let trimmed = text.trim();
    if let Some(start) = trimmed.find("```") {
        let after_fence = &trimmed[start + 3..];
        let body = after_fence
            .strip_prefix("json")
            .unwrap_or(after_fence)
            .trim_start();
        if let Some(end) = body.find("```") {
            return body[..end].trim();
        }
    }
    if let (Some(start), Some(end)) = (trimmed.find('{'), trimmed.rfind('}')) {
        if start < end {
            return &trimmed[start..=end];
        }
    }
    trimmed
}
