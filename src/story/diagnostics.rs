//! Turning a raw failure into the single message shown for a failed run.

use serde_json::Value;

/// Phrase the API uses when the key does not resolve to a project.
pub const INVALID_KEY_PHRASE: &str = "Requested entity was not found";

/// Message shown instead of the raw failure when the key was rejected.
pub const INVALID_KEY_MESSAGE: &str =
    "Your API key is invalid. Please select a valid key and try again.";

/// Fallback when a failure carries no message at all.
pub const UNKNOWN_FAILURE_MESSAGE: &str = "An unknown error occurred during generation.";

/// Replace `message` with the `error.message` of a JSON body embedded in it.
///
/// Everything from the first `{` is parsed as JSON. When that fails, or the
/// body carries no nested message, the input is returned unchanged.
pub fn unwrap_embedded_json(message: &str) -> String {
    let Some(start) = message.find('{') else {
        return message.to_string();
    };

    serde_json::from_str::<Value>(&message[start..])
        .ok()
        .and_then(|body| {
            body.get("error")?
                .get("message")?
                .as_str()
                .map(str::to_string)
        })
        .unwrap_or_else(|| message.to_string())
}

/// Prefix `message` with the scene it happened on (`index` is 0-based).
pub fn attribute_to_scene(message: &str, index: usize, total: usize, caption: &str) -> String {
    format!(
        "Failed on scene {} of {} (\"{}\"): {}",
        index + 1,
        total,
        caption,
        message
    )
}

/// Whether the enriched message means the API key was rejected.
pub fn indicates_invalid_key(message: &str) -> bool {
    message.contains(INVALID_KEY_PHRASE)
}

/// Unwrap and attribute a raw failure, in that order.
pub fn enrich(raw: &str, scene: Option<(usize, usize, &str)>) -> String {
    let message = if raw.trim().is_empty() {
        UNKNOWN_FAILURE_MESSAGE.to_string()
    } else {
        unwrap_embedded_json(raw)
    };

    match scene {
        Some((index, total, caption)) => attribute_to_scene(&message, index, total, caption),
        None => message,
    }
}
