use serde_json::Value;
use tracing::warn;

use super::client::GeminiError;
use super::types::GenerateContentResponse;

/// Pull the JSON object the model was asked to produce out of the first candidate.
pub fn extract_structured(response: &GenerateContentResponse) -> Result<Value, GeminiError> {
    let candidate = response.candidates.as_ref().and_then(|c| c.first());

    let text: String = candidate
        .and_then(|c| c.content.as_ref())
        .map(|content| content.parts.iter().map(|p| p.text.as_str()).collect())
        .unwrap_or_default();

    if text.trim().is_empty() {
        let reason = candidate
            .and_then(|c| c.finish_reason.as_deref())
            .unwrap_or("no candidates");
        warn!(reason, "Gemini returned empty response");
        return Err(GeminiError::InvalidResponse(format!(
            "empty response ({reason})"
        )));
    }

    let value: Value = serde_json::from_str(strip_code_fence(&text))
        .map_err(|e| GeminiError::InvalidResponse(format!("response is not valid JSON: {e}")))?;
    if !value.is_object() {
        return Err(GeminiError::InvalidResponse(
            "response is not a JSON object".into(),
        ));
    }
    Ok(value)
}

/// Models occasionally wrap JSON in a Markdown fence despite the MIME type.
fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|rest| rest.strip_suffix("```"))
        .map(str::trim)
        .unwrap_or(trimmed)
}
