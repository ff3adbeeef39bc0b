//! Decoding of provider payloads.
//!
//! Providers wrap structured output in markdown fences, prepend prose, or append
//! notes. Decoding strips known wrappers first and, failing that, retries on the
//! outermost `{...}` span of the raw text.

use anyhow::Result;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

#[derive(Debug, Deserialize)]
struct BatchPayload {
    translations: Vec<Value>,
}

/// Extract the `translations` array from a batch payload.
///
/// Entries are returned undecoded so the caller can reconcile non-string items
/// position by position.
pub fn parse_batch_payload(raw: &str) -> Option<Vec<Value>> {
    let unwrapped = strip_fences(raw);
    let first_error = match parse_json_with_context::<BatchPayload>(unwrapped) {
        Ok(payload) => return Some(payload.translations),
        Err(e) => e,
    };

    if let Some(candidate) = outermost_object(raw)
        && candidate != unwrapped
        && let Ok(payload) = parse_json_with_context::<BatchPayload>(candidate)
    {
        debug!("Recovered batch payload from surrounding text");
        return Some(payload.translations);
    }

    debug!(error = %first_error, "Batch payload could not be decoded");
    None
}

/// Extract a single translated string from a per-item payload.
///
/// Accepts bare text, a JSON string literal, or a `{"translation": ...}` object.
/// Blank results yield `None`.
pub fn parse_single_payload(raw: &str) -> Option<String> {
    let unwrapped = strip_fences(raw);

    let text = match serde_json::from_str::<Value>(unwrapped) {
        Ok(Value::String(s)) => s,
        Ok(Value::Object(map)) => match map.get("translation") {
            Some(Value::String(s)) => s.clone(),
            _ => unwrapped.to_string(),
        },
        _ => unwrapped.to_string(),
    };

    let text = text.trim();
    (!text.is_empty()).then(|| text.to_string())
}

/// Remove a surrounding markdown code fence (with optional info string) and whitespace.
pub fn strip_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };

    // Drop the info string (`json`, `JSON`, ...) that follows the opening fence.
    let body = match rest.find('\n') {
        Some(newline) => &rest[newline + 1..],
        None => rest.trim_start_matches(|c: char| c.is_ascii_alphanumeric()),
    };
    let body = body.trim_end();
    body.strip_suffix("```").unwrap_or(body).trim()
}

fn outermost_object(raw: &str) -> Option<&str> {
    let start = raw.find('{')?;
    let end = raw.rfind('}')?;
    (end > start).then(|| &raw[start..=end])
}

/// Attempt to parse JSON and, on failure, include a contextual snippet of the
/// line where the error occurred along with the serde path and type mismatch.
pub fn parse_json_with_context<T: serde::de::DeserializeOwned>(body: &str) -> Result<T> {
    let jd = &mut serde_json::Deserializer::from_str(body);
    match serde_path_to_error::deserialize(jd) {
        Ok(value) => Ok(value),
        Err(err) => {
            let inner_err = err.inner();
            let (line, column) = (inner_err.line(), inner_err.column());
            let path = err.path().to_string();

            let msg = inner_err.to_string();
            let loc = format!(" at line {line} column {column}");
            let msg_without_loc = msg.strip_suffix(&loc).unwrap_or(&msg).to_string();

            let type_info = parse_type_mismatch(&msg_without_loc);
            let snippet = build_error_snippet(body, line, column, 20);

            let mut final_err = String::new();
            if !path.is_empty() && path != "." {
                final_err.push_str(&format!("at path '{path}': "));
            }
            final_err.push_str(&format!("{type_info} (line {line} col {column})\n{snippet}"));

            Err(anyhow::anyhow!(final_err))
        }
    }
}

/// Rewrite "invalid type: X, expected Y" as "expected Y, got X".
fn parse_type_mismatch(error_msg: &str) -> String {
    if let Some(invalid_start) = error_msg.find("invalid type: ") {
        let after_prefix = &error_msg[invalid_start + "invalid type: ".len()..];

        if let Some(comma_pos) = after_prefix.find(", expected ") {
            let actual_type = &after_prefix[..comma_pos];
            let expected_type = after_prefix[comma_pos + ", expected ".len()..]
                .split(" at line ")
                .next()
                .unwrap_or_default()
                .trim();

            return format!("expected {expected_type}, got {actual_type}");
        }
    }

    error_msg.to_string()
}

/// Render the offending line around `column` with a caret under the error.
///
/// Payloads are routinely non-ASCII, so the window is widened to char
/// boundaries before slicing.
fn build_error_snippet(body: &str, line: usize, column: usize, context_len: usize) -> String {
    let target_line = body.lines().nth(line.saturating_sub(1)).unwrap_or("");
    if target_line.is_empty() {
        return "(empty line)".to_string();
    }

    let error_idx = column.saturating_sub(1).min(target_line.len());
    let half_len = context_len / 2;

    let mut start = error_idx.saturating_sub(half_len);
    while !target_line.is_char_boundary(start) {
        start -= 1;
    }
    let mut end = (error_idx + half_len).min(target_line.len());
    while !target_line.is_char_boundary(end) {
        end += 1;
    }
    let mut caret_at = error_idx;
    while !target_line.is_char_boundary(caret_at) {
        caret_at -= 1;
    }

    let slice = &target_line[start..end];
    let indicator_pos = target_line[start..caret_at].chars().count();
    let indicator = " ".repeat(indicator_pos) + "^";

    format!("...{slice}...\n   {indicator}")
}
