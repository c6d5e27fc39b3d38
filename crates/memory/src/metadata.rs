//! Content fingerprinting and metadata size normalization, grounded on
//! `sage_core/memory/storage.py`'s `save()` and
//! `_validate_and_optimize_metadata()`.

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

pub struct Fingerprint {
    pub content_hash: String,
    pub time_window: String,
    pub time_aware_hash: String,
}

/// `contentHash := sha256(userInput || assistantResponse)`,
/// `timeWindow := YYYYMMDDHH(now_UTC)`,
/// `timeAwareHash := sha256(contentHash || timeWindow)`.
pub fn fingerprint(user_input: &str, assistant_response: &str, now: DateTime<Utc>) -> Fingerprint {
    let mut hasher = Sha256::new();
    hasher.update(user_input.as_bytes());
    hasher.update(assistant_response.as_bytes());
    let content_hash = hex::encode(hasher.finalize());

    let time_window = now.format("%Y%m%d%H").to_string();

    let mut hasher = Sha256::new();
    hasher.update(content_hash.as_bytes());
    hasher.update(time_window.as_bytes());
    let time_aware_hash = hex::encode(hasher.finalize());

    Fingerprint { content_hash, time_window, time_aware_hash }
}

const MAX_METADATA_BYTES: usize = 100 * 1024;
const MAX_TEXT_FIELD_CHARS: usize = 1000;
const MAX_TOOL_CALLS: usize = 10;
const ESSENTIAL_KEYS: &[&str] = &["content_hash", "time_aware_hash", "time_window", "session_id", "message_count", "tool_call_count"];
const TEXT_FIELDS: &[&str] = &["thinking_content", "error_message", "notes"];

/// Shrinks `metadata` below the 100KiB cap when exceeded, preserving
/// essential keys, truncating `tool_calls` to the first 10, and truncating
/// free-text fields to 1000 characters with a `...[truncated]` suffix.
pub fn normalize(mut metadata: Map<String, Value>) -> Map<String, Value> {
    let size = serde_json::to_vec(&metadata).map(|v| v.len()).unwrap_or(0);
    if size <= MAX_METADATA_BYTES {
        return metadata;
    }

    if let Some(Value::Array(calls)) = metadata.get("tool_calls").cloned() {
        if calls.len() > MAX_TOOL_CALLS {
            let original_len = calls.len();
            let truncated: Vec<Value> = calls.into_iter().take(MAX_TOOL_CALLS).collect();
            metadata.insert("tool_calls".to_string(), Value::Array(truncated));
            metadata.insert("tool_calls_truncated".to_string(), Value::from(original_len));
        }
    }

    for field in TEXT_FIELDS {
        if let Some(Value::String(s)) = metadata.get(*field).cloned() {
            if s.chars().count() > MAX_TEXT_FIELD_CHARS {
                let truncated: String = s.chars().take(MAX_TEXT_FIELD_CHARS).collect();
                metadata.insert(field.to_string(), Value::String(format!("{truncated}...[truncated]")));
            }
        }
    }

    let size_after = serde_json::to_vec(&metadata).map(|v| v.len()).unwrap_or(0);
    if size_after <= MAX_METADATA_BYTES {
        return metadata;
    }

    // Still too large: drop to essential keys only, keeping the already
    // truncated tool_calls/text fields when they are themselves essential.
    let mut essential = Map::new();
    for key in ESSENTIAL_KEYS {
        if let Some(v) = metadata.get(*key) {
            essential.insert(key.to_string(), v.clone());
        }
    }
    essential
}

/// Compares two metadata maps on `{tool_calls, message_count,
/// thinking_content}`, the dedup-bypass key set from §4.6.
pub fn differs_on_dedup_keys(existing: &Value, incoming: &Map<String, Value>) -> bool {
    const KEYS: &[&str] = &["tool_calls", "message_count", "thinking_content"];
    for key in KEYS {
        let existing_val = existing.get(key);
        let incoming_val = incoming.get(*key);
        if existing_val != incoming_val {
            return true;
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn fingerprint_matches_sha256_of_concatenated_inputs() {
        let now = Utc.with_ymd_and_hms(2026, 1, 2, 15, 0, 0).unwrap();
        let fp = fingerprint("hello", "world", now);

        let mut hasher = Sha256::new();
        hasher.update(b"hello");
        hasher.update(b"world");
        assert_eq!(fp.content_hash, hex::encode(hasher.finalize()));
        assert_eq!(fp.time_window, "2026010215");
    }

    #[test]
    fn normalize_is_a_no_op_under_the_size_cap() {
        let mut m = Map::new();
        m.insert("session_id".into(), Value::String("s1".into()));
        let out = normalize(m.clone());
        assert_eq!(out, m);
    }

    #[test]
    fn normalize_truncates_oversized_tool_calls_list() {
        let mut m = Map::new();
        let calls: Vec<Value> = (0..20).map(|i| serde_json::json!({"tool": format!("t{i}"), "payload": "x".repeat(10_000)})).collect();
        m.insert("tool_calls".into(), Value::Array(calls));
        let out = normalize(m);
        assert_eq!(out["tool_calls"].as_array().unwrap().len(), 10);
        assert_eq!(out["tool_calls_truncated"], 20);
    }

    #[test]
    fn normalize_truncates_oversized_text_fields() {
        let mut m = Map::new();
        m.insert("thinking_content".into(), Value::String("x".repeat(200_000)));
        let out = normalize(m);
        let s = out["thinking_content"].as_str().unwrap();
        assert!(s.ends_with("...[truncated]"));
    }

    #[test]
    fn dedup_keys_detect_new_tool_calls() {
        let existing = serde_json::json!({"tool_calls": null, "message_count": 1});
        let mut incoming = Map::new();
        incoming.insert("tool_calls".into(), serde_json::json!([{"tool": "x"}]));
        incoming.insert("message_count".into(), Value::from(1));
        assert!(differs_on_dedup_keys(&existing, &incoming));
    }

    #[test]
    fn dedup_keys_match_when_nothing_changed() {
        let existing = serde_json::json!({"message_count": 1});
        let mut incoming = Map::new();
        incoming.insert("message_count".into(), Value::from(1));
        assert!(!differs_on_dedup_keys(&existing, &incoming));
    }
}
