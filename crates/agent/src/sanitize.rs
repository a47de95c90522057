//! Bounding tool results before they re-enter the conversation.
//!
//! An oversized tool turn would make the *next* model call fail, so results
//! over the limit are replaced by a small envelope with a preview.

use deckhand_config::OrchestrationConfig;
use serde::Serialize;
use tracing::warn;

/// Size limits for tool-result turns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResultLimits {
    /// Largest serialized result kept verbatim
    pub max_bytes: usize,
    /// Characters of the original kept in a truncation envelope
    pub preview_chars: usize,
}

impl Default for ResultLimits {
    fn default() -> Self {
        Self {
            max_bytes: 9_500_000,
            preview_chars: 2000,
        }
    }
}

impl From<&OrchestrationConfig> for ResultLimits {
    fn from(config: &OrchestrationConfig) -> Self {
        Self {
            max_bytes: config.max_tool_result_bytes,
            preview_chars: config.preview_chars,
        }
    }
}

/// Serialize `result` into tool-turn content no larger than the limits allow.
///
/// Always returns valid JSON and never fails: a serialization error becomes
/// an error envelope, an oversized payload a truncation envelope.
pub fn bound<T: Serialize + ?Sized>(
    tool_name: &str,
    invocation_id: &str,
    result: &T,
    limits: ResultLimits,
) -> String {
    let serialized = match serde_json::to_string(result) {
        Ok(s) => s,
        Err(e) => {
            warn!(tool = %tool_name, tool_call_id = %invocation_id, error = %e, "Tool result could not be serialized");
            return serde_json::json!({
                "error": "Tool result could not be serialized",
                "tool": tool_name,
                "toolCallId": invocation_id,
                "reason": e.to_string(),
            })
            .to_string();
        }
    };

    if serialized.len() <= limits.max_bytes {
        return serialized;
    }

    warn!(
        tool = %tool_name,
        tool_call_id = %invocation_id,
        bytes = serialized.len(),
        max_bytes = limits.max_bytes,
        "Truncating oversized tool result"
    );

    serde_json::json!({
        "truncated": true,
        "tool": tool_name,
        "toolCallId": invocation_id,
        "originalBytes": serialized.len(),
        "maxBytes": limits.max_bytes,
        "preview": preview(&serialized, limits.preview_chars),
        "message": format!(
            "The result of {tool_name} was {} bytes, over the {} byte limit. Only a preview is included.",
            serialized.len(),
            limits.max_bytes
        ),
    })
    .to_string()
}

/// The first `chars` characters of `s`.
fn preview(s: &str, chars: usize) -> &str {
    match s.char_indices().nth(chars) {
        Some((end, _)) => &s[..end],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::ser::Error as _;

    struct Unserializable;

    impl Serialize for Unserializable {
        fn serialize<S: serde::Serializer>(&self, _s: S) -> Result<S::Ok, S::Error> {
            Err(S::Error::custom("handle is not serializable"))
        }
    }

    #[test]
    fn small_result_unchanged() {
        let value = serde_json::json!({"taskId": "task_1", "content": "write outline"});
        let out = bound("todo_add", "call_1", &value, ResultLimits::default());
        let back: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(back, value);
    }

    #[test]
    fn twelve_megabyte_result_truncated() {
        let blob = "x".repeat(12 * 1024 * 1024);
        let value = serde_json::json!({"images": [{"b64Json": blob}]});
        let out = bound("generate_image", "call_9", &value, ResultLimits::default());

        assert!(out.len() < 10_000);
        let envelope: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(envelope["truncated"], true);
        assert_eq!(envelope["tool"], "generate_image");
        assert_eq!(envelope["toolCallId"], "call_9");
        assert_eq!(envelope["maxBytes"], 9_500_000);
        assert!(envelope["originalBytes"].as_u64().unwrap() > 9_500_000);
        assert!(envelope["preview"].as_str().unwrap().chars().count() <= 2000);
        assert!(envelope["preview"].as_str().unwrap().starts_with("{\"images\""));
    }

    #[test]
    fn preview_respects_char_boundaries() {
        let value = serde_json::json!({"text": "é".repeat(100)});
        let limits = ResultLimits { max_bytes: 50, preview_chars: 15 };
        let out = bound("disk_read_file", "c", &value, limits);
        let envelope: serde_json::Value = serde_json::from_str(&out).unwrap();
        let preview = envelope["preview"].as_str().unwrap();
        assert_eq!(preview.chars().count(), 15);
        assert!(preview.ends_with('é'));
    }

    #[test]
    fn exactly_at_limit_is_kept() {
        let value = serde_json::json!("abc");
        let limits = ResultLimits { max_bytes: 5, preview_chars: 2 };
        assert_eq!(bound("t", "c", &value, limits), "\"abc\"");
    }

    #[test]
    fn serialization_failure_becomes_envelope() {
        let out = bound("browser_run_task", "call_2", &Unserializable, ResultLimits::default());
        let envelope: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(envelope["tool"], "browser_run_task");
        assert_eq!(envelope["toolCallId"], "call_2");
        assert!(envelope["reason"].as_str().unwrap().contains("not serializable"));
    }

    #[test]
    fn limits_from_config() {
        let config = OrchestrationConfig {
            max_iterations: 3,
            max_tool_result_bytes: 1000,
            preview_chars: 10,
        };
        assert_eq!(ResultLimits::from(&config), ResultLimits { max_bytes: 1000, preview_chars: 10 });
    }
}
