//! Message codec: caller conversation to model wire shape.

use crate::message::{ChatMessage, MessageContent, Role};
use crate::provider::{ProviderMessage, WireContent, WireToolCall};

/// Encode a conversation for the model API.
///
/// Total: every message maps to exactly one wire message. Parts pass through
/// untouched for vision input; content of any other shape is stringified.
/// History-only `tool_calls` records are not sent.
pub fn encode(messages: &[ChatMessage]) -> Vec<ProviderMessage> {
    messages
        .iter()
        .map(|m| ProviderMessage {
            role: m.role,
            content: Some(encode_content(&m.content)),
            tool_calls: Vec::new(),
            tool_call_id: m.tool_call_id.clone(),
        })
        .collect()
}

fn encode_content(content: &MessageContent) -> WireContent {
    match content {
        MessageContent::Text(text) => WireContent::Text(text.clone()),
        MessageContent::Parts(parts) => WireContent::Parts(parts.clone()),
        MessageContent::Other(value) => WireContent::Text(stringify(value)),
    }
}

fn stringify(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::Null => String::new(),
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// The assistant turn that announced `tool_calls`.
pub fn assistant_turn(content: &str, tool_calls: Vec<WireToolCall>) -> ProviderMessage {
    ProviderMessage {
        role: Role::Assistant,
        content: (!content.is_empty()).then(|| WireContent::Text(content.to_string())),
        tool_calls,
        tool_call_id: None,
    }
}

/// The tool turn answering invocation `tool_call_id`.
pub fn tool_turn(tool_call_id: impl Into<String>, content: impl Into<String>) -> ProviderMessage {
    ProviderMessage {
        role: Role::Tool,
        content: Some(WireContent::Text(content.into())),
        tool_calls: Vec::new(),
        tool_call_id: Some(tool_call_id.into()),
    }
}
