//! Chat message and tool invocation domain types.
//!
//! These are the provider-agnostic values that flow through the system:
//! the caller supplies a conversation of `ChatMessage`s, the loop encodes it
//! for the model, and every tool call the model makes is recorded as a
//! `ToolInvocation` in the audit trail returned to the caller.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The role of a message sender in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System instructions
    System,
    /// The end user
    User,
    /// The AI assistant
    Assistant,
    /// Tool execution result
    Tool,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::Tool => "tool",
        }
    }
}

/// One typed part of a multi-part (vision-capable) message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

impl ContentPart {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    pub fn image(url: impl Into<String>) -> Self {
        Self::ImageUrl {
            image_url: ImageUrl {
                url: url.into(),
                detail: None,
            },
        }
    }
}

/// An inline image reference (URL or `data:` URI).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageUrl {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Message content as supplied by the caller.
///
/// Callers are not required to send well-formed content: anything that is
/// neither a string nor a list of typed parts is kept as `Other` and
/// stringified when encoded, rather than rejected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
    Other(serde_json::Value),
}

impl Default for MessageContent {
    fn default() -> Self {
        Self::Text(String::new())
    }
}

impl From<String> for MessageContent {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<&str> for MessageContent {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<Vec<ContentPart>> for MessageContent {
    fn from(parts: Vec<ContentPart>) -> Self {
        Self::Parts(parts)
    }
}

/// A single turn in a conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    /// Who sent this message
    pub role: Role,

    /// Plain text or typed parts
    #[serde(default)]
    pub content: MessageContent,

    /// Tool invocations attached to an assistant turn (history only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolInvocation>>,

    /// If this is a tool turn, which invocation it answers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl ChatMessage {
    fn new(role: Role, content: impl Into<MessageContent>) -> Self {
        Self {
            role,
            content: content.into(),
            tool_calls: None,
            tool_call_id: None,
        }
    }

    /// Create a new system message.
    pub fn system(content: impl Into<MessageContent>) -> Self {
        Self::new(Role::System, content)
    }

    /// Create a new user message.
    pub fn user(content: impl Into<MessageContent>) -> Self {
        Self::new(Role::User, content)
    }

    /// Create a new assistant message.
    pub fn assistant(content: impl Into<MessageContent>) -> Self {
        Self::new(Role::Assistant, content)
    }

    /// Create a tool result message.
    pub fn tool_result(tool_call_id: impl Into<String>, content: impl Into<MessageContent>) -> Self {
        Self {
            tool_call_id: Some(tool_call_id.into()),
            ..Self::new(Role::Tool, content)
        }
    }
}

/// Lifecycle state of a [`ToolInvocation`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvocationStatus {
    Pending,
    Resolved,
    Failed,
}

/// One tool call requested by the model, and how it ended.
///
/// Created pending when the call is observed in a model response, then
/// consumed by exactly one of [`resolve`](Self::resolve) or
/// [`fail`](Self::fail). `arguments` holds the parsed arguments, or the raw
/// payload as a JSON string when it could not be parsed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolInvocation {
    /// Model-issued invocation id
    pub id: String,

    /// Tool name
    pub name: String,

    /// Parsed arguments
    pub arguments: serde_json::Value,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    pub timestamp: DateTime<Utc>,
}

impl ToolInvocation {
    pub fn pending(
        id: impl Into<String>,
        name: impl Into<String>,
        arguments: serde_json::Value,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments,
            result: None,
            error: None,
            timestamp: Utc::now(),
        }
    }

    /// Record a successful result.
    pub fn resolve(self, result: serde_json::Value) -> Self {
        Self {
            result: Some(result),
            error: None,
            timestamp: Utc::now(),
            ..self
        }
    }

    /// Record a failure.
    pub fn fail(self, error: impl Into<String>) -> Self {
        Self {
            result: None,
            error: Some(error.into()),
            timestamp: Utc::now(),
            ..self
        }
    }

    pub fn status(&self) -> InvocationStatus {
        match (&self.result, &self.error) {
            (_, Some(_)) => InvocationStatus::Failed,
            (Some(_), None) => InvocationStatus::Resolved,
            (None, None) => InvocationStatus::Pending,
        }
    }
}
