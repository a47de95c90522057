//! Events emitted by the streaming orchestration loop.
//!
//! The gateway forwards these to clients as SSE events named by
//! [`StreamEvent::event_type`].

use deckhand_core::message::ToolInvocation;
use deckhand_core::tool::ToolStep;
use serde::{Deserialize, Serialize};

/// Events emitted during one streaming orchestration call.
///
/// Within an iteration the order is: `message` fragments, then per tool call
/// `tool_call_start`, any `tool_call_step`s, and `tool_call_complete` or
/// `tool_call_error`. Every stream ends with exactly one `final_message` or
/// `error`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum StreamEvent {
    /// A content fragment from the model.
    Message { content: String },

    /// A tool call is about to run.
    ToolCallStart {
        id: String,
        name: String,
        arguments: serde_json::Value,
    },

    /// Progress from a long-running tool.
    ToolCallStep { id: String, name: String, step: ToolStep },

    ToolCallComplete {
        id: String,
        name: String,
        result: serde_json::Value,
    },

    ToolCallError { id: String, name: String, error: String },

    /// Terminal: the orchestration finished or hit the iteration ceiling.
    FinalMessage {
        message: String,
        tool_calls: Vec<ToolInvocation>,
        iterations: u32,
        ceiling_reached: bool,
    },

    /// Terminal: the model call failed or broke protocol.
    Error { message: String },
}

impl StreamEvent {
    /// SSE event name for this event type.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Message { .. } => "message",
            Self::ToolCallStart { .. } => "tool_call_start",
            Self::ToolCallStep { .. } => "tool_call_step",
            Self::ToolCallComplete { .. } => "tool_call_complete",
            Self::ToolCallError { .. } => "tool_call_error",
            Self::FinalMessage { .. } => "final_message",
            Self::Error { .. } => "error",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::FinalMessage { .. } | Self::Error { .. })
    }
}
