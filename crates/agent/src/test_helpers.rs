//! Shared test helpers for orchestration tests.

use deckhand_core::error::ProviderError;
use deckhand_core::provider::{
    ChunkReceiver, Provider, ProviderRequest, ProviderResponse, StreamChunk, ToolCallDelta, Usage,
    WireToolCall,
};
use std::collections::VecDeque;
use std::sync::Mutex;

/// One scripted model turn.
pub enum Scripted {
    Response(ProviderResponse),
    /// Raw chunks for `stream`; an `Err` item fails mid-stream.
    Chunks(Vec<Result<StreamChunk, ProviderError>>),
    Fail(ProviderError),
}

/// A mock provider that plays back scripted turns in order.
///
/// Each call to `complete` or `stream` consumes the next turn and records
/// the request. Panics if more calls are made than turns provided.
pub struct SequentialMockProvider {
    script: Mutex<VecDeque<Scripted>>,
    requests: Mutex<Vec<ProviderRequest>>,
}

impl SequentialMockProvider {
    pub fn new(script: Vec<Scripted>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn responses(responses: Vec<ProviderResponse>) -> Self {
        Self::new(responses.into_iter().map(Scripted::Response).collect())
    }

    /// A provider that returns a single text response (no tool calls).
    pub fn single_text(text: &str) -> Self {
        Self::responses(vec![make_text_response(text)])
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    /// Every request received so far.
    pub fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().unwrap().clone()
    }

    fn next(&self, request: ProviderRequest) -> Scripted {
        let mut requests = self.requests.lock().unwrap();
        requests.push(request);
        self.script.lock().unwrap().pop_front().unwrap_or_else(|| {
            panic!("SequentialMockProvider: no more responses (call #{})", requests.len())
        })
    }
}

#[async_trait::async_trait]
impl Provider for SequentialMockProvider {
    fn name(&self) -> &str {
        "sequential_mock"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        match self.next(request) {
            Scripted::Response(r) => Ok(r),
            Scripted::Fail(e) => Err(e),
            Scripted::Chunks(_) => panic!("SequentialMockProvider: chunks scripted for a buffered call"),
        }
    }

    async fn stream(&self, request: ProviderRequest) -> Result<ChunkReceiver, ProviderError> {
        let chunks = match self.next(request) {
            Scripted::Response(r) => vec![Ok(replay(r))],
            Scripted::Chunks(chunks) => chunks,
            Scripted::Fail(e) => return Err(e),
        };
        let (tx, rx) = tokio::sync::mpsc::channel(chunks.len().max(1));
        for chunk in chunks {
            let _ = tx.send(chunk).await;
        }
        Ok(rx)
    }
}

fn replay(response: ProviderResponse) -> StreamChunk {
    StreamChunk {
        content: response.content,
        tool_calls: response
            .tool_calls
            .into_iter()
            .enumerate()
            .map(|(i, tc)| ToolCallDelta {
                index: i as u32,
                id: Some(tc.id),
                kind: Some(tc.kind),
                name: Some(tc.function.name),
                arguments: Some(tc.function.arguments),
            })
            .collect(),
        finish_reason: response.finish_reason,
        usage: response.usage,
    }
}

pub fn mock_usage() -> Usage {
    Usage {
        prompt_tokens: 10,
        completion_tokens: 5,
        total_tokens: 15,
    }
}

/// Create a simple text response (no tool calls).
pub fn make_text_response(text: &str) -> ProviderResponse {
    ProviderResponse {
        content: Some(text.to_string()),
        tool_calls: vec![],
        usage: Some(mock_usage()),
        model: "mock-model".into(),
        finish_reason: Some("stop".into()),
    }
}

/// Create a response requesting `tool_calls`, with optional text.
pub fn make_tool_call_response(tool_calls: Vec<WireToolCall>, thought: &str) -> ProviderResponse {
    ProviderResponse {
        content: (!thought.is_empty()).then(|| thought.to_string()),
        tool_calls,
        usage: Some(mock_usage()),
        model: "mock-model".into(),
        finish_reason: Some("tool_calls".into()),
    }
}

/// Helper to create a function tool call.
pub fn make_tool_call(id: &str, name: &str, args: serde_json::Value) -> WireToolCall {
    WireToolCall::function(id, name, args.to_string())
}

/// A text-only stream chunk.
pub fn text_chunk(text: &str) -> StreamChunk {
    StreamChunk {
        content: Some(text.to_string()),
        ..StreamChunk::default()
    }
}

/// A stream chunk carrying one tool-call fragment.
pub fn tool_chunk(index: u32, id: Option<&str>, name: Option<&str>, arguments: &str) -> StreamChunk {
    StreamChunk {
        tool_calls: vec![ToolCallDelta {
            index,
            id: id.map(String::from),
            kind: id.map(|_| "function".to_string()),
            name: name.map(String::from),
            arguments: Some(arguments.to_string()),
        }],
        ..StreamChunk::default()
    }
}
