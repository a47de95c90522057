//! Error types for the Deckhand domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Provider failures are fatal to an orchestration call; tool failures are
//! always recovered by the loop and attributed to a single invocation.

use thiserror::Error;

/// The top-level error type for all Deckhand operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Provider errors ---
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    // --- Tool errors ---
    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- Model protocol violations ---
    #[error("Protocol violation: {0}")]
    Protocol(String),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError {
        status_code: u16,
        message: String,
    },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Stream interrupted: {0}")]
    StreamInterrupted(String),

    #[error("Malformed provider response: {0}")]
    InvalidResponse(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Network error: {0}")]
    Network(String),
}

/// Failures attributed to a single tool invocation.
///
/// The orchestration loop never propagates these: each one becomes the
/// `error` of its `ToolInvocation` and an error-shaped tool turn.
#[derive(Debug, Clone, Error)]
pub enum ToolError {
    #[error("Malformed arguments for {tool_name}: {reason}")]
    MalformedArguments { tool_name: String, reason: String },

    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Missing context for {tool_name}: {field} is required")]
    MissingContext { tool_name: String, field: String },

    #[error("Invalid tool arguments: {0}")]
    InvalidArguments(String),

    #[error("Tool execution failed: {tool_name}: {reason}")]
    ExecutionFailed { tool_name: String, reason: String },

    #[error("Tool timed out: {tool_name} after {timeout_secs}s")]
    Timeout { tool_name: String, timeout_secs: u64 },
}

impl ToolError {
    /// Shorthand for the common "the tool itself failed" case.
    pub fn failed(tool_name: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::ExecutionFailed {
            tool_name: tool_name.into(),
            reason: reason.to_string(),
        }
    }
}
