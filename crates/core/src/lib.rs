//! # Deckhand Core
//!
//! Domain types, traits, and error definitions for the Deckhand slide
//! assistant. Every other crate depends inward on this one.
//!
//! ## Design Philosophy
//!
//! The model-call service and the tool families are traits here;
//! implementations live in their own crates. This enables:
//! - Swapping the model endpoint via configuration
//! - Testing the orchestration loop with scripted providers
//! - Adding tool families without touching dispatch

pub mod codec;
pub mod error;
pub mod message;
pub mod provider;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use error::{Error, ProviderError, Result, ToolError};
pub use message::{ChatMessage, ContentPart, InvocationStatus, MessageContent, Role, ToolInvocation};
pub use provider::{
    LlmConfig, Provider, ProviderMessage, ProviderRequest, ProviderResponse, StreamChunk,
    ToolCallDelta, ToolDefinition, Usage, WireToolCall,
};
pub use tool::{ToolContext, ToolDispatcher, ToolFamily, ToolStep};
