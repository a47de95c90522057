//! The tool-calling orchestration loop at the heart of Deckhand.
//!
//! An orchestration call follows a **Call → Resolve → Append** cycle:
//!
//! 1. **Encode** the caller's conversation for the model
//! 2. **Call the model** with every registered tool definition
//! 3. **If tool calls**: run each through the dispatcher in emission order,
//!    bound its result, append the turns, loop back to step 2
//! 4. **If text response**: return it with the invocation audit trail
//!
//! The loop continues until the model responds with text only or the
//! iteration ceiling is reached. [`Orchestrator::run`] returns one result;
//! [`Orchestrator::run_stream`] reports progress as [`StreamEvent`]s.

pub mod fragments;
pub mod orchestrator;
pub mod sanitize;
pub mod stream;
pub mod stream_event;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use fragments::ToolCallAssembler;
pub use orchestrator::{CEILING_MESSAGE, OrchestrationResult, Orchestrator, Outcome};
pub use sanitize::{ResultLimits, bound};
pub use stream::PROVIDER_FAILURE_MESSAGE;
pub use stream_event::StreamEvent;
