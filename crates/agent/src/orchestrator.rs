//! The tool-calling orchestration loop.
//!
//! One orchestration call runs model turns until the model answers without
//! requesting tools, or the iteration ceiling is hit:
//!
//! 1. **Encode** the caller's conversation once into an owned wire buffer
//! 2. **Call the model** with every tool definition (`tool_choice: auto`)
//! 3. **If tool calls**: resolve each in emission order, append the
//!    assistant turn and one tool turn per call, loop back to step 2
//! 4. **If text only**: return it with the audit trail
//!
//! Tool failures of any kind stay local to their invocation; only model
//! call failures abort the orchestration.

use std::sync::Arc;
use std::time::Instant;

use deckhand_config::OrchestrationConfig;
use deckhand_core::codec;
use deckhand_core::message::{ChatMessage, ToolInvocation};
use deckhand_core::provider::{LlmConfig, Provider, ProviderRequest, Usage, WireToolCall};
use deckhand_core::tool::{ToolContext, ToolDispatcher, ToolStep};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::sanitize::{self, ResultLimits};

/// Returned in place of an answer when the iteration ceiling is reached.
pub const CEILING_MESSAGE: &str =
    "I've reached the maximum number of tool call iterations. Please provide further guidance.";

/// How an orchestration call ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// The model answered without requesting tools.
    Completed,
    /// The model was still requesting tools when the ceiling was reached.
    IterationCeiling,
}

/// Result of a buffered orchestration call.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrchestrationResult {
    /// Final assistant text, or [`CEILING_MESSAGE`]
    pub message: String,

    /// Every tool invocation across all iterations; `None` if there were none
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolInvocation>>,

    /// Model calls made
    pub iterations: u32,

    pub outcome: Outcome,

    /// Token usage summed over all model calls that reported it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

/// A tool call parsed and recorded as pending, ready to run.
pub(crate) struct PreparedCall {
    pub invocation: ToolInvocation,
    /// Parsed arguments, or the error the invocation resolves to
    action: Result<serde_json::Value, String>,
}

/// Drives model turns and tool execution for one conversation at a time.
///
/// Holds no per-call state; one instance serves any number of concurrent
/// orchestration calls.
#[derive(Clone)]
pub struct Orchestrator {
    pub(crate) provider: Arc<dyn Provider>,
    pub(crate) dispatcher: Arc<ToolDispatcher>,
    pub(crate) max_iterations: u32,
    pub(crate) limits: ResultLimits,
}

impl Orchestrator {
    pub fn new(provider: Arc<dyn Provider>, dispatcher: Arc<ToolDispatcher>) -> Self {
        Self {
            provider,
            dispatcher,
            max_iterations: 10,
            limits: ResultLimits::default(),
        }
    }

    /// Build with limits from the `[orchestration]` config section.
    pub fn from_config(
        provider: Arc<dyn Provider>,
        dispatcher: Arc<ToolDispatcher>,
        config: &OrchestrationConfig,
    ) -> Self {
        Self::new(provider, dispatcher)
            .with_max_iterations(config.max_iterations)
            .with_result_limits(ResultLimits::from(config))
    }

    /// Set the maximum number of model calls per orchestration call.
    pub fn with_max_iterations(mut self, max: u32) -> Self {
        self.max_iterations = max;
        self
    }

    pub fn with_result_limits(mut self, limits: ResultLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn dispatcher(&self) -> &Arc<ToolDispatcher> {
        &self.dispatcher
    }

    pub fn provider(&self) -> &Arc<dyn Provider> {
        &self.provider
    }

    /// Run one buffered orchestration call.
    ///
    /// `messages` is only read; the loop works on its own encoded copy.
    pub async fn run(
        &self,
        messages: &[ChatMessage],
        llm: &LlmConfig,
        context: &ToolContext,
    ) -> deckhand_core::Result<OrchestrationResult> {
        info!(
            messages = messages.len(),
            model = %llm.model,
            max_iterations = self.max_iterations,
            "Starting orchestration"
        );

        let mut conversation = codec::encode(messages);
        let tool_definitions = self.dispatcher.definitions();
        let mut audit: Vec<ToolInvocation> = Vec::new();
        let mut usage: Option<Usage> = None;
        let mut iteration = 0;

        loop {
            iteration += 1;

            if iteration > self.max_iterations {
                warn!(
                    iterations = self.max_iterations,
                    tool_calls = audit.len(),
                    "Max tool iterations reached, returning advisory"
                );
                return Ok(OrchestrationResult {
                    message: CEILING_MESSAGE.into(),
                    tool_calls: non_empty(audit),
                    iterations: self.max_iterations,
                    outcome: Outcome::IterationCeiling,
                    usage,
                });
            }

            debug!(iteration, turns = conversation.len(), "Orchestration iteration");

            let request = ProviderRequest::new(llm, conversation.clone(), tool_definitions.clone(), false);
            let response = self.provider.complete(request).await?;

            if let Some(u) = &response.usage {
                usage.get_or_insert_with(Usage::default).add(u);
            }

            let content = response.content.unwrap_or_default();

            if response.tool_calls.is_empty() {
                info!(iterations = iteration, tool_calls = audit.len(), "Orchestration completed");
                return Ok(OrchestrationResult {
                    message: content,
                    tool_calls: non_empty(audit),
                    iterations: iteration,
                    outcome: Outcome::Completed,
                    usage,
                });
            }

            debug!(tool_count = response.tool_calls.len(), "Executing tool calls");

            conversation.push(codec::assistant_turn(&content, response.tool_calls.clone()));

            for call in &response.tool_calls {
                let prepared = prepare(call);
                let (invocation, turn) = self.execute(prepared, context, None).await;
                conversation.push(codec::tool_turn(&call.id, turn));
                audit.push(invocation);
            }
        }
    }

    /// Run a prepared call and produce its audit record and tool-turn content.
    ///
    /// Never fails: every error becomes the invocation's `error` and an
    /// error-shaped tool turn.
    pub(crate) async fn execute(
        &self,
        prepared: PreparedCall,
        context: &ToolContext,
        steps: Option<mpsc::Sender<ToolStep>>,
    ) -> (ToolInvocation, String) {
        let PreparedCall { invocation, action } = prepared;
        let name = invocation.name.clone();

        let outcome = match action {
            Ok(arguments) => {
                let started = Instant::now();
                let result = match steps {
                    Some(tx) => self.dispatcher.dispatch_streaming(&name, arguments, context, tx).await,
                    None => self.dispatcher.dispatch(&name, arguments, context).await,
                };
                debug!(
                    tool = %name,
                    duration_ms = started.elapsed().as_millis() as u64,
                    "Tool dispatch finished"
                );
                result.map_err(|e| e.to_string())
            }
            Err(error) => Err(error),
        };

        match outcome {
            Ok(value) => {
                let turn = sanitize::bound(&name, &invocation.id, &value, self.limits);
                debug!(tool = %name, tool_call_id = %invocation.id, "Tool call resolved");
                (invocation.resolve(value), turn)
            }
            Err(error) => {
                warn!(tool = %name, tool_call_id = %invocation.id, error = %error, "Tool call failed");
                let turn = sanitize::bound(
                    &name,
                    &invocation.id,
                    &serde_json::json!({ "error": error }),
                    self.limits,
                );
                (invocation.fail(error), turn)
            }
        }
    }
}

/// Record a call as pending and decide whether it can run.
///
/// Unparsable arguments are kept in the record as the raw string.
pub(crate) fn prepare(call: &WireToolCall) -> PreparedCall {
    let raw = &call.function.arguments;

    if !call.is_function() {
        return PreparedCall {
            invocation: ToolInvocation::pending(&call.id, &call.function.name, serde_json::Value::String(raw.clone())),
            action: Err(format!("Unsupported tool call type: {}", call.kind)),
        };
    }

    match ToolDispatcher::parse_arguments(&call.function.name, raw) {
        Ok(arguments) => PreparedCall {
            invocation: ToolInvocation::pending(&call.id, &call.function.name, arguments.clone()),
            action: Ok(arguments),
        },
        Err(e) => PreparedCall {
            invocation: ToolInvocation::pending(&call.id, &call.function.name, serde_json::Value::String(raw.clone())),
            action: Err(e.to_string()),
        },
    }
}

fn non_empty(audit: Vec<ToolInvocation>) -> Option<Vec<ToolInvocation>> {
    (!audit.is_empty()).then_some(audit)
}
