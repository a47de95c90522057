//! Streaming orchestration: the same loop, reported as it happens.
//!
//! Each model turn is consumed chunk by chunk. Content fragments are
//! forwarded immediately; tool-call fragments are assembled and the calls
//! run only after the turn's stream has ended.

use deckhand_core::codec;
use deckhand_core::message::{ChatMessage, ToolInvocation};
use deckhand_core::provider::{LlmConfig, ProviderRequest};
use deckhand_core::tool::ToolContext;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::fragments::ToolCallAssembler;
use crate::orchestrator::{CEILING_MESSAGE, Orchestrator, prepare};
use crate::stream_event::StreamEvent;

/// Shown to clients when the model call fails; details go to the log.
pub const PROVIDER_FAILURE_MESSAGE: &str = "The model service failed to respond. Please try again.";

/// Why the streaming loop stopped early.
enum Halt {
    /// Report this message as the terminal `error` event.
    Failed(String),
    /// The consumer went away; nothing more to send.
    Disconnected,
}

impl Orchestrator {
    /// Run one orchestration call, streaming its progress.
    ///
    /// Returns immediately; the loop runs on a spawned task and is the only
    /// producer on the returned channel. The stream always ends with exactly
    /// one `final_message` or `error` event, unless the receiver is dropped,
    /// in which case the loop stops at its next send.
    pub fn run_stream(
        &self,
        messages: Vec<ChatMessage>,
        llm: LlmConfig,
        context: ToolContext,
    ) -> mpsc::Receiver<StreamEvent> {
        let (tx, rx) = mpsc::channel::<StreamEvent>(128);
        let this = self.clone();

        tokio::spawn(async move {
            match this.stream_loop(&messages, &llm, &context, &tx).await {
                Ok(terminal) => {
                    let _ = tx.send(terminal).await;
                }
                Err(Halt::Failed(message)) => {
                    let _ = tx.send(StreamEvent::Error { message }).await;
                }
                Err(Halt::Disconnected) => debug!("Stream consumer disconnected, stopping orchestration"),
            }
        });

        rx
    }

    async fn stream_loop(
        &self,
        messages: &[ChatMessage],
        llm: &LlmConfig,
        context: &ToolContext,
        tx: &mpsc::Sender<StreamEvent>,
    ) -> Result<StreamEvent, Halt> {
        info!(
            messages = messages.len(),
            model = %llm.model,
            max_iterations = self.max_iterations,
            "Starting streaming orchestration"
        );

        let mut conversation = codec::encode(messages);
        let tool_definitions = self.dispatcher.definitions();
        let mut audit: Vec<ToolInvocation> = Vec::new();
        let mut displayed = String::new();
        let mut iteration = 0;

        loop {
            iteration += 1;

            if iteration > self.max_iterations {
                warn!(iterations = self.max_iterations, "Max tool iterations reached, returning advisory");
                return Ok(StreamEvent::FinalMessage {
                    message: CEILING_MESSAGE.into(),
                    tool_calls: audit,
                    iterations: self.max_iterations,
                    ceiling_reached: true,
                });
            }

            debug!(iteration, turns = conversation.len(), "Streaming orchestration iteration");

            let request = ProviderRequest::new(llm, conversation.clone(), tool_definitions.clone(), true);
            let mut chunks = self.provider.stream(request).await.map_err(|e| {
                warn!(error = %e, "Model call failed");
                Halt::Failed(PROVIDER_FAILURE_MESSAGE.into())
            })?;

            // ── Consume the turn ──
            let mut content = String::new();
            let mut assembler = ToolCallAssembler::new();

            while let Some(chunk) = chunks.recv().await {
                let chunk = chunk.map_err(|e| {
                    warn!(error = %e, "Model stream failed");
                    Halt::Failed(PROVIDER_FAILURE_MESSAGE.into())
                })?;

                if let Some(text) = chunk.content
                    && !text.is_empty()
                {
                    content.push_str(&text);
                    emit(tx, StreamEvent::Message { content: text }).await?;
                }

                for delta in &chunk.tool_calls {
                    assembler.push(delta);
                }
            }

            displayed.push_str(&content);
            let calls = assembler.finish();

            if calls.is_empty() {
                if content.is_empty() {
                    warn!(iteration, "Model turn had neither content nor tool calls");
                    return Err(Halt::Failed("The model returned an empty response.".into()));
                }
                info!(iterations = iteration, tool_calls = audit.len(), "Streaming orchestration completed");
                return Ok(StreamEvent::FinalMessage {
                    message: displayed,
                    tool_calls: audit,
                    iterations: iteration,
                    ceiling_reached: false,
                });
            }

            // ── Resolve tool calls in emission order ──
            conversation.push(codec::assistant_turn(&content, calls.clone()));

            for call in &calls {
                let prepared = prepare(call);
                emit(
                    tx,
                    StreamEvent::ToolCallStart {
                        id: call.id.clone(),
                        name: call.function.name.clone(),
                        arguments: prepared.invocation.arguments.clone(),
                    },
                )
                .await?;

                let (step_tx, mut step_rx) = mpsc::channel(16);
                let run = self.execute(prepared, context, Some(step_tx));
                let forward = async {
                    // Ends once the tool drops its step sender
                    while let Some(step) = step_rx.recv().await {
                        let event = StreamEvent::ToolCallStep {
                            id: call.id.clone(),
                            name: call.function.name.clone(),
                            step,
                        };
                        if tx.send(event).await.is_err() {
                            return false;
                        }
                    }
                    true
                };
                let ((invocation, turn), delivered) = tokio::join!(run, forward);
                if !delivered {
                    return Err(Halt::Disconnected);
                }

                let event = match (&invocation.result, &invocation.error) {
                    (_, Some(error)) => StreamEvent::ToolCallError {
                        id: invocation.id.clone(),
                        name: invocation.name.clone(),
                        error: error.clone(),
                    },
                    (result, None) => StreamEvent::ToolCallComplete {
                        id: invocation.id.clone(),
                        name: invocation.name.clone(),
                        result: result.clone().unwrap_or_default(),
                    },
                };

                conversation.push(codec::tool_turn(&call.id, turn));
                audit.push(invocation);
                emit(tx, event).await?;
            }
        }
    }
}

async fn emit(tx: &mpsc::Sender<StreamEvent>, event: StreamEvent) -> Result<(), Halt> {
    tx.send(event).await.map_err(|_| Halt::Disconnected)
}
