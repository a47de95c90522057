//! `deckhand chat`: interactive or single-message chat mode.
//!
//! Each user turn is one orchestration call over the whole conversation so
//! far. The conversation lives only as long as the process.

use std::io::Write;

use deckhand_agent::{Orchestrator, StreamEvent};
use deckhand_config::AppConfig;
use deckhand_core::message::{ChatMessage, ToolInvocation};
use deckhand_core::provider::LlmConfig;
use deckhand_core::tool::ToolContext;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

pub struct ChatOptions {
    pub stream: bool,
    pub session: Option<String>,
    pub disk: Option<String>,
}

pub async fn run(message: Option<String>, options: ChatOptions) -> CliResult<()> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;

    // Check for API key early and give a clear error
    if !config.has_api_key() && !is_local(&config.api_url) {
        eprintln!();
        eprintln!("  ERROR: No API key configured!");
        eprintln!();
        eprintln!("  Set one of these environment variables:");
        eprintln!("    DECKHAND_API_KEY = 'sk-...'");
        eprintln!("    OPENAI_API_KEY   = 'sk-...'");
        eprintln!();
        eprintln!("  Or add it to your config file:");
        eprintln!("    {}", AppConfig::config_path().display());
        eprintln!();
        return Err("No API key found. See above for setup instructions.".into());
    }

    let state = deckhand_gateway::AppState::from_config(&config);
    let session = Session {
        orchestrator: state.orchestrator.clone(),
        llm: state.defaults.clone(),
        context: tool_context(options.session, options.disk),
        stream: options.stream,
    };

    let mut history: Vec<ChatMessage> = Vec::new();

    if let Some(msg) = message {
        // Single message mode
        history.push(ChatMessage::user(msg));
        let answer = session.turn(&history).await?;
        if !session.stream {
            println!("{answer}");
        }
        return Ok(());
    }

    // Interactive mode
    println!();
    println!("  Deckhand: Interactive Mode");
    println!();
    println!("  Model:     {}", session.llm.model);
    println!("  Session:   {}", session.context.session_id.as_deref().unwrap_or("-"));
    println!("  Disk:      {}", session.context.disk_id.as_deref().unwrap_or("(none)"));
    println!();
    println!("  Type your message and press Enter.");
    println!("  Type 'exit' or Ctrl+C to quit.");
    println!();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    prompt()?;
    while let Some(line) = lines.next_line().await? {
        let input = line.trim();
        if input.is_empty() {
            prompt()?;
            continue;
        }
        if matches!(input, "exit" | "quit") {
            break;
        }

        history.push(ChatMessage::user(input));
        match session.turn(&history).await {
            Ok(answer) => {
                if !session.stream {
                    println!();
                    for line in answer.lines() {
                        println!("  Assistant > {line}");
                    }
                }
                println!();
                history.push(ChatMessage::assistant(answer));
            }
            Err(e) => {
                // Drop the unanswered turn so the next one starts clean
                history.pop();
                eprintln!("  [Error] {e}");
                println!();
            }
        }
        prompt()?;
    }

    println!();
    println!("  Goodbye!");
    println!();

    Ok(())
}

struct Session {
    orchestrator: Orchestrator,
    llm: LlmConfig,
    context: ToolContext,
    stream: bool,
}

impl Session {
    /// Run one orchestration call and return the assistant's answer.
    async fn turn(&self, history: &[ChatMessage]) -> CliResult<String> {
        if self.stream {
            let rx = self
                .orchestrator
                .run_stream(history.to_vec(), self.llm.clone(), self.context.clone());
            return drain(rx, &mut std::io::stdout(), &mut std::io::stderr()).await;
        }

        eprint!("  Thinking...");
        let result = self.orchestrator.run(history, &self.llm, &self.context).await;
        eprint!("\r              \r");
        let result = result?;

        for invocation in result.tool_calls.iter().flatten() {
            eprintln!("{}", summarize(invocation));
        }
        Ok(result.message)
    }
}

fn prompt() -> std::io::Result<()> {
    print!("  You > ");
    std::io::stdout().flush()
}

fn is_local(api_url: &str) -> bool {
    api_url.contains("localhost") || api_url.contains("127.0.0.1")
}

/// Context for the tool families: todo needs a session, so one is made up
/// when the user gives none.
fn tool_context(session: Option<String>, disk: Option<String>) -> ToolContext {
    ToolContext {
        session_id: Some(session.unwrap_or_else(|| uuid::Uuid::new_v4().to_string())),
        disk_id: disk,
        ..ToolContext::default()
    }
}

fn summarize(invocation: &ToolInvocation) -> String {
    match &invocation.error {
        Some(error) => format!("  [tool] {} failed: {error}", invocation.name),
        None => format!("  [tool] {} ok", invocation.name),
    }
}

/// Print stream events as they arrive: answer text to `out`, tool progress
/// to `err`. Returns the final message, or the stream's error.
async fn drain(
    mut rx: mpsc::Receiver<StreamEvent>,
    out: &mut impl Write,
    err: &mut impl Write,
) -> CliResult<String> {
    while let Some(event) = rx.recv().await {
        match event {
            StreamEvent::Message { content } => {
                write!(out, "{content}")?;
                out.flush()?;
            }
            StreamEvent::ToolCallStart { name, .. } => writeln!(err, "\n  [tool] {name}...")?,
            StreamEvent::ToolCallStep { step, .. } => writeln!(err, "    {}", step.message)?,
            StreamEvent::ToolCallComplete { name, .. } => writeln!(err, "  [tool] {name} ok")?,
            StreamEvent::ToolCallError { name, error, .. } => {
                writeln!(err, "  [tool] {name} failed: {error}")?
            }
            StreamEvent::FinalMessage {
                message,
                ceiling_reached,
                ..
            } => {
                if ceiling_reached {
                    writeln!(out, "\n{message}")?;
                } else {
                    writeln!(out)?;
                }
                return Ok(message);
            }
            StreamEvent::Error { message } => return Err(message.into()),
        }
    }
    Err("Stream ended without a final message".into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use deckhand_core::tool::ToolStep;

    async fn drained(events: Vec<StreamEvent>) -> (CliResult<String>, String, String) {
        let (tx, rx) = mpsc::channel(events.len().max(1));
        for event in events {
            tx.send(event).await.unwrap();
        }
        drop(tx);

        let mut out = Vec::new();
        let mut err = Vec::new();
        let result = drain(rx, &mut out, &mut err).await;
        (
            result,
            String::from_utf8(out).unwrap(),
            String::from_utf8(err).unwrap(),
        )
    }

    #[tokio::test]
    async fn prints_fragments_and_returns_final() {
        let (result, out, err) = drained(vec![
            StreamEvent::Message { content: "Three ".into() },
            StreamEvent::Message { content: "slides.".into() },
            StreamEvent::FinalMessage {
                message: "Three slides.".into(),
                tool_calls: vec![],
                iterations: 1,
                ceiling_reached: false,
            },
        ])
        .await;

        assert_eq!(result.unwrap(), "Three slides.");
        assert_eq!(out, "Three slides.\n");
        assert!(err.is_empty());
    }

    #[tokio::test]
    async fn tool_progress_goes_to_stderr() {
        let (result, out, err) = drained(vec![
            StreamEvent::ToolCallStart {
                id: "c1".into(),
                name: "generate_image".into(),
                arguments: serde_json::json!({"prompt": "a lighthouse"}),
            },
            StreamEvent::ToolCallStep {
                id: "c1".into(),
                name: "generate_image".into(),
                step: ToolStep::new("submitting"),
            },
            StreamEvent::ToolCallError {
                id: "c1".into(),
                name: "generate_image".into(),
                error: "Tool execution timed out".into(),
            },
            StreamEvent::FinalMessage {
                message: String::new(),
                tool_calls: vec![],
                iterations: 2,
                ceiling_reached: false,
            },
        ])
        .await;

        assert!(result.is_ok());
        assert_eq!(out, "\n");
        assert!(err.contains("[tool] generate_image..."));
        assert!(err.contains("    submitting"));
        assert!(err.contains("generate_image failed: Tool execution timed out"));
    }

    #[tokio::test]
    async fn ceiling_prints_advisory() {
        let (result, out, _) = drained(vec![StreamEvent::FinalMessage {
            message: deckhand_agent::CEILING_MESSAGE.into(),
            tool_calls: vec![],
            iterations: 10,
            ceiling_reached: true,
        }])
        .await;

        assert_eq!(result.unwrap(), deckhand_agent::CEILING_MESSAGE);
        assert!(out.contains(deckhand_agent::CEILING_MESSAGE));
    }

    #[tokio::test]
    async fn error_event_fails_the_turn() {
        let (result, _, _) = drained(vec![StreamEvent::Error {
            message: deckhand_agent::PROVIDER_FAILURE_MESSAGE.into(),
        }])
        .await;

        assert_eq!(
            result.unwrap_err().to_string(),
            deckhand_agent::PROVIDER_FAILURE_MESSAGE
        );
    }

    #[tokio::test]
    async fn closed_stream_without_terminal_is_an_error() {
        let (result, _, _) = drained(vec![StreamEvent::Message { content: "partial".into() }]).await;
        assert!(result.is_err());
    }

    #[test]
    fn context_gets_a_session() {
        let ctx = tool_context(None, Some("deck-7".into()));
        assert!(ctx.session_id.is_some_and(|s| !s.is_empty()));
        assert_eq!(ctx.disk_id.as_deref(), Some("deck-7"));

        let ctx = tool_context(Some("s-1".into()), None);
        assert_eq!(ctx.session_id.as_deref(), Some("s-1"));
        assert!(ctx.disk_id.is_none());
    }

    #[test]
    fn summarizes_invocations() {
        let ok = ToolInvocation::pending("c", "todo_add", serde_json::json!({})).resolve(serde_json::json!({}));
        assert_eq!(summarize(&ok), "  [tool] todo_add ok");

        let failed = ToolInvocation::pending("c", "frobnicate", serde_json::json!({})).fail("Unknown tool: frobnicate");
        assert_eq!(summarize(&failed), "  [tool] frobnicate failed: Unknown tool: frobnicate");
    }

    #[test]
    fn local_endpoints_need_no_key() {
        assert!(is_local("http://localhost:11434/v1"));
        assert!(!is_local("https://api.openai.com/v1"));
    }
}
