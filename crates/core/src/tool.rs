//! Tool families and the dispatcher that routes calls to them.
//!
//! A tool family is a cohesive group of tools sharing a name-matching rule
//! (all todo operations, all disk operations, ...). The dispatcher holds the
//! families in priority order and hands each call to the first family that
//! claims the name, so adding a family never touches routing logic.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;

use crate::error::ToolError;
use crate::provider::ToolDefinition;

/// Opaque identifiers the caller supplies for one orchestration call.
///
/// Passed through to tool families unmodified; the loop never interprets
/// them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolContext {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disk_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub acontext_session_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub character_id: Option<String>,
}

impl ToolContext {
    /// The session id, or `MissingContext` if absent or blank.
    pub fn require_session(&self, tool_name: &str) -> Result<&str, ToolError> {
        require(self.session_id.as_deref(), tool_name, "sessionId")
    }

    /// The disk id, or `MissingContext` if absent or blank.
    pub fn require_disk(&self, tool_name: &str) -> Result<&str, ToolError> {
        require(self.disk_id.as_deref(), tool_name, "diskId")
    }
}

fn require<'a>(value: Option<&'a str>, tool_name: &str, field: &str) -> Result<&'a str, ToolError> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(ToolError::MissingContext {
            tool_name: tool_name.to_string(),
            field: field.to_string(),
        }),
    }
}

/// An intermediate progress report from a long-running tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolStep {
    pub message: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl ToolStep {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            data: None,
        }
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }
}

/// A group of related tools sharing a name-matching rule.
#[async_trait]
pub trait ToolFamily: Send + Sync {
    /// Family label (e.g., "todo", "disk").
    fn name(&self) -> &str;

    /// Is `tool_name` one of ours?
    fn handles(&self, tool_name: &str) -> bool;

    /// Definitions of every tool in the family (sent to the LLM).
    fn definitions(&self) -> Vec<ToolDefinition>;

    /// Family-specific preconditions on the caller context.
    fn check_context(&self, _tool_name: &str, _context: &ToolContext) -> Result<(), ToolError> {
        Ok(())
    }

    /// Execute one tool with parsed arguments.
    async fn execute(
        &self,
        tool_name: &str,
        arguments: serde_json::Value,
        context: &ToolContext,
    ) -> Result<serde_json::Value, ToolError>;

    /// Execute one tool, reporting intermediate steps on `steps`.
    ///
    /// Families without progress to report keep the default, which simply
    /// runs [`execute`](Self::execute).
    async fn execute_streaming(
        &self,
        tool_name: &str,
        arguments: serde_json::Value,
        context: &ToolContext,
        _steps: mpsc::Sender<ToolStep>,
    ) -> Result<serde_json::Value, ToolError> {
        self.execute(tool_name, arguments, context).await
    }
}

/// Routes tool calls to families in priority order.
///
/// The dispatcher itself is stateless; side effects live in the families.
#[derive(Default)]
pub struct ToolDispatcher {
    families: Vec<Arc<dyn ToolFamily>>,
}

impl ToolDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a family. Earlier registrations win name conflicts.
    pub fn register(&mut self, family: Arc<dyn ToolFamily>) {
        self.families.push(family);
    }

    /// Builder-style [`register`](Self::register).
    pub fn with_family(mut self, family: Arc<dyn ToolFamily>) -> Self {
        self.register(family);
        self
    }

    /// The first family claiming `tool_name`.
    pub fn family_for(&self, tool_name: &str) -> Option<&Arc<dyn ToolFamily>> {
        self.families.iter().find(|f| f.handles(tool_name))
    }

    pub fn families(&self) -> &[Arc<dyn ToolFamily>] {
        &self.families
    }

    /// Get all tool definitions (for sending to the LLM).
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.families.iter().flat_map(|f| f.definitions()).collect()
    }

    /// Parse a raw argument payload into a JSON object.
    ///
    /// An empty payload means "no arguments".
    pub fn parse_arguments(tool_name: &str, raw: &str) -> Result<serde_json::Value, ToolError> {
        if raw.trim().is_empty() {
            return Ok(serde_json::json!({}));
        }
        let value: serde_json::Value =
            serde_json::from_str(raw).map_err(|e| ToolError::MalformedArguments {
                tool_name: tool_name.to_string(),
                reason: e.to_string(),
            })?;
        if !value.is_object() {
            return Err(ToolError::MalformedArguments {
                tool_name: tool_name.to_string(),
                reason: "expected a JSON object".into(),
            });
        }
        Ok(value)
    }

    /// Parse `arguments_json` and run the call.
    pub async fn execute(
        &self,
        tool_name: &str,
        arguments_json: &str,
        context: &ToolContext,
    ) -> Result<serde_json::Value, ToolError> {
        let arguments = Self::parse_arguments(tool_name, arguments_json)?;
        self.dispatch(tool_name, arguments, context).await
    }

    /// Streaming variant of [`execute`](Self::execute).
    pub async fn execute_streaming(
        &self,
        tool_name: &str,
        arguments_json: &str,
        context: &ToolContext,
        steps: mpsc::Sender<ToolStep>,
    ) -> Result<serde_json::Value, ToolError> {
        let arguments = Self::parse_arguments(tool_name, arguments_json)?;
        self.dispatch_streaming(tool_name, arguments, context, steps).await
    }

    /// Run a call whose arguments are already parsed.
    pub async fn dispatch(
        &self,
        tool_name: &str,
        arguments: serde_json::Value,
        context: &ToolContext,
    ) -> Result<serde_json::Value, ToolError> {
        let family = self.claim(tool_name, context)?;
        family.execute(tool_name, arguments, context).await
    }

    /// Streaming variant of [`dispatch`](Self::dispatch).
    pub async fn dispatch_streaming(
        &self,
        tool_name: &str,
        arguments: serde_json::Value,
        context: &ToolContext,
        steps: mpsc::Sender<ToolStep>,
    ) -> Result<serde_json::Value, ToolError> {
        let family = self.claim(tool_name, context)?;
        family.execute_streaming(tool_name, arguments, context, steps).await
    }

    fn claim(&self, tool_name: &str, context: &ToolContext) -> Result<&Arc<dyn ToolFamily>, ToolError> {
        let family = self
            .family_for(tool_name)
            .ok_or_else(|| ToolError::UnknownTool(tool_name.to_string()))?;
        family.check_context(tool_name, context)?;
        debug!(tool = %tool_name, family = %family.name(), "Dispatching tool call");
        Ok(family)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Echoes its arguments back; claims names with a prefix.
    struct PrefixFamily {
        label: &'static str,
        prefix: &'static str,
        needs_session: bool,
    }

    #[async_trait]
    impl ToolFamily for PrefixFamily {
        fn name(&self) -> &str {
            self.label
        }

        fn handles(&self, tool_name: &str) -> bool {
            tool_name.starts_with(self.prefix)
        }

        fn definitions(&self) -> Vec<ToolDefinition> {
            vec![ToolDefinition {
                name: format!("{}echo", self.prefix),
                description: "Echoes back the input".into(),
                parameters: serde_json::json!({"type": "object"}),
            }]
        }

        fn check_context(&self, tool_name: &str, context: &ToolContext) -> Result<(), ToolError> {
            if self.needs_session {
                context.require_session(tool_name)?;
            }
            Ok(())
        }

        async fn execute(
            &self,
            _tool_name: &str,
            arguments: serde_json::Value,
            _context: &ToolContext,
        ) -> Result<serde_json::Value, ToolError> {
            Ok(serde_json::json!({ "family": self.label, "args": arguments }))
        }

        async fn execute_streaming(
            &self,
            tool_name: &str,
            arguments: serde_json::Value,
            context: &ToolContext,
            steps: mpsc::Sender<ToolStep>,
        ) -> Result<serde_json::Value, ToolError> {
            let _ = steps.send(ToolStep::new("working")).await;
            self.execute(tool_name, arguments, context).await
        }
    }

    fn dispatcher() -> ToolDispatcher {
        ToolDispatcher::new()
            .with_family(Arc::new(PrefixFamily { label: "todo", prefix: "todo_", needs_session: true }))
            .with_family(Arc::new(PrefixFamily { label: "greedy", prefix: "", needs_session: false }))
    }

    fn session() -> ToolContext {
        ToolContext {
            session_id: Some("s1".into()),
            ..ToolContext::default()
        }
    }

    #[tokio::test]
    async fn first_matching_family_wins() {
        let d = dispatcher();
        let out = d.execute("todo_add", r#"{"content":"x"}"#, &session()).await.unwrap();
        assert_eq!(out["family"], "todo");
        assert_eq!(out["args"]["content"], "x");

        let out = d.execute("anything", "{}", &session()).await.unwrap();
        assert_eq!(out["family"], "greedy");
    }

    #[tokio::test]
    async fn unknown_tool_when_nothing_claims() {
        let d = ToolDispatcher::new();
        let err = d.execute("frobnicate", "{}", &ToolContext::default()).await.unwrap_err();
        assert_eq!(err.to_string(), "Unknown tool: frobnicate");
    }

    #[tokio::test]
    async fn malformed_arguments_rejected() {
        let d = dispatcher();
        let err = d.execute("todo_add", "{not json", &session()).await.unwrap_err();
        assert!(matches!(err, ToolError::MalformedArguments { .. }));

        let err = d.execute("todo_add", "[1,2]", &session()).await.unwrap_err();
        assert!(matches!(err, ToolError::MalformedArguments { .. }));
    }

    #[tokio::test]
    async fn empty_arguments_mean_empty_object() {
        let d = dispatcher();
        let out = d.execute("todo_list", "  ", &session()).await.unwrap();
        assert_eq!(out["args"], serde_json::json!({}));
    }

    #[tokio::test]
    async fn missing_session_fails_precondition() {
        let d = dispatcher();
        let blank = ToolContext {
            session_id: Some("   ".into()),
            ..ToolContext::default()
        };
        for ctx in [ToolContext::default(), blank] {
            let err = d.execute("todo_add", "{}", &ctx).await.unwrap_err();
            assert!(matches!(err, ToolError::MissingContext { .. }), "got {err:?}");
        }
    }

    #[tokio::test]
    async fn streaming_forwards_steps() {
        let d = dispatcher();
        let (tx, mut rx) = mpsc::channel(4);
        let out = d.execute_streaming("todo_list", "{}", &session(), tx).await.unwrap();
        assert_eq!(out["family"], "todo");
        assert_eq!(rx.recv().await.unwrap().message, "working");
    }

    #[test]
    fn definitions_follow_priority_order() {
        let defs = dispatcher().definitions();
        let names: Vec<_> = defs.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["todo_echo", "echo"]);
    }

    #[test]
    fn context_uses_camel_case() {
        let ctx: ToolContext =
            serde_json::from_str(r#"{"diskId":"d1","acontextSessionId":"a1","characterId":"c1"}"#).unwrap();
        assert_eq!(ctx.disk_id.as_deref(), Some("d1"));
        assert_eq!(ctx.acontext_session_id.as_deref(), Some("a1"));
        assert_eq!(ctx.character_id.as_deref(), Some("c1"));
        assert!(ctx.session_id.is_none());
    }
}
