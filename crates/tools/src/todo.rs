//! Todo family: per-session task lists the assistant uses to plan a deck.
//!
//! State lives in a [`TodoStore`] created once at process start and shared
//! by every request. Sessions are keyed by the caller's `sessionId`.

use async_trait::async_trait;
use deckhand_core::error::ToolError;
use deckhand_core::provider::ToolDefinition;
use deckhand_core::tool::{ToolContext, ToolFamily};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

use crate::{optional_str, required_str};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TodoStatus {
    Pending,
    InProgress,
    Completed,
}

impl TodoStatus {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "in_progress" => Some(Self::InProgress),
            "completed" => Some(Self::Completed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
}

impl Priority {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "low" => Some(Self::Low),
            "medium" => Some(Self::Medium),
            "high" => Some(Self::High),
            _ => None,
        }
    }
}

/// One task in a session's list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TodoItem {
    pub task_id: String,
    pub content: String,
    pub status: TodoStatus,
    pub priority: Priority,
}

/// Partial update applied by `todo_update`.
#[derive(Debug, Clone, Default)]
pub struct TodoPatch {
    pub content: Option<String>,
    pub status: Option<TodoStatus>,
    pub priority: Option<Priority>,
}

#[derive(Default)]
struct SessionTodos {
    items: Vec<TodoItem>,
    next_id: u64,
    /// Logical clock value of the last write
    touched: u64,
}

struct StoreInner {
    sessions: HashMap<String, SessionTodos>,
    clock: u64,
    max_sessions: usize,
}

impl StoreInner {
    /// The session's list, created if needed; bumps its recency.
    fn session_mut(&mut self, session_id: &str) -> &mut SessionTodos {
        if !self.sessions.contains_key(session_id) {
            self.evict_for_insert();
        }
        self.clock += 1;
        let clock = self.clock;
        let session = self.sessions.entry(session_id.to_string()).or_default();
        session.touched = clock;
        session
    }

    fn evict_for_insert(&mut self) {
        while self.sessions.len() >= self.max_sessions.max(1) {
            let oldest = self
                .sessions
                .iter()
                .min_by_key(|(_, s)| s.touched)
                .map(|(id, _)| id.clone());
            match oldest {
                Some(id) => {
                    debug!(session_id = %id, "Evicting least recently updated todo session");
                    self.sessions.remove(&id);
                }
                None => break,
            }
        }
    }
}

/// Process-wide todo state, cheap to clone.
#[derive(Clone)]
pub struct TodoStore {
    inner: Arc<RwLock<StoreInner>>,
}

impl TodoStore {
    pub fn new(max_sessions: usize) -> Self {
        Self {
            inner: Arc::new(RwLock::new(StoreInner {
                sessions: HashMap::new(),
                clock: 0,
                max_sessions,
            })),
        }
    }

    pub async fn add(&self, session_id: &str, content: String, priority: Priority) -> TodoItem {
        let mut inner = self.inner.write().await;
        let session = inner.session_mut(session_id);
        session.next_id += 1;
        let item = TodoItem {
            task_id: format!("task_{}", session.next_id),
            content,
            status: TodoStatus::Pending,
            priority,
        };
        session.items.push(item.clone());
        item
    }

    /// Tasks in insertion order, optionally filtered by status.
    pub async fn list(&self, session_id: &str, status: Option<TodoStatus>) -> Vec<TodoItem> {
        let inner = self.inner.read().await;
        inner
            .sessions
            .get(session_id)
            .map(|s| {
                s.items
                    .iter()
                    .filter(|i| status.is_none_or(|st| i.status == st))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    pub async fn update(&self, session_id: &str, task_id: &str, patch: TodoPatch) -> Option<TodoItem> {
        let mut inner = self.inner.write().await;
        if !inner.sessions.contains_key(session_id) {
            return None;
        }
        let session = inner.session_mut(session_id);
        let item = session.items.iter_mut().find(|i| i.task_id == task_id)?;
        if let Some(content) = patch.content {
            item.content = content;
        }
        if let Some(status) = patch.status {
            item.status = status;
        }
        if let Some(priority) = patch.priority {
            item.priority = priority;
        }
        Some(item.clone())
    }

    pub async fn remove(&self, session_id: &str, task_id: &str) -> Option<TodoItem> {
        let mut inner = self.inner.write().await;
        if !inner.sessions.contains_key(session_id) {
            return None;
        }
        let session = inner.session_mut(session_id);
        let pos = session.items.iter().position(|i| i.task_id == task_id)?;
        Some(session.items.remove(pos))
    }

    /// Drop every task in the session. Ids keep counting upward.
    pub async fn clear(&self, session_id: &str) -> usize {
        let mut inner = self.inner.write().await;
        match inner.sessions.get_mut(session_id) {
            Some(session) => std::mem::take(&mut session.items).len(),
            None => 0,
        }
    }

    pub async fn session_count(&self) -> usize {
        self.inner.read().await.sessions.len()
    }
}

impl Default for TodoStore {
    fn default() -> Self {
        Self::new(1024)
    }
}

/// The `todo_*` tools.
pub struct TodoFamily {
    store: TodoStore,
}

impl TodoFamily {
    pub fn new(store: TodoStore) -> Self {
        Self { store }
    }

    fn parse_status(tool_name: &str, raw: Option<&str>) -> Result<Option<TodoStatus>, ToolError> {
        raw.map(|s| {
            TodoStatus::parse(s).ok_or_else(|| {
                ToolError::InvalidArguments(format!(
                    "{tool_name}: status must be one of pending, in_progress, completed (got '{s}')"
                ))
            })
        })
        .transpose()
    }

    fn parse_priority(tool_name: &str, raw: Option<&str>) -> Result<Option<Priority>, ToolError> {
        raw.map(|s| {
            Priority::parse(s).ok_or_else(|| {
                ToolError::InvalidArguments(format!(
                    "{tool_name}: priority must be one of low, medium, high (got '{s}')"
                ))
            })
        })
        .transpose()
    }
}

#[async_trait]
impl ToolFamily for TodoFamily {
    fn name(&self) -> &str {
        "todo"
    }

    fn handles(&self, tool_name: &str) -> bool {
        tool_name.starts_with("todo_")
    }

    fn definitions(&self) -> Vec<ToolDefinition> {
        let status = serde_json::json!({
            "type": "string",
            "enum": ["pending", "in_progress", "completed"]
        });
        let priority = serde_json::json!({
            "type": "string",
            "enum": ["low", "medium", "high"]
        });
        let task_id = serde_json::json!({
            "type": "string",
            "description": "Task id as returned by todo_add (e.g. task_1)"
        });

        vec![
            ToolDefinition {
                name: "todo_add".into(),
                description: "Add a task to the session's todo list.".into(),
                parameters: serde_json::json!({
                    "type": "object",
                    "properties": {
                        "content": { "type": "string", "description": "What needs doing" },
                        "priority": priority
                    },
                    "required": ["content"]
                }),
            },
            ToolDefinition {
                name: "todo_list".into(),
                description: "List the session's tasks, optionally filtered by status.".into(),
                parameters: serde_json::json!({
                    "type": "object",
                    "properties": { "status": status }
                }),
            },
            ToolDefinition {
                name: "todo_update".into(),
                description: "Change a task's content, status, or priority.".into(),
                parameters: serde_json::json!({
                    "type": "object",
                    "properties": {
                        "taskId": task_id,
                        "content": { "type": "string" },
                        "status": status,
                        "priority": priority
                    },
                    "required": ["taskId"]
                }),
            },
            ToolDefinition {
                name: "todo_remove".into(),
                description: "Remove a task from the list.".into(),
                parameters: serde_json::json!({
                    "type": "object",
                    "properties": { "taskId": task_id },
                    "required": ["taskId"]
                }),
            },
            ToolDefinition {
                name: "todo_clear".into(),
                description: "Remove every task in the session.".into(),
                parameters: serde_json::json!({ "type": "object", "properties": {} }),
            },
        ]
    }

    fn check_context(&self, tool_name: &str, context: &ToolContext) -> Result<(), ToolError> {
        context.require_session(tool_name).map(|_| ())
    }

    async fn execute(
        &self,
        tool_name: &str,
        arguments: serde_json::Value,
        context: &ToolContext,
    ) -> Result<serde_json::Value, ToolError> {
        let session_id = context.require_session(tool_name)?;

        match tool_name {
            "todo_add" => {
                let content = required_str(&arguments, "content", tool_name)?;
                let priority = Self::parse_priority(tool_name, optional_str(&arguments, "priority"))?
                    .unwrap_or_default();
                let item = self.store.add(session_id, content.to_string(), priority).await;
                Ok(serde_json::to_value(item).unwrap_or_default())
            }
            "todo_list" => {
                let status = Self::parse_status(tool_name, optional_str(&arguments, "status"))?;
                let tasks = self.store.list(session_id, status).await;
                let count_of = |st| tasks.iter().filter(|t| t.status == st).count();
                let summary = serde_json::json!({
                    "pending": count_of(TodoStatus::Pending),
                    "inProgress": count_of(TodoStatus::InProgress),
                    "completed": count_of(TodoStatus::Completed),
                });
                Ok(serde_json::json!({
                    "count": tasks.len(),
                    "summary": summary,
                    "tasks": tasks,
                }))
            }
            "todo_update" => {
                let task_id = required_str(&arguments, "taskId", tool_name)?;
                let patch = TodoPatch {
                    content: optional_str(&arguments, "content").map(str::to_string),
                    status: Self::parse_status(tool_name, optional_str(&arguments, "status"))?,
                    priority: Self::parse_priority(tool_name, optional_str(&arguments, "priority"))?,
                };
                let item = self
                    .store
                    .update(session_id, task_id, patch)
                    .await
                    .ok_or_else(|| ToolError::failed(tool_name, format!("Task {task_id} not found")))?;
                Ok(serde_json::to_value(item).unwrap_or_default())
            }
            "todo_remove" => {
                let task_id = required_str(&arguments, "taskId", tool_name)?;
                let item = self
                    .store
                    .remove(session_id, task_id)
                    .await
                    .ok_or_else(|| ToolError::failed(tool_name, format!("Task {task_id} not found")))?;
                Ok(serde_json::json!({ "removed": true, "taskId": item.task_id }))
            }
            "todo_clear" => {
                let cleared = self.store.clear(session_id).await;
                Ok(serde_json::json!({ "cleared": cleared }))
            }
            other => Err(ToolError::UnknownTool(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(session: &str) -> ToolContext {
        ToolContext {
            session_id: Some(session.into()),
            ..ToolContext::default()
        }
    }

    fn family() -> TodoFamily {
        TodoFamily::new(TodoStore::new(8))
    }

    #[tokio::test]
    async fn add_assigns_sequential_ids_per_session() {
        let f = family();
        let a = f.execute("todo_add", serde_json::json!({"content": "Outline"}), &ctx("s1")).await.unwrap();
        assert_eq!(a["taskId"], "task_1");
        assert_eq!(a["status"], "pending");
        assert_eq!(a["priority"], "medium");

        let b = f.execute("todo_add", serde_json::json!({"content": "Draft", "priority": "high"}), &ctx("s1")).await.unwrap();
        assert_eq!(b["taskId"], "task_2");
        assert_eq!(b["priority"], "high");

        let other = f.execute("todo_add", serde_json::json!({"content": "x"}), &ctx("s2")).await.unwrap();
        assert_eq!(other["taskId"], "task_1");
    }

    #[tokio::test]
    async fn update_then_list_by_status() {
        let f = family();
        for content in ["Title slide", "Agenda", "Summary"] {
            f.execute("todo_add", serde_json::json!({"content": content}), &ctx("s")).await.unwrap();
        }
        let updated = f
            .execute("todo_update", serde_json::json!({"taskId": "task_2", "status": "completed"}), &ctx("s"))
            .await
            .unwrap();
        assert_eq!(updated["status"], "completed");
        assert_eq!(updated["content"], "Agenda");

        let all = f.execute("todo_list", serde_json::json!({}), &ctx("s")).await.unwrap();
        assert_eq!(all["count"], 3);
        assert_eq!(all["summary"]["completed"], 1);
        assert_eq!(all["summary"]["pending"], 2);

        let done = f.execute("todo_list", serde_json::json!({"status": "completed"}), &ctx("s")).await.unwrap();
        assert_eq!(done["count"], 1);
        assert_eq!(done["tasks"][0]["taskId"], "task_2");
    }

    #[tokio::test]
    async fn remove_and_clear() {
        let f = family();
        f.execute("todo_add", serde_json::json!({"content": "a"}), &ctx("s")).await.unwrap();
        f.execute("todo_add", serde_json::json!({"content": "b"}), &ctx("s")).await.unwrap();

        let removed = f.execute("todo_remove", serde_json::json!({"taskId": "task_1"}), &ctx("s")).await.unwrap();
        assert_eq!(removed["removed"], true);

        let err = f.execute("todo_remove", serde_json::json!({"taskId": "task_1"}), &ctx("s")).await.unwrap_err();
        assert!(err.to_string().contains("task_1 not found"));

        let cleared = f.execute("todo_clear", serde_json::json!({}), &ctx("s")).await.unwrap();
        assert_eq!(cleared["cleared"], 1);

        // Ids keep counting after a clear
        let next = f.execute("todo_add", serde_json::json!({"content": "c"}), &ctx("s")).await.unwrap();
        assert_eq!(next["taskId"], "task_3");
    }

    #[tokio::test]
    async fn invalid_arguments() {
        let f = family();
        let err = f.execute("todo_add", serde_json::json!({}), &ctx("s")).await.unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));

        let err = f
            .execute("todo_list", serde_json::json!({"status": "someday"}), &ctx("s"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("someday"));
    }

    #[tokio::test]
    async fn requires_session() {
        let f = family();
        assert!(f.check_context("todo_add", &ToolContext::default()).is_err());
        assert!(f.check_context("todo_add", &ctx("s")).is_ok());
    }

    #[tokio::test]
    async fn evicts_least_recently_updated_session() {
        let store = TodoStore::new(2);
        store.add("a", "1".into(), Priority::Low).await;
        store.add("b", "1".into(), Priority::Low).await;
        // Touch "a" so "b" becomes the oldest
        store.add("a", "2".into(), Priority::Low).await;
        store.add("c", "1".into(), Priority::Low).await;

        assert_eq!(store.session_count().await, 2);
        assert_eq!(store.list("a", None).await.len(), 2);
        assert!(store.list("b", None).await.is_empty());
        assert_eq!(store.list("c", None).await.len(), 1);
    }

    #[test]
    fn handles_prefix_only() {
        let f = family();
        assert!(f.handles("todo_add"));
        assert!(f.handles("todo_whatever"));
        assert!(!f.handles("disk_read_file"));
        assert_eq!(f.definitions().len(), 5);
    }
}
