//! Browser family: delegates research tasks to a remote browser-automation
//! service and reports its progress while polling.

use async_trait::async_trait;
use deckhand_config::BrowserConfig;
use deckhand_core::error::ToolError;
use deckhand_core::provider::ToolDefinition;
use deckhand_core::tool::{ToolContext, ToolFamily, ToolStep};
use serde::Deserialize;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::required_str;

const TOOL_NAME: &str = "browser_run_task";

pub struct BrowserFamily {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
    timeout: Duration,
    poll_interval: Duration,
}

impl BrowserFamily {
    pub fn new(
        api_url: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
        poll_interval: Duration,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_default();

        Self {
            client,
            api_url: api_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            timeout,
            poll_interval,
        }
    }

    /// Build from config; `None` unless both URL and key are set.
    pub fn from_config(config: &BrowserConfig) -> Option<Self> {
        let key = config.api_key.as_deref().filter(|k| !k.trim().is_empty())?;
        if config.api_url.trim().is_empty() {
            return None;
        }
        Some(Self::new(
            &config.api_url,
            key,
            Duration::from_secs(config.timeout_secs),
            Duration::from_millis(config.poll_interval_ms),
        ))
    }

    async fn create_task(&self, task: &str) -> Result<String, ToolError> {
        let response = self
            .client
            .post(format!("{}/run-task", self.api_url))
            .bearer_auth(&self.api_key)
            .json(&serde_json::json!({ "task": task }))
            .send()
            .await
            .map_err(|e| ToolError::failed(TOOL_NAME, format!("Failed to create task: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), body = %body, "Browser service rejected task");
            return Err(ToolError::failed(
                TOOL_NAME,
                format!("Browser service returned {}: {body}", status.as_u16()),
            ));
        }

        let created: CreatedTask = response
            .json()
            .await
            .map_err(|e| ToolError::failed(TOOL_NAME, format!("Invalid response: {e}")))?;
        Ok(created.id)
    }

    async fn fetch_task(&self, task_id: &str) -> Result<RemoteTask, ToolError> {
        let response = self
            .client
            .get(format!("{}/task/{task_id}", self.api_url))
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(|e| ToolError::failed(TOOL_NAME, format!("Failed to poll task: {e}")))?;

        if !response.status().is_success() {
            return Err(ToolError::failed(
                TOOL_NAME,
                format!("Polling task {task_id} returned {}", response.status().as_u16()),
            ));
        }

        response
            .json()
            .await
            .map_err(|e| ToolError::failed(TOOL_NAME, format!("Invalid task status: {e}")))
    }

    /// Poll until the task reaches a final state.
    async fn wait_for(
        &self,
        task_id: &str,
        steps: Option<&mpsc::Sender<ToolStep>>,
    ) -> Result<serde_json::Value, ToolError> {
        let mut seen = 0;
        loop {
            let task = self.fetch_task(task_id).await?;

            for step in new_steps(seen, &task.steps) {
                if let Some(tx) = steps {
                    let _ = tx.send(step).await;
                }
            }
            seen = seen.max(task.steps.len());

            match task.status.as_str() {
                "finished" => {
                    info!(task_id, steps = seen, "Browser task finished");
                    return Ok(serde_json::json!({
                        "taskId": task_id,
                        "status": task.status,
                        "output": task.output,
                        "steps": seen,
                        "liveUrl": task.live_url,
                    }));
                }
                "failed" | "stopped" => {
                    return Err(ToolError::failed(
                        TOOL_NAME,
                        format!("Browser task {task_id} ended with status '{}'", task.status),
                    ));
                }
                other => debug!(task_id, status = other, "Browser task still running"),
            }

            tokio::time::sleep(self.poll_interval).await;
        }
    }

    async fn create_and_wait(
        &self,
        task: &str,
        steps: Option<&mpsc::Sender<ToolStep>>,
    ) -> Result<serde_json::Value, ToolError> {
        let task_id = self.create_task(task).await?;
        if let Some(tx) = steps {
            let _ = tx
                .send(ToolStep::new("Task created").with_data(serde_json::json!({ "taskId": task_id })))
                .await;
        }
        self.wait_for(&task_id, steps).await
    }

    async fn run(
        &self,
        arguments: &serde_json::Value,
        steps: Option<&mpsc::Sender<ToolStep>>,
    ) -> Result<serde_json::Value, ToolError> {
        let task = required_str(arguments, "task", TOOL_NAME)?;

        tokio::time::timeout(self.timeout, self.create_and_wait(task, steps))
            .await
            .map_err(|_| ToolError::Timeout {
                tool_name: TOOL_NAME.into(),
                timeout_secs: self.timeout.as_secs(),
            })?
    }
}

/// Steps past the first `seen`, as progress reports.
fn new_steps(seen: usize, steps: &[serde_json::Value]) -> Vec<ToolStep> {
    steps
        .iter()
        .enumerate()
        .skip(seen)
        .map(|(i, step)| {
            let number = step["step"].as_u64().unwrap_or(i as u64 + 1);
            let goal = step["next_goal"]
                .as_str()
                .or_else(|| step["evaluation_previous_goal"].as_str())
                .unwrap_or("working");
            ToolStep::new(format!("Step {number}: {goal}")).with_data(step.clone())
        })
        .collect()
}

#[derive(Debug, Deserialize)]
struct CreatedTask {
    id: String,
}

#[derive(Debug, Deserialize)]
struct RemoteTask {
    #[serde(default)]
    status: String,
    #[serde(default)]
    steps: Vec<serde_json::Value>,
    #[serde(default)]
    output: Option<String>,
    #[serde(default)]
    live_url: Option<String>,
}

#[async_trait]
impl ToolFamily for BrowserFamily {
    fn name(&self) -> &str {
        "browser"
    }

    fn handles(&self, tool_name: &str) -> bool {
        tool_name == TOOL_NAME
    }

    fn definitions(&self) -> Vec<ToolDefinition> {
        vec![ToolDefinition {
            name: TOOL_NAME.into(),
            description: "Run a research task in a remote web browser and return what it found. Slow; use for facts the conversation lacks.".into(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {
                    "task": { "type": "string", "description": "Natural-language instructions for the browser agent" }
                },
                "required": ["task"]
            }),
        }]
    }

    async fn execute(
        &self,
        _tool_name: &str,
        arguments: serde_json::Value,
        _context: &ToolContext,
    ) -> Result<serde_json::Value, ToolError> {
        self.run(&arguments, None).await
    }

    async fn execute_streaming(
        &self,
        _tool_name: &str,
        arguments: serde_json::Value,
        _context: &ToolContext,
        steps: mpsc::Sender<ToolStep>,
    ) -> Result<serde_json::Value, ToolError> {
        self.run(&arguments, Some(&steps)).await
    }
}
