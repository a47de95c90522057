//! Image family: slide illustrations via an OpenAI-compatible images API.
//!
//! Results can carry base64 payloads of several megabytes; the orchestration
//! loop bounds them before they re-enter the conversation.

use async_trait::async_trait;
use deckhand_config::ImageConfig;
use deckhand_core::error::ToolError;
use deckhand_core::provider::ToolDefinition;
use deckhand_core::tool::{ToolContext, ToolFamily, ToolStep};
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::{optional_str, required_str};

const TOOL_NAME: &str = "generate_image";

pub struct ImageFamily {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
    model: String,
    size: String,
}

impl ImageFamily {
    pub fn new(
        api_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
        size: impl Into<String>,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(180))
            .build()
            .unwrap_or_default();

        Self {
            client,
            api_url: api_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model: model.into(),
            size: size.into(),
        }
    }

    /// Build from config; `None` when no API key is available.
    pub fn from_config(config: &ImageConfig) -> Option<Self> {
        let key = config.api_key.as_deref().filter(|k| !k.trim().is_empty())?;
        Some(Self::new(&config.api_url, key, &config.model, &config.size))
    }

    async fn generate(
        &self,
        arguments: &serde_json::Value,
        steps: Option<&mpsc::Sender<ToolStep>>,
    ) -> Result<serde_json::Value, ToolError> {
        let prompt = required_str(arguments, "prompt", TOOL_NAME)?;
        let size = optional_str(arguments, "size").unwrap_or(self.size.as_str());
        let n = arguments["n"].as_u64().unwrap_or(1).clamp(1, 4);

        report(steps, ToolStep::new("submitting").with_data(serde_json::json!({
            "model": self.model,
            "size": size,
            "n": n,
        })))
        .await;

        let url = format!("{}/images/generations", self.api_url);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&serde_json::json!({
                "model": self.model,
                "prompt": prompt,
                "size": size,
                "n": n,
            }))
            .send()
            .await
            .map_err(|e| ToolError::failed(TOOL_NAME, format!("Request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), body = %body, "Image API returned error");
            return Err(ToolError::failed(
                TOOL_NAME,
                format!("Image API returned {}: {body}", status.as_u16()),
            ));
        }

        let parsed: ImagesResponse = response
            .json()
            .await
            .map_err(|e| ToolError::failed(TOOL_NAME, format!("Invalid response: {e}")))?;

        let images = images_from(parsed);
        debug!(count = images.len(), "Image generation finished");
        report(steps, ToolStep::new("received").with_data(serde_json::json!({ "count": images.len() }))).await;

        Ok(serde_json::json!({
            "prompt": prompt,
            "model": self.model,
            "images": images,
        }))
    }
}

async fn report(steps: Option<&mpsc::Sender<ToolStep>>, step: ToolStep) {
    if let Some(tx) = steps {
        let _ = tx.send(step).await;
    }
}

#[derive(Debug, Deserialize)]
struct ImagesResponse {
    #[serde(default)]
    data: Vec<ImageDatum>,
}

#[derive(Debug, Deserialize)]
struct ImageDatum {
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    b64_json: Option<String>,
    #[serde(default)]
    revised_prompt: Option<String>,
}

fn images_from(response: ImagesResponse) -> Vec<serde_json::Value> {
    response
        .data
        .into_iter()
        .map(|d| {
            let mut image = serde_json::Map::new();
            if let Some(url) = d.url {
                image.insert("url".into(), url.into());
            }
            if let Some(b64) = d.b64_json {
                image.insert("b64Json".into(), b64.into());
            }
            if let Some(revised) = d.revised_prompt {
                image.insert("revisedPrompt".into(), revised.into());
            }
            serde_json::Value::Object(image)
        })
        .collect()
}

#[async_trait]
impl ToolFamily for ImageFamily {
    fn name(&self) -> &str {
        "image"
    }

    fn handles(&self, tool_name: &str) -> bool {
        tool_name == TOOL_NAME
    }

    fn definitions(&self) -> Vec<ToolDefinition> {
        vec![ToolDefinition {
            name: TOOL_NAME.into(),
            description: "Generate an illustration for a slide from a text prompt.".into(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {
                    "prompt": { "type": "string", "description": "What the image should show" },
                    "size": { "type": "string", "description": "WIDTHxHEIGHT, e.g. 1024x1024" },
                    "n": { "type": "integer", "minimum": 1, "maximum": 4 }
                },
                "required": ["prompt"]
            }),
        }]
    }

    async fn execute(
        &self,
        _tool_name: &str,
        arguments: serde_json::Value,
        _context: &ToolContext,
    ) -> Result<serde_json::Value, ToolError> {
        self.generate(&arguments, None).await
    }

    async fn execute_streaming(
        &self,
        _tool_name: &str,
        arguments: serde_json::Value,
        _context: &ToolContext,
        steps: mpsc::Sender<ToolStep>,
    ) -> Result<serde_json::Value, ToolError> {
        self.generate(&arguments, Some(&steps)).await
    }
}
