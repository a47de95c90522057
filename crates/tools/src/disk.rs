//! Disk family: a small file store per `diskId` for slide sources and assets.
//!
//! Every disk is a directory `<root>/<disk_id>/`. Tool paths are relative to
//! it; absolute paths and `..` components are rejected before any I/O.

use async_trait::async_trait;
use deckhand_core::error::ToolError;
use deckhand_core::provider::ToolDefinition;
use deckhand_core::tool::{ToolContext, ToolFamily};
use std::path::{Component, Path, PathBuf};
use tracing::debug;

use crate::{optional_str, required_str};

/// The `disk_*` tools.
pub struct DiskFamily {
    root: PathBuf,
}

impl DiskFamily {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Directory backing `disk_id`.
    fn disk_dir(&self, tool_name: &str, disk_id: &str) -> Result<PathBuf, ToolError> {
        let mut components = Path::new(disk_id).components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(_)), None) => Ok(self.root.join(disk_id)),
            _ => Err(ToolError::failed(tool_name, format!("Invalid disk id '{disk_id}'"))),
        }
    }

    /// Resolve a tool-supplied relative path inside the disk.
    fn resolve(&self, tool_name: &str, disk_id: &str, path: &str) -> Result<PathBuf, ToolError> {
        let dir = self.disk_dir(tool_name, disk_id)?;
        let relative = sanitize_relative(path).ok_or_else(|| {
            ToolError::InvalidArguments(format!(
                "{tool_name}: path '{path}' must be relative and stay inside the disk"
            ))
        })?;
        Ok(dir.join(relative))
    }

    async fn write(&self, tool_name: &str, disk_id: &str, args: &serde_json::Value) -> Result<serde_json::Value, ToolError> {
        let path = required_str(args, "path", tool_name)?;
        let content = required_str(args, "content", tool_name)?;
        let target = self.resolve(tool_name, disk_id, path)?;

        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| ToolError::failed(tool_name, format!("Failed to create directory: {e}")))?;
        }
        tokio::fs::write(&target, content)
            .await
            .map_err(|e| ToolError::failed(tool_name, format!("Failed to write file: {e}")))?;

        debug!(disk_id, path, bytes = content.len(), "Wrote disk file");
        Ok(serde_json::json!({ "path": path, "bytes": content.len() }))
    }

    async fn read(&self, tool_name: &str, disk_id: &str, args: &serde_json::Value) -> Result<serde_json::Value, ToolError> {
        let path = required_str(args, "path", tool_name)?;
        let target = self.resolve(tool_name, disk_id, path)?;

        let content = tokio::fs::read_to_string(&target)
            .await
            .map_err(|e| ToolError::failed(tool_name, format!("Failed to read file '{path}': {e}")))?;
        Ok(serde_json::json!({ "path": path, "content": content }))
    }

    async fn list(&self, tool_name: &str, disk_id: &str, args: &serde_json::Value) -> Result<serde_json::Value, ToolError> {
        let path = optional_str(args, "path").unwrap_or("");
        let dir = if path.is_empty() || path == "." {
            self.disk_dir(tool_name, disk_id)?
        } else {
            self.resolve(tool_name, disk_id, path)?
        };

        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(rd) => rd,
            // A disk nobody has written to yet is simply empty
            Err(e) if e.kind() == std::io::ErrorKind::NotFound && path.is_empty() => {
                return Ok(serde_json::json!({ "files": [] }));
            }
            Err(e) => return Err(ToolError::failed(tool_name, format!("Failed to list '{path}': {e}"))),
        };

        let mut files = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| ToolError::failed(tool_name, e))?
        {
            let meta = entry.metadata().await.map_err(|e| ToolError::failed(tool_name, e))?;
            let name = entry.file_name().to_string_lossy().into_owned();
            let rel = if path.is_empty() || path == "." {
                name
            } else {
                format!("{}/{name}", path.trim_end_matches('/'))
            };
            files.push(serde_json::json!({
                "path": rel,
                "size": meta.len(),
                "isDir": meta.is_dir(),
            }));
        }
        files.sort_by(|a, b| a["path"].as_str().cmp(&b["path"].as_str()));

        Ok(serde_json::json!({ "files": files }))
    }

    async fn delete(&self, tool_name: &str, disk_id: &str, args: &serde_json::Value) -> Result<serde_json::Value, ToolError> {
        let path = required_str(args, "path", tool_name)?;
        let target = self.resolve(tool_name, disk_id, path)?;

        tokio::fs::remove_file(&target)
            .await
            .map_err(|e| ToolError::failed(tool_name, format!("Failed to delete '{path}': {e}")))?;
        Ok(serde_json::json!({ "path": path, "deleted": true }))
    }
}

/// Normalize a relative path, or `None` if it is absolute or escapes.
fn sanitize_relative(path: &str) -> Option<PathBuf> {
    let path = path.replace('\\', "/");
    let mut out = PathBuf::new();
    for component in Path::new(&path).components() {
        match component {
            Component::Normal(part) => out.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    if out.as_os_str().is_empty() { None } else { Some(out) }
}

#[async_trait]
impl ToolFamily for DiskFamily {
    fn name(&self) -> &str {
        "disk"
    }

    fn handles(&self, tool_name: &str) -> bool {
        tool_name.starts_with("disk_")
    }

    fn definitions(&self) -> Vec<ToolDefinition> {
        let path = serde_json::json!({
            "type": "string",
            "description": "Path relative to the disk root, e.g. slides/intro.md"
        });
        vec![
            ToolDefinition {
                name: "disk_write_file".into(),
                description: "Write a text file to the disk, creating parent folders. Overwrites existing files.".into(),
                parameters: serde_json::json!({
                    "type": "object",
                    "properties": { "path": path, "content": { "type": "string" } },
                    "required": ["path", "content"]
                }),
            },
            ToolDefinition {
                name: "disk_read_file".into(),
                description: "Read a text file from the disk.".into(),
                parameters: serde_json::json!({
                    "type": "object",
                    "properties": { "path": path },
                    "required": ["path"]
                }),
            },
            ToolDefinition {
                name: "disk_list_files".into(),
                description: "List files in a disk folder (the root when no path is given).".into(),
                parameters: serde_json::json!({
                    "type": "object",
                    "properties": { "path": path }
                }),
            },
            ToolDefinition {
                name: "disk_delete_file".into(),
                description: "Delete a file from the disk.".into(),
                parameters: serde_json::json!({
                    "type": "object",
                    "properties": { "path": path },
                    "required": ["path"]
                }),
            },
        ]
    }

    fn check_context(&self, tool_name: &str, context: &ToolContext) -> Result<(), ToolError> {
        context.require_disk(tool_name).map(|_| ())
    }

    async fn execute(
        &self,
        tool_name: &str,
        arguments: serde_json::Value,
        context: &ToolContext,
    ) -> Result<serde_json::Value, ToolError> {
        let disk_id = context.require_disk(tool_name)?;
        match tool_name {
            "disk_write_file" => self.write(tool_name, disk_id, &arguments).await,
            "disk_read_file" => self.read(tool_name, disk_id, &arguments).await,
            "disk_list_files" => self.list(tool_name, disk_id, &arguments).await,
            "disk_delete_file" => self.delete(tool_name, disk_id, &arguments).await,
            other => Err(ToolError::UnknownTool(other.to_string())),
        }
    }
}
