//! Built-in tool families for Deckhand.
//!
//! Families give the assistant the ability to plan work (todo), keep slide
//! sources (disk), illustrate slides (image), and research on the web
//! (browser). The image and browser families call external services and
//! are only registered when their credentials are configured.

pub mod browser;
pub mod disk;
pub mod image;
pub mod todo;

use std::sync::Arc;

use deckhand_config::AppConfig;
use deckhand_core::error::ToolError;
use deckhand_core::tool::ToolDispatcher;
use tracing::info;

pub use browser::BrowserFamily;
pub use disk::DiskFamily;
pub use image::ImageFamily;
pub use todo::{TodoFamily, TodoStore};

/// Create the dispatcher with every configured family, in priority order:
/// todo, disk, image, browser.
pub fn default_dispatcher(config: &AppConfig, todo_store: TodoStore) -> ToolDispatcher {
    let mut dispatcher = ToolDispatcher::new()
        .with_family(Arc::new(TodoFamily::new(todo_store)))
        .with_family(Arc::new(DiskFamily::new(&config.tools.disk.root)));

    if let Some(image) = ImageFamily::from_config(&config.tools.image) {
        dispatcher.register(Arc::new(image));
    }
    if let Some(browser) = BrowserFamily::from_config(&config.tools.browser) {
        dispatcher.register(Arc::new(browser));
    }

    let families: Vec<&str> = dispatcher.families().iter().map(|f| f.name()).collect();
    info!(families = ?families, tools = dispatcher.definitions().len(), "Tool dispatcher ready");
    dispatcher
}

/// A required, non-empty string argument.
pub(crate) fn required_str<'a>(
    arguments: &'a serde_json::Value,
    key: &str,
    tool_name: &str,
) -> Result<&'a str, ToolError> {
    arguments[key]
        .as_str()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ToolError::InvalidArguments(format!("{tool_name}: missing '{key}' argument")))
}

/// An optional string argument; `null` counts as absent.
pub(crate) fn optional_str<'a>(arguments: &'a serde_json::Value, key: &str) -> Option<&'a str> {
    arguments.get(key).and_then(|v| v.as_str())
}
