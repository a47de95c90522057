//! `deckhand tools`: list the tool families registered for this config.

use deckhand_config::AppConfig;
use deckhand_core::tool::ToolDispatcher;
use deckhand_tools::TodoStore;

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    let dispatcher = deckhand_tools::default_dispatcher(&config, TodoStore::default());

    println!("Registered tools");
    println!("================\n");
    print!("{}", render(&dispatcher));

    if config.tools.image.api_key.is_none() {
        println!("\n  image: not registered (set DECKHAND_IMAGE_API_KEY)");
    }
    if config.tools.browser.api_key.is_none() {
        println!("  browser: not registered (set DECKHAND_BROWSER_API_KEY)");
    }

    Ok(())
}

/// One block per family, in dispatch priority order.
fn render(dispatcher: &ToolDispatcher) -> String {
    let mut out = String::new();
    for family in dispatcher.families() {
        out.push_str(&format!("  {}\n", family.name()));
        for def in family.definitions() {
            out.push_str(&format!("    - {:<22} {}\n", def.name, def.description));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lists_families_in_priority_order() {
        let mut config = AppConfig::default();
        config.tools.disk.root = std::env::temp_dir().join("deckhand-cli-tools");
        let dispatcher = deckhand_tools::default_dispatcher(&config, TodoStore::default());

        let text = render(&dispatcher);
        let todo = text.find("  todo\n").unwrap();
        let disk = text.find("  disk\n").unwrap();
        assert!(todo < disk);
        assert!(text.contains("todo_add"));
        assert!(text.contains("disk_write_file"));
    }
}
