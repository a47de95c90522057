//! `deckhand init`: first-time setup.

use std::path::Path;

use deckhand_config::AppConfig;

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config_dir = AppConfig::config_dir();
    let config_path = AppConfig::config_path();

    println!("Deckhand: First-Time Setup");
    println!("==========================\n");

    if !config_dir.exists() {
        std::fs::create_dir_all(&config_dir)?;
        println!("  Created config directory: {}", config_dir.display());
    } else {
        println!("  Config directory exists: {}", config_dir.display());
    }

    let disk_root = AppConfig::load_from(&config_path)
        .map(|c| c.tools.disk.root)
        .unwrap_or_else(|_| AppConfig::default().tools.disk.root);
    if !disk_root.exists() {
        std::fs::create_dir_all(&disk_root)?;
        println!("  Created disk root: {}", disk_root.display());
    }

    if write_default_config(&config_path)? {
        println!("  Created config.toml at: {}", config_path.display());
        println!("\n  Next steps:");
        println!("   1. Edit {} and add your API key", config_path.display());
        println!("      (or set DECKHAND_API_KEY / OPENAI_API_KEY)");
        println!("   2. Run: deckhand chat");
        println!("   3. Or serve the web client: deckhand serve\n");
    } else {
        println!("\n  Config already exists at: {}", config_path.display());
        println!("   Edit it manually or delete and re-run init.\n");
    }

    Ok(())
}

/// Write the default config to `path` unless a file is already there.
///
/// Returns whether a file was written.
fn write_default_config(path: &Path) -> std::io::Result<bool> {
    if path.exists() {
        return Ok(false);
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, AppConfig::default_toml())?;
    Ok(true)
}
