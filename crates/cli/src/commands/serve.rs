//! `deckhand serve`: start the HTTP API server.

use deckhand_config::AppConfig;

pub async fn run(port_override: Option<u16>) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;

    if let Some(port) = port_override {
        config.gateway.port = port;
    }

    if !config.has_api_key() {
        eprintln!("  Warning: no API key configured; chat requests will fail until one is set.");
    }

    println!("Deckhand Gateway");
    println!("   Listening: {}:{}", config.gateway.host, config.gateway.port);
    println!("   Model:     {}", config.default_model);

    deckhand_gateway::start(config).await?;

    Ok(())
}
