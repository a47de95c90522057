//! Deckhand CLI, the main entry point.
//!
//! Commands:
//! - `init`   Write the default config and create the disk root
//! - `chat`   Interactive or single-message chat with the slide assistant
//! - `serve`  Start the HTTP gateway
//! - `tools`  List the registered tool families

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "deckhand",
    about = "Deckhand: chat-driven slide assistant",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Write the default configuration file
    Init,

    /// Chat with the assistant
    Chat {
        /// Send a single message instead of entering interactive mode
        #[arg(short, long)]
        message: Option<String>,

        /// Print events as they arrive instead of waiting for the answer
        #[arg(long)]
        stream: bool,

        /// Session id for the todo tools (random if omitted)
        #[arg(long)]
        session: Option<String>,

        /// Disk id for the file tools
        #[arg(long)]
        disk: Option<String>,
    },

    /// Start the HTTP gateway server
    Serve {
        /// Override the port
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// List registered tools by family
    Tools,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Init => commands::init::run().await?,
        Commands::Chat {
            message,
            stream,
            session,
            disk,
        } => {
            let options = commands::chat::ChatOptions {
                stream,
                session,
                disk,
            };
            commands::chat::run(message, options).await?
        }
        Commands::Serve { port } => commands::serve::run(port).await?,
        Commands::Tools => commands::tools::run().await?,
    }

    Ok(())
}
