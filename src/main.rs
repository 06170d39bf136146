use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use stratus::config::{default_config_path, StratusConfig};
use stratus::server;

#[derive(Parser)]
#[command(
    name = "stratus",
    version,
    about = "Infrastructure-context service for AI agents"
)]
struct Cli {
    /// Path to a config file (default: ~/.stratus/config.toml)
    #[arg(long, global = true)]
    config: Option<std::path::PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start the HTTP server
    Serve,
    /// Print the resolved configuration and exit
    Doctor,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => StratusConfig::load_from(path)?,
        None => StratusConfig::load()?,
    };

    // Initialize tracing with the configured log level, writing to stderr.
    let filter = EnvFilter::try_new(&config.server.log_level)
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Command::Serve => {
            server::serve(config).await?;
        }
        Command::Doctor => {
            println!("config file: {}", default_config_path().display());
            println!("{config:#?}");
        }
    }

    Ok(())
}
