//! Murmur CLI
//!
//! Runs a broadcast node on stdin/stdout. Logs go to stderr.

use clap::{Parser, Subcommand};
use murmur_node::{LogFormat, LoggingConfig, NodeConfig};
use std::path::PathBuf;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "murmur")]
#[command(version)]
#[command(about = "Murmur - gossip broadcast node", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Configuration file path
    #[arg(short, long, global = true, env = "MURMUR_CONFIG")]
    config: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the broadcast protocol on stdin/stdout (default)
    Run,

    /// Print the effective configuration as TOML
    Config,

    /// Version information
    Version,
}

fn init_logging(verbose: bool, logging: &LoggingConfig) {
    let env_filter = if verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level))
    };

    // stdout carries protocol traffic
    let (text, json) = match logging.format {
        LogFormat::Text => (
            Some(
                fmt::layer()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_writer(std::io::stderr),
            ),
            None,
        ),
        LogFormat::Json => (None, Some(fmt::layer().json().with_writer(std::io::stderr))),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(text)
        .with(json)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = NodeConfig::load(cli.config.as_deref())?;

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => {
            init_logging(cli.verbose, &config.logging);
            tracing::info!(
                "Murmur v{} starting (interval: {}ms, retry: {:?}, anti-entropy: {})",
                env!("CARGO_PKG_VERSION"),
                config.gossip.interval_ms,
                config.gossip.retry_policy,
                config.gossip.anti_entropy
            );
            murmur_node::run_stdio(config.gossip_config()).await?;
        }

        Commands::Config => {
            print!("{}", config.to_toml()?);
        }

        Commands::Version => {
            println!("murmur {}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}
