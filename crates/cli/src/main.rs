use anyhow::Context;
use clap::{CommandFactory, Parser};
use kx_common::KxConfig;
use std::path::PathBuf;

mod commands;
mod completions;

#[derive(Parser)]
#[command(name = "kx")]
#[command(about = "Distributed locks and priority work queues over Redis")]
struct Cli {
    /// Config file path
    #[arg(short, long, default_value = "kx.toml")]
    config: PathBuf,

    /// Redis URL, overrides store.redis_url from the config file
    #[arg(long)]
    redis_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand)]
enum Commands {
    /// Check that the store is reachable
    Ping,

    /// Named lock operations
    Lock {
        #[command(subcommand)]
        action: commands::LockCommand,
    },

    /// Priority queue operations
    Queue {
        #[command(subcommand)]
        action: commands::QueueCommand,
    },

    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if let Commands::Completions { shell } = cli.command {
        completions::generate(shell, &mut Cli::command());
        return Ok(());
    }

    let mut config = if cli.config.exists() {
        KxConfig::from_file(&cli.config)
            .with_context(|| format!("Failed to load config from {}", cli.config.display()))?
    } else {
        KxConfig::default_config()
    };
    if let Some(url) = cli.redis_url {
        config.store.redis_url = url;
    }

    kx_common::init_tracing(&config.logging.level)?;
    if !cli.config.exists() {
        tracing::debug!("Config file {} not found, using defaults", cli.config.display());
    }

    let store = kx_storage::initialize_store(&config.store.redis_url)
        .await
        .context("Failed to connect to store")?;

    match cli.command {
        Commands::Ping => println!("PONG"),
        Commands::Lock { action } => commands::run_lock(action, store, &config).await?,
        Commands::Queue { action } => commands::run_queue(action, store, &config).await?,
        Commands::Completions { .. } => {}
    }

    Ok(())
}
