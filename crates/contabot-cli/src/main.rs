use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod config;
mod shell;

use config::ContabotConfig;
use shell::{Session, Shell};

#[derive(Parser)]
#[command(name = "contabot")]
#[command(version)]
#[command(about = "Contabot: assistente virtual da Contabilizei")]
struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    /// Language model backend (openai or groq), overrides the config file
    #[arg(short, long, global = true)]
    provider: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start an interactive chat (default)
    Chat,

    /// Send a one-shot message and print the reply
    Ask {
        /// The message to send
        message: String,
    },

    /// Initialize config directory and default config
    Init,

    /// Show current configuration
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr so they never interleave with the chat transcript
    let filter = if cli.debug { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_writer(std::io::stderr)
        .init();

    match cli.command.unwrap_or(Commands::Chat) {
        Commands::Chat => cmd_chat(&cli.config, cli.provider.as_deref()).await,
        Commands::Ask { message } => cmd_ask(&cli.config, cli.provider.as_deref(), &message).await,
        Commands::Init => cmd_init().await,
        Commands::Config => cmd_config(&cli.config).await,
    }
}

async fn cmd_chat(config_path: &Option<PathBuf>, provider: Option<&str>) -> Result<()> {
    let cfg = ContabotConfig::load(config_path)?;
    let kind = cfg.provider_kind(provider)?;
    let mut shell = Shell::new(cfg, kind).context("Failed to start chat")?;
    shell.run().await
}

async fn cmd_ask(config_path: &Option<PathBuf>, provider: Option<&str>, message: &str) -> Result<()> {
    let cfg = ContabotConfig::load(config_path)?;
    let kind = cfg.provider_kind(provider)?;
    let manager = shell::build_manager(&cfg, kind)?;

    let outcome = manager.run(message, &[]).await;
    println!("{}", outcome.response);

    if outcome.wants_upload() {
        let mut session = Session::new();
        session.record_turn(message, &outcome);
        println!("\n{}", session.upload_panel());
    }
    Ok(())
}

async fn cmd_init() -> Result<()> {
    let config_dir = config::config_dir();
    tokio::fs::create_dir_all(&config_dir)
        .await
        .with_context(|| format!("Failed to create config dir: {}", config_dir.display()))?;

    let config_path = config_dir.join("config.toml");
    if config_path.exists() {
        warn!("Config already exists at {}", config_path.display());
    } else {
        let default_config = include_str!("../../../config/default.toml");
        tokio::fs::write(&config_path, default_config).await?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            tokio::fs::set_permissions(&config_path, std::fs::Permissions::from_mode(0o600)).await?;
        }
        info!("Created default config at {}", config_path.display());
    }

    println!("Contabot initialized at {}", config_dir.display());
    println!("Edit {} or export OPENAI_API_KEY / GROQ_API_KEY.", config_path.display());
    Ok(())
}

async fn cmd_config(config_path: &Option<PathBuf>) -> Result<()> {
    let cfg = ContabotConfig::load(config_path)?;
    println!("{}", toml::to_string_pretty(&cfg.redacted())?);
    Ok(())
}
