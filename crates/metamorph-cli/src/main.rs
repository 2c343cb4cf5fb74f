//! MetaMorph CLI - autonomous repository healing
//!
//! Usage:
//!   metamorph serve                      Run the HTTP healing service
//!   metamorph heal <owner/name> <mission> Heal one repository and print the result
//!   metamorph init-config                Write a default metamorph.toml

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use metamorph_agent::CommandAgent;
use metamorph_core::{HealingRequest, MetamorphConfig, CONFIG_FILE_NAME};
use metamorph_github::GitHubClient;
use metamorph_orchestrator::{HealingPipeline, Notifier, PipelineConfig};
use metamorph_server::AppState;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// How long a one-shot heal waits for its last dashboard update
const NOTIFY_GRACE: Duration = Duration::from_secs(5);

#[derive(Parser)]
#[command(name = "metamorph")]
#[command(author, version, about = "Autonomous repository healing service")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Config file path
    #[arg(short, long, global = true, default_value = CONFIG_FILE_NAME)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP healing service
    Serve {
        /// Port to listen on (overrides the config file)
        #[arg(short, long)]
        port: Option<u16>,

        /// Address to bind (overrides the config file)
        #[arg(long)]
        bind: Option<String>,
    },

    /// Heal one repository and print the response envelope
    Heal {
        /// Repository as owner/name
        repository: String,

        /// What the agent should fix
        mission: String,

        /// Access token used to download and publish
        #[arg(long, env = "GITHUB_TOKEN", hide_env_values = true)]
        token: Option<String>,
    },

    /// Write the default configuration file
    InitConfig {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // RUST_LOG wins over --verbose
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command {
        Commands::Serve { port, bind } => cmd_serve(&cli.config, port, bind).await,
        Commands::Heal {
            repository,
            mission,
            token,
        } => cmd_heal(&cli.config, repository, mission, token).await,
        Commands::InitConfig { force } => cmd_init_config(&cli.config, force),
    }
}

fn load_config(path: &Path) -> Result<MetamorphConfig> {
    MetamorphConfig::load_or_default(path)
        .with_context(|| format!("Failed to load config from {:?}", path))
}

/// Wire the real hosting client, agent and notifier into a pipeline
fn build_pipeline(config: &MetamorphConfig) -> Result<HealingPipeline> {
    let hosting = GitHubClient::new(&config.github).context("Failed to create GitHub client")?;
    let agent = CommandAgent::from_config(&config.agent);

    Ok(HealingPipeline::new(
        Arc::new(hosting),
        Arc::new(agent),
        PipelineConfig::from_config(config),
    )
    .with_notifier(Notifier::from_env()))
}

async fn cmd_serve(config_path: &Path, port: Option<u16>, bind: Option<String>) -> Result<()> {
    let mut config = load_config(config_path)?;
    if let Some(port) = port {
        config.server.port = port;
    }
    if let Some(bind) = bind {
        config.server.bind = bind;
    }

    let pipeline = build_pipeline(&config)?;
    let addr = config.listen_addr();
    info!("Starting MetaMorph healing service on {}", addr);

    let state = Arc::new(AppState {
        pipeline: Arc::new(pipeline),
    });
    metamorph_server::serve(state, &addr)
        .await
        .with_context(|| format!("Server on {} failed", addr))
}

async fn cmd_heal(
    config_path: &Path,
    repository: String,
    mission: String,
    token: Option<String>,
) -> Result<()> {
    let config = load_config(config_path)?;
    let request =
        HealingRequest::parse(&repository, &mission, token).context("Invalid healing request")?;

    let pipeline = build_pipeline(&config)?;
    let response = pipeline.heal_to_response(&request).await;
    pipeline.notifier().flush(NOTIFY_GRACE).await;

    println!("{}", serde_json::to_string_pretty(&response)?);

    if !response.success {
        anyhow::bail!(
            "Healing failed: {}",
            response.error.as_deref().unwrap_or("unknown error")
        );
    }
    Ok(())
}

fn cmd_init_config(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        anyhow::bail!("{:?} already exists (use --force to overwrite)", path);
    }

    MetamorphConfig::write_default(path)
        .with_context(|| format!("Failed to write config to {:?}", path))?;

    println!("Wrote default configuration to {:?}", path);
    Ok(())
}
