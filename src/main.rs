//! Codex Factory
//!
//! This is the main CLI entry point for Codex Factory.

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use codex_factory::cluster::{Orchestrator, StartRequest};
use codex_factory::config::{
    FactoryConfig, DEFAULT_ENV_PREFIX, DEFAULT_IMAGE_PREFIX, DEFAULT_REPO, MAX_HOSTS,
};
use codex_factory::container::{BollardDaemon, ContainerLogs, ContainerRegistry, ContainerRole};
use codex_factory::readiness::HttpNodeApi;
use codex_factory::version::{resolve_version, validate_version, VERSION_ENV_KEY};
use codex_factory::FactoryError;
use futures_util::StreamExt;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Codex Factory - local Codex test cluster on Docker
#[derive(Parser)]
#[command(name = "codex-factory")]
#[command(version)]
#[command(about = "Spin up a local Codex cluster for testing", long_about = None)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,

    /// Only print warnings and errors
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct PrefixArgs {
    /// Docker container's names prefix
    #[arg(long, env = "FACTORY_ENV_PREFIX", default_value = DEFAULT_ENV_PREFIX)]
    env_prefix: String,

    /// Docker image name prefix
    #[arg(long, env = "FACTORY_IMAGE_PREFIX", default_value = DEFAULT_IMAGE_PREFIX)]
    image_prefix: String,
}

impl PrefixArgs {
    fn config(&self) -> FactoryConfig {
        FactoryConfig::new(&self.env_prefix).image_prefix(&self.image_prefix)
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Spin up the Codex Factory cluster
    Start {
        /// Codex image version
        codex_version: Option<String>,

        /// Purge the cluster data before start
        #[arg(short, long, env = "FACTORY_FRESH")]
        fresh: bool,

        /// Spin up the cluster and exit without streaming logs
        #[arg(short, long, env = "FACTORY_DETACH")]
        detach: bool,

        /// Number of hosts to spin, between 0 and 4 including
        #[arg(long, env = "FACTORY_HOSTS", default_value_t = MAX_HOSTS)]
        hosts: u8,

        /// Docker repo
        #[arg(long, env = "FACTORY_DOCKER_REPO", default_value = DEFAULT_REPO)]
        repo: String,

        #[command(flatten)]
        prefixes: PrefixArgs,
    },

    /// Stop the Codex Factory cluster
    Stop {
        /// Remove the containers
        #[arg(long, env = "FACTORY_RM")]
        rm: bool,

        #[command(flatten)]
        prefixes: PrefixArgs,
    },

    /// Print logs of a cluster container
    Logs {
        /// One of blockchain, client, host, host2, host3, host4
        container: String,

        /// Stay attached and print new logs
        #[arg(short, long)]
        follow: bool,

        /// Number of last lines to print
        #[arg(short, long)]
        tail: Option<usize>,

        #[command(flatten)]
        prefixes: PrefixArgs,
    },

    /// Show the status of every cluster container
    Status {
        #[command(flatten)]
        prefixes: PrefixArgs,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // RUST_LOG wins over the verbosity flags
    let level = if cli.verbose {
        "debug"
    } else if cli.quiet {
        "warn"
    } else {
        "info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    match cli.command {
        Commands::Start {
            codex_version,
            fresh,
            detach,
            hosts,
            repo,
            prefixes,
        } => {
            let from_env = std::env::var(VERSION_ENV_KEY).ok();
            let cwd = std::env::current_dir().context("Failed to read the working directory")?;
            let version = resolve_version(codex_version.as_deref(), from_env.as_deref(), &cwd)?;
            let version = validate_version(&version)?;
            info!("Spinning up cluster with Codex version {}", version);

            let config = prefixes.config().repo(Some(repo));
            let api = HttpNodeApi::new(config.endpoints.clone())?;
            let orchestrator = Orchestrator::new(connect(config)?, Arc::new(api));

            let request = StartRequest::new(&version)
                .hosts(hosts)
                .detach(detach)
                .fresh(fresh);

            let interrupt = async {
                if tokio::signal::ctrl_c().await.is_err() {
                    std::future::pending::<()>().await;
                }
            };

            match orchestrator
                .start(&request, interrupt, &mut tokio::io::stdout())
                .await
            {
                Ok(()) => {}
                Err(FactoryError::Interrupted) => info!("Cluster stopped"),
                Err(e) => return Err(e.into()),
            }
        }

        Commands::Stop { rm, prefixes } => {
            let registry = connect(prefixes.config())?;
            registry.stop_all(true, rm).await?;
            info!("Containers stopped");
        }

        Commands::Logs {
            container,
            follow,
            tail,
            prefixes,
        } => {
            let role: ContainerRole = container.parse()?;
            let registry = connect(prefixes.config())?;
            let mut stdout = tokio::io::stdout();

            match registry.logs(role, follow, tail).await? {
                ContainerLogs::Buffered(bytes) => stdout.write_all(&bytes).await?,
                ContainerLogs::Follow(mut stream) => {
                    while let Some(chunk) = stream.next().await {
                        stdout.write_all(&chunk?).await?;
                        stdout.flush().await?;
                    }
                }
            }
            stdout.flush().await?;
        }

        Commands::Status { prefixes } => {
            let registry = connect(prefixes.config())?;
            let status = registry.cluster_status().await?;

            for (role, status) in status.iter() {
                println!("{:<12}{}", role, status);
            }
        }
    }

    Ok(())
}

fn connect(config: FactoryConfig) -> anyhow::Result<Arc<ContainerRegistry>> {
    let daemon = BollardDaemon::connect().context("Failed to connect to the Docker daemon")?;
    Ok(Arc::new(ContainerRegistry::new(Arc::new(daemon), config)))
}
