//! brokerd: the stub service broker daemon.
//!
//! Serves scripted broker replies over HTTP so platform tests can exercise
//! provisioning, polling, binding, and failure paths without a real broker.
//!
//! # Usage
//!
//! ```text
//! brokerd serve --port 4567 --data behaviors.json
//! brokerd check --data behaviors.json
//! brokerd scaffold > behaviors.json
//! ```

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use anyhow::Context;
use broker_core::{BrokerdConfig, DocumentSource, Environment, EMBEDDED_DOCUMENT};
use broker_state::{BehaviorGap, BrokerState, ConfigStore};
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const DEFAULT_CONFIG_FILE: &str = "brokerd.toml";

#[derive(Parser)]
#[command(name = "brokerd", about = "Stub service broker daemon")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Serve the broker API.
    Serve {
        /// Configuration file. `brokerd.toml` is used when present.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Port to listen on.
        #[arg(long)]
        port: Option<u16>,

        /// Address to bind.
        #[arg(long)]
        bind: Option<String>,

        /// Bootstrap behavior document.
        #[arg(long)]
        data: Option<String>,

        /// development, test, or production.
        #[arg(long)]
        environment: Option<Environment>,
    },

    /// Report operations a behavior document does not cover.
    Check {
        #[arg(long)]
        data: PathBuf,
    },

    /// Print the built-in behavior document, or a brokerd.toml with `--config`.
    Scaffold {
        #[arg(long)]
        config: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Serve {
            config,
            port,
            bind,
            data,
            environment,
        } => {
            let config = load_config(config.as_deref())?
                .with_overrides(bind, port, data, environment);
            init_tracing(&config.log_filter());
            serve(config).await
        }
        Command::Check { data } => {
            init_tracing("warn");
            check(&data)
        }
        Command::Scaffold { config } => {
            if config {
                print!("{}", BrokerdConfig::scaffold().to_toml_string()?);
            } else {
                print!("{EMBEDDED_DOCUMENT}");
            }
            Ok(())
        }
    }
}

fn init_tracing(default_filter: &str) {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .init();
}

/// Explicit `--config` must exist; the default file is optional.
fn load_config(path: Option<&Path>) -> anyhow::Result<BrokerdConfig> {
    match path {
        Some(path) => BrokerdConfig::from_file(path)
            .with_context(|| format!("failed to load config {}", path.display())),
        None => {
            let default_path = Path::new(DEFAULT_CONFIG_FILE);
            if default_path.exists() {
                BrokerdConfig::from_file(default_path)
                    .with_context(|| format!("failed to load config {DEFAULT_CONFIG_FILE}"))
            } else {
                Ok(BrokerdConfig::default())
            }
        }
    }
}

async fn serve(config: BrokerdConfig) -> anyhow::Result<()> {
    let source = config.document_source();
    let document = source.load()?;
    let store = ConfigStore::open(document)?;
    info!(
        scheme = source.scheme(),
        source = %source.origin(),
        environment = config.environment().as_str(),
        "behavior document loaded"
    );

    let router = broker_api::build_router(store);
    let addr: SocketAddr = format!("{}:{}", config.bind(), config.port())
        .parse()
        .with_context(|| format!("invalid listen address {}:{}", config.bind(), config.port()))?;

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "stub broker listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "failed to listen for shutdown signal");
                std::future::pending::<()>().await;
            }
            info!("shutdown signal received");
        })
        .await?;

    info!("stub broker stopped");
    Ok(())
}

fn check(path: &Path) -> anyhow::Result<()> {
    let document = DocumentSource::from_path(path).load()?;
    let state = BrokerState::from_document(document)?;
    let gaps = state.behaviors.gaps();

    if gaps.is_empty() {
        println!("{}: every operation has a behavior with a default", path.display());
        return Ok(());
    }

    let mut missing = 0;
    for gap in &gaps {
        match gap {
            BehaviorGap::Missing(operation) => {
                missing += 1;
                println!("missing: {operation}");
            }
            BehaviorGap::NoDefault(operation) => {
                println!("no default: {operation}");
            }
        }
    }

    if missing > 0 {
        anyhow::bail!("{missing} operation(s) have no behavior in {}", path.display());
    }
    Ok(())
}
