//! logpipe-ingest - platform log ingestion service
//!
//! Receives event batches over HTTP, archives them as date-partitioned
//! gzip objects, serves paginated queries and live streams, and enforces
//! age-based retention.

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use logpipe_ingest::{IngestConfig, IngestServer, LogFormat};
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser)]
#[command(name = "logpipe-ingest")]
#[command(about = "Platform log ingestion service")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the ingestion server and retention sweeper
    Serve {
        /// Path to config file
        #[arg(short, long, env = "LOGPIPE_CONFIG", default_value = "/etc/logpipe/ingest.toml")]
        config: PathBuf,
    },

    /// Run one retention pass and exit
    Sweep {
        /// Path to config file
        #[arg(short, long, env = "LOGPIPE_CONFIG", default_value = "/etc/logpipe/ingest.toml")]
        config: PathBuf,
    },

    /// Write a config file with every default filled in
    InitConfig {
        /// Path to write config
        #[arg(short, long, default_value = "ingest.toml")]
        output: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { config } => {
            let config = load_config(&config)?;
            init_tracing(config.log_format)?;
            serve(config).await?;
        }

        Commands::Sweep { config } => {
            let config = load_config(&config)?;
            init_tracing(config.log_format)?;
            sweep(config).await?;
        }

        Commands::InitConfig { output } => {
            let content = toml::to_string_pretty(&IngestConfig::default())?;
            std::fs::write(&output, content)
                .with_context(|| format!("failed to write {}", output.display()))?;
            println!("wrote {}", output.display());
        }
    }

    Ok(())
}

fn load_config(path: &Path) -> anyhow::Result<IngestConfig> {
    IngestConfig::from_file(path).with_context(|| format!("loading {}", path.display()))
}

fn init_tracing(format: LogFormat) -> anyhow::Result<()> {
    let filter = EnvFilter::from_default_env().add_directive("logpipe=info".parse()?);
    let registry = tracing_subscriber::registry().with(filter);

    match format {
        LogFormat::Text => registry.with(fmt::layer()).init(),
        LogFormat::Json => registry.with(fmt::layer().json()).init(),
    }
    Ok(())
}

async fn serve(config: IngestConfig) -> anyhow::Result<()> {
    let addr = config.bind_addr;
    info!(
        addr = %addr,
        root = %config.storage.root.display(),
        namespace = %config.storage.namespace,
        "starting logpipe-ingest"
    );

    let server = IngestServer::open(config)?;
    let cancel = CancellationToken::new();
    let sweeper = tokio::spawn(server.sweeper().run(cancel.clone()));

    let shutdown = {
        let cancel = cancel.clone();
        async move {
            tokio::select! {
                result = tokio::signal::ctrl_c() => {
                    if let Err(e) = result {
                        tracing::error!(error = %e, "failed to listen for ctrl-c");
                    }
                    info!("received shutdown signal");
                }
                () = cancel.cancelled() => {}
            }
        }
    };

    let served = server.serve_with_shutdown(addr, shutdown).await;
    cancel.cancel();
    sweeper.await.context("retention sweeper panicked")?;
    served?;
    Ok(())
}

async fn sweep(config: IngestConfig) -> anyhow::Result<()> {
    let server = IngestServer::open(config)?;
    let sweeper = server.sweeper();
    let today = chrono::Utc::now().date_naive();

    let report = tokio::task::spawn_blocking(move || sweeper.sweep_once(today)).await??;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
