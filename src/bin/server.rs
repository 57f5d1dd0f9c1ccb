//! Conversational text-to-SQL server
//!
//! Loads configuration from the environment (and `.env`), applies command line
//! overrides, wires the inference service clients and serves the HTTP API.

use anyhow::Context;
use clap::Parser;
use convo_sql::api::{self, AppState};
use convo_sql::config::{CacheBackend, OrchestratorConfig};
use convo_sql::orchestrator::Orchestrator;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "convo-sql-server", version, about = "Conversational text-to-SQL orchestration server")]
struct Args {
    /// Address to bind
    #[arg(long)]
    host: Option<String>,

    #[arg(long, short)]
    port: Option<u16>,

    /// Clear every cache namespace before serving
    #[arg(long)]
    flush_cache: bool,

    /// memory or sqlite
    #[arg(long)]
    cache_backend: Option<CacheBackend>,

    /// SQLite file used by the sqlite cache backend
    #[arg(long)]
    cache_path: Option<PathBuf>,

    /// Spider-style tables.json with the database schemas
    #[arg(long)]
    tables_path: Option<PathBuf>,
}

impl Args {
    fn apply(self, config: &mut OrchestratorConfig) {
        if let Some(host) = self.host {
            config.server.host = host;
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if self.flush_cache {
            config.cache.flush_on_start = true;
        }
        if let Some(backend) = self.cache_backend {
            config.cache.backend = backend;
        }
        if let Some(path) = self.cache_path {
            config.cache.sqlite_path = path;
        }
        if let Some(path) = self.tables_path {
            config.schema.tables_path = path;
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let mut config = OrchestratorConfig::from_env().context("reading configuration")?;
    args.apply(&mut config);
    config.validate().context("validating configuration")?;

    info!(
        "Cache backend: {:?}, parser at {}",
        config.cache.backend,
        config.parser.endpoint.base_url()
    );

    let orchestrator = Orchestrator::from_config(&config).context("building the pipeline")?;
    if config.cache.flush_on_start {
        orchestrator.flush_caches().await.context("flushing caches")?;
    }

    let bind_addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("binding {}", bind_addr))?;

    let state = Arc::new(AppState::new(orchestrator));
    api::serve(listener, state).await?;
    Ok(())
}
