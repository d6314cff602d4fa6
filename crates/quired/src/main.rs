//! Quire Daemon (quired)
//!
//! Serves collaborative plain-text documents over TCP.
//!
//! # Usage
//!
//! ```bash
//! # In-memory documents on 127.0.0.1:7878
//! quired
//!
//! # Edit a directory of files in place
//! quired --store file --store-path ./docs
//!
//! # Persist content and versions in SQLite
//! quired --store sqlite --store-path /var/lib/quire/quire.db
//!
//! # With configuration file
//! quired --config /etc/quire/quire.toml
//! ```

mod config;

use std::fs::OpenOptions;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, ValueEnum};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use quire_core::{Auditor, Curator, JsonAuditor, Store, TracingAuditor};
use quire_storage::{FileStore, MemoryStore, SqliteStore};
use quire_transport::TcpServer;

use crate::config::{AuditConfig, ServerConfig, StoreConfig};

/// Quire Daemon - collaborative text editing server
#[derive(Parser, Debug)]
#[command(name = "quired")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file path
    #[arg(short, long, env = "QUIRE_CONFIG")]
    config: Option<PathBuf>,

    /// Bind address
    #[arg(long, env = "QUIRE_BIND")]
    bind: Option<String>,

    /// TCP port to listen on
    #[arg(short, long, env = "QUIRE_PORT")]
    port: Option<u16>,

    /// Storage backend
    #[arg(long, env = "QUIRE_STORE", value_enum)]
    store: Option<StoreKind>,

    /// Directory (file store) or database file (sqlite store)
    #[arg(long, env = "QUIRE_STORE_PATH")]
    store_path: Option<PathBuf>,

    /// Refuse to create documents that do not exist yet
    #[arg(long)]
    no_create: bool,

    /// Seconds a silent client may stay joined
    #[arg(long, env = "QUIRE_SESSION_TIMEOUT")]
    session_timeout: Option<u64>,

    /// Default log filter, overridden by RUST_LOG
    #[arg(long, env = "QUIRE_LOG_LEVEL", default_value = "info")]
    log_level: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum StoreKind {
    Memory,
    File,
    Sqlite,
}

impl Args {
    /// Layer command line flags over the file configuration
    fn apply(&self, config: &mut ServerConfig) -> Result<()> {
        if let Some(bind) = &self.bind {
            config.bind = bind.clone();
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(kind) = self.store {
            let path = || {
                self.store_path
                    .clone()
                    .context("--store-path is required for this store")
            };
            config.store = match kind {
                StoreKind::Memory => StoreConfig::Memory,
                StoreKind::File => StoreConfig::File { path: path()? },
                StoreKind::Sqlite => StoreConfig::Sqlite { path: path()? },
            };
        } else if self.store_path.is_some() {
            bail!("--store-path needs --store file or --store sqlite");
        }
        if self.no_create {
            config.acl.allow_create = false;
        }
        if let Some(secs) = self.session_timeout {
            config.session.timeout_secs = secs;
        }
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let mut config = match &args.config {
        Some(path) => ServerConfig::load(path)?,
        None => ServerConfig::default(),
    };
    args.apply(&mut config)?;

    let store = open_store(&config.store).await?;
    let mut curator = Curator::new(store, config.authorizer(), config.curator_config());
    if let Some(auditor) = open_auditor(&config.audit)? {
        curator = curator.with_auditor(auditor);
    }
    let curator = Arc::new(curator);

    let addr: SocketAddr = format!("{}:{}", config.bind, config.port)
        .parse()
        .with_context(|| format!("invalid bind address {}:{}", config.bind, config.port))?;
    let server = TcpServer::new(Arc::clone(&curator), addr).with_config(config.transport_config());

    info!(
        addr = %addr,
        store = ?config.store,
        session_timeout_secs = config.session.timeout_secs,
        eviction_grace_secs = config.curator.eviction_grace_secs,
        "Starting Quire daemon v{}",
        env!("CARGO_PKG_VERSION")
    );

    tokio::select! {
        result = server.run() => {
            result.context("TCP server failed")?;
        }
        signal = tokio::signal::ctrl_c() => {
            signal?;
            info!("Shutting down...");
        }
    }

    let stats = curator.stats();
    info!(binders = stats.binders, sessions = stats.sessions, "Flushing open documents");
    if let Err(e) = curator.flush_all().await {
        warn!(error = %e, "Some documents could not be flushed");
    }

    Ok(())
}

async fn open_store(config: &StoreConfig) -> Result<Arc<dyn Store>> {
    let store: Arc<dyn Store> = match config {
        StoreConfig::Memory => {
            info!("Running in-memory only, documents are lost on exit");
            Arc::new(MemoryStore::new())
        }
        StoreConfig::File { path } => {
            info!(root = %path.display(), "Using file store");
            Arc::new(
                FileStore::open(path)
                    .await
                    .with_context(|| format!("opening file store at {}", path.display()))?,
            )
        }
        StoreConfig::Sqlite { path } => {
            info!(path = %path.display(), "Using SQLite store");
            Arc::new(
                SqliteStore::new(path)
                    .with_context(|| format!("opening SQLite database {}", path.display()))?,
            )
        }
    };
    Ok(store)
}

fn open_auditor(config: &AuditConfig) -> Result<Option<Arc<dyn Auditor>>> {
    let auditor: Arc<dyn Auditor> = match config {
        AuditConfig::None => return Ok(None),
        AuditConfig::Tracing => Arc::new(TracingAuditor),
        AuditConfig::Json { path } => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("opening audit log {}", path.display()))?;
            info!(path = %path.display(), "Writing audit log");
            Arc::new(JsonAuditor::new(file))
        }
    };
    Ok(Some(auditor))
}
