//! dakv Server Binary
//!
//! Opens a store handle over a directory and serves it over TCP.

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use dakv::network::Server;
use dakv::service::{DbStorageService, StorageService};
use dakv::{CancellationToken, Config};
use tracing_subscriber::{fmt, EnvFilter};

/// dakv Server
#[derive(Parser, Debug)]
#[command(name = "dakv-server")]
#[command(about = "Data-availability blob store with retention GC")]
#[command(version)]
struct Args {
    /// Data directory
    #[arg(short, long, default_value = "./dakv_data")]
    data_dir: String,

    /// Listen address (host:port)
    #[arg(short, long, default_value = "127.0.0.1:9876")]
    listen: String,

    /// Drop records once their retention timeout passes
    #[arg(long)]
    discard_after_timeout: bool,

    /// Retention for writes without a timeout, in days (with --discard-after-timeout)
    #[arg(long, default_value = "21")]
    default_retention_days: u64,

    /// Seconds between GC cycles
    #[arg(long, default_value = "300")]
    gc_interval_secs: u64,

    /// Maximum concurrent connections
    #[arg(short, long, default_value = "1024")]
    max_connections: usize,

    /// MemTable size limit in MB before flush
    #[arg(short = 'M', long, default_value = "64")]
    memtable_mb: usize,
}

fn main() {
    // Initialize tracing/logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,dakv=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .init();

    let args = Args::parse();

    tracing::info!("dakv Server v{}", dakv::VERSION);
    tracing::info!("Data directory: {}", args.data_dir);
    tracing::info!("Listen address: {}", args.listen);

    // Build config from args
    let config = Config::builder()
        .data_dir(&args.data_dir)
        .listen_addr(&args.listen)
        .discard_after_timeout(args.discard_after_timeout)
        .default_retention(Duration::from_secs(args.default_retention_days * 24 * 60 * 60))
        .gc_interval(Duration::from_secs(args.gc_interval_secs))
        .max_connections(args.max_connections)
        .memtable_size_limit(args.memtable_mb * 1024 * 1024)
        .build();

    if let Err(e) = config.validate() {
        tracing::error!("Invalid configuration: {}", e);
        std::process::exit(2);
    }

    let token = CancellationToken::new();

    let handler_token = token.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        tracing::info!("Received Ctrl+C, initiating shutdown...");
        handler_token.cancel();
    }) {
        tracing::error!("Failed to install Ctrl+C handler: {}", e);
        std::process::exit(1);
    }

    // Open the store; it shuts down with the token
    let store = match DbStorageService::open(config.clone(), token.clone()) {
        Ok(store) => Arc::new(store),
        Err(e) => {
            tracing::error!("Failed to open store: {}", e);
            std::process::exit(1);
        }
    };

    tracing::info!("Store {} ready", store.identity());

    let server = match Server::bind(config, Arc::clone(&store) as Arc<dyn StorageService>, token) {
        Ok(server) => server,
        Err(e) => {
            tracing::error!("Failed to bind: {}", e);
            store.close();
            std::process::exit(1);
        }
    };

    if let Err(e) = server.run() {
        tracing::error!("Server error: {}", e);
    }

    // Joins the GC loop, which closes the engine
    store.close();
    tracing::info!("Server stopped");
}
