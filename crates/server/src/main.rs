//! apirun server binary

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use apirun_common::RunStore;
use apirun_server::analysis::{LocalAnalyzer, ReportAnalyzer};
use apirun_server::runner::NewmanRunner;
use apirun_server::worker::WorkerClient;
use apirun_server::{AnalysisMode, AppState, RunsService, ServerConfig};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "apirun-server")]
#[command(about = "apirun server - generate, store and run API test collections")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "apirun.toml", env = "APIRUN_CONFIG")]
    config: PathBuf,

    /// HTTP listen address
    #[arg(short, long, env = "APIRUN_LISTEN")]
    listen: Option<String>,

    /// Storage directory
    #[arg(short, long, env = "APIRUN_STORAGE_DIR")]
    storage_dir: Option<PathBuf>,

    /// Worker base URL
    #[arg(long, env = "APIRUN_WORKER_URL")]
    worker_url: Option<String>,

    /// Report analysis: remote (worker) or local
    #[arg(long, env = "APIRUN_ANALYSIS")]
    analysis: Option<AnalysisMode>,

    /// Path to the newman executable
    #[arg(long, env = "APIRUN_NEWMAN_BIN")]
    newman_bin: Option<PathBuf>,

    /// Default batch size for execute-batch
    #[arg(long, env = "APIRUN_BATCH_SIZE")]
    batch_size: Option<usize>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

impl Cli {
    fn apply(self, config: &mut ServerConfig) {
        if let Some(listen) = self.listen {
            config.listen = listen;
        }
        if let Some(dir) = self.storage_dir {
            config.storage_dir = dir;
        }
        if let Some(url) = self.worker_url {
            config.worker.url = url;
        }
        if let Some(mode) = self.analysis {
            config.worker.analysis = mode;
        }
        if let Some(bin) = self.newman_bin {
            config.runner.newman_bin = bin;
        }
        if let Some(size) = self.batch_size {
            config.default_batch_size = size;
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    info!("apirun server v{}", apirun_common::VERSION);

    let mut config = ServerConfig::load(&cli.config)
        .with_context(|| format!("failed to load config from {}", cli.config.display()))?;
    cli.apply(&mut config);

    let addr: SocketAddr = config
        .listen
        .parse()
        .with_context(|| format!("invalid listen address: {}", config.listen))?;

    let store = RunStore::open(&config.storage_dir).await?;
    let worker = WorkerClient::new(&config.worker)?;
    info!("Worker at {} ({:?} analysis)", worker.base_url(), config.worker.analysis);

    let runner = NewmanRunner::new(config.runner.clone(), store.clone());
    match runner.check_installed().await {
        Some(version) => info!("Using newman {}", version),
        None => warn!(
            "newman not found at {}; executions will fail until it is installed",
            config.runner.newman_bin.display()
        ),
    }

    let analyzer: Arc<dyn ReportAnalyzer> = match config.worker.analysis {
        AnalysisMode::Remote => Arc::new(worker.clone()),
        AnalysisMode::Local => Arc::new(LocalAnalyzer),
    };

    let service = RunsService::new(store, Arc::new(worker.clone()), Arc::new(runner), analyzer)
        .with_default_batch_size(config.default_batch_size);

    let state = Arc::new(AppState {
        service: Arc::new(service),
        worker: Some(worker),
    });

    apirun_server::serve(addr, state, config.max_body_bytes).await
}
