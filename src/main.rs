//! # Image Optimization Job - Main Entry Point
//!
//! Questo è il punto di ingresso del job.
//!
//! ## Responsabilità:
//! - Parsing degli argomenti della command line con `clap`
//! - Inizializzazione del sistema di logging con `tracing`
//! - Caricamento della configurazione (file JSON + override da CLI)
//! - Assemblaggio dei collaboratori (store, client, ledger) e avvio del job
//! - Ctrl-C richiede uno stop cooperativo: l'asset in corso viene completato
//!
//! ## Esempio di utilizzo:
//! ```bash
//! image-optimization-job /var/www/globalassets --site-url https://www.example.com --verbose
//! ```

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use image_optimization_job::{Config, FsContentStore, JobOrchestrator, JsonLedger, ResmushClient};

#[derive(Parser)]
#[command(name = "image-optimization-job")]
#[command(about = "Optimize published images through an external service, once per image")]
struct Args {
    /// Directory served as the global assets root
    global_root: PathBuf,

    /// Directory served as the content assets root
    #[arg(long)]
    content_root: Option<PathBuf>,

    /// JSON configuration file (flags override its values)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Public URL prefix of the images
    #[arg(long)]
    site_url: Option<String>,

    /// Optimization service endpoint
    #[arg(long)]
    api: Option<String>,

    /// Process images already marked as optimized in the ledger
    #[arg(long)]
    bypass: bool,

    /// Also walk the content assets root
    #[arg(long)]
    include_content_assets: bool,

    /// Ledger file (default: one per site under ~/.image-optimization-job)
    #[arg(long)]
    ledger: Option<PathBuf>,

    /// HTTP timeout in seconds
    #[arg(long)]
    timeout: Option<u64>,

    /// Output progress and status as JSON
    #[arg(long)]
    json: bool,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

impl Args {
    async fn load_config(&self) -> Result<Config> {
        let mut config = match self.config {
            Some(ref path) => Config::from_file(path).await?,
            None => Config::default(),
        };

        if let Some(ref site_url) = self.site_url {
            config.site_url = site_url.clone();
        }
        if let Some(ref api) = self.api {
            config.optimization_api = Some(api.clone());
        }
        if let Some(timeout) = self.timeout {
            config.request_timeout_secs = Some(timeout);
        }
        config.bypass_previously_optimized |= self.bypass;
        config.include_content_assets |= self.include_content_assets;
        config.json_output |= self.json;

        config.validate()?;
        Ok(config)
    }
}

/// Wire the filesystem store, the HTTP client and the JSON ledger together
async fn build_job(args: &Args, config: Config) -> Result<JobOrchestrator> {
    if !args.global_root.is_dir() {
        return Err(anyhow::anyhow!("Global root is not a directory: {}", args.global_root.display()));
    }
    if config.include_content_assets && args.content_root.is_none() {
        warn!("Content assets are enabled but no --content-root was given");
    }

    let store = FsContentStore::new(
        args.global_root.clone(),
        args.content_root.clone(),
        &config.site_url,
    );
    let client = ResmushClient::new(&config)?;
    let ledger = match args.ledger {
        Some(ref path) => JsonLedger::open(path).await?,
        None => JsonLedger::for_site(&config.site_url).await?,
    };

    Ok(JobOrchestrator::new(
        config,
        Arc::new(store),
        Arc::new(client),
        Arc::new(ledger),
    ))
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging, stdout is reserved for the summary and JSON events
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if args.verbose { "debug" } else { "info" }));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    let config = args.load_config().await?;
    let json_output = config.json_output;
    let job = build_job(&args, config).await?;

    let stop = job.stop_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Stop requested, finishing the current image");
            stop.stop();
        }
    });

    let summary = job.execute().await?;
    if !json_output {
        println!("{}", summary);
    }

    Ok(())
}
