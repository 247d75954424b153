//! # Configuration Management Module
//!
//! Questo modulo gestisce tutta la configurazione del job.
//!
//! ## Responsabilità:
//! - Definisce la struct `Config` con tutti i parametri del job
//! - Fornisce validazione robusta dei parametri di input
//! - Supporta il caricamento della configurazione da file JSON
//! - Fornisce valori di default sensati per tutti i parametri
//!
//! La configurazione viene costruita una sola volta all'avvio e passata
//! esplicitamente a orchestratore e client: niente singleton globali.
//!
//! ## Parametri di configurazione:
//! - `site_url`: Prefisso URL pubblico degli asset (obbligatorio)
//! - `optimization_api`: Endpoint del servizio (default: reSmush.it)
//! - `bypass_previously_optimized`: Rielabora anche asset già ottimizzati (default: false)
//! - `include_content_assets`: Include la root secondaria (default: false)
//! - `request_timeout_secs`: Timeout delle chiamate HTTP (default: 60)
//! - `json_output`: Eventi JSON su stdout (default: false)
//! - `show_progress`: Spinner `indicatif` (default: true)
//!
//! ## Esempio:
//! ```rust,ignore
//! let config = Config {
//!     site_url: "https://www.example.com".to_string(),
//!     bypass_previously_optimized: true,
//!     ..Default::default()
//! };
//! config.validate()?;
//! ```

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Public endpoint used when no override is configured
pub const DEFAULT_OPTIMIZATION_API: &str = "http://api.resmush.it/ws.php";

/// Configuration for the image optimization job
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Url prefix used for the images (needs to be public)
    pub site_url: String,
    /// Optimization service endpoint (None = public reSmush.it endpoint)
    pub optimization_api: Option<String>,
    /// Process assets even if the ledger says they are already optimized
    pub bypass_previously_optimized: bool,
    /// Walk the secondary content-assets root too
    pub include_content_assets: bool,
    /// Timeout for each HTTP call made by the client (None = no timeout)
    pub request_timeout_secs: Option<u64>,
    /// Output progress and status as JSON for programmatic use
    pub json_output: bool,
    /// Show a spinner while the job runs
    pub show_progress: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            site_url: String::new(),
            optimization_api: None,
            bypass_previously_optimized: false,
            include_content_assets: false,
            request_timeout_secs: Some(60),
            json_output: false,
            show_progress: true,
        }
    }
}

impl Config {
    /// Validate configuration parameters
    pub fn validate(&self) -> Result<()> {
        if self.site_url.is_empty() {
            return Err(anyhow::anyhow!("Site URL must be set"));
        }

        if !is_http_url(&self.site_url) {
            return Err(anyhow::anyhow!("Site URL must start with http:// or https://: {}", self.site_url));
        }

        if let Some(ref api) = self.optimization_api {
            if !is_http_url(api) {
                return Err(anyhow::anyhow!("Optimization API must start with http:// or https://: {}", api));
            }
        }

        if self.request_timeout_secs == Some(0) {
            return Err(anyhow::anyhow!("Request timeout must be greater than 0"));
        }

        Ok(())
    }

    /// Endpoint to call, falling back to the public service
    pub fn optimization_endpoint(&self) -> &str {
        self.optimization_api
            .as_deref()
            .unwrap_or(DEFAULT_OPTIMIZATION_API)
    }

    /// Load configuration from file
    pub async fn from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = tokio::fs::read_to_string(path).await?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }
}

fn is_http_url(value: &str) -> bool {
    value.starts_with("http://") || value.starts_with("https://")
}
