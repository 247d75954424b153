//! # JSON Output Module
//!
//! Questo modulo gestisce l'output strutturato in JSON per chi lancia il job
//! da uno scheduler o da un altro processo.
//!
//! ## Responsabilità:
//! - Emette un messaggio JSON per riga su stdout
//! - Fornisce interfaccia standardizzata per comunicazione inter-processo
//!
//! ## Tipi di messaggi:
//! - `start`: Inizio del run
//! - `asset_complete`: Asset ottimizzato e salvato
//! - `asset_failed`: Errore del servizio o del salvataggio
//! - `complete`: Fine del run (completato o fermato) con statistiche finali

use crate::content_store::ImageAsset;
use crate::ledger::LedgerStats;
use crate::progress::JobStats;
use serde::{Deserialize, Serialize};

/// Tipo di messaggio JSON
#[derive(Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum JsonMessage {
    #[serde(rename = "start")]
    Start {
        site_url: String,
        endpoint: String,
        bypass_previously_optimized: bool,
        include_content_assets: bool,
    },

    #[serde(rename = "asset_complete")]
    AssetComplete {
        asset_id: String,
        url: String,
        original_size: u64,
        optimized_size: u64,
        percent_saved: f64,
    },

    #[serde(rename = "asset_failed")]
    AssetFailed {
        asset_id: String,
        url: String,
        error: String,
    },

    #[serde(rename = "complete")]
    Complete {
        stopped: bool,
        images_optimized: usize,
        bytes_before: u64,
        bytes_after: u64,
        already_optimized: usize,
        skipped: usize,
        failed: usize,
        duration_seconds: f64,
        historical_stats: HistoricalStats,
    },
}

/// Statistiche storiche dal ledger
#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct HistoricalStats {
    pub total_entries: usize,
    pub total_optimized: usize,
    pub total_bytes_saved: u64,
}

impl From<LedgerStats> for HistoricalStats {
    fn from(stats: LedgerStats) -> Self {
        Self {
            total_entries: stats.entries,
            total_optimized: stats.optimized,
            total_bytes_saved: stats.bytes_saved,
        }
    }
}

impl JsonMessage {
    /// Emette il messaggio JSON su stdout
    pub fn emit(&self) {
        if let Ok(json) = serde_json::to_string(self) {
            println!("{}", json);
        }
    }

    pub fn asset_complete(asset: &ImageAsset, original_size: u64, optimized_size: u64, percent_saved: f64) -> Self {
        Self::AssetComplete {
            asset_id: asset.id.0.clone(),
            url: asset.url.clone(),
            original_size,
            optimized_size,
            percent_saved,
        }
    }

    pub fn asset_failed(asset: &ImageAsset, error: &str) -> Self {
        Self::AssetFailed {
            asset_id: asset.id.0.clone(),
            url: asset.url.clone(),
            error: error.to_string(),
        }
    }

    pub fn complete(stopped: bool, stats: &JobStats, duration_seconds: f64, historical_stats: HistoricalStats) -> Self {
        Self::Complete {
            stopped,
            images_optimized: stats.images_optimized,
            bytes_before: stats.bytes_before,
            bytes_after: stats.bytes_after,
            already_optimized: stats.already_optimized,
            skipped: stats.skipped_unpublished,
            failed: stats.failed,
            duration_seconds,
            historical_stats,
        }
    }
}
