//! # Optimization Ledger Module
//!
//! Questo modulo gestisce il registro degli esiti di ottimizzazione, usato
//! per non rielaborare gli stessi asset al run successivo.
//!
//! ## Responsabilità:
//! - Una entry per identità di asset (mai due)
//! - Lookup per identità asset, per URL immagine e per id della entry
//! - Upsert: crea la entry se assente, altrimenti la aggiorna sul posto
//! - Timestamp `created_at` / `updated_at` gestiti dallo store
//! - Il flag `optimized` passa da false a true una sola volta e non torna indietro
//! - Statistiche storiche per il report finale
//!
//! ## Strategia di persistence:
//! - Un file JSON per sito (basato su hash del `site_url`)
//! - Salvataggio in `~/.image-optimization-job/ledger_<hash>.json`
//! - Il file viene riscritto dopo ogni `save`
//! - Un file illeggibile è un errore: ripartire da zero rielaborerebbe tutto
//!
//! ## Esempio struttura ledger:
//! ```json
//! {
//!   "next_id": 2,
//!   "entries": {
//!     "9f0c...": {
//!       "id": 1,
//!       "asset_id": "9f0c...",
//!       "image_url": "https://www.example.com/globalassets/hero.jpg",
//!       "original_size": 102400,
//!       "optimized_size": 61440,
//!       "percent_saved": 40.0,
//!       "optimized": true,
//!       "created_at": 1642680000,
//!       "updated_at": 1642680003
//!     }
//!   }
//! }
//! ```

use crate::content_store::AssetId;
use crate::error::{OptimizeError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tokio::fs;
use tokio::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LedgerId(pub u64);

impl fmt::Display for LedgerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Outcome of the latest optimization attempt of an asset
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct LedgerEntry {
    /// Assigned by the ledger on first save
    pub id: Option<LedgerId>,
    pub asset_id: AssetId,
    pub image_url: String,
    pub original_size: u64,
    /// As reported by the service, may be zero or negative
    pub optimized_size: i64,
    pub percent_saved: f64,
    pub optimized: bool,
    #[serde(default)]
    pub created_at: u64,
    #[serde(default)]
    pub updated_at: u64,
}

impl LedgerEntry {
    pub fn new(asset_id: AssetId, image_url: String) -> Self {
        Self {
            id: None,
            asset_id,
            image_url,
            original_size: 0,
            optimized_size: 0,
            percent_saved: 0.0,
            optimized: false,
            created_at: 0,
            updated_at: 0,
        }
    }
}

/// Historical totals over every entry of the ledger
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LedgerStats {
    pub entries: usize,
    pub optimized: usize,
    pub bytes_saved: u64,
}

#[async_trait]
pub trait Ledger: Send + Sync {
    async fn get(&self, id: LedgerId) -> Result<Option<LedgerEntry>>;
    async fn lookup_by_id(&self, asset_id: &AssetId) -> Result<Option<LedgerEntry>>;
    async fn lookup_by_locator(&self, image_url: &str) -> Result<Option<LedgerEntry>>;
    /// Create or update `entry`, returning its id
    async fn save(&self, entry: LedgerEntry) -> Result<LedgerId>;
    async fn stats(&self) -> Result<LedgerStats>;
}

#[derive(Debug, Serialize, Deserialize)]
struct LedgerFile {
    next_id: u64,
    entries: BTreeMap<AssetId, LedgerEntry>,
}

impl Default for LedgerFile {
    fn default() -> Self {
        Self {
            next_id: 1,
            entries: BTreeMap::new(),
        }
    }
}

impl LedgerFile {
    fn key_of(&self, id: LedgerId) -> Option<AssetId> {
        self.entries
            .values()
            .find(|e| e.id == Some(id))
            .map(|e| e.asset_id.clone())
    }

    fn upsert(&mut self, mut entry: LedgerEntry, now: u64) -> LedgerId {
        let previous = entry
            .id
            .and_then(|id| self.key_of(id))
            .and_then(|key| self.entries.remove(&key))
            .or_else(|| self.entries.remove(&entry.asset_id));

        match previous {
            Some(previous) => {
                entry.id = previous.id;
                entry.created_at = previous.created_at;
                if previous.asset_id == entry.asset_id {
                    entry.optimized |= previous.optimized;
                }
                // the asset may have moved under an id that already has its own entry
                if let Some(clash) = self.entries.remove(&entry.asset_id) {
                    entry.optimized |= clash.optimized;
                }
            }
            None => {
                entry.id = Some(LedgerId(self.next_id));
                self.next_id += 1;
                entry.created_at = now;
            }
        }
        entry.updated_at = now;

        let id = entry.id.unwrap_or(LedgerId(0));
        self.entries.insert(entry.asset_id.clone(), entry);
        id
    }
}

/// Ledger kept in memory and mirrored to a JSON file
pub struct JsonLedger {
    path: Option<PathBuf>,
    state: Mutex<LedgerFile>,
}

impl JsonLedger {
    /// Open the default ledger of a site under the home directory
    pub async fn for_site(site_url: &str) -> Result<Self> {
        let ledger_dir = dirs::home_dir()
            .ok_or_else(|| OptimizeError::Ledger("Could not find home directory".to_string()))?
            .join(".image-optimization-job");

        fs::create_dir_all(&ledger_dir).await?;

        let mut hasher = Sha256::new();
        hasher.update(site_url.trim_end_matches('/').as_bytes());
        let hash = hex::encode(hasher.finalize())[..16].to_string();

        Self::open(&ledger_dir.join(format!("ledger_{}.json", hash))).await
    }

    /// Open (or start) a ledger stored at `path`
    pub async fn open(path: &Path) -> Result<Self> {
        let state = if path.exists() {
            let content = fs::read_to_string(path).await?;
            serde_json::from_str(&content).map_err(|e| {
                OptimizeError::Ledger(format!("{} is not a valid ledger: {}", path.display(), e))
            })?
        } else {
            LedgerFile::default()
        };

        Ok(Self {
            path: Some(path.to_path_buf()),
            state: Mutex::new(state),
        })
    }

    /// Ledger that is never written to disk
    pub fn in_memory() -> Self {
        Self {
            path: None,
            state: Mutex::new(LedgerFile::default()),
        }
    }

    async fn persist(&self, state: &LedgerFile) -> Result<()> {
        if let Some(ref path) = self.path {
            let content = serde_json::to_string_pretty(state)?;
            fs::write(path, content)
                .await
                .map_err(|e| OptimizeError::Ledger(format!("{}: {}", path.display(), e)))?;
        }
        Ok(())
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[async_trait]
impl Ledger for JsonLedger {
    async fn get(&self, id: LedgerId) -> Result<Option<LedgerEntry>> {
        let state = self.state.lock().await;
        Ok(state.entries.values().find(|e| e.id == Some(id)).cloned())
    }

    async fn lookup_by_id(&self, asset_id: &AssetId) -> Result<Option<LedgerEntry>> {
        let state = self.state.lock().await;
        Ok(state.entries.get(asset_id).cloned())
    }

    async fn lookup_by_locator(&self, image_url: &str) -> Result<Option<LedgerEntry>> {
        let state = self.state.lock().await;
        Ok(state
            .entries
            .values()
            .find(|e| e.image_url == image_url)
            .cloned())
    }

    async fn save(&self, entry: LedgerEntry) -> Result<LedgerId> {
        let mut state = self.state.lock().await;
        let id = state.upsert(entry, unix_now());
        self.persist(&state).await?;
        Ok(id)
    }

    async fn stats(&self) -> Result<LedgerStats> {
        let state = self.state.lock().await;
        let mut stats = LedgerStats {
            entries: state.entries.len(),
            ..Default::default()
        };

        for entry in state.entries.values().filter(|e| e.optimized) {
            stats.optimized += 1;
            if entry.optimized_size > 0 {
                stats.bytes_saved += entry.original_size.saturating_sub(entry.optimized_size as u64);
            }
        }

        Ok(stats)
    }
}
