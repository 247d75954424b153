//! # Image Optimization Job Library
//!
//! Questo è il modulo principale della libreria che espone tutte le API pubbliche.
//!
//! ## Responsabilità:
//! - Definisce la struttura modulare del job
//! - Espone i tipi e le funzioni principali tramite re-exports
//! - Fornisce un'interfaccia pulita per il main.rs e per altri consumatori
//!
//! ## Architettura dei moduli:
//! - `config`: Gestione configurazione e validazione parametri
//! - `error`: Tipi di errore custom
//! - `content_store`: Contratto verso lo store gerarchico dei contenuti
//! - `fs_store`: Store dei contenuti su filesystem
//! - `walker`: Discovery lazy e de-duplicata delle immagini
//! - `ledger`: Registro degli esiti, evita rielaborazioni
//! - `client`: Chiamata al servizio esterno di ottimizzazione
//! - `optimizer`: Orchestratore del job
//! - `progress`: Statistiche e spinner
//! - `json_output`: Eventi JSON per uso programmatico
//!
//! ## Utilizzo:
//! ```rust,ignore
//! use image_optimization_job::{Config, JobOrchestrator};
//!
//! let job = JobOrchestrator::new(config, store, optimizer, ledger);
//! let summary = job.execute().await?;
//! ```

pub mod client;
pub mod config;
pub mod content_store;
pub mod error;
pub mod fs_store;
pub mod json_output;
pub mod ledger;
pub mod optimizer;
pub mod progress;
pub mod walker;

#[cfg(test)]
mod testing;

pub use client::{ImageOptimizer, OptimizationRequest, OptimizationResponse, ResmushClient};
pub use config::Config;
pub use content_store::{ContentStore, ImageAsset};
pub use error::OptimizeError;
pub use fs_store::FsContentStore;
pub use ledger::{JsonLedger, Ledger, LedgerEntry};
pub use optimizer::{JobOrchestrator, JobReport, JobState, StopHandle};
pub use walker::ContentTreeWalker;
