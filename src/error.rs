//! # Error Types Module
//!
//! Questo modulo definisce tutti i tipi di errore custom del job.
//!
//! ## Responsabilità:
//! - Definisce `OptimizeError` enum per categorizzare tutti gli errori possibili
//! - Separa gli errori non fatali (per cartella / per asset) da quelli che
//!   interrompono il run
//! - Integra con `thiserror` per automatic error conversion
//!
//! ## Categorie di errori:
//! - `Traversal`: Enumerazione di una cartella fallita (non fatale)
//! - `Transport`: Servizio di ottimizzazione irraggiungibile o risposta non 2xx
//! - `Persistence`: Salvataggio della nuova revisione fallito (non fatale, per asset)
//! - `Ledger`: Il ledger non può essere letto o scritto (fatale)
//! - `Config`: Configurazione non valida
//! - `AlreadyRunning`: Un altro run è già in corso su questo orchestratore
//!
//! ## Esempio:
//! ```rust,ignore
//! if !folder_exists {
//!     return Err(OptimizeError::Traversal(format!("missing folder {}", name)));
//! }
//! ```

/// Custom error types for the image optimization job
#[derive(thiserror::Error, Debug)]
pub enum OptimizeError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Folder enumeration failed: {0}")]
    Traversal(String),

    #[error("Optimization service error: {0}")]
    Transport(String),

    #[error("Content store save failed: {0}")]
    Persistence(String),

    #[error("Ledger error: {0}")]
    Ledger(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Job is already running")]
    AlreadyRunning,
}

pub type Result<T> = std::result::Result<T, OptimizeError>;
