//! # Progress Tracking and Statistics Module
//!
//! Questo modulo gestisce il feedback visivo e le statistiche del run.
//!
//! ## Responsabilità:
//! - Spinner con `indicatif` (il numero di candidati non è noto a priori:
//!   la discovery è lazy)
//! - Tracking statistiche del run (ottimizzati, byte prima/dopo, skip, errori)
//! - Riepilogo testuale restituito dal job
//! - Formattazione human-readable delle dimensioni
//!
//! ## Statistiche tracciate:
//! - **images_optimized**: Immagini il cui nuovo binario è stato salvato
//! - **bytes_before** / **bytes_after**: Totali sulle sole immagini salvate
//! - **skipped_unpublished**: Asset non pubblicati o cancellati
//! - **already_optimized**: Asset esclusi dal ledger
//! - **failed**: Errori del servizio o del salvataggio
//!
//! ## Esempio:
//! ```rust,ignore
//! let mut stats = JobStats::new();
//! stats.add_optimized(102400, 61440);
//! assert_eq!(stats.summary(false), "Job completed after optimizing: 1 images. Before: 100 KB, after: 60 KB.");
//! ```

use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

/// Spinner shown while the job walks and optimizes assets
#[derive(Clone)]
pub struct ProgressManager {
    bar: ProgressBar,
}

impl ProgressManager {
    pub fn new(enabled: bool) -> Self {
        if !enabled {
            return Self {
                bar: ProgressBar::hidden(),
            };
        }

        let bar = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::default_spinner()
            .template("{spinner:.green} [{elapsed_precise}] {pos} assets {msg}")
        {
            bar.set_style(style);
        }
        bar.enable_steady_tick(Duration::from_millis(100));

        Self { bar }
    }

    /// Count one more asset and show a message
    pub fn update(&self, message: &str) {
        self.bar.inc(1);
        self.bar.set_message(message.to_string());
    }

    pub fn finish(&self, message: &str) {
        self.bar.finish_with_message(message.to_string());
    }
}

/// Statistics of a single job run
#[derive(Debug, Default, Clone, PartialEq)]
pub struct JobStats {
    pub images_optimized: usize,
    pub bytes_before: u64,
    pub bytes_after: u64,
    pub skipped_unpublished: usize,
    pub already_optimized: usize,
    pub failed: usize,
}

impl JobStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_optimized(&mut self, original_size: u64, new_size: u64) {
        self.images_optimized += 1;
        self.bytes_before += original_size;
        self.bytes_after += new_size;
    }

    pub fn add_skipped(&mut self) {
        self.skipped_unpublished += 1;
    }

    pub fn add_already_optimized(&mut self) {
        self.already_optimized += 1;
    }

    pub fn add_failed(&mut self) {
        self.failed += 1;
    }

    pub fn bytes_saved(&self) -> u64 {
        self.bytes_before.saturating_sub(self.bytes_after)
    }

    /// The message the job returns to its caller
    pub fn summary(&self, stopped: bool) -> String {
        format!(
            "Job {} after optimizing: {} images. Before: {} KB, after: {} KB.",
            if stopped { "stopped" } else { "completed" },
            self.images_optimized,
            self.bytes_before / 1024,
            self.bytes_after / 1024
        )
    }

    pub fn format_details(&self) -> String {
        format!(
            "Optimized: {} | Already optimized: {} | Skipped: {} | Failed: {} | Saved: {} ({:.2}%)",
            self.images_optimized,
            self.already_optimized,
            self.skipped_unpublished,
            self.failed,
            format_size(self.bytes_saved()),
            calculate_reduction(self.bytes_before, self.bytes_after)
        )
    }
}

/// Get human-readable size
pub fn format_size(size: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut size = size as f64;
    let mut unit_index = 0;

    while size >= 1024.0 && unit_index < UNITS.len() - 1 {
        size /= 1024.0;
        unit_index += 1;
    }

    if unit_index == 0 {
        format!("{} {}", size as u64, UNITS[unit_index])
    } else {
        format!("{:.2} {}", size, UNITS[unit_index])
    }
}

/// Calculate percentage reduction
pub fn calculate_reduction(original_size: u64, new_size: u64) -> f64 {
    if original_size == 0 {
        0.0
    } else {
        ((original_size as f64 - new_size as f64) / original_size as f64) * 100.0
    }
}
