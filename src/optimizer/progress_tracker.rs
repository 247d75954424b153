//! # Progress Tracking Module
//!
//! Unifica statistiche del run, spinner ed eventi JSON in un singolo tracker.
//! Il run è seriale, quindi il tracker vive sullo stack dell'orchestratore.

use crate::{
    config::Config,
    content_store::ImageAsset,
    json_output::{HistoricalStats, JsonMessage},
    progress::{JobStats, ProgressManager},
};

pub struct ProgressTracker {
    stats: JobStats,
    progress_manager: ProgressManager,
    json_output: bool,
}

impl ProgressTracker {
    pub fn new(config: &Config) -> Self {
        Self {
            stats: JobStats::new(),
            // the spinner would interleave with JSON lines on the terminal
            progress_manager: ProgressManager::new(config.show_progress && !config.json_output),
            json_output: config.json_output,
        }
    }

    pub fn stats(&self) -> &JobStats {
        &self.stats
    }

    pub fn record_optimized(&mut self, asset: &ImageAsset, original_size: u64, new_size: u64, percent_saved: f64) {
        self.stats.add_optimized(original_size, new_size);

        if self.json_output {
            JsonMessage::asset_complete(asset, original_size, new_size, percent_saved).emit();
        }
        self.progress_manager
            .update(&format!("[OK] {}: {:.1}% saved", asset.name, percent_saved));
    }

    pub fn record_failed(&mut self, asset: &ImageAsset, error: &str) {
        self.stats.add_failed();

        if self.json_output {
            JsonMessage::asset_failed(asset, error).emit();
        }
        self.progress_manager
            .update(&format!("[ERROR] {}", asset.name));
    }

    pub fn record_skipped(&mut self, asset: &ImageAsset) {
        self.stats.add_skipped();
        self.progress_manager
            .update(&format!("[SKIP] {}: not published", asset.name));
    }

    pub fn record_already_optimized(&mut self, asset: &ImageAsset) {
        self.stats.add_already_optimized();
        self.progress_manager
            .update(&format!("[SKIP] {}: already optimized", asset.name));
    }

    /// Close the spinner and emit the final JSON event
    pub fn finish(self, stopped: bool, duration_seconds: f64, history: HistoricalStats) -> JobStats {
        if self.json_output {
            JsonMessage::complete(stopped, &self.stats, duration_seconds, history).emit();
        }
        self.progress_manager.finish(&self.stats.format_details());
        self.stats
    }
}
