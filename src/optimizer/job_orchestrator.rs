//! # Job Orchestrator
//!
//! Orchestratore principale del job di ottimizzazione.
//!
//! ## Flusso di esecuzione:
//! 1. **Discovery**: stream lazy delle immagini dalle root configurate
//! 2. **Filtro ledger**: esclude gli asset già ottimizzati (salvo bypass)
//! 3. **Per ogni candidato**, in sequenza:
//!    - controllo del segnale di stop
//!    - skip se non pubblicato o cancellato (nessuna chiamata, nessuna entry)
//!    - chiamata al servizio di ottimizzazione
//!    - scrittura della entry nel ledger, qualunque sia l'esito
//!    - salvataggio della nuova revisione e flag `optimized` sulla entry
//! 4. **Reporting**: riepilogo testuale e statistiche storiche
//!
//! ## Gestione errori:
//! - Errori di enumerazione, del servizio e del salvataggio sono per
//!   cartella / per asset: vengono loggati e il run prosegue
//! - Un errore del ledger interrompe il run, che termina come `Stopped`
//!   restituendo comunque il riepilogo
//!
//! ## Stop cooperativo:
//! Il segnale viene letto prima di iniziare e prima di ogni asset, mai
//! durante una chiamata o un salvataggio in corso.

use crate::{
    client::{ImageOptimizer, OptimizationRequest, OptimizationResponse},
    config::Config,
    content_store::{AccessLevel, ContentStore, Folder, FolderKind, ImageAsset, SaveAction},
    error::{OptimizeError, Result},
    json_output::{HistoricalStats, JsonMessage},
    ledger::{Ledger, LedgerEntry, LedgerId},
    optimizer::progress_tracker::ProgressTracker,
    progress::JobStats,
    walker::ContentTreeWalker,
};
use futures::StreamExt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Terminal state of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Completed,
    Stopped,
}

#[derive(Debug, Clone, PartialEq)]
pub struct JobReport {
    pub state: JobState,
    pub stats: JobStats,
}

impl JobReport {
    pub fn summary(&self) -> String {
        self.stats.summary(self.state == JobState::Stopped)
    }
}

/// Cooperative cancellation flag, cheap to clone into other tasks
#[derive(Debug, Clone, Default)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Marks the orchestrator busy for one run, released even when the run
/// future is dropped before it completes
struct RunGuard<'a> {
    running: &'a AtomicBool,
    stop: &'a StopHandle,
}

impl<'a> RunGuard<'a> {
    fn acquire(running: &'a AtomicBool, stop: &'a StopHandle) -> Result<Self> {
        if running.swap(true, Ordering::SeqCst) {
            return Err(OptimizeError::AlreadyRunning);
        }
        Ok(Self { running, stop })
    }
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        // a stop request only applies to the run it interrupted
        self.stop.reset();
        self.running.store(false, Ordering::SeqCst);
    }
}

pub struct JobOrchestrator {
    config: Config,
    store: Arc<dyn ContentStore>,
    optimizer: Arc<dyn ImageOptimizer>,
    ledger: Arc<dyn Ledger>,
    walker: ContentTreeWalker,
    stop: StopHandle,
    running: AtomicBool,
}

impl JobOrchestrator {
    pub fn new(
        config: Config,
        store: Arc<dyn ContentStore>,
        optimizer: Arc<dyn ImageOptimizer>,
        ledger: Arc<dyn Ledger>,
    ) -> Self {
        let walker = ContentTreeWalker::new(Arc::clone(&store));
        Self {
            config,
            store,
            optimizer,
            ledger,
            walker,
            stop: StopHandle::default(),
            running: AtomicBool::new(false),
        }
    }

    /// Ask the current (or next) run to stop at its next checkpoint
    pub fn stop(&self) {
        self.stop.stop();
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    /// Run the job and return the human readable summary
    pub async fn execute(&self) -> Result<String> {
        Ok(self.run().await?.summary())
    }

    pub async fn run(&self) -> Result<JobReport> {
        let _guard = RunGuard::acquire(&self.running, &self.stop)?;
        self.run_once().await
    }

    async fn run_once(&self) -> Result<JobReport> {
        let start_time = Instant::now();
        self.emit_start_message();

        let mut tracker = ProgressTracker::new(&self.config);

        if self.stop.is_stopped() {
            return self.finish(tracker, JobState::Stopped, start_time).await;
        }

        let roots = self.roots().await;
        let candidates = self.walker.walk(roots);
        futures::pin_mut!(candidates);

        while let Some(asset) = candidates.next().await {
            if self.stop.is_stopped() {
                info!("Stop requested, ending run early");
                return self.finish(tracker, JobState::Stopped, start_time).await;
            }

            if let Err(e) = self.visit(&asset, &mut tracker).await {
                error!("Ledger unavailable, ending run early: {}", e);
                tracker.record_failed(&asset, &e.to_string());
                return self.finish(tracker, JobState::Stopped, start_time).await;
            }
        }

        self.finish(tracker, JobState::Completed, start_time).await
    }

    /// Handle one candidate; only ledger errors are returned
    async fn visit(&self, asset: &ImageAsset, tracker: &mut ProgressTracker) -> Result<()> {
        if !self.config.bypass_previously_optimized && self.is_previously_optimized(asset).await? {
            debug!("Already optimized: {}", asset.url);
            tracker.record_already_optimized(asset);
            return Ok(());
        }

        if !asset.is_eligible() {
            debug!("Skipping unpublished or deleted asset: {}", asset.url);
            tracker.record_skipped(asset);
            return Ok(());
        }

        self.process_asset(asset, tracker).await
    }

    fn emit_start_message(&self) {
        if self.config.json_output {
            JsonMessage::Start {
                site_url: self.config.site_url.clone(),
                endpoint: self.config.optimization_endpoint().to_string(),
                bypass_previously_optimized: self.config.bypass_previously_optimized,
                include_content_assets: self.config.include_content_assets,
            }
            .emit();
            return;
        }

        info!("Starting image optimization for {}", self.config.site_url);
        info!("Optimization service: {}", self.config.optimization_endpoint());
        if self.config.bypass_previously_optimized {
            info!("Bypass mode: previously optimized images will be processed again");
        }
        if self.config.include_content_assets {
            info!("Including content assets root");
        }
    }

    /// Primary root always, secondary root when enabled
    async fn roots(&self) -> Vec<Folder> {
        let mut kinds = vec![FolderKind::GlobalAssets];
        if self.config.include_content_assets {
            kinds.push(FolderKind::ContentAssets);
        }

        let mut roots = Vec::new();
        for kind in kinds {
            match self.store.root_folder(kind).await {
                Ok(folder) => roots.push(folder),
                Err(e) => error!("Cannot open {} root: {}", kind.as_str(), e),
            }
        }
        roots
    }

    async fn is_previously_optimized(&self, asset: &ImageAsset) -> Result<bool> {
        Ok(self
            .ledger
            .lookup_by_id(&asset.id)
            .await?
            .map(|entry| entry.optimized)
            .unwrap_or(false))
    }

    async fn process_asset(&self, asset: &ImageAsset, tracker: &mut ProgressTracker) -> Result<()> {
        let request = OptimizationRequest {
            image_url: asset.url.clone(),
        };

        let response = match self.optimizer.process(&request).await {
            Ok(response) => response,
            Err(e) => OptimizationResponse::failed(&asset.url, e.to_string()),
        };

        let entry_id = self.record_attempt(asset, &response).await?;

        if let Some(ref message) = response.error {
            error!("Optimization service failed for {}: {}", asset.url, message);
            tracker.record_failed(asset, message);
            return Ok(());
        }

        let new_size = response.effective_size();
        match self.publish_revision(asset, &response).await {
            Ok(()) => {
                self.mark_optimized(entry_id).await?;
                debug!(
                    "Optimized {}: {} -> {} bytes",
                    asset.url, response.original_size, new_size
                );
                tracker.record_optimized(asset, response.original_size, new_size, response.percent_saved);
            }
            Err(e) => {
                error!("Failed to save optimized image {}: {}", asset.url, e);
                tracker.record_failed(asset, &e.to_string());
            }
        }

        Ok(())
    }

    /// Write the outcome of an attempt, successful or not
    async fn record_attempt(&self, asset: &ImageAsset, response: &OptimizationResponse) -> Result<LedgerId> {
        // a locator may have belonged to another asset before, its entry stays with it
        let existing = match self.ledger.lookup_by_locator(&response.original_url).await? {
            Some(entry) if entry.asset_id == asset.id => Some(entry),
            _ => self.ledger.lookup_by_id(&asset.id).await?,
        };

        let mut entry = existing
            .unwrap_or_else(|| LedgerEntry::new(asset.id.clone(), response.original_url.clone()));
        entry.asset_id = asset.id.clone();
        entry.image_url = response.original_url.clone();
        entry.original_size = response.original_size;
        entry.optimized_size = response.optimized_size;
        entry.percent_saved = response.percent_saved;

        self.ledger.save(entry).await
    }

    /// Copy-on-write: new revision with the optimized bytes, or the current
    /// bytes when the service reported no reduction
    async fn publish_revision(&self, asset: &ImageAsset, response: &OptimizationResponse) -> Result<()> {
        let mut revision = self.store.create_writable_revision(asset).await?;

        if response.optimized_size > 0 {
            let bytes = response.optimized_image.clone().ok_or_else(|| {
                OptimizeError::Transport(format!(
                    "service reported {} bytes for {} but returned no image",
                    response.optimized_size, asset.url
                ))
            })?;
            revision.set_binary(bytes);
        }

        self.store
            .save(revision, SaveAction::Publish, AccessLevel::NoAccess)
            .await
    }

    async fn mark_optimized(&self, entry_id: LedgerId) -> Result<()> {
        let mut entry = self
            .ledger
            .get(entry_id)
            .await?
            .ok_or_else(|| OptimizeError::Ledger(format!("entry {} disappeared", entry_id)))?;

        entry.optimized = true;
        self.ledger.save(entry).await?;
        Ok(())
    }

    async fn finish(&self, tracker: ProgressTracker, state: JobState, start_time: Instant) -> Result<JobReport> {
        let history = match self.ledger.stats().await {
            Ok(stats) => stats,
            Err(e) => {
                warn!("Could not read ledger statistics: {}", e);
                Default::default()
            }
        };

        let stopped = state == JobState::Stopped;
        let details = tracker.stats().format_details();
        let stats = tracker.finish(stopped, start_time.elapsed().as_secs_f64(), HistoricalStats::from(history));
        let report = JobReport { state, stats };

        if !self.config.json_output {
            info!("{}", report.summary());
            info!("{}", details);
            info!(
                "Ledger: {} images tracked, {} optimized",
                history.entries, history.optimized
            );
        }

        Ok(report)
    }
}
