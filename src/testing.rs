//! In-memory collaborators used by the unit tests.

use crate::client::{ImageOptimizer, OptimizationRequest, OptimizationResponse};
use crate::content_store::{
    AccessLevel, AssetId, ContentStore, Folder, FolderKind, ImageAsset, PublishState, SaveAction,
    WritableImage,
};
use crate::error::{OptimizeError, Result};
use crate::ledger::{JsonLedger, Ledger, LedgerEntry, LedgerId, LedgerStats};
use crate::optimizer::StopHandle;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

/// A published jpeg whose id is `id`
pub fn image(id: &str) -> ImageAsset {
    ImageAsset {
        id: AssetId::from(id),
        name: format!("{}.jpg", id),
        folder_id: "root".to_string(),
        url: format!("https://www.example.com/globalassets/{}.jpg", id),
        mime_type: "image/jpeg".to_string(),
        state: PublishState::Published,
        deleted: false,
    }
}

#[derive(Default)]
struct StoreState {
    folders: HashMap<String, Vec<String>>,
    images: HashMap<String, Vec<ImageAsset>>,
    binaries: HashMap<AssetId, Vec<u8>>,
    failing_folders: HashSet<String>,
    failing_images: HashSet<String>,
    failing_saves: HashSet<AssetId>,
    saves: Vec<AssetId>,
}

/// Folder tree with roots `root` (global) and `content` (content assets)
#[derive(Default)]
pub struct MemoryContentStore {
    state: Mutex<StoreState>,
}

impl MemoryContentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_folder(&self, parent: &str, child: &str) {
        let mut state = self.state.lock().unwrap();
        state
            .folders
            .entry(parent.to_string())
            .or_default()
            .push(child.to_string());
    }

    pub fn add_image(&self, folder: &str, asset: ImageAsset) {
        let mut state = self.state.lock().unwrap();
        state.images.entry(folder.to_string()).or_default().push(asset);
    }

    pub fn set_binary(&self, id: &str, binary: Vec<u8>) {
        let mut state = self.state.lock().unwrap();
        state.binaries.insert(AssetId::from(id), binary);
    }

    pub fn binary(&self, id: &str) -> Option<Vec<u8>> {
        let state = self.state.lock().unwrap();
        state.binaries.get(&AssetId::from(id)).cloned()
    }

    pub fn fail_folders_of(&self, folder: &str) {
        let mut state = self.state.lock().unwrap();
        state.failing_folders.insert(folder.to_string());
    }

    pub fn fail_images_of(&self, folder: &str) {
        let mut state = self.state.lock().unwrap();
        state.failing_images.insert(folder.to_string());
    }

    pub fn fail_save_of(&self, id: &str) {
        let mut state = self.state.lock().unwrap();
        state.failing_saves.insert(AssetId::from(id));
    }

    pub fn saves(&self) -> Vec<AssetId> {
        self.state.lock().unwrap().saves.clone()
    }
}

fn folder(id: &str) -> Folder {
    Folder {
        id: id.to_string(),
        name: id.to_string(),
    }
}

#[async_trait]
impl ContentStore for MemoryContentStore {
    async fn root_folder(&self, kind: FolderKind) -> Result<Folder> {
        Ok(match kind {
            FolderKind::GlobalAssets => folder("root"),
            FolderKind::ContentAssets => folder("content"),
        })
    }

    async fn child_folders(&self, parent: &Folder) -> Result<Vec<Folder>> {
        let state = self.state.lock().unwrap();
        if state.failing_folders.contains(&parent.id) {
            return Err(OptimizeError::Traversal(format!("{} is unreadable", parent.id)));
        }
        Ok(state
            .folders
            .get(&parent.id)
            .map(|children| children.iter().map(|c| folder(c)).collect())
            .unwrap_or_default())
    }

    async fn child_images(&self, parent: &Folder) -> Result<Vec<ImageAsset>> {
        let state = self.state.lock().unwrap();
        if state.failing_images.contains(&parent.id) {
            return Err(OptimizeError::Traversal(format!("{} is unreadable", parent.id)));
        }
        Ok(state.images.get(&parent.id).cloned().unwrap_or_default())
    }

    async fn create_writable_revision(&self, asset: &ImageAsset) -> Result<WritableImage> {
        let state = self.state.lock().unwrap();
        Ok(WritableImage {
            asset: asset.clone(),
            binary: state.binaries.get(&asset.id).cloned().unwrap_or_default(),
        })
    }

    async fn save(&self, image: WritableImage, action: SaveAction, _access: AccessLevel) -> Result<()> {
        assert_eq!(action, SaveAction::Publish);
        let mut state = self.state.lock().unwrap();
        if state.failing_saves.contains(&image.asset.id) {
            return Err(OptimizeError::Persistence("disk full".to_string()));
        }
        state.saves.push(image.asset.id.clone());
        state.binaries.insert(image.asset.id, image.binary);
        Ok(())
    }
}

enum Scripted {
    Reply(OptimizationResponse),
    Transport(String),
}

/// Blocks one optimization call until released
#[derive(Clone, Default)]
pub struct Gate {
    entered: Arc<Notify>,
    released: Arc<Notify>,
}

impl Gate {
    pub async fn entered(&self) {
        self.entered.notified().await;
    }

    pub fn release(&self) {
        self.released.notify_one();
    }
}

/// Optimizer answering from a per-url script, unknown urls get "unchanged"
#[derive(Default)]
pub struct ScriptedOptimizer {
    replies: Mutex<HashMap<String, Scripted>>,
    calls: Mutex<Vec<String>>,
    stop_after: Mutex<Option<(usize, StopHandle)>>,
    gate: Mutex<Option<Gate>>,
}

impl ScriptedOptimizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply_with(&self, url: &str, response: OptimizationResponse) {
        self.replies
            .lock()
            .unwrap()
            .insert(url.to_string(), Scripted::Reply(response));
    }

    /// Successful reply with an optimized payload of `optimized` bytes
    pub fn reply_optimized(&self, url: &str, original: usize, optimized: usize) {
        self.reply_with(
            url,
            OptimizationResponse {
                original_url: url.to_string(),
                original_size: original as u64,
                optimized_size: optimized as i64,
                optimized_image: Some(vec![1u8; optimized]),
                percent_saved: crate::progress::calculate_reduction(original as u64, optimized as u64),
                error: None,
            },
        );
    }

    pub fn fail_transport(&self, url: &str, message: &str) {
        self.replies
            .lock()
            .unwrap()
            .insert(url.to_string(), Scripted::Transport(message.to_string()));
    }

    /// Raise the stop flag while serving the `calls`-th request
    pub fn stop_after(&self, calls: usize, handle: StopHandle) {
        *self.stop_after.lock().unwrap() = Some((calls, handle));
    }

    /// Hold the next call until the returned gate is released
    pub fn block(&self) -> Gate {
        let gate = Gate::default();
        *self.gate.lock().unwrap() = Some(gate.clone());
        gate
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ImageOptimizer for ScriptedOptimizer {
    async fn process(&self, request: &OptimizationRequest) -> Result<OptimizationResponse> {
        let count = {
            let mut calls = self.calls.lock().unwrap();
            calls.push(request.image_url.clone());
            calls.len()
        };

        if let Some((after, ref handle)) = *self.stop_after.lock().unwrap() {
            if count >= after {
                handle.stop();
            }
        }

        let gate = self.gate.lock().unwrap().take();
        if let Some(gate) = gate {
            gate.entered.notify_one();
            gate.released.notified().await;
        }

        match self.replies.lock().unwrap().get(&request.image_url) {
            Some(Scripted::Reply(response)) => Ok(response.clone()),
            Some(Scripted::Transport(message)) => Err(OptimizeError::Transport(message.clone())),
            None => Ok(OptimizationResponse::unchanged(&request.image_url)),
        }
    }
}

/// Ledger wrapper counting writes, optionally failing them
pub struct CountingLedger {
    inner: JsonLedger,
    saves: AtomicUsize,
    failing: AtomicBool,
}

impl CountingLedger {
    pub fn new(inner: JsonLedger) -> Self {
        Self {
            inner,
            saves: AtomicUsize::new(0),
            failing: AtomicBool::new(false),
        }
    }

    pub fn fail_saves(&self) {
        self.failing.store(true, Ordering::SeqCst);
    }

    pub fn saves(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    pub async fn entries(&self) -> usize {
        self.inner.stats().await.map(|s| s.entries).unwrap_or(0)
    }
}

#[async_trait]
impl Ledger for CountingLedger {
    async fn get(&self, id: LedgerId) -> Result<Option<LedgerEntry>> {
        self.inner.get(id).await
    }

    async fn lookup_by_id(&self, asset_id: &AssetId) -> Result<Option<LedgerEntry>> {
        self.inner.lookup_by_id(asset_id).await
    }

    async fn lookup_by_locator(&self, image_url: &str) -> Result<Option<LedgerEntry>> {
        self.inner.lookup_by_locator(image_url).await
    }

    async fn save(&self, entry: LedgerEntry) -> Result<LedgerId> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(OptimizeError::Ledger("ledger.json: read-only file system".to_string()));
        }
        self.saves.fetch_add(1, Ordering::SeqCst);
        self.inner.save(entry).await
    }

    async fn stats(&self) -> Result<LedgerStats> {
        self.inner.stats().await
    }
}
