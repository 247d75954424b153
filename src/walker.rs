//! # Content Tree Walker
//!
//! Discovery lazy delle immagini raggiungibili dalle root configurate.
//!
//! ## Responsabilità:
//! - Visita breadth-first con una coda esplicita, seminata con le root
//! - Le sottocartelle vengono accodate, le immagini restituite nello stream
//! - Un errore di enumerazione su una cartella viene loggato e la cartella
//!   saltata, la visita continua
//! - De-duplicazione per identità: un asset raggiungibile da più percorsi
//!   viene restituito una sola volta
//!
//! Lo stream è finito e si consuma una volta; per un nuovo run si chiama di
//! nuovo `walk`.

use crate::content_store::{ContentStore, Folder, ImageAsset};
use futures::stream::{self, Stream};
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use tracing::{debug, error};

/// Produces the candidate assets of a run
#[derive(Clone)]
pub struct ContentTreeWalker {
    store: Arc<dyn ContentStore>,
}

struct WalkState {
    store: Arc<dyn ContentStore>,
    folders: VecDeque<Folder>,
    pending: VecDeque<ImageAsset>,
    seen: HashSet<String>,
}

impl WalkState {
    async fn next_asset(mut self) -> Option<(ImageAsset, Self)> {
        loop {
            while let Some(asset) = self.pending.pop_front() {
                if self.seen.insert(asset.id.0.clone()) {
                    return Some((asset, self));
                }
                debug!("Skipping duplicate asset {} ({})", asset.id, asset.url);
            }

            let folder = self.folders.pop_front()?;

            match self.store.child_folders(&folder).await {
                Ok(children) => self.folders.extend(children),
                Err(e) => error!("Failed to list folders of {}: {}", folder.name, e),
            }

            match self.store.child_images(&folder).await {
                Ok(images) => self.pending.extend(images),
                Err(e) => error!("Failed to list images of {}: {}", folder.name, e),
            }
        }
    }
}

impl ContentTreeWalker {
    pub fn new(store: Arc<dyn ContentStore>) -> Self {
        Self { store }
    }

    /// Lazily walk `roots`, yielding each image asset identity once
    pub fn walk(&self, roots: Vec<Folder>) -> impl Stream<Item = ImageAsset> + Send + 'static {
        let state = WalkState {
            store: Arc::clone(&self.store),
            folders: roots.into(),
            pending: VecDeque::new(),
            seen: HashSet::new(),
        };

        stream::unfold(state, WalkState::next_asset)
    }
}
