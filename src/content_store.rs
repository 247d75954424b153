//! # Content Store Contract
//!
//! Questo modulo definisce il contratto verso lo store gerarchico dei contenuti.
//!
//! ## Responsabilità:
//! - Tipi del modello dati: `Folder`, `ImageAsset`, `WritableImage`
//! - Trait `ContentStore` usato da walker e orchestratore
//!
//! Il job non modifica mai un asset sul posto: chiede allo store una nuova
//! revisione scrivibile (`create_writable_revision`), le assegna il nuovo
//! binario e la sottomette con `save` (copy-on-write).

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable identity of an asset, unique across the whole store
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AssetId(pub String);

impl fmt::Display for AssetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AssetId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Which configured root a traversal starts from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FolderKind {
    /// Shared assets, always walked
    GlobalAssets,
    /// Per-page assets, walked only when enabled in the config
    ContentAssets,
}

impl FolderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::GlobalAssets => "global",
            Self::ContentAssets => "content",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Folder {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PublishState {
    Published,
    Draft,
}

/// An image item as enumerated by the store
#[derive(Debug, Clone, PartialEq)]
pub struct ImageAsset {
    pub id: AssetId,
    pub name: String,
    /// Id of the folder the asset was listed in
    pub folder_id: String,
    /// Public URL the optimization service downloads the image from
    pub url: String,
    pub mime_type: String,
    pub state: PublishState,
    pub deleted: bool,
}

impl ImageAsset {
    pub fn is_published(&self) -> bool {
        self.state == PublishState::Published
    }

    /// Only published, non-deleted assets are sent to the service
    pub fn is_eligible(&self) -> bool {
        self.is_published() && !self.deleted
    }
}

/// New revision of an asset, carrying the binary that will be saved
#[derive(Debug, Clone)]
pub struct WritableImage {
    pub asset: ImageAsset,
    pub binary: Vec<u8>,
}

impl WritableImage {
    pub fn set_binary(&mut self, binary: Vec<u8>) {
        self.binary = binary;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveAction {
    Save,
    Publish,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessLevel {
    /// Skip access checks, the job runs without a user context
    NoAccess,
    Edit,
}

#[async_trait]
pub trait ContentStore: Send + Sync {
    async fn root_folder(&self, kind: FolderKind) -> Result<Folder>;
    async fn child_folders(&self, folder: &Folder) -> Result<Vec<Folder>>;
    async fn child_images(&self, folder: &Folder) -> Result<Vec<ImageAsset>>;
    async fn create_writable_revision(&self, asset: &ImageAsset) -> Result<WritableImage>;
    async fn save(&self, image: WritableImage, action: SaveAction, access: AccessLevel) -> Result<()>;
}
