//! # Filesystem Content Store
//!
//! Implementazione di `ContentStore` basata su directory locali.
//!
//! ## Responsabilità:
//! - Espone una directory come root `globalassets` e, opzionalmente, una
//!   seconda come root `contentassets`
//! - Enumera sottocartelle e immagini di una cartella
//! - Determina il formato immagine (JPEG, PNG, WebP, GIF) tramite il crate `image`
//! - Sostituisce il binario di un asset in modo atomico
//!
//! ## Identità e URL:
//! - URL pubblico: `<site_url>/<root>/<path relativo>`, con ogni segmento
//!   percent-encoded (`a#1.jpg` → `a%231.jpg`)
//! - Il path su disco si ricava dalla cartella di enumerazione, mai dall'URL
//! - Identità: primi 32 caratteri hex dello SHA-256 del path pubblico,
//!   quindi stabile tra un run e l'altro
//!
//! ## Sicurezza operazioni:
//! - La nuova revisione viene scritta in un file temporaneo nella stessa
//!   directory e poi rinominata sopra l'originale
//! - File e cartelle nascosti (prefisso `.`) vengono ignorati, inclusi i
//!   temporanei lasciati da un save interrotto

use crate::content_store::{
    AccessLevel, AssetId, ContentStore, Folder, FolderKind, ImageAsset, PublishState, SaveAction,
    WritableImage,
};
use crate::error::{OptimizeError, Result};
use async_trait::async_trait;
use image::ImageFormat;
use reqwest::Url;
use sha2::{Digest, Sha256};
use std::io::Write;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

/// Content store backed by one or two directory trees
pub struct FsContentStore {
    global_root: PathBuf,
    content_root: Option<PathBuf>,
    site_url: String,
}

impl FsContentStore {
    pub fn new(global_root: PathBuf, content_root: Option<PathBuf>, site_url: &str) -> Self {
        Self {
            global_root,
            content_root,
            site_url: site_url.trim_end_matches('/').to_string(),
        }
    }

    fn root_path(&self, kind: FolderKind) -> Option<&Path> {
        match kind {
            FolderKind::GlobalAssets => Some(self.global_root.as_path()),
            FolderKind::ContentAssets => self.content_root.as_deref(),
        }
    }

    fn url_segment(kind: FolderKind) -> &'static str {
        match kind {
            FolderKind::GlobalAssets => "globalassets",
            FolderKind::ContentAssets => "contentassets",
        }
    }

    /// Public path segments (`globalassets`, `a`, `b.jpg`) of a file under one of the roots
    fn public_segments(&self, path: &Path) -> Option<Vec<String>> {
        for kind in [FolderKind::GlobalAssets, FolderKind::ContentAssets] {
            let Some(root) = self.root_path(kind) else {
                continue;
            };
            if let Ok(relative) = path.strip_prefix(root) {
                let mut segments = vec![Self::url_segment(kind).to_string()];
                segments.extend(
                    relative
                        .components()
                        .map(|c| c.as_os_str().to_string_lossy().to_string()),
                );
                return Some(segments);
            }
        }
        None
    }

    fn public_url(&self, segments: &[String]) -> Result<Url> {
        let mut url = Url::parse(&self.site_url)
            .map_err(|e| OptimizeError::Config(format!("invalid site url {}: {}", self.site_url, e)))?;
        url.path_segments_mut()
            .map_err(|_| OptimizeError::Config(format!("site url {} cannot hold a path", self.site_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn asset_for(&self, path: &Path, format: ImageFormat) -> Result<ImageAsset> {
        let segments = self.public_segments(path).ok_or_else(|| {
            OptimizeError::Traversal(format!("{} is outside the configured roots", path.display()))
        })?;

        let mut hasher = Sha256::new();
        hasher.update(segments.join("/").as_bytes());
        let id = hex::encode(hasher.finalize())[..32].to_string();

        Ok(ImageAsset {
            id: AssetId(id),
            name: path
                .file_name()
                .unwrap_or_default()
                .to_string_lossy()
                .to_string(),
            folder_id: path
                .parent()
                .map(|p| p.to_string_lossy().to_string())
                .unwrap_or_default(),
            url: self.public_url(&segments)?.to_string(),
            mime_type: format.to_mime_type().to_string(),
            state: PublishState::Published,
            deleted: false,
        })
    }

    /// Path on disk of an asset, which must lie under one of the roots
    fn asset_path(&self, asset: &ImageAsset) -> Result<PathBuf> {
        let path = Path::new(&asset.folder_id).join(&asset.name);
        if asset.folder_id.is_empty() || self.public_segments(&path).is_none() {
            return Err(OptimizeError::Persistence(format!(
                "{} is outside the configured roots",
                path.display()
            )));
        }
        Ok(path)
    }

    async fn read_entries(folder: &Folder) -> Result<Vec<(PathBuf, bool)>> {
        let dir = PathBuf::from(&folder.id);
        let mut reader = fs::read_dir(&dir)
            .await
            .map_err(|e| OptimizeError::Traversal(format!("{}: {}", dir.display(), e)))?;

        let mut entries = Vec::new();
        while let Some(entry) = reader
            .next_entry()
            .await
            .map_err(|e| OptimizeError::Traversal(format!("{}: {}", dir.display(), e)))?
        {
            if entry.file_name().to_string_lossy().starts_with('.') {
                continue;
            }
            let file_type = entry.file_type().await?;
            entries.push((entry.path(), file_type.is_dir()));
        }

        // read_dir order is platform dependent
        entries.sort();
        Ok(entries)
    }

    fn image_format(path: &Path) -> Option<ImageFormat> {
        match ImageFormat::from_path(path) {
            Ok(format @ (ImageFormat::Jpeg | ImageFormat::Png | ImageFormat::WebP | ImageFormat::Gif)) => {
                Some(format)
            }
            _ => None,
        }
    }
}

fn folder_for(path: &Path) -> Folder {
    Folder {
        id: path.to_string_lossy().to_string(),
        name: path
            .file_name()
            .unwrap_or_default()
            .to_string_lossy()
            .to_string(),
    }
}

#[async_trait]
impl ContentStore for FsContentStore {
    async fn root_folder(&self, kind: FolderKind) -> Result<Folder> {
        let root = self.root_path(kind).ok_or_else(|| {
            OptimizeError::Traversal(format!("no {} root configured", kind.as_str()))
        })?;

        if !fs::metadata(root).await.map(|m| m.is_dir()).unwrap_or(false) {
            return Err(OptimizeError::Traversal(format!(
                "{} root is not a directory: {}",
                kind.as_str(),
                root.display()
            )));
        }

        Ok(folder_for(root))
    }

    async fn child_folders(&self, folder: &Folder) -> Result<Vec<Folder>> {
        Ok(Self::read_entries(folder)
            .await?
            .into_iter()
            .filter(|(_, is_dir)| *is_dir)
            .map(|(path, _)| folder_for(&path))
            .collect())
    }

    async fn child_images(&self, folder: &Folder) -> Result<Vec<ImageAsset>> {
        let mut images = Vec::new();
        for (path, is_dir) in Self::read_entries(folder).await? {
            if is_dir {
                continue;
            }
            if let Some(format) = Self::image_format(&path) {
                images.push(self.asset_for(&path, format)?);
            }
        }
        Ok(images)
    }

    async fn create_writable_revision(&self, asset: &ImageAsset) -> Result<WritableImage> {
        let path = self.asset_path(asset)?;
        let binary = fs::read(&path)
            .await
            .map_err(|e| OptimizeError::Persistence(format!("{}: {}", path.display(), e)))?;

        Ok(WritableImage {
            asset: asset.clone(),
            binary,
        })
    }

    async fn save(&self, image: WritableImage, action: SaveAction, _access: AccessLevel) -> Result<()> {
        if action != SaveAction::Publish {
            return Err(OptimizeError::Persistence(
                "filesystem store only supports publishing saves".to_string(),
            ));
        }

        let path = self.asset_path(&image.asset)?;
        let parent = path
            .parent()
            .map(Path::to_path_buf)
            .ok_or_else(|| OptimizeError::Persistence(format!("{} has no parent", path.display())))?;

        let target = path.clone();
        tokio::task::spawn_blocking(move || -> std::io::Result<()> {
            let mut temp = tempfile::NamedTempFile::new_in(&parent)?;
            temp.write_all(&image.binary)?;
            temp.as_file().sync_all()?;
            temp.persist(&target).map_err(|e| e.error)?;
            Ok(())
        })
        .await
        .map_err(|e| OptimizeError::Persistence(e.to_string()))?
        .map_err(|e| OptimizeError::Persistence(format!("{}: {}", path.display(), e)))?;

        debug!("Published new revision of {}", path.display());
        Ok(())
    }
}
