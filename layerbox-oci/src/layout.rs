use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::blob::{decompress_verified, LayerBlob};
use crate::digest::{self, strip_algorithm};
use crate::fetcher::{Fetcher, ImageInfo};
use crate::layer::{layer_infos, LayerInfo};
use crate::manifest::{ImageConfig, ImageIndex, OciManifest};
use crate::source::ImageSource;
use crate::{OciError, Result};

/// [`Fetcher`] for `oci://` sources: an OCI image layout directory holding
/// `index.json` and `blobs/sha256/<hex>`.
pub struct LayoutFetcher;

impl LayoutFetcher {
    fn root(source: &ImageSource) -> Result<&Path> {
        match source {
            ImageSource::Layout(p) => Ok(p),
            other => Err(OciError::InvalidSource(format!(
                "layout fetcher cannot handle '{}'",
                other
            ))),
        }
    }

    fn blob_path(root: &Path, digest: &str) -> Result<PathBuf> {
        let (algorithm, hex) = digest
            .split_once(':')
            .ok_or_else(|| OciError::Manifest(format!("malformed digest '{}'", digest)))?;
        if algorithm != "sha256" || hex.is_empty() || hex.contains(['/', '\\', '.']) {
            return Err(OciError::Manifest(format!(
                "unsupported digest '{}'",
                digest
            )));
        }
        Ok(root.join("blobs").join(algorithm).join(hex))
    }

    async fn read(path: &Path) -> Result<Vec<u8>> {
        tokio::fs::read(path)
            .await
            .map_err(|e| OciError::Manifest(format!("read {}: {}", path.display(), e)))
    }

    /// Read a JSON blob and check it against its digest.
    async fn read_json_blob<T: DeserializeOwned>(
        root: &Path,
        what: &'static str,
        digest: &str,
    ) -> Result<T> {
        let raw = Self::read(&Self::blob_path(root, digest)?).await?;
        digest::verify(what, &raw, digest)?;
        Ok(serde_json::from_slice(&raw)?)
    }
}

#[async_trait]
impl Fetcher for LayoutFetcher {
    async fn image_info(&self, source: &ImageSource) -> Result<ImageInfo> {
        let root = Self::root(source)?;
        info!(layout = %root.display(), "reading image layout");

        let index: ImageIndex = serde_json::from_slice(&Self::read(&root.join("index.json")).await?)?;
        let manifest_desc = match index.manifests.as_slice() {
            [only] => only,
            other => {
                return Err(OciError::Manifest(format!(
                    "index.json must list exactly one manifest, found {}",
                    other.len()
                )))
            }
        };

        let manifest: OciManifest =
            Self::read_json_blob(root, "manifest", &manifest_desc.digest).await?;
        let config: ImageConfig =
            Self::read_json_blob(root, "config", &manifest.config.digest).await?;

        if config.rootfs.fs_type != "layers" {
            return Err(OciError::Manifest(format!(
                "unsupported rootfs type '{}'",
                config.rootfs.fs_type
            )));
        }

        let layer_infos = layer_infos(&manifest, &config)?;
        debug!(layers = layer_infos.len(), "layout resolved");
        Ok(ImageInfo {
            layer_infos,
            config,
        })
    }

    async fn stream_blob(&self, source: &ImageSource, layer: &LayerInfo) -> Result<LayerBlob> {
        let path = Self::blob_path(Self::root(source)?, &layer.blob_id)?;
        debug!(blob = %strip_algorithm(&layer.blob_id), path = %path.display(), "streaming local blob");

        let layer = layer.clone();
        tokio::task::spawn_blocking(move || -> Result<LayerBlob> {
            let file = std::fs::File::open(&path)
                .map_err(|e| OciError::Layer(format!("open {}: {}", path.display(), e)))?;
            decompress_verified(file, &layer)
        })
        .await
        .map_err(|e| OciError::Layer(format!("decompress task failed: {}", e)))?
    }
}
