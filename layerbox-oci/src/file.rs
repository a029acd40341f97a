use async_trait::async_trait;
use std::path::Path;
use std::time::UNIX_EPOCH;
use tracing::debug;

use crate::blob::LayerBlob;
use crate::digest::sha256_hex;
use crate::fetcher::{Fetcher, ImageInfo};
use crate::layer::LayerInfo;
use crate::manifest::{ImageConfig, RootFs};
use crate::source::ImageSource;
use crate::{OciError, Result};

/// [`Fetcher`] for a plain local tar file, presented as a one-layer image.
///
/// The layer's chain ID is derived from the path and modification time, so
/// touching the file produces a fresh layer.
pub struct FileFetcher;

impl FileFetcher {
    fn path(source: &ImageSource) -> Result<&Path> {
        match source {
            ImageSource::File(p) => Ok(p),
            other => Err(OciError::InvalidSource(format!(
                "file fetcher cannot handle '{}'",
                other
            ))),
        }
    }
}

#[async_trait]
impl Fetcher for FileFetcher {
    async fn image_info(&self, source: &ImageSource) -> Result<ImageInfo> {
        let path = Self::path(source)?;
        let meta = tokio::fs::metadata(path)
            .await
            .map_err(|e| OciError::InvalidSource(format!("{}: {}", path.display(), e)))?;
        if meta.is_dir() {
            return Err(OciError::InvalidSource(format!(
                "{} is a directory, expected a tar file",
                path.display()
            )));
        }

        let mtime_nanos = meta
            .modified()?
            .duration_since(UNIX_EPOCH)
            .map_err(|e| OciError::InvalidSource(format!("{}: {}", path.display(), e)))?
            .as_nanos();
        let chain_id = sha256_hex(format!("{}-{}", path.display(), mtime_nanos).as_bytes());
        debug!(path = %path.display(), %chain_id, "local tar resolved");

        let layer = LayerInfo {
            blob_id: path.display().to_string(),
            diff_id: chain_id.clone(),
            chain_id: chain_id.clone(),
            parent_chain_id: String::new(),
            size: i64::try_from(meta.len()).unwrap_or(i64::MAX),
            media_type: String::new(),
            urls: Vec::new(),
        };
        Ok(ImageInfo {
            layer_infos: vec![layer],
            config: ImageConfig {
                rootfs: RootFs {
                    fs_type: "layers".to_string(),
                    diff_ids: vec![chain_id],
                },
                ..Default::default()
            },
        })
    }

    async fn stream_blob(&self, source: &ImageSource, _layer: &LayerInfo) -> Result<LayerBlob> {
        let file = tokio::fs::File::open(Self::path(source)?).await?;
        Ok(LayerBlob::from_file(file.into_std().await))
    }
}
