//! Image puller: materializes every layer of an image into the layer store.
//!
//! Layers are built top-down. Each missing layer starts its own download and
//! recurses into its parent at the same time; once both finish, the layer is
//! unpacked on top of its (now complete) ancestors.

use std::sync::Arc;

use async_recursion::async_recursion;
use layerbox_oci::{Fetcher, ImageSource, LayerInfo};
use tracing::{debug, info};

use crate::driver::Driver;
use crate::error::{Error, Result};
use crate::model::{Image, ImageSpec};
use crate::quota::check_image_fits;

pub struct Puller {
    fetcher: Arc<dyn Fetcher>,
    driver: Arc<Driver>,
}

impl Puller {
    pub fn new(fetcher: Arc<dyn Fetcher>, driver: Arc<Driver>) -> Self {
        Self { fetcher, driver }
    }

    /// Pull `spec.image_src`, unpacking any layer not already stored.
    ///
    /// Fails with [`Error::QuotaExceeded`] before anything is downloaded if
    /// the image alone is larger than the disk limit.
    pub async fn pull(&self, spec: &ImageSpec) -> Result<Image> {
        let source = &spec.image_src;
        info!(source = %source, "pulling image");

        let info = self.fetcher.image_info(source).await?;
        let base_image_size: i64 = info.layer_infos.iter().map(|l| l.size).sum();
        check_image_fits(
            base_image_size,
            spec.disk_limit,
            spec.exclude_image_from_quota,
        )?;

        if let Some(top) = info.layer_infos.len().checked_sub(1) {
            self.build_layer(source, &info.layer_infos, top).await?;
        }

        let chain_ids = info
            .layer_infos
            .iter()
            .map(|l| l.chain_id.clone())
            .collect();
        info!(
            source = %source,
            layers = info.layer_infos.len(),
            base_image_size,
            "image pulled"
        );

        Ok(Image {
            config: info.config,
            chain_ids,
            base_image_size,
        })
    }

    #[async_recursion]
    async fn build_layer(
        &self,
        source: &ImageSource,
        layers: &[LayerInfo],
        index: usize,
    ) -> Result<()> {
        let layer = &layers[index];
        if self.driver.exists(&layer.chain_id) {
            debug!(chain_id = %layer.chain_id, "layer exists");
            return Ok(());
        }

        let download = self.fetcher.stream_blob(source, layer);
        let parent = async {
            match index.checked_sub(1) {
                Some(parent) => self.build_layer(source, layers, parent).await,
                None => Ok(()),
            }
        };
        let (blob, parent) = tokio::join!(download, parent);

        // Dropping a fetched blob on the error path removes its temp file.
        let blob = blob?;
        parent?;

        let driver = Arc::clone(&self.driver);
        let chain_id = layer.chain_id.clone();
        let parent_ids: Vec<String> = layers[..index]
            .iter()
            .map(|l| l.chain_id.clone())
            .collect();

        let size = tokio::task::spawn_blocking(move || driver.unpack(&chain_id, &parent_ids, blob))
            .await
            .map_err(|e| Error::Backend(format!("unpack task failed: {}", e)))??;
        debug!(chain_id = %layer.chain_id, size, "layer built");
        Ok(())
    }
}
