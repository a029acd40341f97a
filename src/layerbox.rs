//! Top-level entry point tying the puller and the driver together.

use std::path::PathBuf;
use std::sync::Arc;

use layerbox_oci::{Fetcher, ImageSource, Platform, RegistryFetcher, SourceFetcher};
use tracing::info;

use crate::config::Config;
use crate::driver::Driver;
use crate::error::{Error, Result};
use crate::model::{BundleSpec, Image, ImageSpec, RuntimeSpec, VolumeStats};
use crate::puller::Puller;

pub struct Layerbox {
    driver: Arc<Driver>,
    puller: Puller,
}

impl Layerbox {
    pub fn new(driver: Arc<Driver>, fetcher: Arc<dyn Fetcher>) -> Self {
        let puller = Puller::new(fetcher, Arc::clone(&driver));
        Self { driver, puller }
    }

    /// Open the platform driver at `store` with the default image fetchers.
    pub fn open(store: Option<PathBuf>) -> Result<Self> {
        let driver = Arc::new(Driver::open(store));
        let fetcher: Arc<dyn Fetcher> = Arc::new(source_fetcher(None)?);
        Ok(Self::new(driver, fetcher))
    }

    /// Like [`Layerbox::open`], with the store and image platform taken from
    /// `config`.
    pub fn from_config(config: &Config) -> Result<Self> {
        let driver = Arc::new(Driver::open(config.store.clone()));
        let fetcher: Arc<dyn Fetcher> = Arc::new(source_fetcher(config.platform()?)?);
        Ok(Self::new(driver, fetcher))
    }

    pub fn driver(&self) -> &Driver {
        &self.driver
    }

    /// Pull `source` and build the bundle `handle` on top of it.
    pub async fn create(
        &self,
        handle: &str,
        source: ImageSource,
        disk_limit: i64,
        exclude_image_from_quota: bool,
    ) -> Result<RuntimeSpec> {
        if disk_limit < 0 {
            return Err(Error::InvalidDiskLimit { limit: disk_limit });
        }
        info!(handle, source = %source, disk_limit, "creating bundle");

        let image = self
            .puller
            .pull(&ImageSpec {
                disk_limit,
                exclude_image_from_quota,
                image_src: source,
            })
            .await?;

        let spec = BundleSpec {
            disk_limit,
            exclude_image_from_quota,
            base_image_size: image.base_image_size,
        };
        let driver = Arc::clone(&self.driver);
        let bundle_id = handle.to_string();
        let chain_ids = image.chain_ids.clone();
        let mut runtime_spec =
            blocking(move || driver.bundle(&bundle_id, &chain_ids, &spec)).await?;

        runtime_spec.append_env(image.config.env());
        info!(handle, "bundle created");
        Ok(runtime_spec)
    }

    /// Pull `source` into the layer store without creating a bundle.
    pub async fn pull(&self, source: ImageSource) -> Result<Image> {
        self.puller.pull(&ImageSpec::unlimited(source)).await
    }

    pub async fn delete(&self, handle: &str) -> Result<()> {
        let driver = Arc::clone(&self.driver);
        let bundle_id = handle.to_string();
        blocking(move || driver.delete(&bundle_id)).await
    }

    pub async fn stats(&self, handle: &str) -> Result<VolumeStats> {
        let driver = Arc::clone(&self.driver);
        let bundle_id = handle.to_string();
        blocking(move || driver.stats(&bundle_id)).await
    }
}

fn source_fetcher(platform: Option<Platform>) -> Result<SourceFetcher> {
    let mut registry = RegistryFetcher::new()?;
    if let Some(platform) = platform {
        registry = registry.with_platform(platform);
    }
    Ok(SourceFetcher::with_registry(registry))
}

async fn blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| Error::Backend(format!("driver task failed: {}", e)))?
}
