use async_trait::async_trait;
use serde::Serialize;

use crate::blob::LayerBlob;
use crate::file::FileFetcher;
use crate::layer::LayerInfo;
use crate::layout::LayoutFetcher;
use crate::manifest::ImageConfig;
use crate::registry::RegistryFetcher;
use crate::source::ImageSource;
use crate::Result;

/// Everything needed to materialize an image: its layers (base to top) and
/// its config.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ImageInfo {
    pub layer_infos: Vec<LayerInfo>,
    pub config: ImageConfig,
}

/// Resolves image metadata and streams individual layers.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Resolve the layer list and config for `source`.
    async fn image_info(&self, source: &ImageSource) -> Result<ImageInfo>;

    /// Fetch one layer as an uncompressed, verified tar stream.
    async fn stream_blob(&self, source: &ImageSource, layer: &LayerInfo) -> Result<LayerBlob>;
}

/// Dispatches to the registry, layout, or file fetcher by source kind.
pub struct SourceFetcher {
    registry: RegistryFetcher,
    layout: LayoutFetcher,
    file: FileFetcher,
}

impl SourceFetcher {
    pub fn new() -> Result<Self> {
        Ok(Self::with_registry(RegistryFetcher::new()?))
    }

    pub fn with_registry(registry: RegistryFetcher) -> Self {
        Self {
            registry,
            layout: LayoutFetcher,
            file: FileFetcher,
        }
    }

    pub fn registry(&self) -> &RegistryFetcher {
        &self.registry
    }

    fn pick(&self, source: &ImageSource) -> &dyn Fetcher {
        match source {
            ImageSource::Registry(_) => &self.registry,
            ImageSource::Layout(_) => &self.layout,
            ImageSource::File(_) => &self.file,
        }
    }
}

#[async_trait]
impl Fetcher for SourceFetcher {
    async fn image_info(&self, source: &ImageSource) -> Result<ImageInfo> {
        self.pick(source).image_info(source).await
    }

    async fn stream_blob(&self, source: &ImageSource, layer: &LayerInfo) -> Result<LayerBlob> {
        self.pick(source).stream_blob(source, layer).await
    }
}
