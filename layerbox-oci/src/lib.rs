//! Image sources for layerbox: registry, OCI layout, and local tar files.
//!
//! A [`Fetcher`] turns an [`ImageSource`] into an [`ImageInfo`] (layers with
//! their chain IDs, plus the image config) and streams individual layers as
//! verified, uncompressed tar data.

pub mod blob;
pub mod digest;
pub mod error;
pub mod fetcher;
pub mod file;
pub mod layer;
pub mod layout;
pub mod manifest;
pub mod registry;
pub mod source;

pub use blob::LayerBlob;
pub use error::{OciError, Result};
pub use fetcher::{Fetcher, ImageInfo, SourceFetcher};
pub use layer::{chain_ids, LayerInfo};
pub use manifest::{ImageConfig, Platform};
pub use registry::RegistryFetcher;
pub use source::ImageSource;
