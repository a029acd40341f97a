//! layerbox: container image layers materialized as directory bundles
//!
//! Pulls content-addressed image layers from a registry, an OCI layout, or a
//! local tar file, unpacks each one exactly once into a shared layer store,
//! and assembles per-container writable volumes on top of them.
//!
//! # Key Features
//!
//! - **Shared layers**: Every layer is stored once, keyed by its chain ID
//! - **Crash safe**: A layer counts as present only once its size marker is written
//! - **Parallel pulls**: Ancestor layers download while their children do
//! - **Disk quotas**: Bundle limits with or without the image counted in
//!
//! # Example
//!
//! ```no_run
//! use layerbox::Layerbox;
//! use layerbox_oci::ImageSource;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let layerbox = Layerbox::open(Some("/var/lib/layerbox".into()))?;
//!
//!     let source = ImageSource::parse("docker://library/alpine:3.20")?;
//!     let spec = layerbox.create("web-1", source, 0, false).await?;
//!     println!("rootfs: {}", spec.root.path.display());
//!
//!     let stats = layerbox.stats("web-1").await?;
//!     println!("used: {}", stats.disk_usage.total_bytes_used);
//!
//!     layerbox.delete("web-1").await?;
//!     Ok(())
//! }
//! ```

pub mod backend;
pub mod config;
pub mod driver;
pub mod error;
pub mod layerbox;
pub mod lock;
pub mod model;
pub mod privilege;
pub mod puller;
pub mod quota;

// Re-exports for convenience
pub use driver::Driver;
pub use error::{Error, Result};
pub use layerbox::Layerbox;
pub use model::{BundleSpec, Image, ImageSpec, RuntimeSpec, VolumeStats};
pub use puller::Puller;
