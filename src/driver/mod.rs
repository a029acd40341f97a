//! The volume driver: owns the on-disk layer and volume stores.
//!
//! Layers are keyed by chain ID under `<store>/layers`; bundle volumes are
//! keyed by bundle ID under `<store>/volumes`. A layer is complete once its
//! `size` marker exists, and is never modified afterwards.

mod bundle;
mod delete;
mod exists;
mod metadata;
mod stats;
mod unpack;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::backend::{create_backends, Backends, LayerBackend, QuotaBackend};
use crate::error::{Error, Result};
use crate::privilege::Privileges;

pub use unpack::SIZE_MARKER;

pub struct Driver {
    store: Option<PathBuf>,
    layers: Arc<dyn LayerBackend>,
    volumes: Arc<dyn LayerBackend>,
    quota: Arc<dyn QuotaBackend>,
    privileges: Privileges,
}

impl Driver {
    pub fn new(store: Option<PathBuf>, backends: Backends) -> Self {
        Self {
            store: store.filter(|s| !s.as_os_str().is_empty()),
            layers: backends.layers,
            volumes: backends.volumes,
            quota: backends.quota,
            privileges: Privileges::new(backends.privileges),
        }
    }

    /// A driver on the platform backends rooted at `store`.
    pub fn open(store: Option<PathBuf>) -> Self {
        let root = store.clone().unwrap_or_default();
        Self::new(store, create_backends(&root))
    }

    pub fn store(&self) -> Result<&Path> {
        self.store.as_deref().ok_or(Error::EmptyDriverStore)
    }

    pub fn layer_store(&self) -> Result<PathBuf> {
        Ok(self.store()?.join("layers"))
    }

    pub fn volume_store(&self) -> Result<PathBuf> {
        Ok(self.store()?.join("volumes"))
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::fakes::Fakes;

    #[test]
    fn empty_store_path_counts_as_missing() {
        let tmp = tempfile::tempdir().unwrap();
        let fakes = Fakes::new(tmp.path());
        let driver = Driver::new(Some(PathBuf::new()), fakes.backends());
        assert!(matches!(driver.store(), Err(Error::EmptyDriverStore)));
    }

    #[test]
    fn stores_live_under_root() {
        let driver = Driver::open(Some(PathBuf::from("/var/lib/layerbox")));
        assert_eq!(
            driver.layer_store().unwrap(),
            PathBuf::from("/var/lib/layerbox/layers")
        );
        assert_eq!(
            driver.volume_store().unwrap(),
            PathBuf::from("/var/lib/layerbox/volumes")
        );
    }
}
