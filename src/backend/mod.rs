//! Backend abstraction for layer storage.
//!
//! The driver talks to the host through four narrow capabilities:
//!
//! - [`LayerBackend`]: allocate, populate, locate, and destroy layer records
//! - [`LayerWriter`]: stream one tar layer into a fresh layer record
//! - [`QuotaBackend`]: apply and read a disk quota on a volume path
//! - [`PrivilegeBackend`]: raise and drop the backup/restore privileges
//!   needed to write layers
//!
//! Portable implementations:
//! - [`DirLayerBackend`](dir::DirLayerBackend): plain directories, one per layer
//! - [`DirQuota`](quota::DirQuota): limit recorded beside the volume, usage by walking it
//! - [`NoopPrivileges`]: Unix hosts have no privileges to toggle

pub mod dir;
pub mod quota;

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::debug;

use crate::error::{Error, Result};

/// Kind of filesystem entry being added by a [`LayerWriter`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Dir,
    Symlink { target: String },
    /// Device nodes, FIFOs and similar; backends may ignore them.
    Special,
}

/// Metadata for one entry of a layer tar.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileMeta {
    pub kind: EntryKind,
    pub mode: u32,
    pub size: u64,
    /// Seconds since the epoch.
    pub mtime: u64,
}

impl FileMeta {
    pub fn from_header(header: &tar::Header) -> Result<Self> {
        let kind = match header.entry_type() {
            tar::EntryType::Regular | tar::EntryType::Continuous | tar::EntryType::GNUSparse => {
                EntryKind::File
            }
            tar::EntryType::Directory => EntryKind::Dir,
            tar::EntryType::Symlink => {
                let target = header
                    .link_name()?
                    .ok_or_else(|| Error::Backend("symlink entry without target".to_string()))?;
                EntryKind::Symlink {
                    target: target.to_string_lossy().into_owned(),
                }
            }
            _ => EntryKind::Special,
        };
        Ok(Self {
            kind,
            mode: header.mode()?,
            size: header.size()?,
            mtime: header.mtime()?,
        })
    }
}

/// Streams one layer into the store. Body bytes for the most recent
/// [`add`](LayerWriter::add) of a regular file go through [`Write`].
pub trait LayerWriter: Write + Send {
    /// Begin a new entry at `name` (relative, `/`-separated).
    fn add(&mut self, name: &str, meta: &FileMeta) -> Result<()>;

    /// Add `name` as a hard link to `target`, which lives in this layer or
    /// one of its parents.
    fn add_link(&mut self, name: &str, target: &str) -> Result<()>;

    /// Record that `name` is deleted in this layer.
    fn remove(&mut self, name: &str) -> Result<()>;

    /// Flush and seal the layer.
    fn close(self: Box<Self>) -> Result<()>;
}

/// Storage for layer records, keyed by ID.
pub trait LayerBackend: Send + Sync {
    fn layer_exists(&self, id: &str) -> Result<bool>;

    /// Create a writable layer on top of `parent_paths` (newest first).
    fn create_layer(&self, id: &str, parent_paths: &[PathBuf]) -> Result<()>;

    /// Remove a layer record and everything in it.
    fn destroy_layer(&self, id: &str) -> Result<()>;

    /// Path where the layer's contents are visible; empty when the layer
    /// is not present or not mounted.
    fn mount_path(&self, id: &str) -> Result<PathBuf>;

    /// Open a writer that populates layer `id` over `parent_paths` (newest
    /// first).
    fn new_layer_writer(&self, id: &str, parent_paths: &[PathBuf])
        -> Result<Box<dyn LayerWriter>>;
}

/// Disk quota management for volumes.
pub trait QuotaBackend: Send + Sync {
    fn set_quota(&self, path: &Path, bytes: u64) -> Result<()>;

    fn quota_used(&self, path: &Path) -> Result<u64>;
}

/// Process privilege toggling.
pub trait PrivilegeBackend: Send + Sync {
    fn enable(&self, names: &[&str]) -> Result<()>;

    fn disable(&self, names: &[&str]) -> Result<()>;
}

/// Privilege backend for hosts where layer writes need no extra rights.
#[derive(Debug, Default)]
pub struct NoopPrivileges;

impl PrivilegeBackend for NoopPrivileges {
    fn enable(&self, names: &[&str]) -> Result<()> {
        debug!(?names, "privileges enabled (no-op)");
        Ok(())
    }

    fn disable(&self, names: &[&str]) -> Result<()> {
        debug!(?names, "privileges disabled (no-op)");
        Ok(())
    }
}

/// The full set of backends a [`Driver`](crate::driver::Driver) runs on.
#[derive(Clone)]
pub struct Backends {
    pub layers: Arc<dyn LayerBackend>,
    pub volumes: Arc<dyn LayerBackend>,
    pub quota: Arc<dyn QuotaBackend>,
    pub privileges: Arc<dyn PrivilegeBackend>,
}

/// Create the platform-appropriate backends rooted at `store`.
///
/// Layers live in `<store>/layers`, bundle volumes in `<store>/volumes`, and
/// both share the `<store>/create.lock` creation lock.
pub fn create_backends(store: &Path) -> Backends {
    let lock_path = store.join(crate::lock::LOCK_FILE);
    Backends {
        layers: Arc::new(dir::DirLayerBackend::new(store.join("layers"), lock_path.clone())),
        volumes: Arc::new(dir::DirLayerBackend::new(store.join("volumes"), lock_path)),
        quota: Arc::new(quota::DirQuota),
        privileges: Arc::new(NoopPrivileges),
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_meta_from_headers() {
        let mut header = tar::Header::new_gnu();
        header.set_entry_type(tar::EntryType::Regular);
        header.set_size(42);
        header.set_mode(0o640);
        header.set_mtime(1_700_000_000);
        let meta = FileMeta::from_header(&header).unwrap();
        assert_eq!(meta.kind, EntryKind::File);
        assert_eq!(meta.size, 42);
        assert_eq!(meta.mode, 0o640);
        assert_eq!(meta.mtime, 1_700_000_000);

        let mut link = tar::Header::new_gnu();
        link.set_entry_type(tar::EntryType::Symlink);
        link.set_size(0);
        link.set_mode(0o777);
        link.set_mtime(0);
        link.set_link_name("../target").unwrap();
        assert_eq!(
            FileMeta::from_header(&link).unwrap().kind,
            EntryKind::Symlink {
                target: "../target".to_string()
            }
        );

        let mut fifo = tar::Header::new_gnu();
        fifo.set_entry_type(tar::EntryType::Fifo);
        fifo.set_size(0);
        fifo.set_mode(0o600);
        fifo.set_mtime(0);
        assert_eq!(FileMeta::from_header(&fifo).unwrap().kind, EntryKind::Special);
    }

    #[test]
    fn backends_are_rooted_in_store() {
        let tmp = tempfile::tempdir().unwrap();
        let backends = create_backends(tmp.path());
        assert!(!backends.layers.layer_exists("abc").unwrap());
        assert_eq!(backends.volumes.mount_path("missing").unwrap(), PathBuf::new());
    }
}
