use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use super::Driver;
use crate::backend::{FileMeta, LayerWriter};
use crate::error::{Error, Result};
use crate::lock::CreateLock;

/// Marker file inside a layer directory; its presence means "complete".
pub const SIZE_MARKER: &str = "size";

/// Directory under the store holding per-layer unpack locks.
pub const LOCKS_DIR: &str = "locks";

const WHITEOUT_PREFIX: &str = ".wh.";
const OPAQUE_WHITEOUT: &str = ".wh..wh..opq";

impl Driver {
    /// Unpack a layer tar into the layer store as `layer_id`.
    ///
    /// `parent_ids` are the chain IDs of every strictly older layer, base
    /// first. Returns the number of content bytes written. Calling this for
    /// a layer that is already complete returns its recorded size without
    /// touching the stream; a layer left incomplete by an earlier crash is
    /// destroyed and rebuilt.
    ///
    /// Unpacks of the same layer are serialized by a per-layer lock, so a
    /// caller that loses the race finds the winner's marker and returns it.
    pub fn unpack<R: Read>(&self, layer_id: &str, parent_ids: &[String], stream: R) -> Result<i64> {
        let layer_store = self.layer_store()?;
        let marker = layer_store.join(layer_id).join(SIZE_MARKER);
        let _lock = CreateLock::acquire(&self.layer_lock_path(layer_id)?)?;

        if self.layers.layer_exists(layer_id)? {
            if let Some(size) = read_marker(&marker)? {
                debug!(layer_id, size, "layer already unpacked");
                return Ok(size);
            }
            warn!(layer_id, "layer exists without size marker, rebuilding");
            self.layers.destroy_layer(layer_id)?;
        }

        info!(layer_id, parents = parent_ids.len(), "unpacking layer");
        let _privileges = self.privileges.acquire()?;

        let parent_paths: Vec<PathBuf> = parent_ids
            .iter()
            .rev()
            .map(|id| layer_store.join(id))
            .collect();

        let mut writer = self.layers.new_layer_writer(layer_id, &parent_paths)?;
        let size = write_entries(writer.as_mut(), stream)?;
        writer.close()?;

        fs::write(&marker, size.to_string())
            .map_err(|e| Error::backend(format!("write size marker {}", marker.display()), e))?;
        info!(layer_id, size, "layer unpacked");
        Ok(size)
    }

    /// `<store>/locks/<layer_id>.lock`, outside the layer directory so that
    /// destroying a partial layer leaves the lock alone.
    fn layer_lock_path(&self, layer_id: &str) -> Result<PathBuf> {
        if layer_id.is_empty() || layer_id.starts_with('.') || layer_id.contains(['/', '\\']) {
            return Err(Error::Backend(format!("invalid layer id '{}'", layer_id)));
        }
        Ok(self
            .store()?
            .join(LOCKS_DIR)
            .join(format!("{}.lock", layer_id)))
    }
}

/// `Ok(None)` when the marker does not exist.
fn read_marker(path: &Path) -> Result<Option<i64>> {
    match fs::read_to_string(path) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| Error::backend(format!("parse size marker {}", path.display()), e)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn write_entries<R: Read>(writer: &mut dyn LayerWriter, stream: R) -> Result<i64> {
    let mut archive = tar::Archive::new(stream);
    let mut size: i64 = 0;

    for entry in archive.entries()? {
        let mut entry = entry?;
        let raw_name = entry.path()?.to_string_lossy().into_owned();
        let Some(name) = normalize(&raw_name) else {
            continue;
        };
        let (dir, base) = match name.rsplit_once('/') {
            Some((dir, base)) => (Some(dir), base),
            None => (None, name),
        };

        if base == OPAQUE_WHITEOUT {
            warn!(name, "opaque whiteout not supported, skipping");
            continue;
        }

        if let Some(hidden) = base.strip_prefix(WHITEOUT_PREFIX) {
            let target = match dir {
                Some(dir) => format!("{}/{}", dir, hidden),
                None => hidden.to_string(),
            };
            debug!(path = %target, "whiteout");
            writer.remove(&target)?;
            continue;
        }

        if entry.header().entry_type() == tar::EntryType::Link {
            let link = entry
                .link_name()?
                .ok_or_else(|| Error::Backend(format!("hard link {} has no target", name)))?;
            let link = link.to_string_lossy().into_owned();
            let target = normalize(&link)
                .ok_or_else(|| Error::Backend(format!("hard link {} has empty target", name)))?;
            writer.add_link(name, target)?;
            continue;
        }

        let meta = FileMeta::from_header(entry.header())?;
        writer.add(name, &meta)?;
        let copied = io::copy(&mut entry, &mut *writer)?;
        size += i64::try_from(copied).map_err(|e| Error::backend("layer size", e))?;
    }

    Ok(size)
}

/// Strip `./` and `/` prefixes and trailing slashes; `None` for the root.
fn normalize(name: &str) -> Option<&str> {
    let mut name = name;
    loop {
        if let Some(rest) = name.strip_prefix("./") {
            name = rest;
        } else if let Some(rest) = name.strip_prefix('/') {
            name = rest;
        } else {
            break;
        }
    }
    let name = name.trim_end_matches('/');
    if name.is_empty() || name == "." {
        None
    } else {
        Some(name)
    }
}
