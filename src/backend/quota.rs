//! Quota backend for directory volumes.
//!
//! The limit is recorded in a `quota` file next to the volume's mount path
//! (inside the volume record, so it goes away with the volume). Usage is the
//! apparent size of every regular file under the mount path, less the
//! `baseline` the volume was created with.

use std::fs;
use std::path::Path;

use tracing::debug;
use walkdir::WalkDir;

use super::QuotaBackend;
use crate::error::{Error, Result};

/// Slack added to every limit for filesystem metadata.
pub const DISK_QUOTA_OVERHEAD: u64 = 10 * 1024;

pub const QUOTA_FILE: &str = "quota";

/// Bytes a volume inherited from its parent layers at creation.
pub const BASELINE_FILE: &str = "baseline";

#[derive(Debug, Default)]
pub struct DirQuota;

impl DirQuota {
    /// The limit recorded for `path`, if any.
    #[cfg(test)]
    pub(crate) fn limit(&self, path: &Path) -> Result<Option<u64>> {
        let Some(record) = quota_file(path) else {
            return Ok(None);
        };
        match fs::read_to_string(&record) {
            Ok(raw) => raw
                .trim()
                .parse()
                .map(Some)
                .map_err(|e| Error::backend(format!("parse {}", record.display()), e)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

fn quota_file(path: &Path) -> Option<std::path::PathBuf> {
    path.parent().map(|p| p.join(QUOTA_FILE))
}

fn baseline(path: &Path) -> Result<u64> {
    let Some(record) = path.parent().map(|p| p.join(BASELINE_FILE)) else {
        return Ok(0);
    };
    match fs::read_to_string(&record) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|e| Error::backend(format!("parse {}", record.display()), e)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(0),
        Err(e) => Err(e.into()),
    }
}

/// Total length of the regular files under `path`.
pub(crate) fn apparent_size(path: &Path) -> Result<u64> {
    let mut used = 0u64;
    for entry in WalkDir::new(path) {
        let entry = entry.map_err(|e| Error::backend(format!("walk {}", path.display()), e))?;
        if entry.file_type().is_file() {
            let meta = entry
                .metadata()
                .map_err(|e| Error::backend(format!("stat {}", entry.path().display()), e))?;
            used += meta.len();
        }
    }
    Ok(used)
}

impl QuotaBackend for DirQuota {
    fn set_quota(&self, path: &Path, bytes: u64) -> Result<()> {
        if bytes == 0 {
            return Ok(());
        }
        let record = quota_file(path)
            .ok_or_else(|| Error::Backend(format!("no parent for volume {}", path.display())))?;
        let limit = bytes + DISK_QUOTA_OVERHEAD;
        fs::write(&record, limit.to_string())?;
        debug!(path = %path.display(), limit, "quota recorded");
        Ok(())
    }

    fn quota_used(&self, path: &Path) -> Result<u64> {
        Ok(apparent_size(path)?.saturating_sub(baseline(path)?))
    }
}
