use std::fs;
use std::path::PathBuf;

use super::Driver;
use crate::error::{Error, Result};
use crate::model::VolumeMetadata;

const METADATA_FILE: &str = "metadata.json";

impl Driver {
    fn metadata_path(&self, bundle_id: &str) -> Result<PathBuf> {
        Ok(self.volume_store()?.join(bundle_id).join(METADATA_FILE))
    }

    /// Record bundle metadata beside its volume.
    pub fn write_metadata(&self, bundle_id: &str, metadata: &VolumeMetadata) -> Result<()> {
        let path = self.metadata_path(bundle_id)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_vec(metadata)?;
        fs::write(&path, json)
            .map_err(|e| Error::backend(format!("write metadata {}", path.display()), e))
    }

    pub fn read_metadata(&self, bundle_id: &str) -> Result<VolumeMetadata> {
        let path = self.metadata_path(bundle_id)?;
        let raw = fs::read(&path)
            .map_err(|e| Error::backend(format!("read metadata {}", path.display()), e))?;
        Ok(serde_json::from_slice(&raw)?)
    }
}
