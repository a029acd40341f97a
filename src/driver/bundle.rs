use std::path::PathBuf;

use tracing::{error, info, warn};

use super::Driver;
use crate::error::{Error, Result};
use crate::model::{BundleSpec, RuntimeSpec, VolumeMetadata};
use crate::quota::resolve_quota;

impl Driver {
    /// Create the writable volume `bundle_id` over `chain_ids` (base to
    /// top) and describe it as a runtime bundle.
    ///
    /// A failure from volume creation onwards destroys whatever part of the
    /// volume was made.
    pub fn bundle(
        &self,
        bundle_id: &str,
        chain_ids: &[String],
        spec: &BundleSpec,
    ) -> Result<RuntimeSpec> {
        let layer_store = self.layer_store()?;

        if self.volumes.layer_exists(bundle_id)? {
            return Err(Error::LayerExists {
                id: bundle_id.to_string(),
            });
        }

        let layer_folders: Vec<PathBuf> = chain_ids
            .iter()
            .rev()
            .map(|id| layer_store.join(id))
            .collect();

        info!(bundle_id, layers = layer_folders.len(), "creating volume");
        let created = self
            .volumes
            .create_layer(bundle_id, &layer_folders)
            .and_then(|()| self.finish_bundle(bundle_id, layer_folders, spec));

        match created {
            Ok(runtime_spec) => Ok(runtime_spec),
            Err(e) => {
                warn!(bundle_id, error = %e, "bundle failed, removing volume");
                if let Err(destroy_err) = self.volumes.destroy_layer(bundle_id) {
                    error!(bundle_id, error = %destroy_err, "failed to remove volume");
                }
                Err(e)
            }
        }
    }

    fn finish_bundle(
        &self,
        bundle_id: &str,
        layer_folders: Vec<PathBuf>,
        spec: &BundleSpec,
    ) -> Result<RuntimeSpec> {
        let volume_path = self.volumes.mount_path(bundle_id)?;
        if volume_path.as_os_str().is_empty() {
            return Err(Error::MissingVolumePath {
                id: bundle_id.to_string(),
            });
        }

        if let Some(quota) = resolve_quota(
            spec.disk_limit,
            spec.exclude_image_from_quota,
            spec.base_image_size,
        )? {
            self.quota.set_quota(&volume_path, quota)?;
            info!(bundle_id, quota, "volume quota set");
        }

        self.write_metadata(
            bundle_id,
            &VolumeMetadata {
                base_image_size: spec.base_image_size,
            },
        )?;

        Ok(RuntimeSpec::new(volume_path, layer_folders))
    }
}
