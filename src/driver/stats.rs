use tracing::debug;

use super::Driver;
use crate::error::{Error, Result};
use crate::model::{DiskUsage, VolumeStats};

impl Driver {
    /// Disk usage of bundle `bundle_id`: the image plus what the volume
    /// has written on top of it.
    pub fn stats(&self, bundle_id: &str) -> Result<VolumeStats> {
        self.store()?;

        let volume_path = self.volumes.mount_path(bundle_id)?;
        if volume_path.as_os_str().is_empty() {
            return Err(Error::MissingVolumePath {
                id: bundle_id.to_string(),
            });
        }

        let used = self.quota.quota_used(&volume_path)?;
        let used = i64::try_from(used).map_err(|e| Error::backend("volume usage", e))?;
        let metadata = self.read_metadata(bundle_id)?;
        debug!(bundle_id, used, base = metadata.base_image_size, "volume stats");

        Ok(VolumeStats {
            disk_usage: DiskUsage {
                total_bytes_used: metadata.base_image_size + used,
                exclusive_bytes_used: used,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::VolumeMetadata;
    use crate::driver::testutil::TestDriver;
    use std::path::PathBuf;

    #[test]
    fn totals_include_base_image() {
        let t = TestDriver::new();
        t.driver
            .write_metadata(
                "b1",
                &VolumeMetadata {
                    base_image_size: 1000,
                },
            )
            .unwrap();
        *t.fakes.quota.used.lock().unwrap() = 300;

        let stats = t.driver.stats("b1").unwrap();
        assert_eq!(stats.disk_usage.total_bytes_used, 1300);
        assert_eq!(stats.disk_usage.exclusive_bytes_used, 300);
    }

    #[test]
    fn empty_mount_path_is_reported() {
        let t = TestDriver::new();
        t.fakes
            .volumes
            .mount_paths
            .lock()
            .unwrap()
            .insert("b1".to_string(), PathBuf::new());
        assert!(matches!(
            t.driver.stats("b1"),
            Err(Error::MissingVolumePath { .. })
        ));
    }

    #[test]
    fn missing_metadata_is_an_error() {
        let t = TestDriver::new();
        assert!(t.driver.stats("b1").is_err());
    }
}
