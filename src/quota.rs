//! Disk quota arithmetic for bundle volumes.

use crate::error::{Error, Result};

/// Work out the quota to apply to a bundle's writable volume.
///
/// Returns `None` when no quota applies (`disk_limit == 0`). When the image is
/// counted against the limit, the volume gets whatever the base image leaves.
pub fn resolve_quota(
    disk_limit: i64,
    exclude_image_from_quota: bool,
    base_image_size: i64,
) -> Result<Option<u64>> {
    if disk_limit == 0 {
        return Ok(None);
    }
    if disk_limit < 0 {
        return Err(Error::InvalidDiskLimit { limit: disk_limit });
    }

    let quota = if exclude_image_from_quota {
        disk_limit
    } else {
        let remaining = disk_limit - base_image_size;
        if remaining <= 0 {
            return Err(Error::DiskLimitTooSmall {
                limit: disk_limit,
                base: base_image_size,
            });
        }
        remaining
    };

    // Both branches are strictly positive here.
    Ok(Some(quota.unsigned_abs()))
}

/// Pre-flight check before pulling: would the image alone blow the limit?
pub fn check_image_fits(total: i64, disk_limit: i64, exclude_image_from_quota: bool) -> Result<()> {
    if disk_limit > 0 && !exclude_image_from_quota && total > disk_limit {
        return Err(Error::QuotaExceeded {
            total,
            limit: disk_limit,
        });
    }
    Ok(())
}
