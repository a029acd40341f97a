//! Reference-counted privilege elevation.
//!
//! Writing layers needs the backup and restore privileges. Several unpacks
//! may run at once, so the privileges are enabled when the first holder
//! arrives and disabled when the last one leaves. A driver owns one
//! [`Privileges`] and every unpack it runs goes through it.

use std::sync::{Arc, Mutex};

use tracing::{debug, error};

use crate::backend::PrivilegeBackend;
use crate::error::{Error, Result};

/// Privileges needed to write layer contents.
pub const LAYER_PRIVILEGES: [&str; 2] = ["SeBackupPrivilege", "SeRestorePrivilege"];

#[derive(Clone)]
pub struct Privileges {
    backend: Arc<dyn PrivilegeBackend>,
    holders: Arc<Mutex<usize>>,
}

impl Privileges {
    pub fn new(backend: Arc<dyn PrivilegeBackend>) -> Self {
        Self {
            backend,
            holders: Arc::new(Mutex::new(0)),
        }
    }

    /// Hold the layer privileges until the returned guard is dropped.
    pub fn acquire(&self) -> Result<PrivilegeGuard> {
        let mut holders = self
            .holders
            .lock()
            .map_err(|_| Error::Backend("privilege counter poisoned".to_string()))?;
        if *holders == 0 {
            self.backend.enable(&LAYER_PRIVILEGES)?;
            debug!("layer privileges enabled");
        }
        *holders += 1;
        Ok(PrivilegeGuard {
            owner: self.clone(),
        })
    }

    fn release(&self) {
        let Ok(mut holders) = self.holders.lock() else {
            error!("privilege counter poisoned; leaving privileges enabled");
            return;
        };
        *holders = holders.saturating_sub(1);
        if *holders == 0 {
            match self.backend.disable(&LAYER_PRIVILEGES) {
                Ok(()) => debug!("layer privileges disabled"),
                Err(e) => error!(error = %e, "failed to disable layer privileges"),
            }
        }
    }
}

/// Keeps the layer privileges enabled while alive.
pub struct PrivilegeGuard {
    owner: Privileges,
}

impl Drop for PrivilegeGuard {
    fn drop(&mut self) {
        self.owner.release();
    }
}
