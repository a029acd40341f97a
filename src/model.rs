//! Values passed between the puller, the driver, and the CLI.

use layerbox_oci::{ImageConfig, ImageSource};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// OCI runtime spec version written into bundles.
pub const OCI_VERSION: &str = "1.0.2";

/// The runtime bundle handed to a container runtime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuntimeSpec {
    #[serde(rename = "ociVersion")]
    pub oci_version: String,
    pub root: Root,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub process: Option<Process>,
    pub windows: Windows,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Root {
    pub path: PathBuf,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Process {
    #[serde(default)]
    pub env: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Windows {
    /// Parent layer paths, newest first.
    #[serde(rename = "layerFolders")]
    pub layer_folders: Vec<PathBuf>,
}

impl RuntimeSpec {
    pub fn new(root: PathBuf, layer_folders: Vec<PathBuf>) -> Self {
        Self {
            oci_version: OCI_VERSION.to_string(),
            root: Root { path: root },
            process: None,
            windows: Windows { layer_folders },
        }
    }

    /// Append environment entries to `process.env`, creating it if needed.
    pub fn append_env(&mut self, env: &[String]) {
        if env.is_empty() {
            return;
        }
        self.process
            .get_or_insert_with(Process::default)
            .env
            .extend(env.iter().cloned());
    }
}

/// How to size a bundle's writable volume.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BundleSpec {
    pub disk_limit: i64,
    pub exclude_image_from_quota: bool,
    pub base_image_size: i64,
}

/// What to pull and the quota it must fit in.
#[derive(Debug, Clone)]
pub struct ImageSpec {
    pub disk_limit: i64,
    pub exclude_image_from_quota: bool,
    pub image_src: ImageSource,
}

impl ImageSpec {
    pub fn unlimited(image_src: ImageSource) -> Self {
        Self {
            disk_limit: 0,
            exclude_image_from_quota: false,
            image_src,
        }
    }
}

/// A pulled image: every chain ID is present in the layer store.
#[derive(Debug, Clone, Serialize)]
pub struct Image {
    pub config: ImageConfig,
    /// Base to top.
    pub chain_ids: Vec<String>,
    pub base_image_size: i64,
}

/// Sidecar stored with each bundle volume.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeMetadata {
    pub base_image_size: i64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeStats {
    pub disk_usage: DiskUsage,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiskUsage {
    pub total_bytes_used: i64,
    pub exclusive_bytes_used: i64,
}
