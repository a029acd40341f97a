//! Manifest, index, and image config documents (OCI and Docker v2 schemas).

use serde::{Deserialize, Serialize};

use crate::{OciError, Result};

/// A single-platform image: one config blob plus its layers, base first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OciManifest {
    #[serde(rename = "schemaVersion")]
    pub schema_version: u32,

    #[serde(rename = "mediaType", default)]
    pub media_type: String,

    pub config: Descriptor,

    pub layers: Vec<Descriptor>,
}

/// Pointer to a blob by digest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Descriptor {
    #[serde(rename = "mediaType", default)]
    pub media_type: String,

    pub digest: String,

    pub size: i64,

    /// Alternate download locations (foreign / non-distributable layers).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub urls: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform: Option<Platform>,
}

/// An `os/arch[/variant]` triple.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Platform {
    pub architecture: String,
    pub os: String,
    #[serde(default)]
    pub variant: Option<String>,
}

impl Platform {
    /// The platform this process runs on, in OCI spelling.
    pub fn host() -> Self {
        Self {
            architecture: host_arch().to_string(),
            os: host_os().to_string(),
            variant: None,
        }
    }

    /// Parse an `os/arch[/variant]` string such as `windows/amd64`.
    pub fn parse(raw: &str) -> Result<Self> {
        let mut parts = raw.split('/');
        match (parts.next(), parts.next(), parts.next(), parts.next()) {
            (Some(os), Some(arch), variant, None) if !os.is_empty() && !arch.is_empty() => {
                Ok(Self {
                    architecture: arch.to_string(),
                    os: os.to_string(),
                    variant: variant.map(str::to_string),
                })
            }
            _ => Err(OciError::InvalidSource(format!(
                "invalid platform '{}', expected os/arch[/variant]",
                raw
            ))),
        }
    }
}

fn host_arch() -> &'static str {
    match std::env::consts::ARCH {
        "x86_64" => "amd64",
        "aarch64" => "arm64",
        "x86" => "386",
        other => other,
    }
}

fn host_os() -> &'static str {
    match std::env::consts::OS {
        "macos" => "darwin",
        other => other,
    }
}

/// A multi-platform image: one manifest descriptor per platform.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageIndex {
    #[serde(rename = "schemaVersion")]
    pub schema_version: u32,

    pub manifests: Vec<Descriptor>,
}

impl ImageIndex {
    /// The first manifest built for `target`. A target without a variant
    /// accepts any variant.
    pub fn select_platform(&self, target: &Platform) -> Result<&Descriptor> {
        let fits = |p: &Platform| {
            p.os == target.os
                && p.architecture == target.architecture
                && target.variant.as_ref().is_none_or(|v| p.variant.as_ref() == Some(v))
        };
        self.manifests
            .iter()
            .find(|d| d.platform.as_ref().is_some_and(fits))
            .ok_or_else(|| {
                OciError::Manifest(format!(
                    "image has no {}/{} manifest ({} candidates)",
                    target.os,
                    target.architecture,
                    self.manifests.len()
                ))
            })
    }
}

/// An image config blob, as referenced by a manifest's `config` descriptor.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImageConfig {
    #[serde(default)]
    pub os: String,

    #[serde(default)]
    pub architecture: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<ContainerConfig>,

    #[serde(default)]
    pub rootfs: RootFs,
}

impl ImageConfig {
    /// Environment variables declared by the image, if any.
    pub fn env(&self) -> &[String] {
        self.config
            .as_ref()
            .map(|c| c.env.as_slice())
            .unwrap_or_default()
    }
}

/// The `config` section of an image config: what a container starts with.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContainerConfig {
    #[serde(rename = "Env", default)]
    pub env: Vec<String>,

    #[serde(rename = "Cmd", default)]
    pub cmd: Vec<String>,

    #[serde(rename = "WorkingDir", default)]
    pub working_dir: String,
}

/// The ordered list of uncompressed layer digests.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RootFs {
    #[serde(rename = "type", default)]
    pub fs_type: String,

    #[serde(default)]
    pub diff_ids: Vec<String>,
}

pub const MEDIA_TYPE_OCI_INDEX: &str = "application/vnd.oci.image.index.v1+json";
pub const MEDIA_TYPE_OCI_MANIFEST: &str = "application/vnd.oci.image.manifest.v1+json";
pub const MEDIA_TYPE_OCI_CONFIG: &str = "application/vnd.oci.image.config.v1+json";
pub const MEDIA_TYPE_OCI_LAYER: &str = "application/vnd.oci.image.layer.v1.tar";
pub const MEDIA_TYPE_OCI_LAYER_GZIP: &str = "application/vnd.oci.image.layer.v1.tar+gzip";
pub const MEDIA_TYPE_OCI_LAYER_ZSTD: &str = "application/vnd.oci.image.layer.v1.tar+zstd";
pub const MEDIA_TYPE_DOCKER_MANIFEST_LIST: &str =
    "application/vnd.docker.distribution.manifest.list.v2+json";
pub const MEDIA_TYPE_DOCKER_MANIFEST: &str = "application/vnd.docker.distribution.manifest.v2+json";
pub const MEDIA_TYPE_DOCKER_CONFIG: &str = "application/vnd.docker.container.image.v1+json";
pub const MEDIA_TYPE_DOCKER_LAYER: &str = "application/vnd.docker.image.rootfs.diff.tar.gzip";
pub const MEDIA_TYPE_DOCKER_FOREIGN_LAYER: &str =
    "application/vnd.docker.image.rootfs.foreign.diff.tar.gzip";

pub fn is_index_media_type(media_type: &str) -> bool {
    matches!(media_type, MEDIA_TYPE_OCI_INDEX | MEDIA_TYPE_DOCKER_MANIFEST_LIST)
}

pub fn is_manifest_media_type(media_type: &str) -> bool {
    matches!(media_type, MEDIA_TYPE_OCI_MANIFEST | MEDIA_TYPE_DOCKER_MANIFEST)
}

pub fn is_config_media_type(media_type: &str) -> bool {
    matches!(media_type, MEDIA_TYPE_OCI_CONFIG | MEDIA_TYPE_DOCKER_CONFIG)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn servercore_manifest() -> OciManifest {
        serde_json::from_value(json!({
            "schemaVersion": 2,
            "mediaType": MEDIA_TYPE_DOCKER_MANIFEST,
            "config": { "mediaType": MEDIA_TYPE_DOCKER_CONFIG, "digest": "sha256:c0", "size": 3100 },
            "layers": [
                {
                    "mediaType": MEDIA_TYPE_DOCKER_FOREIGN_LAYER,
                    "digest": "sha256:f1",
                    "size": 1_500_000_000i64,
                    "urls": ["https://mcr.example/servercore/base.tar.gz"]
                },
                { "mediaType": MEDIA_TYPE_DOCKER_LAYER, "digest": "sha256:a2", "size": 4200 }
            ]
        }))
        .unwrap()
    }

    fn descriptor(digest: &str, platform: Option<Platform>) -> Descriptor {
        Descriptor {
            media_type: MEDIA_TYPE_OCI_MANIFEST.to_string(),
            digest: digest.to_string(),
            size: 1,
            urls: Vec::new(),
            platform,
        }
    }

    #[test]
    fn foreign_layers_keep_their_urls() {
        let m = servercore_manifest();
        assert_eq!(m.config.size, 3100);
        assert_eq!(m.layers[0].size, 1_500_000_000);
        assert_eq!(m.layers[0].urls.len(), 1);
        assert!(m.layers[1].urls.is_empty());

        // Empty url lists and platforms stay out of re-serialized documents.
        let out = serde_json::to_value(&m.layers[1]).unwrap();
        assert!(out.get("urls").is_none());
        assert!(out.get("platform").is_none());
    }

    #[test]
    fn index_selection_by_os_and_variant() {
        let arm = |v: &str| Platform {
            architecture: "arm64".to_string(),
            os: "linux".to_string(),
            variant: Some(v.to_string()),
        };
        let idx = ImageIndex {
            schema_version: 2,
            manifests: vec![
                descriptor("sha256:attestation", None),
                descriptor("sha256:win", Some(Platform::parse("windows/amd64").unwrap())),
                descriptor("sha256:v7", Some(arm("v7"))),
                descriptor("sha256:v8", Some(arm("v8"))),
            ],
        };

        let pick = |raw: &str| idx.select_platform(&Platform::parse(raw).unwrap()).map(|d| d.digest.clone());
        assert_eq!(pick("windows/amd64").unwrap(), "sha256:win");
        assert_eq!(pick("linux/arm64").unwrap(), "sha256:v7");
        assert_eq!(pick("linux/arm64/v8").unwrap(), "sha256:v8");
        let err = pick("windows/arm64").unwrap_err();
        assert!(err.to_string().contains("4 candidates"), "{}", err);
    }

    #[test]
    fn platform_strings() {
        assert!(Platform::parse("windows").is_err());
        assert!(Platform::parse("/amd64").is_err());
        assert!(Platform::parse("linux/arm/v7/extra").is_err());
        assert_eq!(Platform::parse("linux/arm/v7").unwrap().variant.as_deref(), Some("v7"));
        assert!(!Platform::host().os.is_empty());
    }

    #[test]
    fn config_without_container_section_has_no_env() {
        let cfg: ImageConfig = serde_json::from_value(json!({
            "os": "windows",
            "rootfs": { "type": "layers", "diff_ids": ["sha256:d1"] }
        }))
        .unwrap();
        assert!(cfg.env().is_empty());
        assert_eq!(cfg.rootfs.fs_type, "layers");

        let cfg: ImageConfig = serde_json::from_value(json!({
            "config": { "Env": ["ComSpec=C:\\Windows\\cmd.exe"], "WorkingDir": "C:\\app" }
        }))
        .unwrap();
        assert_eq!(cfg.env(), ["ComSpec=C:\\Windows\\cmd.exe"]);
        assert_eq!(cfg.config.unwrap().working_dir, "C:\\app");
    }

    #[test]
    fn media_type_classes() {
        for t in [MEDIA_TYPE_OCI_INDEX, MEDIA_TYPE_DOCKER_MANIFEST_LIST] {
            assert!(is_index_media_type(t) && !is_manifest_media_type(t));
        }
        for t in [MEDIA_TYPE_OCI_MANIFEST, MEDIA_TYPE_DOCKER_MANIFEST] {
            assert!(is_manifest_media_type(t) && !is_index_media_type(t));
        }
        assert!(is_config_media_type(MEDIA_TYPE_OCI_CONFIG));
        assert!(!is_config_media_type(MEDIA_TYPE_OCI_LAYER_ZSTD));
    }
}
