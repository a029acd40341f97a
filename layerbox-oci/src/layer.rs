use serde::Serialize;

use crate::digest::{sha256_hex, strip_algorithm};
use crate::manifest::{ImageConfig, OciManifest};
use crate::{OciError, Result};

/// Metadata about one layer of an image, in base-to-top order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LayerInfo {
    /// Digest of the blob as stored (e.g. "sha256:abcdef…"); empty or a
    /// path for sources that have no content address.
    pub blob_id: String,
    /// Bare hex digest of the uncompressed tar.
    pub diff_id: String,
    /// Bare hex chain ID; names the layer directory in the store.
    pub chain_id: String,
    /// Chain ID of the layer below, empty for the base layer.
    pub parent_chain_id: String,
    /// Size in bytes as advertised by the source.
    pub size: i64,
    pub media_type: String,
    /// Alternate download locations for foreign layers.
    pub urls: Vec<String>,
}

/// Compute the chain ID of a layer from its parent's chain ID and its diff ID.
///
/// The base layer's chain ID is its diff ID.
pub fn chain_id(parent_chain_id: Option<&str>, diff_id: &str) -> String {
    let diff_id = strip_algorithm(diff_id);
    match parent_chain_id {
        None => diff_id.to_string(),
        Some(parent) => sha256_hex(format!("{} {}", strip_algorithm(parent), diff_id).as_bytes()),
    }
}

/// Compute all chain IDs for an ordered (base-to-top) list of diff IDs.
pub fn chain_ids(diff_ids: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(diff_ids.len());
    for diff in diff_ids {
        let next = chain_id(out.last().map(String::as_str), diff);
        out.push(next);
    }
    out
}

/// Pair manifest layers with config diff IDs and compute their chain IDs.
pub fn layer_infos(manifest: &OciManifest, config: &ImageConfig) -> Result<Vec<LayerInfo>> {
    let diff_ids = &config.rootfs.diff_ids;
    if manifest.layers.len() != diff_ids.len() {
        return Err(OciError::Manifest(format!(
            "manifest lists {} layers but config has {} diff_ids",
            manifest.layers.len(),
            diff_ids.len()
        )));
    }

    let chains = chain_ids(diff_ids);
    let infos = manifest
        .layers
        .iter()
        .zip(diff_ids)
        .enumerate()
        .map(|(i, (desc, diff))| LayerInfo {
            blob_id: desc.digest.clone(),
            diff_id: strip_algorithm(diff).to_string(),
            chain_id: chains[i].clone(),
            parent_chain_id: if i == 0 {
                String::new()
            } else {
                chains[i - 1].clone()
            },
            size: desc.size,
            media_type: desc.media_type.clone(),
            urls: desc.urls.clone(),
        })
        .collect();
    Ok(infos)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::{Descriptor, RootFs};

    fn desc(digest: &str, size: i64) -> Descriptor {
        Descriptor {
            media_type: crate::manifest::MEDIA_TYPE_OCI_LAYER_GZIP.to_string(),
            digest: digest.to_string(),
            size,
            urls: Vec::new(),
            platform: None,
        }
    }

    #[test]
    fn base_chain_id_is_diff_id() {
        assert_eq!(chain_id(None, "sha256:abc"), "abc");
        assert_eq!(chain_ids(&["abc".to_string()]), vec!["abc"]);
    }

    #[test]
    fn chain_id_hashes_parent_and_diff() {
        let ids = chain_ids(&["a".to_string(), "b".to_string(), "c".to_string()]);
        let second = sha256_hex(b"a b");
        let third = sha256_hex(format!("{} c", second).as_bytes());
        assert_eq!(ids, vec!["a".to_string(), second, third]);
    }

    #[test]
    fn chain_ids_are_deterministic_and_order_sensitive() {
        let forward = chain_ids(&["a".to_string(), "b".to_string()]);
        assert_eq!(forward, chain_ids(&["a".to_string(), "b".to_string()]));

        let reversed = chain_ids(&["b".to_string(), "a".to_string()]);
        assert_ne!(forward[1], reversed[1]);
    }

    #[test]
    fn layer_infos_link_parents() {
        let manifest = OciManifest {
            schema_version: 2,
            media_type: String::new(),
            config: desc("sha256:cfg", 10),
            layers: vec![desc("sha256:blob1", 100), desc("sha256:blob2", 200)],
        };
        let config = ImageConfig {
            rootfs: RootFs {
                fs_type: "layers".to_string(),
                diff_ids: vec!["sha256:d1".to_string(), "sha256:d2".to_string()],
            },
            ..Default::default()
        };

        let infos = layer_infos(&manifest, &config).unwrap();
        assert_eq!(infos.len(), 2);
        assert_eq!(infos[0].chain_id, "d1");
        assert_eq!(infos[0].parent_chain_id, "");
        assert_eq!(infos[1].diff_id, "d2");
        assert_eq!(infos[1].parent_chain_id, "d1");
        assert_eq!(infos[1].chain_id, sha256_hex(b"d1 d2"));
        assert_eq!(infos[1].blob_id, "sha256:blob2");
        assert_eq!(infos[1].size, 200);
    }

    #[test]
    fn layer_infos_rejects_count_mismatch() {
        let manifest = OciManifest {
            schema_version: 2,
            media_type: String::new(),
            config: desc("sha256:cfg", 10),
            layers: vec![desc("sha256:blob1", 100)],
        };
        let config = ImageConfig::default();
        assert!(matches!(
            layer_infos(&manifest, &config),
            Err(OciError::Manifest(_))
        ));
    }
}
