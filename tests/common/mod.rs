#![allow(dead_code)]

use std::path::Path;

use layerbox_oci::digest::sha256_hex;
use serde_json::json;

pub enum Entry<'a> {
    File(&'a str, &'a [u8]),
    Dir(&'a str),
    Link(&'a str, &'a str),
}

/// Build an uncompressed layer tar.
pub fn layer_tar(entries: &[Entry<'_>]) -> Vec<u8> {
    let mut builder = tar::Builder::new(Vec::new());
    for entry in entries {
        let mut header = tar::Header::new_gnu();
        header.set_mtime(0);
        match entry {
            Entry::File(name, body) => {
                header.set_entry_type(tar::EntryType::Regular);
                header.set_path(name).unwrap();
                header.set_size(body.len() as u64);
                header.set_mode(0o644);
                header.set_cksum();
                builder.append(&header, *body).unwrap();
            }
            Entry::Dir(name) => {
                header.set_entry_type(tar::EntryType::Directory);
                header.set_path(name).unwrap();
                header.set_size(0);
                header.set_mode(0o755);
                header.set_cksum();
                builder.append(&header, std::io::empty()).unwrap();
            }
            Entry::Link(name, target) => {
                header.set_entry_type(tar::EntryType::Link);
                header.set_path(name).unwrap();
                header.set_link_name(target).unwrap();
                header.set_size(0);
                header.set_mode(0o644);
                header.set_cksum();
                builder.append(&header, std::io::empty()).unwrap();
            }
        }
    }
    builder.into_inner().unwrap()
}

fn write_blob(root: &Path, data: &[u8]) -> String {
    let hex = sha256_hex(data);
    let dir = root.join("blobs").join("sha256");
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join(&hex), data).unwrap();
    format!("sha256:{}", hex)
}

/// Write an OCI image layout with plain-tar `layers` (base first) and the
/// given config environment. Returns the layers' diff IDs.
pub fn write_layout(root: &Path, layers: &[Vec<u8>], env: &[&str]) -> Vec<String> {
    let mut descriptors = Vec::new();
    let mut diff_ids = Vec::new();
    for layer in layers {
        let digest = write_blob(root, layer);
        descriptors.push(json!({
            "mediaType": "application/vnd.oci.image.layer.v1.tar",
            "digest": digest,
            "size": layer.len(),
        }));
        diff_ids.push(digest);
    }

    let config = serde_json::to_vec(&json!({
        "os": "windows",
        "architecture": "amd64",
        "config": { "Env": env },
        "rootfs": { "type": "layers", "diff_ids": diff_ids },
    }))
    .unwrap();
    let config_digest = write_blob(root, &config);

    let manifest = serde_json::to_vec(&json!({
        "schemaVersion": 2,
        "mediaType": "application/vnd.oci.image.manifest.v1+json",
        "config": {
            "mediaType": "application/vnd.oci.image.config.v1+json",
            "digest": config_digest,
            "size": config.len(),
        },
        "layers": descriptors,
    }))
    .unwrap();
    let manifest_digest = write_blob(root, &manifest);

    std::fs::write(
        root.join("index.json"),
        serde_json::to_vec(&json!({
            "schemaVersion": 2,
            "manifests": [{
                "mediaType": "application/vnd.oci.image.manifest.v1+json",
                "digest": manifest_digest,
                "size": manifest.len(),
            }],
        }))
        .unwrap(),
    )
    .unwrap();

    diff_ids
        .iter()
        .map(|d| d.trim_start_matches("sha256:").to_string())
        .collect()
}
