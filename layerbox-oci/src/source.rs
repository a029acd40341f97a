use std::fmt;
use std::path::PathBuf;

use crate::registry::ImageRef;
use crate::{OciError, Result};

/// Where an image comes from, selected by URI scheme.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageSource {
    /// `docker://[registry/]repo[:tag|@digest]`
    Registry(ImageRef),
    /// `oci:///abs/path` (an OCI image layout directory)
    Layout(PathBuf),
    /// Anything else: a local tar file treated as a single-layer image.
    File(PathBuf),
}

impl ImageSource {
    /// Parse a rootfs URI.
    ///
    /// `docker:///ubuntu#22.04` (garden style) is accepted as an alias for
    /// `docker://ubuntu:22.04`.
    pub fn parse(uri: &str) -> Result<Self> {
        let uri = uri.trim();
        if uri.is_empty() {
            return Err(OciError::InvalidSource("empty image URI".to_string()));
        }

        if let Some(rest) = uri.strip_prefix("docker://") {
            let rest = rest.trim_start_matches('/').replacen('#', ":", 1);
            return Ok(ImageSource::Registry(ImageRef::parse(&rest)?));
        }

        if let Some(rest) = uri.strip_prefix("oci://") {
            if rest.is_empty() {
                return Err(OciError::InvalidSource(format!(
                    "'{}' does not name a layout directory",
                    uri
                )));
            }
            return Ok(ImageSource::Layout(PathBuf::from(rest)));
        }

        if let Some((scheme, _)) = uri.split_once("://") {
            return Err(OciError::InvalidSource(format!(
                "unsupported scheme '{}'",
                scheme
            )));
        }

        Ok(ImageSource::File(PathBuf::from(uri)))
    }
}

impl fmt::Display for ImageSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImageSource::Registry(r) => {
                let sep = if r.reference.starts_with("sha256:") { '@' } else { ':' };
                write!(f, "docker://{}/{}{}{}", r.registry, r.repository, sep, r.reference)
            }
            ImageSource::Layout(p) => write!(f, "oci://{}", p.display()),
            ImageSource::File(p) => write!(f, "{}", p.display()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_docker_uri() {
        match ImageSource::parse("docker://ghcr.io/foo/bar:v1").unwrap() {
            ImageSource::Registry(r) => {
                assert_eq!(r.registry, "ghcr.io");
                assert_eq!(r.repository, "foo/bar");
                assert_eq!(r.reference, "v1");
            }
            other => panic!("unexpected source {:?}", other),
        }
    }

    #[test]
    fn parse_garden_style_docker_uri() {
        match ImageSource::parse("docker:///busybox#1.36").unwrap() {
            ImageSource::Registry(r) => {
                assert_eq!(r.registry, "registry-1.docker.io");
                assert_eq!(r.repository, "library/busybox");
                assert_eq!(r.reference, "1.36");
            }
            other => panic!("unexpected source {:?}", other),
        }
    }

    #[test]
    fn parse_oci_layout_uri() {
        assert_eq!(
            ImageSource::parse("oci:///var/images/base").unwrap(),
            ImageSource::Layout(PathBuf::from("/var/images/base"))
        );
        assert!(ImageSource::parse("oci://").is_err());
    }

    #[test]
    fn plain_path_is_file_source() {
        assert_eq!(
            ImageSource::parse("/tmp/rootfs.tar").unwrap(),
            ImageSource::File(PathBuf::from("/tmp/rootfs.tar"))
        );
    }

    #[test]
    fn unknown_scheme_and_empty_are_rejected() {
        assert!(ImageSource::parse("ftp://host/file").is_err());
        assert!(ImageSource::parse("   ").is_err());
    }

    #[test]
    fn display_round_trips_registry_uri() {
        let src = ImageSource::parse("docker://localhost:5000/app@sha256:abc").unwrap();
        assert_eq!(src.to_string(), "docker://localhost:5000/app@sha256:abc");
    }
}
