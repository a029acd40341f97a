use async_trait::async_trait;
use reqwest::header::{ACCEPT, AUTHORIZATION, WWW_AUTHENTICATE};
use reqwest::StatusCode;
use std::future::Future;
use std::time::Duration;
use tempfile::NamedTempFile;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use crate::blob::{decompress_verified, LayerBlob};
use crate::digest;
use crate::error::{OciError, Result};
use crate::fetcher::{Fetcher, ImageInfo};
use crate::layer::{layer_infos, LayerInfo};
use crate::manifest::{
    self, ImageConfig, ImageIndex, OciManifest, Platform, MEDIA_TYPE_DOCKER_MANIFEST,
    MEDIA_TYPE_DOCKER_MANIFEST_LIST, MEDIA_TYPE_OCI_INDEX, MEDIA_TYPE_OCI_MANIFEST,
};
use crate::source::ImageSource;

/// Attempts per layer download.
pub const LAYER_DOWNLOAD_ATTEMPTS: u32 = 5;
/// Attempts per manifest or config fetch.
pub const METADATA_ATTEMPTS: u32 = 3;
/// Base delay; attempt `n` waits `n * base` before the next try.
pub const DEFAULT_BACKOFF: Duration = Duration::from_secs(1);

const DOCKER_HUB: &str = "registry-1.docker.io";

/// `registry/repository` plus a tag or `sha256:` digest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRef {
    pub registry: String,
    pub repository: String,
    /// Tag, or digest when the reference used `@`.
    pub reference: String,
}

impl ImageRef {
    /// Parse `[registry/]repository[:tag|@digest]`. The registry defaults to
    /// Docker Hub, where single-name repositories live under `library/`.
    pub fn parse(raw: &str) -> Result<Self> {
        let raw = raw.trim();
        let invalid = || OciError::InvalidSource(format!("invalid image reference '{}'", raw));

        let (name, reference) = match raw.split_once('@') {
            Some((name, digest)) => (name, digest),
            None => match raw.rsplit_once(':') {
                // A colon before the last '/' is a registry port, not a tag.
                Some((name, tag)) if !tag.contains('/') => (name, tag),
                _ => (raw, "latest"),
            },
        };
        if name.is_empty() || reference.is_empty() {
            return Err(invalid());
        }

        let (registry, repository) = match name.split_once('/') {
            Some((host, rest)) if is_registry_host(host) => (host, rest.to_string()),
            _ => (DOCKER_HUB, name.to_string()),
        };
        if repository.is_empty() {
            return Err(invalid());
        }
        let registry = if registry == "docker.io" { DOCKER_HUB } else { registry };
        let repository = if registry == DOCKER_HUB && !repository.contains('/') {
            format!("library/{}", repository)
        } else {
            repository
        };

        Ok(Self {
            registry: registry.to_string(),
            repository,
            reference: reference.to_string(),
        })
    }
}

fn is_registry_host(component: &str) -> bool {
    component == "localhost" || component.contains(['.', ':'])
}

/// Loopback registries are spoken to over plain HTTP.
fn is_loopback(registry: &str) -> bool {
    let host = registry
        .rsplit_once(':')
        .map_or(registry, |(host, _)| host)
        .trim_matches(['[', ']']);
    matches!(host, "localhost" | "127.0.0.1" | "::1")
}

/// The `Bearer` challenge from a `401`'s `www-authenticate` header.
#[derive(Debug, Default, PartialEq, Eq)]
struct BearerChallenge {
    realm: String,
    service: Option<String>,
    scope: Option<String>,
}

impl BearerChallenge {
    fn parse(header: &str) -> Option<Self> {
        let params = header.trim().strip_prefix("Bearer ")?;
        let mut challenge = BearerChallenge::default();
        for pair in params.split("\",") {
            let (key, value) = pair.split_once('=')?;
            let value = value.trim_matches('"').to_string();
            match key.trim().trim_start_matches(',') {
                "realm" => challenge.realm = value,
                "service" => challenge.service = Some(value),
                "scope" => challenge.scope = Some(value),
                _ => {}
            }
        }
        (!challenge.realm.is_empty()).then_some(challenge)
    }
}

#[derive(serde::Deserialize)]
struct TokenResponse {
    token: Option<String>,
    access_token: Option<String>,
}

/// HTTP client for the OCI distribution API.
pub struct RegistryClient {
    client: reqwest::Client,
}

impl RegistryClient {
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("layerbox/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client })
    }

    fn url(image_ref: &ImageRef, kind: &str, reference: &str) -> String {
        let scheme = if is_loopback(&image_ref.registry) { "http" } else { "https" };
        format!(
            "{}://{}/v2/{}/{}/{}",
            scheme, image_ref.registry, image_ref.repository, kind, reference,
        )
    }

    /// The document behind `image_ref`'s tag or digest: a manifest, or an
    /// index to pick a platform from.
    pub async fn fetch_manifest(&self, image_ref: &ImageRef) -> Result<ManifestResponse> {
        let url = Self::url(image_ref, "manifests", &image_ref.reference);
        let accept = [
            MEDIA_TYPE_OCI_INDEX,
            MEDIA_TYPE_DOCKER_MANIFEST_LIST,
            MEDIA_TYPE_OCI_MANIFEST,
            MEDIA_TYPE_DOCKER_MANIFEST,
        ]
        .join(", ");

        let body = self.authenticated_get(&url, image_ref, Some(&accept)).await?;

        let doc: serde_json::Value = serde_json::from_slice(&body)?;
        let is_index = doc
            .get("mediaType")
            .and_then(|v| v.as_str())
            .is_some_and(manifest::is_index_media_type)
            || doc.get("manifests").is_some();
        if is_index {
            Ok(ManifestResponse::Index(serde_json::from_value(doc)?))
        } else {
            Ok(ManifestResponse::Manifest(serde_json::from_value(doc)?))
        }
    }

    /// A platform manifest picked out of an index, checked against `digest`.
    pub async fn fetch_manifest_by_digest(
        &self,
        image_ref: &ImageRef,
        digest: &str,
    ) -> Result<OciManifest> {
        let url = Self::url(image_ref, "manifests", digest);
        let accept = [MEDIA_TYPE_OCI_MANIFEST, MEDIA_TYPE_DOCKER_MANIFEST].join(", ");
        let body = self.authenticated_get(&url, image_ref, Some(&accept)).await?;
        digest::verify("manifest", &body, digest)?;
        Ok(serde_json::from_slice(&body)?)
    }

    /// A small blob, such as an image config, read into memory.
    pub async fn fetch_blob(&self, image_ref: &ImageRef, digest: &str) -> Result<Vec<u8>> {
        let url = Self::url(image_ref, "blobs", digest);
        self.authenticated_get(&url, image_ref, None).await
    }

    /// Stream a layer blob into a temp file. Foreign layers are fetched from
    /// their first alternate URL without registry auth.
    pub async fn download_blob(
        &self,
        image_ref: &ImageRef,
        layer: &LayerInfo,
    ) -> Result<NamedTempFile> {
        let mut resp = match layer.urls.first() {
            Some(foreign) => {
                debug!(url = %foreign, "downloading foreign layer");
                check_status(foreign, self.client.get(foreign).send().await?).await?
            }
            None => {
                let url = Self::url(image_ref, "blobs", &layer.blob_id);
                self.authenticated_send(&url, image_ref, None).await?
            }
        };

        let tmp = NamedTempFile::new()?;
        let mut out = tokio::fs::File::from_std(tmp.reopen()?);
        let mut written: u64 = 0;
        while let Some(chunk) = resp.chunk().await? {
            out.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        out.flush().await?;
        debug!(blob_id = %layer.blob_id, bytes = written, "blob downloaded");
        Ok(tmp)
    }

    /// The manifest for `platform`, following an index if there is one.
    pub async fn resolve_manifest(
        &self,
        image_ref: &ImageRef,
        platform: &Platform,
    ) -> Result<OciManifest> {
        match self.fetch_manifest(image_ref).await? {
            ManifestResponse::Manifest(m) => Ok(m),
            ManifestResponse::Index(idx) => {
                let desc = idx.select_platform(platform)?;
                info!(
                    digest = %desc.digest,
                    os = %platform.os,
                    arch = %platform.architecture,
                    "platform manifest selected"
                );
                self.fetch_manifest_by_digest(image_ref, &desc.digest).await
            }
        }
    }

    async fn authenticated_get(
        &self,
        url: &str,
        image_ref: &ImageRef,
        accept: Option<&str>,
    ) -> Result<Vec<u8>> {
        let resp = self.authenticated_send(url, image_ref, accept).await?;
        Ok(resp.bytes().await?.to_vec())
    }

    /// GET `url`, retrying once with a bearer token if the registry
    /// challenges the anonymous request.
    async fn authenticated_send(
        &self,
        url: &str,
        image_ref: &ImageRef,
        accept: Option<&str>,
    ) -> Result<reqwest::Response> {
        let get = |token: Option<&str>| {
            let mut req = self.client.get(url);
            if let Some(accept) = accept {
                req = req.header(ACCEPT, accept);
            }
            if let Some(token) = token {
                req = req.header(AUTHORIZATION, format!("Bearer {}", token));
            }
            req
        };

        let resp = get(None).send().await?;
        if resp.status() != StatusCode::UNAUTHORIZED {
            return check_status(url, resp).await;
        }

        let challenge = resp
            .headers()
            .get(WWW_AUTHENTICATE)
            .and_then(|v| v.to_str().ok())
            .and_then(BearerChallenge::parse)
            .ok_or_else(|| {
                OciError::Registry(format!("{} requires auth without a bearer challenge", url))
            })?;
        let token = self.fetch_token(&challenge, image_ref).await?;
        check_status(url, get(Some(&token)).send().await?).await
    }

    async fn fetch_token(&self, challenge: &BearerChallenge, image_ref: &ImageRef) -> Result<String> {
        let scope = challenge
            .scope
            .clone()
            .unwrap_or_else(|| format!("repository:{}:pull", image_ref.repository));
        let mut query = vec![("scope", scope)];
        if let Some(service) = &challenge.service {
            query.push(("service", service.clone()));
        }
        debug!(realm = %challenge.realm, "requesting registry token");

        let resp = self.client.get(&challenge.realm).query(&query).send().await?;
        let body: TokenResponse = check_status(&challenge.realm, resp).await?.json().await?;
        body.token
            .or(body.access_token)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| OciError::Registry(format!("{} returned no token", challenge.realm)))
    }
}

async fn check_status(url: &str, resp: reqwest::Response) -> Result<reqwest::Response> {
    let status = resp.status();
    if status.is_success() {
        Ok(resp)
    } else if status == StatusCode::NOT_FOUND {
        Err(OciError::NotFound(url.to_string()))
    } else {
        let body = resp.text().await.unwrap_or_default();
        Err(OciError::Registry(format!(
            "GET {} returned {}: {}",
            url,
            status,
            one_line(&body)
        )))
    }
}

const ERROR_BODY_LIMIT: usize = 200;

/// An error response body squeezed onto one line and cut to
/// [`ERROR_BODY_LIMIT`] characters.
fn one_line(body: &str) -> String {
    let squeezed = body.split_whitespace().collect::<Vec<_>>().join(" ");
    match squeezed.char_indices().nth(ERROR_BODY_LIMIT) {
        Some((cut, _)) => format!("{}...", &squeezed[..cut]),
        None => squeezed,
    }
}

/// What a manifest endpoint returned.
pub enum ManifestResponse {
    Manifest(OciManifest),
    Index(ImageIndex),
}

/// [`Fetcher`] for `docker://` sources.
pub struct RegistryFetcher {
    client: RegistryClient,
    platform: Platform,
    backoff: Duration,
}

impl RegistryFetcher {
    pub fn new() -> Result<Self> {
        Ok(Self {
            client: RegistryClient::new()?,
            platform: Platform::host(),
            backoff: DEFAULT_BACKOFF,
        })
    }

    pub fn with_platform(mut self, platform: Platform) -> Self {
        self.platform = platform;
        self
    }

    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    /// The platform picked out of multi-platform images.
    pub fn platform(&self) -> &Platform {
        &self.platform
    }

    fn image_ref(source: &ImageSource) -> Result<&ImageRef> {
        match source {
            ImageSource::Registry(r) => Ok(r),
            other => Err(OciError::InvalidSource(format!(
                "registry fetcher cannot handle '{}'",
                other
            ))),
        }
    }
}

#[async_trait]
impl Fetcher for RegistryFetcher {
    async fn image_info(&self, source: &ImageSource) -> Result<ImageInfo> {
        let image_ref = Self::image_ref(source)?;
        info!(image = %source, "resolving image");

        let manifest = retry("manifest", METADATA_ATTEMPTS, self.backoff, || {
            self.client.resolve_manifest(image_ref, &self.platform)
        })
        .await?;

        let config_digest = manifest.config.digest.clone();
        let raw = retry(&config_digest, METADATA_ATTEMPTS, self.backoff, || {
            self.client.fetch_blob(image_ref, &config_digest)
        })
        .await?;
        digest::verify("config", &raw, &config_digest)?;
        let config: ImageConfig = serde_json::from_slice(&raw)?;

        let layer_infos = layer_infos(&manifest, &config)?;
        info!(image = %source, layers = layer_infos.len(), "image resolved");
        Ok(ImageInfo {
            layer_infos,
            config,
        })
    }

    async fn stream_blob(&self, source: &ImageSource, layer: &LayerInfo) -> Result<LayerBlob> {
        let image_ref = Self::image_ref(source)?;

        let downloaded = retry(&layer.blob_id, LAYER_DOWNLOAD_ATTEMPTS, self.backoff, || {
            self.client.download_blob(image_ref, layer)
        })
        .await
        .map_err(|e| {
            if e.is_transient() {
                OciError::MaxRetries {
                    digest: layer.blob_id.clone(),
                    attempts: LAYER_DOWNLOAD_ATTEMPTS,
                }
            } else {
                e
            }
        })?;

        let layer = layer.clone();
        tokio::task::spawn_blocking(move || -> Result<LayerBlob> {
            let compressed = downloaded.reopen()?;
            decompress_verified(compressed, &layer)
        })
        .await
        .map_err(|e| OciError::Layer(format!("decompress task failed: {}", e)))?
    }
}

/// Run `op` up to `attempts` times, sleeping `attempt * backoff` between
/// transient failures. Returns the last error when attempts run out.
async fn retry<T, F, Fut>(what: &str, attempts: u32, backoff: Duration, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(v) => return Ok(v),
            Err(e) if e.is_transient() && attempt < attempts => {
                warn!(what, attempt, error = %e, "fetch failed, retrying");
                tokio::time::sleep(backoff * attempt).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
