/// Errors produced while resolving and fetching images.
#[derive(Debug, thiserror::Error)]
pub enum OciError {
    #[error("registry error: {0}")]
    Registry(String),

    #[error("manifest error: {0}")]
    Manifest(String),

    #[error("layer error: {0}")]
    Layer(String),

    #[error("invalid image source: {0}")]
    InvalidSource(String),

    #[error("digest mismatch for {what}: expected {expected}, got {actual}")]
    DigestMismatch {
        what: &'static str,
        expected: String,
        actual: String,
    },

    #[error("exceeded maximum download attempts ({attempts}) for blob {digest}")]
    MaxRetries { digest: String, attempts: u32 },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("not found: {0}")]
    NotFound(String),
}

impl OciError {
    /// Whether a failed download attempt may be retried.
    ///
    /// Content verification failures and malformed inputs are terminal; only
    /// transport and server-side failures are worth another attempt.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            OciError::Http(_) | OciError::Io(_) | OciError::Registry(_)
        )
    }
}

/// Result of image resolution and blob fetching.
pub type Result<T> = std::result::Result<T, OciError>;
