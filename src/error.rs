//! Error types for layerbox

use thiserror::Error;

/// Result type alias using layerbox Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in layerbox operations
#[derive(Error, Debug)]
pub enum Error {
    /// No store directory was configured
    #[error("driver store path is empty")]
    EmptyDriverStore,

    /// A layer or volume with this ID is already present
    #[error("layer already exists: {id}")]
    LayerExists { id: String },

    /// The backend returned no mount path for a volume
    #[error("volume path for {id} is empty")]
    MissingVolumePath { id: String },

    /// Disk limits must not be negative
    #[error("invalid disk limit: {limit}")]
    InvalidDiskLimit { limit: i64 },

    /// The limit leaves no room beside the image itself
    #[error("disk limit {limit} is too small: base image is {base} bytes")]
    DiskLimitTooSmall { limit: i64, base: i64 },

    /// The image alone is larger than the requested limit
    #[error("layers exceed disk quota {total}/{limit} bytes")]
    QuotaExceeded { total: i64, limit: i64 },

    /// Layer, quota, or privilege backend failures
    #[error("backend error: {0}")]
    Backend(String),

    /// Configuration errors
    #[error("configuration error: {0}")]
    Config(String),

    /// Image source errors
    #[error(transparent)]
    Oci(#[from] layerbox_oci::OciError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

impl Error {
    pub(crate) fn backend(context: impl std::fmt::Display, err: impl std::fmt::Display) -> Self {
        Error::Backend(format!("{}: {}", context, err))
    }
}
