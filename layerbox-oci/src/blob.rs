use flate2::read::GzDecoder;
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::Path;
use tempfile::NamedTempFile;
use tracing::{debug, warn};

use crate::digest::{strip_algorithm, HashingReader};
use crate::layer::LayerInfo;
use crate::{OciError, Result};

// ---------------------------------------------------------------------------
// LayerBlob
// ---------------------------------------------------------------------------

/// An uncompressed layer tar stream ready for unpacking.
///
/// Downloaded layers live in a temporary file that is deleted when the blob
/// is dropped. Local tar sources are read in place.
pub struct LayerBlob {
    backing: Backing,
}

enum Backing {
    Temp(NamedTempFile),
    File(File),
}

impl LayerBlob {
    /// Wrap a local file that must not be removed afterwards.
    pub fn from_file(file: File) -> Self {
        Self {
            backing: Backing::File(file),
        }
    }

    fn from_temp(mut tmp: NamedTempFile) -> Result<Self> {
        tmp.as_file_mut().seek(SeekFrom::Start(0))?;
        Ok(Self {
            backing: Backing::Temp(tmp),
        })
    }

    /// Path of the temp file backing this blob, if any.
    pub fn temp_path(&self) -> Option<&Path> {
        match &self.backing {
            Backing::Temp(tmp) => Some(tmp.path()),
            Backing::File(_) => None,
        }
    }
}

impl Read for LayerBlob {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match &mut self.backing {
            Backing::Temp(tmp) => tmp.as_file_mut().read(buf),
            Backing::File(f) => f.read(buf),
        }
    }
}

impl std::fmt::Debug for LayerBlob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.backing {
            Backing::Temp(tmp) => write!(f, "LayerBlob(temp {})", tmp.path().display()),
            Backing::File(_) => write!(f, "LayerBlob(file)"),
        }
    }
}

// ---------------------------------------------------------------------------
// Decompression + verification
// ---------------------------------------------------------------------------

/// Decompress a layer blob into a temp file, verifying both the compressed
/// digest (`blob_id`) and the uncompressed digest (`diff_id`).
///
/// Verification is skipped for a digest the layer does not carry (empty).
pub fn decompress_verified<R: Read>(compressed: R, layer: &LayerInfo) -> Result<LayerBlob> {
    let mut tmp = NamedTempFile::new()?;
    let mut blob_hasher = HashingReader::new(compressed);

    let diff_actual = {
        let decoder = decompressor(&layer.media_type, &mut blob_hasher)?;
        let mut diff_hasher = HashingReader::new(decoder);
        let written = io::copy(&mut diff_hasher, tmp.as_file_mut())
            .map_err(|e| OciError::Layer(format!("decompress {}: {}", layer.blob_id, e)))?;
        debug!(blob_id = %layer.blob_id, bytes = written, "layer decompressed");
        diff_hasher.hex()
    };

    // Compressed streams may carry trailing padding the decoder never reads.
    io::copy(&mut blob_hasher, &mut io::sink())?;
    let blob_actual = blob_hasher.hex();

    check("blob", &layer.blob_id, &blob_actual)?;
    check("diff_id", &layer.diff_id, &diff_actual)?;

    LayerBlob::from_temp(tmp)
}

fn check(what: &'static str, expected: &str, actual: &str) -> Result<()> {
    let expected = strip_algorithm(expected);
    if expected.is_empty() || expected == actual {
        return Ok(());
    }
    Err(OciError::DigestMismatch {
        what,
        expected: expected.to_string(),
        actual: actual.to_string(),
    })
}

/// Return a `Read`er that decompresses `reader` according to the media type.
fn decompressor<'a, R: Read + 'a>(media_type: &str, reader: R) -> Result<Box<dyn Read + 'a>> {
    if media_type.contains("gzip") {
        Ok(Box::new(GzDecoder::new(reader)))
    } else if media_type.contains("zstd") {
        let decoder =
            zstd::Decoder::new(reader).map_err(|e| OciError::Layer(format!("zstd init: {}", e)))?;
        Ok(Box::new(decoder))
    } else if media_type.contains("tar") && !media_type.contains('+') {
        Ok(Box::new(reader))
    } else {
        warn!(media_type, "unknown compression; assuming gzip");
        Ok(Box::new(GzDecoder::new(reader)))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
