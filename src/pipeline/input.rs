//! Input resolution: validate a user-supplied path before the engine runs.
//!
//! Checks happen in order: existence, read permission, format from the
//! extension, the size limit, and for DOCX the zip magic bytes, so callers get
//! a meaningful error rather than an engine failure on garbage input.

use crate::config::{SourceFormat, TargetFormat};
use crate::error::ConvertError;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Local-file header magic of a zip container, which every DOCX is.
const ZIP_MAGIC: [u8; 4] = *b"PK\x03\x04";

/// A validated input file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedInput {
    pub path: PathBuf,
    pub format: SourceFormat,
    pub size: u64,
}

/// Validate `path` and detect its format.
pub fn resolve_input(path: &Path, max_bytes: u64) -> Result<ResolvedInput, ConvertError> {
    if !path.exists() {
        return Err(ConvertError::FileNotFound {
            path: path.to_path_buf(),
        });
    }

    let mut file = match std::fs::File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            return Err(ConvertError::PermissionDenied {
                path: path.to_path_buf(),
            });
        }
        Err(_) => {
            return Err(ConvertError::FileNotFound {
                path: path.to_path_buf(),
            });
        }
    };

    let format = SourceFormat::from_path(path).ok_or_else(|| ConvertError::UnsupportedFormat {
        path: path.to_path_buf(),
        extension: path
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy()))
            .unwrap_or_else(|| "(none)".to_string()),
    })?;

    let size = file
        .metadata()
        .map_err(|source| ConvertError::ReadFailed {
            path: path.to_path_buf(),
            source,
        })?
        .len();
    if size > max_bytes {
        return Err(ConvertError::InputTooLarge {
            path: path.to_path_buf(),
            size,
            limit: max_bytes,
        });
    }

    if format == SourceFormat::Docx {
        let mut magic = [0u8; 4];
        if file.read_exact(&mut magic).is_err() || magic != ZIP_MAGIC {
            return Err(ConvertError::InvalidDocx {
                path: path.to_path_buf(),
                magic,
            });
        }
    }

    debug!("Resolved {} input: {} ({} bytes)", format, path.display(), size);
    Ok(ResolvedInput {
        path: path.to_path_buf(),
        format,
        size,
    })
}

/// Output path next to the input: same stem, target extension.
pub fn default_output_path(input: &Path, target: TargetFormat) -> PathBuf {
    input.with_extension(target.extension())
}
