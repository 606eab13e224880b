//! Error types for the docx2jats library.
//!
//! A single fatal error type, [`ConvertError`], covers everything that can
//! abort one conversion: a bad input file, a failing conversion engine, or
//! engine output that is not a parseable JATS article. Errors never leak
//! across conversions; a batch run reports one `Result` per input.
//!
//! Content that merely *looks like* a figure or a flattenable table cell but
//! does not match is not an error. The repair stages leave it untouched.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the docx2jats library.
#[derive(Debug, Error)]
pub enum ConvertError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("Input file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The file extension is neither `.docx` nor a Markdown extension.
    #[error("Unsupported input format '{extension}' for '{path}'. Supported formats: .docx, .md")]
    UnsupportedFormat { path: PathBuf, extension: String },

    /// The file has a `.docx` extension but is not a zip container.
    #[error("'{path}' is not a valid DOCX file (magic bytes: {magic:?})")]
    InvalidDocx { path: PathBuf, magic: [u8; 4] },

    /// The file is larger than the configured admission limit.
    #[error("Input '{path}' is {size} bytes, over the {limit}-byte limit")]
    InputTooLarge { path: PathBuf, size: u64, limit: u64 },

    // ── Engine errors ─────────────────────────────────────────────────────
    /// The conversion engine binary could not be located.
    #[error("Conversion engine '{name}' is not installed or not found in PATH.\nInstall pandoc from https://pandoc.org/installing.html or pass --pandoc <PATH>.")]
    EngineNotFound { name: String },

    /// The engine ran but exited unsuccessfully.
    #[error("Conversion engine failed ({status}): {stderr}")]
    EngineFailed { status: String, stderr: String },

    /// The engine did not finish within the configured timeout.
    #[error("Conversion engine timed out after {secs}s on '{path}'")]
    EngineTimeout { path: PathBuf, secs: u64 },

    // ── Malformed-input errors ────────────────────────────────────────────
    /// The engine output is not well-formed XML.
    #[error("Malformed JATS XML at byte {position}: {detail}")]
    MalformedXml { position: u64, detail: String },

    /// The document root is not a JATS `<article>`.
    #[error("Expected an <article> root element, found <{found}>")]
    UnexpectedRoot { found: String },

    /// A structurally required element is absent.
    #[error("Missing required element: <{0}>")]
    MissingElement(&'static str),

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not read an input or intermediate file.
    #[error("Failed to read '{path}': {source}")]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Could not create or write the output file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ConvertError {
    /// True for errors caused by the engine's output rather than the user's
    /// input file or environment.
    pub fn is_malformed_input(&self) -> bool {
        matches!(
            self,
            ConvertError::MalformedXml { .. }
                | ConvertError::UnexpectedRoot { .. }
                | ConvertError::MissingElement(_)
        )
    }
}
