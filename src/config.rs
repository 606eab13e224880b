//! Configuration types for DOCX/Markdown → JATS conversion.
//!
//! All conversion behaviour is controlled through [`ConversionConfig`], built
//! via its [`ConversionConfigBuilder`]. One struct holds every knob, so a
//! config can be shared across the concurrent conversions of a batch and
//! logged as a whole.

use crate::engine::ConversionEngine;
use crate::error::ConvertError;
use crate::pipeline::ids::{DEFAULT_SUFFIX_LEN, MAX_SUFFIX_LEN, MIN_SUFFIX_LEN};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Default admission limit on input size: 50 MiB.
pub const DEFAULT_MAX_INPUT_BYTES: u64 = 50 * 1024 * 1024;

/// Configuration for a conversion.
///
/// Built via [`ConversionConfig::builder()`] or using
/// [`ConversionConfig::default()`].
///
/// # Example
/// ```rust
/// use docx2jats::{ConversionConfig, TargetFormat};
///
/// let config = ConversionConfig::builder()
///     .docx_target(TargetFormat::Jats)
///     .id_suffix_len(16)
///     .concurrency(2)
///     .build()
///     .unwrap();
/// assert_eq!(config.id_suffix_len, 16);
/// ```
#[derive(Clone)]
pub struct ConversionConfig {
    /// Explicit path to the `pandoc` binary. If None, `pandoc` is looked up
    /// on `PATH`.
    pub pandoc_path: Option<PathBuf>,

    /// Pre-constructed engine. Takes precedence over `pandoc_path`.
    pub engine: Option<Arc<dyn ConversionEngine>>,

    /// What a `.docx` input is converted to. Default: Markdown.
    ///
    /// [`TargetFormat::Jats`] runs two engine passes through a temporary
    /// Markdown file so the Markdown fixups apply before the JATS repair.
    /// Markdown inputs always convert to JATS.
    pub docx_target: TargetFormat,

    /// Apply the Markdown fixups to DOCX → Markdown output. Default: true.
    pub fix_markdown: bool,

    /// Width of the hex suffix on minted identifiers. Range: 8–32. Default: 24.
    pub id_suffix_len: usize,

    /// Inputs larger than this are rejected before the engine runs.
    /// Default: 50 MiB.
    pub max_input_bytes: u64,

    /// Per-engine-call timeout in seconds. Default: 120.
    pub engine_timeout_secs: u64,

    /// Number of files converted concurrently by [`crate::convert_batch`].
    /// Default: 4.
    pub concurrency: usize,
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            pandoc_path: None,
            engine: None,
            docx_target: TargetFormat::Markdown,
            fix_markdown: true,
            id_suffix_len: DEFAULT_SUFFIX_LEN,
            max_input_bytes: DEFAULT_MAX_INPUT_BYTES,
            engine_timeout_secs: 120,
            concurrency: 4,
        }
    }
}

impl fmt::Debug for ConversionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConversionConfig")
            .field("pandoc_path", &self.pandoc_path)
            .field("engine", &self.engine.as_ref().map(|e| e.name()))
            .field("docx_target", &self.docx_target)
            .field("fix_markdown", &self.fix_markdown)
            .field("id_suffix_len", &self.id_suffix_len)
            .field("max_input_bytes", &self.max_input_bytes)
            .field("engine_timeout_secs", &self.engine_timeout_secs)
            .field("concurrency", &self.concurrency)
            .finish()
    }
}

impl ConversionConfig {
    /// Create a new builder for `ConversionConfig`.
    pub fn builder() -> ConversionConfigBuilder {
        ConversionConfigBuilder {
            config: Self::default(),
        }
    }

    /// The output format for an input of the given format.
    pub fn target_for(&self, source: SourceFormat) -> TargetFormat {
        match source {
            SourceFormat::Docx => self.docx_target,
            SourceFormat::Markdown => TargetFormat::Jats,
        }
    }
}

/// Builder for [`ConversionConfig`].
#[derive(Debug)]
pub struct ConversionConfigBuilder {
    config: ConversionConfig,
}

impl ConversionConfigBuilder {
    pub fn pandoc_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.pandoc_path = Some(path.into());
        self
    }

    pub fn engine(mut self, engine: Arc<dyn ConversionEngine>) -> Self {
        self.config.engine = Some(engine);
        self
    }

    pub fn docx_target(mut self, target: TargetFormat) -> Self {
        self.config.docx_target = target;
        self
    }

    pub fn fix_markdown(mut self, v: bool) -> Self {
        self.config.fix_markdown = v;
        self
    }

    pub fn id_suffix_len(mut self, len: usize) -> Self {
        self.config.id_suffix_len = len;
        self
    }

    pub fn max_input_bytes(mut self, bytes: u64) -> Self {
        self.config.max_input_bytes = bytes;
        self
    }

    pub fn engine_timeout_secs(mut self, secs: u64) -> Self {
        self.config.engine_timeout_secs = secs;
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n.max(1);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ConversionConfig, ConvertError> {
        let c = &self.config;
        if !(MIN_SUFFIX_LEN..=MAX_SUFFIX_LEN).contains(&c.id_suffix_len) {
            return Err(ConvertError::InvalidConfig(format!(
                "Identifier suffix width must be {}–{}, got {}",
                MIN_SUFFIX_LEN, MAX_SUFFIX_LEN, c.id_suffix_len
            )));
        }
        if c.max_input_bytes == 0 {
            return Err(ConvertError::InvalidConfig(
                "Maximum input size must be > 0".into(),
            ));
        }
        if c.engine_timeout_secs == 0 {
            return Err(ConvertError::InvalidConfig(
                "Engine timeout must be ≥ 1 second".into(),
            ));
        }
        Ok(self.config)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// Input document format, detected from the file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceFormat {
    Docx,
    Markdown,
}

impl SourceFormat {
    /// Detect the format from a path's extension, case-insensitively.
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "docx" => Some(SourceFormat::Docx),
            "md" | "markdown" => Some(SourceFormat::Markdown),
            _ => None,
        }
    }

    /// Engine reader name.
    pub fn engine_name(self) -> &'static str {
        match self {
            SourceFormat::Docx => "docx",
            SourceFormat::Markdown => "markdown",
        }
    }
}

impl fmt::Display for SourceFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.engine_name())
    }
}

/// Output document format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetFormat {
    /// Engine Markdown with the DOCX fixups applied. (default for DOCX)
    #[default]
    Markdown,
    /// Repaired JATS archiving XML.
    Jats,
}

impl TargetFormat {
    /// File extension for the default output path.
    pub fn extension(self) -> &'static str {
        match self {
            TargetFormat::Markdown => "md",
            TargetFormat::Jats => "xml",
        }
    }
}

impl fmt::Display for TargetFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetFormat::Markdown => f.write_str("markdown"),
            TargetFormat::Jats => f.write_str("jats"),
        }
    }
}
