//! Output types returned by the conversion entry points.

use crate::config::{SourceFormat, TargetFormat};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// The result of converting one document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversionOutput {
    /// Final document text: repaired JATS XML or fixed-up Markdown.
    pub content: String,
    /// Input file as given by the caller.
    pub input: PathBuf,
    pub source: SourceFormat,
    pub target: TargetFormat,
    /// What the repair stages changed. All zero for Markdown output.
    pub report: PipelineReport,
    /// Engine version string, when the engine reported one.
    pub engine_version: Option<String>,
    /// Wall-clock time of the whole conversion.
    pub duration_ms: u64,
}

/// Per-stage counters for one run of the repair pipeline.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineReport {
    /// Loose body runs wrapped in a new `<sec>`.
    pub sections_wrapped: usize,
    /// Existing sections that had no id and got one.
    pub sections_identified: usize,
    /// Image + caption pairs rewritten into `<fig>`.
    pub figures_synthesized: usize,
    /// Table cells whose block content was flattened.
    pub cells_flattened: usize,
    /// Identifiers minted by the allocator across all stages.
    pub ids_minted: usize,
    /// Duplicate identifiers replaced by the final audit.
    pub ids_repaired: usize,
}

impl PipelineReport {
    /// True when the pipeline left the document structurally unchanged.
    pub fn is_noop(&self) -> bool {
        *self == Self::default()
    }
}

/// Outcome of one input in a batch run.
#[derive(Debug)]
pub struct BatchItem {
    pub input: PathBuf,
    /// Where the output was written, on success.
    pub result: Result<(PathBuf, ConversionOutput), crate::error::ConvertError>,
}
