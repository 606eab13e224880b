//! Conversion pipeline: input handling, the engine-output repair stages, and
//! the Markdown text fixups.
//!
//! Each submodule implements exactly one transformation step. The JATS
//! repair stages are functions `Document → Document` that share a
//! [`PipelineContext`] for identifier minting and counters, so each stage is
//! testable on its own.
//!
//! ## Data Flow
//!
//! ```text
//! engine ──▶ parse ──▶ sections ──▶ figures ──▶ cells ──▶ ids audit ──▶ serialize
//! (pandoc)  (quick-xml) (wrap runs)  (synthesize) (flatten) (fill/dedupe)  (XML text)
//! ```
//!
//! 1. [`sections`]: wrap loose top-level body content in `<sec>` and give
//!    existing sections an id. Runs first: figure detection works inside
//!    section-scoped sibling lists and must not pair nodes across sections.
//! 2. [`figures`]: rewrite image + "Figure N:" caption pairs into `<fig>`.
//! 3. [`cells`]: flatten block content inside table cells. Runs after
//!    figures so cells are flattened in their final shape.
//! 4. [`ids`]: the allocator used by every stage, plus the final audit
//!    guaranteeing every addressable element has a document-unique id.
//!
//! [`input`] resolves files before the engine runs and [`postprocess`] fixes
//! the engine's DOCX → Markdown output.

pub mod cells;
pub mod figures;
pub mod ids;
pub mod input;
pub mod postprocess;
pub mod sections;

use crate::config::ConversionConfig;
use crate::error::ConvertError;
use crate::jats::{self, Document, Node};
use crate::output::PipelineReport;
use ids::IdAllocator;
use tracing::debug;

/// Per-conversion state threaded through every repair stage.
///
/// Created fresh for each document and dropped after serialization; never
/// shared between conversions.
#[derive(Debug, Default)]
pub struct PipelineContext {
    pub ids: IdAllocator,
    pub report: PipelineReport,
}

impl PipelineContext {
    pub fn new(ids: IdAllocator) -> Self {
        Self {
            ids,
            report: PipelineReport::default(),
        }
    }
}

/// Trim whitespace at both ends of an inline sequence's top-level text.
pub(crate) fn trim_inline_edges(mut nodes: Vec<Node>) -> Vec<Node> {
    while let Some(Node::Text(t)) = nodes.first_mut() {
        let trimmed = t.trim_start().to_string();
        if trimmed.is_empty() {
            nodes.remove(0);
        } else {
            *t = trimmed;
            break;
        }
    }
    while let Some(Node::Text(t)) = nodes.last_mut() {
        let trimmed = t.trim_end().to_string();
        if trimmed.is_empty() {
            nodes.pop();
        } else {
            *t = trimmed;
            break;
        }
    }
    nodes
}

/// Run every repair stage over a parsed article, in order.
pub fn run(doc: Document, ctx: &mut PipelineContext) -> Document {
    ids::reserve_existing(&doc, &mut ctx.ids);

    let doc = sections::wrap_sections(doc, ctx);
    debug!(
        "sections: {} wrapped, {} ids assigned",
        ctx.report.sections_wrapped, ctx.report.sections_identified
    );

    let doc = figures::synthesize_figures(doc, ctx);
    debug!("figures: {} synthesized", ctx.report.figures_synthesized);

    let doc = cells::flatten_table_cells(doc, ctx);
    debug!("cells: {} flattened", ctx.report.cells_flattened);

    let doc = ids::audit_identifiers(doc, ctx);
    ctx.report.ids_minted = ctx.ids.minted();
    debug!(
        "ids: {} minted, {} duplicates repaired",
        ctx.report.ids_minted, ctx.report.ids_repaired
    );
    doc
}

/// Parse engine JATS output, repair it, and serialize the result.
///
/// The only error path is malformed input; once parsed, every stage is total.
pub fn repair_jats(
    xml: &str,
    config: &ConversionConfig,
) -> Result<(String, PipelineReport), ConvertError> {
    let doc = jats::parse_article(xml)?;
    let mut ctx = PipelineContext::new(IdAllocator::new(config.id_suffix_len));
    let doc = run(doc, &mut ctx);
    Ok((jats::to_xml(&doc), ctx.report))
}
