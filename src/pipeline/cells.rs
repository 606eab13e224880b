//! Table-Cell Flattener: block content inside `<td>`/`<th>` → flat inline run.
//!
//! The platform's table renderer cannot display paragraphs, block quotes or
//! line breaks inside a cell. Per cell:
//!
//! ```text
//! SCAN ─▶ block child? ──no──▶ SKIP
//!              │yes
//!              ▼
//!        UNWRAP_QUOTES ─▶ COLLECT_SEGMENTS ─▶ JOIN("; ") ─▶ REPLACE
//! ```
//!
//! Detection only looks at direct children, so an already-flat cell is never
//! touched again.

use super::{trim_inline_edges, PipelineContext};
use crate::jats::{Document, Element, Node, TagKind};

/// Text inserted between two collected segments.
pub const SEGMENT_SEPARATOR: &str = "; ";

/// Flatten every table cell in the body that holds block-level children.
pub fn flatten_table_cells(mut doc: Document, ctx: &mut PipelineContext) -> Document {
    if let Some(body) = doc.body_mut() {
        visit(body, ctx);
    }
    doc
}

fn visit(element: &mut Element, ctx: &mut PipelineContext) {
    // Nested tables first, so an inner cell is flat before its outer cell
    // moves it around.
    for child in element.child_elements_mut() {
        visit(child, ctx);
    }
    if element.kind() == TagKind::TableCell && flatten_cell(element) {
        ctx.report.cells_flattened += 1;
    }
}

fn is_block(node: &Node) -> bool {
    matches!(
        node.kind(),
        Some(TagKind::Paragraph | TagKind::Quotation | TagKind::Break)
    )
}

/// Flatten one cell in place. Returns false when the cell was skipped.
pub fn flatten_cell(cell: &mut Element) -> bool {
    if !cell.children.iter().any(is_block) {
        return false;
    }

    let mut segments = Vec::new();
    let mut loose = Vec::new();
    collect_segments(std::mem::take(&mut cell.children), &mut segments, &mut loose);
    flush(&mut loose, &mut segments);

    let mut flat = Vec::new();
    for (i, segment) in segments.into_iter().enumerate() {
        if i > 0 {
            flat.push(Node::text(SEGMENT_SEPARATOR));
        }
        flat.extend(segment);
    }
    cell.children = merge_text(flat);
    true
}

fn collect_segments(nodes: Vec<Node>, segments: &mut Vec<Vec<Node>>, loose: &mut Vec<Node>) {
    for node in nodes {
        match node {
            Node::Element(e) if e.kind() == TagKind::Paragraph => {
                flush(loose, segments);
                let mut segment = Vec::new();
                for child in e.children {
                    push_without_breaks(child, &mut segment);
                }
                flush(&mut segment, segments);
            }
            Node::Element(e) if e.kind() == TagKind::Quotation => {
                flush(loose, segments);
                collect_segments(e.children, segments, loose);
                flush(loose, segments);
            }
            other => push_without_breaks(other, loose),
        }
    }
}

/// Append `node` with every `<break/>` at any depth removed.
fn push_without_breaks(node: Node, out: &mut Vec<Node>) {
    match node {
        Node::Element(e) if e.kind() == TagKind::Break => {}
        Node::Element(mut e) => {
            let children = std::mem::take(&mut e.children);
            for child in children {
                push_without_breaks(child, &mut e.children);
            }
            out.push(Node::Element(e));
        }
        other => out.push(other),
    }
}

/// Close the pending segment; blank segments vanish.
fn flush(pending: &mut Vec<Node>, segments: &mut Vec<Vec<Node>>) {
    let segment = trim_inline_edges(std::mem::take(pending));
    if segment.iter().any(Node::is_content) {
        segments.push(segment);
    }
}

fn merge_text(nodes: Vec<Node>) -> Vec<Node> {
    let mut out: Vec<Node> = Vec::with_capacity(nodes.len());
    for node in nodes {
        match (out.last_mut(), node) {
            (Some(Node::Text(prev)), Node::Text(t)) => prev.push_str(&t),
            (_, node) => out.push(node),
        }
    }
    out
}
