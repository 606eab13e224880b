//! Section Wrapper: every top-level body content run ends up inside `<sec>`.
//!
//! The engine emits a `<sec>` per Markdown heading, but anything before the
//! first heading (or between headings when the source skips levels) lands
//! directly in `<body>`. The publishing platform only addresses content
//! through sections, so each maximal run of non-section nodes is wrapped in a
//! new section, in place, without reordering anything.

use super::PipelineContext;
use crate::jats::{Document, Element, Node, TagKind};

/// Prefix for every section identifier.
pub const SECTION_ID_PREFIX: &str = "heading-";

/// Wrap loose body runs in new sections and give id-less sections an id.
///
/// An empty body stays empty. Runs holding only comments or layout
/// whitespace are left where they are.
pub fn wrap_sections(mut doc: Document, ctx: &mut PipelineContext) -> Document {
    if let Some(body) = doc.body_mut() {
        let children = std::mem::take(&mut body.children);
        let mut wrapped = Vec::with_capacity(children.len());
        let mut run: Vec<Node> = Vec::new();

        for node in children {
            if node.kind() == Some(TagKind::Section) {
                flush_run(&mut run, &mut wrapped, ctx);
                wrapped.push(node);
            } else {
                run.push(node);
            }
        }
        flush_run(&mut run, &mut wrapped, ctx);
        body.children = wrapped;

        identify_sections(body, ctx);
    }
    doc
}

fn flush_run(run: &mut Vec<Node>, out: &mut Vec<Node>, ctx: &mut PipelineContext) {
    if run.is_empty() {
        return;
    }
    if !run.iter().any(Node::is_content) {
        out.append(run);
        return;
    }
    let mut section = Element::new("sec");
    section.set_id(ctx.ids.allocate(SECTION_ID_PREFIX));
    section.children = std::mem::take(run);
    out.push(Node::Element(section));
    ctx.report.sections_wrapped += 1;
}

/// Sections at any depth keep an existing id and get one if missing.
fn identify_sections(element: &mut Element, ctx: &mut PipelineContext) {
    for child in element.child_elements_mut() {
        if child.kind() == TagKind::Section && child.id().is_none() {
            child.set_id(ctx.ids.allocate(SECTION_ID_PREFIX));
            ctx.report.sections_identified += 1;
        }
        identify_sections(child, ctx);
    }
}
