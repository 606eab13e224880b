//! Figure Synthesizer: image reference + "Figure N:" caption → `<fig>`.
//!
//! The engine renders a Markdown image as `<inline-graphic>` in its own
//! paragraph (or as an unlabeled `<fig>` when the image stands alone), and the
//! manuscript's "Figure 1: …" caption as a plain paragraph next to it. The
//! platform needs a full figure element instead:
//!
//! ```text
//! <fig id="fig-…">
//!   <object-id id="object-id-…">fig-…</object-id>
//!   <label id="label-…">Figure 1</label>
//!   <caption id="caption-…">
//!     <title id="title-…" />
//!     <p id="p-…">A caption.</p>
//!   </caption>
//!   <graphic id="graphic-…" mime-subtype="png" mimetype="image" xlink:href="img1.png" />
//! </fig>
//! ```
//!
//! Matching is structural: candidates are adjacent siblings (layout
//! whitespace between them is ignored) within one container, so a pair never
//! spans two sections. The regex only extracts the label from the caption
//! paragraph's text. Anything ambiguous is left alone.

use super::{trim_inline_edges, PipelineContext};
use crate::jats::{Document, Element, Node, TagKind};
use once_cell::sync::Lazy;
use regex::Regex;

pub const FIGURE_ID_PREFIX: &str = "fig-";
pub const OBJECT_ID_PREFIX: &str = "object-id-";
pub const LABEL_ID_PREFIX: &str = "label-";
pub const CAPTION_ID_PREFIX: &str = "caption-";
pub const TITLE_ID_PREFIX: &str = "title-";
pub const PARAGRAPH_ID_PREFIX: &str = "p-";
pub const GRAPHIC_ID_PREFIX: &str = "graphic-";

/// "Figure 1:", "Fig. 2 –", "Figure 2.1.", "FIGURE 3" (label only), with
/// free whitespace. Numbers may be dotted; a `.` only separates when followed
/// by whitespace or the end. Text after the number without a separator
/// ("Figure 1 shows…", "Figure 1.5 shows…") is prose.
static RE_CAPTION_LABEL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)^\s*(fig(?:ure)?\.?)\s*(\d+(?:\.\d+)*[a-z]?)\s*(?:(?:[:\-\x{2013}\x{2014}]|\.(?:\s|$))\s*|$)",
    )
    .unwrap()
});

/// Rewrite every image + caption pair in the body into a figure element.
pub fn synthesize_figures(mut doc: Document, ctx: &mut PipelineContext) -> Document {
    if let Some(body) = doc.body_mut() {
        scan_container(body, ctx);
    }
    doc
}

/// A detected image reference.
#[derive(Debug, Clone)]
struct ImageRef {
    href: String,
    alt: String,
    /// `mime-subtype` the engine already put on the image, if any.
    declared_subtype: Option<String>,
    /// Text following the image inside its paragraph.
    trailing: Vec<Node>,
    /// Id of an unlabeled engine figure being replaced.
    existing_id: Option<String>,
}

/// A detected caption paragraph.
#[derive(Debug, Clone)]
struct CaptionRef {
    label: String,
    body: Vec<Node>,
}

#[derive(Debug, Clone)]
enum Candidate {
    Image(ImageRef),
    Caption(CaptionRef),
    Blank,
    Other,
}

/// Containers whose children may hold figure patterns.
fn can_hold_figures(element: &Element) -> bool {
    !matches!(
        element.kind(),
        TagKind::Paragraph
            | TagKind::Figure
            | TagKind::Caption
            | TagKind::Title
            | TagKind::Label
            | TagKind::Emphasis
            | TagKind::FootnoteRef
            | TagKind::Graphic
            | TagKind::InlineGraphic
            | TagKind::AltText
            | TagKind::ObjectId
    )
}

fn scan_container(container: &mut Element, ctx: &mut PipelineContext) {
    for child in container.child_elements_mut() {
        if can_hold_figures(child) {
            scan_container(child, ctx);
        }
    }
    let children = std::mem::take(&mut container.children);
    container.children = rewrite_siblings(children, ctx);
}

fn rewrite_siblings(nodes: Vec<Node>, ctx: &mut PipelineContext) -> Vec<Node> {
    let candidates: Vec<Candidate> = nodes.iter().map(classify).collect();
    if !candidates.iter().any(|c| matches!(c, Candidate::Image(_))) {
        return nodes;
    }

    let next = |from: usize| (from + 1..candidates.len()).find(|&j| !matches!(candidates[j], Candidate::Blank));
    let mut slots: Vec<Option<Node>> = nodes.into_iter().map(Some).collect();
    let mut out = Vec::with_capacity(slots.len());
    let mut i = 0;

    while i < slots.len() {
        if let Some(j) = next(i) {
            let pair = match (&candidates[i], &candidates[j]) {
                (Candidate::Image(image), Candidate::Caption(caption)) => Some((image, caption)),
                // Caption first only when the image is not claimed by a
                // caption that follows it.
                (Candidate::Caption(caption), Candidate::Image(image))
                    if !matches!(next(j).map(|k| &candidates[k]), Some(Candidate::Caption(_))) =>
                {
                    Some((image, caption))
                }
                _ => None,
            };
            if let Some(figure) = pair.and_then(|(image, caption)| build_figure(image, caption, ctx)) {
                out.push(Node::Element(figure));
                ctx.report.figures_synthesized += 1;
                i = j + 1;
                continue;
            }
        }
        if let Some(node) = slots[i].take() {
            out.push(node);
        }
        i += 1;
    }
    out
}

fn classify(node: &Node) -> Candidate {
    let element = match node {
        Node::Element(e) => e,
        n if n.is_blank_text() => return Candidate::Blank,
        _ => return Candidate::Other,
    };
    match element.kind() {
        TagKind::Graphic | TagKind::InlineGraphic => Candidate::Image(image_from(element, Vec::new(), None)),
        TagKind::Paragraph => classify_paragraph(element),
        TagKind::Figure => unlabeled_figure(element).map_or(Candidate::Other, Candidate::Image),
        _ => Candidate::Other,
    }
}

fn classify_paragraph(p: &Element) -> Candidate {
    let first = p.children.iter().position(|n| !n.is_blank_text());
    if let Some(first) = first {
        if let Node::Element(image) = &p.children[first] {
            if image.kind().is_image() {
                let trailing = p.children[first + 1..].to_vec();
                if trailing.iter().any(contains_image) {
                    return Candidate::Other;
                }
                return Candidate::Image(image_from(image, trim_inline_edges(trailing), None));
            }
        }
    }
    if p.children.iter().any(contains_image) {
        return Candidate::Other;
    }
    match caption_from(p) {
        Some(caption) => Candidate::Caption(caption),
        None => Candidate::Other,
    }
}

fn contains_image(node: &Node) -> bool {
    match node {
        Node::Element(e) => e.kind().is_image() || e.children.iter().any(contains_image),
        _ => false,
    }
}

/// The engine's implicit figure: a `<fig>` without a label wrapping exactly
/// one graphic.
fn unlabeled_figure(fig: &Element) -> Option<ImageRef> {
    if fig.child("label").is_some() {
        return None;
    }
    let mut graphics = fig.child_elements().filter(|e| e.kind().is_image());
    let graphic = graphics.next()?;
    if graphics.next().is_some() {
        return None;
    }
    let mut image = image_from(graphic, Vec::new(), fig.id().map(str::to_string));
    if image.alt.is_empty() {
        if let Some(caption) = fig.child("caption") {
            image.alt = caption.text_content().trim().to_string();
        }
    }
    Some(image)
}

fn image_from(element: &Element, trailing: Vec<Node>, existing_id: Option<String>) -> ImageRef {
    let alt = element
        .child("alt-text")
        .map(|a| a.text_content().trim().to_string())
        .or_else(|| element.attr("alt").map(str::to_string))
        .unwrap_or_default();
    ImageRef {
        href: element.attr("xlink:href").unwrap_or_default().to_string(),
        alt,
        declared_subtype: element.attr("mime-subtype").map(str::to_string),
        trailing,
        existing_id,
    }
}

fn caption_from(p: &Element) -> Option<CaptionRef> {
    let text = p.text_content();
    let caps = RE_CAPTION_LABEL.captures(&text)?;
    let whole = caps.get(0)?;
    let label = format!("{} {}", &caps[1], &caps[2]);
    let body = trim_inline_edges(strip_leading_text(p.children.clone(), whole.end()));
    Some(CaptionRef { label, body })
}

/// Remove the first `n` bytes of character data from an inline sequence,
/// descending into elements and dropping any emptied along the way.
fn strip_leading_text(nodes: Vec<Node>, mut n: usize) -> Vec<Node> {
    let mut out = Vec::with_capacity(nodes.len());
    for node in nodes {
        if n == 0 {
            out.push(node);
            continue;
        }
        match node {
            Node::Text(t) | Node::CData(t) if t.len() <= n => n -= t.len(),
            Node::Text(t) => {
                out.push(Node::Text(t[n..].to_string()));
                n = 0;
            }
            Node::CData(t) => {
                out.push(Node::CData(t[n..].to_string()));
                n = 0;
            }
            Node::Element(mut e) => {
                let len = e.text_content().len();
                if len <= n {
                    n -= len;
                } else {
                    e.children = strip_leading_text(std::mem::take(&mut e.children), n);
                    out.push(Node::Element(e));
                    n = 0;
                }
            }
            other => out.push(other),
        }
    }
    out
}

fn build_figure(image: &ImageRef, caption: &CaptionRef, ctx: &mut PipelineContext) -> Option<Element> {
    // The caption body comes from exactly one place: the caption paragraph,
    // or, for a label-only paragraph, the text after the image.
    let body = match (caption.body.is_empty(), image.trailing.is_empty()) {
        (_, true) => caption.body.clone(),
        (true, false) => image.trailing.clone(),
        (false, false) => return None,
    };

    let fig_id = image
        .existing_id
        .clone()
        .unwrap_or_else(|| ctx.ids.allocate(FIGURE_ID_PREFIX));

    let mut graphic = Element::new("graphic")
        .with_attr("id", ctx.ids.allocate(GRAPHIC_ID_PREFIX))
        .with_attr("mime-subtype", mime_subtype(&image.href, image.declared_subtype.as_deref()))
        .with_attr("mimetype", "image")
        .with_attr("xlink:href", image.href.clone());
    if !image.alt.is_empty() {
        graphic = graphic.with_child(Element::new("alt-text").with_text(image.alt.clone()));
    }

    let caption_el = Element::new("caption")
        .with_attr("id", ctx.ids.allocate(CAPTION_ID_PREFIX))
        .with_child(Element::new("title").with_attr("id", ctx.ids.allocate(TITLE_ID_PREFIX)))
        .with_child(
            Element::new("p")
                .with_attr("id", ctx.ids.allocate(PARAGRAPH_ID_PREFIX))
                .with_children(body),
        );

    Some(
        Element::new("fig")
            .with_attr("id", fig_id.clone())
            .with_child(
                Element::new("object-id")
                    .with_attr("id", ctx.ids.allocate(OBJECT_ID_PREFIX))
                    .with_text(fig_id),
            )
            .with_child(
                Element::new("label")
                    .with_attr("id", ctx.ids.allocate(LABEL_ID_PREFIX))
                    .with_text(caption.label.clone()),
            )
            .with_child(caption_el)
            .with_child(graphic),
    )
}

/// Best-effort `mime-subtype` from the file extension.
///
/// Unknown extensions pass through as written; with no extension at all the
/// engine's declared subtype (or an empty value) is used.
pub fn mime_subtype(href: &str, declared: Option<&str>) -> String {
    let path = href.split(['?', '#']).next().unwrap_or(href);
    let file = path.rsplit('/').next().unwrap_or(path);
    let ext = match file.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() && !ext.is_empty() => ext,
        _ => return declared.unwrap_or_default().to_string(),
    };
    match ext.to_ascii_lowercase().as_str() {
        "png" => "png".to_string(),
        "jpg" | "jpeg" => "jpg".to_string(),
        "gif" => "gif".to_string(),
        "tif" | "tiff" => "tiff".to_string(),
        "svg" => "svg+xml".to_string(),
        "bmp" => "bmp".to_string(),
        "webp" => "webp".to_string(),
        "eps" => "postscript".to_string(),
        _ => ext.to_string(),
    }
}
