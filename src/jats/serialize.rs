//! Tree → well-formed XML text.
//!
//! Block containers without character data are re-indented two spaces per
//! level; everything else (paragraphs, cells, front-matter text fields) is
//! written compactly so no whitespace is added to mixed content.

use super::{is_block_container, Document, Element, Node, PrologItem};
use quick_xml::escape::{escape, partial_escape};

const INDENT: &str = "  ";

/// Serialize a document with a UTF-8 declaration and a trailing newline.
pub fn to_xml(doc: &Document) -> String {
    let mut out = String::with_capacity(4096);
    out.push_str("<?xml version=\"1.0\" encoding=\"utf-8\" ?>\n");
    for item in &doc.prolog {
        match item {
            PrologItem::DocType(d) => out.push_str(&format!("<!DOCTYPE {d}>")),
            PrologItem::Comment(c) => out.push_str(&format!("<!--{c}-->")),
            PrologItem::Instruction(pi) => out.push_str(&format!("<?{pi}?>")),
        }
        out.push('\n');
    }
    write_element(&mut out, &doc.root, 0, true);
    out.push('\n');
    out
}

/// Serialize a single element compactly. Handy for logging and tests.
pub fn element_to_string(element: &Element) -> String {
    let mut out = String::new();
    write_element(&mut out, element, 0, false);
    out
}

fn write_element(out: &mut String, element: &Element, depth: usize, pretty: bool) {
    out.push('<');
    out.push_str(&element.name);
    for (key, value) in &element.attributes {
        out.push(' ');
        out.push_str(key);
        out.push_str("=\"");
        out.push_str(&escape(value.as_str()));
        out.push('"');
    }

    if element.children.is_empty() {
        out.push_str(" />");
        return;
    }
    out.push('>');

    let indent_children = pretty
        && is_block_container(&element.name)
        && element
            .children
            .iter()
            .all(|c| !matches!(c, Node::Text(_) | Node::CData(_)));

    if indent_children {
        for child in &element.children {
            out.push('\n');
            push_indent(out, depth + 1);
            write_node(out, child, depth + 1, true);
        }
        out.push('\n');
        push_indent(out, depth);
    } else {
        for child in &element.children {
            write_node(out, child, depth, false);
        }
    }

    out.push_str("</");
    out.push_str(&element.name);
    out.push('>');
}

fn write_node(out: &mut String, node: &Node, depth: usize, pretty: bool) {
    match node {
        Node::Element(e) => write_element(out, e, depth, pretty),
        Node::Text(t) => out.push_str(&partial_escape(t.as_str())),
        Node::CData(d) => {
            out.push_str("<![CDATA[");
            out.push_str(d);
            out.push_str("]]>");
        }
        Node::Comment(c) => {
            out.push_str("<!--");
            out.push_str(c);
            out.push_str("-->");
        }
        Node::Instruction(pi) => {
            out.push_str("<?");
            out.push_str(pi);
            out.push_str("?>");
        }
    }
}

fn push_indent(out: &mut String, depth: usize) {
    for _ in 0..depth {
        out.push_str(INDENT);
    }
}
