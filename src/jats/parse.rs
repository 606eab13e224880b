//! quick-xml reader → [`Document`].
//!
//! The engine's output is untrusted structurally but must at least be
//! well-formed XML with an `<article>` root and a `<body>`. Anything else is a
//! malformed-input error and aborts the conversion; the pipeline never sees a
//! partial tree.

use super::{is_block_container, Document, Element, Node, PrologItem};
use crate::error::ConvertError;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

/// Parse engine output into a JATS article, checking the root/body structure.
pub fn parse_article(xml: &str) -> Result<Document, ConvertError> {
    let doc = parse_document(xml)?;
    if doc.root.name != "article" {
        return Err(ConvertError::UnexpectedRoot {
            found: doc.root.name.clone(),
        });
    }
    if doc.body().is_none() {
        return Err(ConvertError::MissingElement("body"));
    }
    Ok(doc)
}

/// Parse any well-formed XML document into the tree.
///
/// Whitespace-only text directly inside block containers is dropped; all
/// other character data is kept verbatim with entities resolved.
pub fn parse_document(xml: &str) -> Result<Document, ConvertError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(false);

    let mut prolog = Vec::new();
    let mut stack: Vec<Element> = Vec::new();
    let mut root: Option<Element> = None;

    loop {
        let event = reader.read_event().map_err(|e| ConvertError::MalformedXml {
            position: reader.error_position(),
            detail: e.to_string(),
        })?;
        let position = reader.buffer_position();

        match event {
            Event::Start(e) => {
                if root.is_some() {
                    return Err(malformed(position, "content after the root element"));
                }
                stack.push(element_from(&e, position)?);
            }
            Event::Empty(e) => {
                let element = element_from(&e, position)?;
                attach(&mut stack, &mut root, Node::Element(element), position)?;
            }
            Event::End(_) => {
                // quick-xml has already checked the end name against the start.
                let mut element = stack
                    .pop()
                    .ok_or_else(|| malformed(position, "unmatched end tag"))?;
                if is_block_container(&element.name) {
                    element.children.retain(|c| !c.is_blank_text());
                }
                attach(&mut stack, &mut root, Node::Element(element), position)?;
            }
            Event::Text(e) => {
                let text = String::from_utf8_lossy(&e).into_owned();
                push_text(&mut stack, text, position)?;
            }
            Event::GeneralRef(e) => {
                let entity = String::from_utf8_lossy(&e).into_owned();
                let resolved = resolve_entity(&entity).ok_or_else(|| {
                    malformed(position, &format!("unknown entity '&{entity};'"))
                })?;
                push_text(&mut stack, resolved, position)?;
            }
            Event::CData(e) => {
                let data = String::from_utf8_lossy(&e).into_owned();
                match stack.last_mut() {
                    Some(parent) => parent.children.push(Node::CData(data)),
                    None => return Err(malformed(position, "CDATA outside the root element")),
                }
            }
            Event::Comment(e) => {
                let comment = String::from_utf8_lossy(&e).into_owned();
                match stack.last_mut() {
                    Some(parent) => parent.children.push(Node::Comment(comment)),
                    None => prolog.push(PrologItem::Comment(comment)),
                }
            }
            Event::PI(e) => {
                let target = String::from_utf8_lossy(e.target()).into_owned();
                let content = String::from_utf8_lossy(e.content()).trim().to_string();
                let pi = if content.is_empty() {
                    target
                } else {
                    format!("{target} {content}")
                };
                match stack.last_mut() {
                    Some(parent) => parent.children.push(Node::Instruction(pi)),
                    None => prolog.push(PrologItem::Instruction(pi)),
                }
            }
            Event::DocType(e) => {
                let doctype = String::from_utf8_lossy(&e).trim().to_string();
                prolog.push(PrologItem::DocType(doctype));
            }
            // The serializer always writes its own UTF-8 declaration.
            Event::Decl(_) => {}
            Event::Eof => break,
        }
    }

    if let Some(open) = stack.last() {
        return Err(malformed(
            reader.buffer_position(),
            &format!("unclosed element <{}>", open.name),
        ));
    }
    let root = root.ok_or(ConvertError::MissingElement("article"))?;
    Ok(Document { prolog, root })
}

fn malformed(position: u64, detail: &str) -> ConvertError {
    ConvertError::MalformedXml {
        position,
        detail: detail.to_string(),
    }
}

fn element_from(start: &BytesStart<'_>, position: u64) -> Result<Element, ConvertError> {
    let mut element = Element::new(String::from_utf8_lossy(start.name().as_ref()).into_owned());
    for attr in start.attributes() {
        let attr = attr.map_err(|e| malformed(position, &e.to_string()))?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let raw = String::from_utf8_lossy(&attr.value).into_owned();
        let value = quick_xml::escape::unescape(&raw)
            .map_err(|e| malformed(position, &format!("attribute '{key}': {e}")))?
            .into_owned();
        element.attributes.push((key, value));
    }
    Ok(element)
}

fn attach(
    stack: &mut [Element],
    root: &mut Option<Element>,
    node: Node,
    position: u64,
) -> Result<(), ConvertError> {
    match stack.last_mut() {
        Some(parent) => {
            parent.children.push(node);
            Ok(())
        }
        None => match (node, root.is_some()) {
            (Node::Element(element), false) => {
                *root = Some(element);
                Ok(())
            }
            _ => Err(malformed(position, "more than one root element")),
        },
    }
}

/// Append character data, merging with a preceding text node so that
/// entity references do not split runs of text.
fn push_text(stack: &mut [Element], text: String, position: u64) -> Result<(), ConvertError> {
    match stack.last_mut() {
        Some(parent) => {
            match parent.children.last_mut() {
                Some(Node::Text(prev)) => prev.push_str(&text),
                _ => parent.children.push(Node::Text(text)),
            }
            Ok(())
        }
        None if text.trim().is_empty() => Ok(()),
        None => Err(malformed(position, "text outside the root element")),
    }
}

fn resolve_entity(entity: &str) -> Option<String> {
    match entity {
        "apos" => return Some("'".to_string()),
        "quot" => return Some("\"".to_string()),
        "lt" => return Some("<".to_string()),
        "gt" => return Some(">".to_string()),
        "amp" => return Some("&".to_string()),
        _ => {}
    }

    let code = if let Some(hex) = entity.strip_prefix("#x") {
        u32::from_str_radix(hex, 16).ok()?
    } else {
        entity.strip_prefix('#')?.parse::<u32>().ok()?
    };
    char::from_u32(code).map(|c| c.to_string())
}
