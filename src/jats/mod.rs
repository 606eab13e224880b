//! Typed, mutable JATS document tree.
//!
//! The tree is deliberately small: elements keep their original tag name and
//! attribute order so anything the repair stages do not understand (front
//! matter, back matter, MathML, custom tags) round-trips untouched. The stages
//! reason about elements through [`TagKind`], a classification of the tag
//! names they care about.
//!
//! ```text
//! Document
//!  ├─ prolog    DOCTYPE, comments, processing instructions
//!  └─ root      <article>
//!      ├─ <front>   never mutated
//!      ├─ <body>    the only subtree the pipeline rewrites
//!      └─ <back>    never mutated
//! ```

pub mod parse;
pub mod serialize;

pub use parse::{parse_article, parse_document};
pub use serialize::to_xml;

/// Structural kind of an element, derived from its tag name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TagKind {
    Body,
    Section,
    Paragraph,
    Figure,
    ObjectId,
    Label,
    Caption,
    Title,
    /// Block-level `<graphic>`.
    Graphic,
    /// `<inline-graphic>`, the engine's rendering of a Markdown image.
    InlineGraphic,
    AltText,
    Table,
    TableRow,
    /// `<td>` or `<th>`.
    TableCell,
    /// `<disp-quote>`.
    Quotation,
    /// `<bold>`, `<italic>`, `<sup>` and friends.
    Emphasis,
    /// `<xref>`, typically `ref-type="fn"`.
    FootnoteRef,
    /// `<break/>`.
    Break,
    Other,
}

impl TagKind {
    pub fn of(name: &str) -> Self {
        match name {
            "body" => TagKind::Body,
            "sec" => TagKind::Section,
            "p" => TagKind::Paragraph,
            "fig" => TagKind::Figure,
            "object-id" => TagKind::ObjectId,
            "label" => TagKind::Label,
            "caption" => TagKind::Caption,
            "title" => TagKind::Title,
            "graphic" => TagKind::Graphic,
            "inline-graphic" => TagKind::InlineGraphic,
            "alt-text" => TagKind::AltText,
            "table" => TagKind::Table,
            "tr" => TagKind::TableRow,
            "td" | "th" => TagKind::TableCell,
            "disp-quote" => TagKind::Quotation,
            "bold" | "italic" | "underline" | "monospace" | "sc" | "sup" | "sub" | "strike"
            | "overline" | "roman" | "sans-serif" => TagKind::Emphasis,
            "xref" => TagKind::FootnoteRef,
            "break" => TagKind::Break,
            _ => TagKind::Other,
        }
    }

    /// Either flavour of image reference.
    pub fn is_image(self) -> bool {
        matches!(self, TagKind::Graphic | TagKind::InlineGraphic)
    }

    /// Identifier prefix for kinds that must carry an `id` after the pipeline.
    ///
    /// Paragraphs are only addressable inside a figure caption; callers
    /// decide that from context.
    pub fn id_prefix(self) -> Option<&'static str> {
        match self {
            TagKind::Section => Some("heading-"),
            TagKind::Figure => Some("fig-"),
            TagKind::ObjectId => Some("object-id-"),
            TagKind::Label => Some("label-"),
            TagKind::Caption => Some("caption-"),
            TagKind::Title => Some("title-"),
            TagKind::Graphic => Some("graphic-"),
            TagKind::Paragraph => Some("p-"),
            _ => None,
        }
    }
}

/// Tags whose children are purely structural: whitespace-only text between
/// them is layout, not content, and the serializer may re-indent them.
///
/// Anything not listed is treated as mixed content and kept byte-for-byte.
pub fn is_block_container(name: &str) -> bool {
    matches!(
        name,
        "article"
            | "front"
            | "body"
            | "back"
            | "sec"
            | "fig"
            | "fig-group"
            | "caption"
            | "table-wrap"
            | "table"
            | "thead"
            | "tbody"
            | "tfoot"
            | "tr"
            | "colgroup"
            | "disp-quote"
            | "list"
            | "list-item"
            | "fn-group"
            | "fn"
            | "ref-list"
            | "ref"
            | "app-group"
            | "app"
            | "ack"
            | "boxed-text"
            | "def-list"
            | "def-item"
            | "journal-meta"
            | "journal-title-group"
            | "article-meta"
            | "title-group"
            | "contrib-group"
            | "contrib"
            | "name"
            | "permissions"
            | "abstract"
            | "kwd-group"
            | "pub-date"
            | "history"
            | "date"
    )
}

/// One node of the tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Element(Element),
    /// Character data with entities already resolved.
    Text(String),
    CData(String),
    Comment(String),
    /// Processing instruction inside the root, stored as `target content`.
    Instruction(String),
}

impl Node {
    pub fn text(s: impl Into<String>) -> Self {
        Node::Text(s.into())
    }

    pub fn as_element(&self) -> Option<&Element> {
        match self {
            Node::Element(e) => Some(e),
            _ => None,
        }
    }

    pub fn as_element_mut(&mut self) -> Option<&mut Element> {
        match self {
            Node::Element(e) => Some(e),
            _ => None,
        }
    }

    /// Kind of the node if it is an element.
    pub fn kind(&self) -> Option<TagKind> {
        self.as_element().map(Element::kind)
    }

    /// Whitespace-only text.
    pub fn is_blank_text(&self) -> bool {
        matches!(self, Node::Text(t) if t.trim().is_empty())
    }

    /// Nodes that carry document content: elements and non-blank text.
    pub fn is_content(&self) -> bool {
        match self {
            Node::Element(_) | Node::CData(_) => true,
            Node::Text(t) => !t.trim().is_empty(),
            Node::Comment(_) | Node::Instruction(_) => false,
        }
    }

    /// Concatenated character data of this node and its descendants.
    pub fn text_content(&self) -> String {
        let mut out = String::new();
        self.push_text(&mut out);
        out
    }

    fn push_text(&self, out: &mut String) {
        match self {
            Node::Text(t) | Node::CData(t) => out.push_str(t),
            Node::Element(e) => {
                for child in &e.children {
                    child.push_text(out);
                }
            }
            Node::Comment(_) | Node::Instruction(_) => {}
        }
    }
}

impl From<Element> for Node {
    fn from(e: Element) -> Self {
        Node::Element(e)
    }
}

/// An element with ordered attributes and children.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Element {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub children: Vec<Node>,
}

impl Element {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn kind(&self) -> TagKind {
        TagKind::of(&self.name)
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Set an attribute, replacing an existing value in place.
    pub fn set_attr(&mut self, name: &str, value: impl Into<String>) {
        let value = value.into();
        match self.attributes.iter_mut().find(|(k, _)| k == name) {
            Some(slot) => slot.1 = value,
            None => self.attributes.push((name.to_string(), value)),
        }
    }

    /// The `id` attribute, if present and non-empty.
    pub fn id(&self) -> Option<&str> {
        self.attr("id").filter(|v| !v.trim().is_empty())
    }

    /// Set `id`, keeping it as the first attribute for readable output.
    pub fn set_id(&mut self, id: impl Into<String>) {
        let id = id.into();
        match self.attributes.iter().position(|(k, _)| k == "id") {
            Some(i) => self.attributes[i].1 = id,
            None => self.attributes.insert(0, ("id".to_string(), id)),
        }
    }

    pub fn with_attr(mut self, name: &str, value: impl Into<String>) -> Self {
        self.set_attr(name, value);
        self
    }

    pub fn with_child(mut self, child: impl Into<Node>) -> Self {
        self.children.push(child.into());
        self
    }

    pub fn with_children(mut self, children: Vec<Node>) -> Self {
        self.children.extend(children);
        self
    }

    pub fn with_text(self, text: impl Into<String>) -> Self {
        self.with_child(Node::Text(text.into()))
    }

    pub fn child_elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(Node::as_element)
    }

    pub fn child_elements_mut(&mut self) -> impl Iterator<Item = &mut Element> {
        self.children.iter_mut().filter_map(Node::as_element_mut)
    }

    /// First direct child with the given tag name.
    pub fn child(&self, name: &str) -> Option<&Element> {
        self.child_elements().find(|e| e.name == name)
    }

    pub fn child_mut(&mut self, name: &str) -> Option<&mut Element> {
        self.child_elements_mut().find(|e| e.name == name)
    }

    /// Depth-first search for the first descendant of the given kind.
    pub fn find_descendant(&self, kind: TagKind) -> Option<&Element> {
        for child in self.child_elements() {
            if child.kind() == kind {
                return Some(child);
            }
            if let Some(found) = child.find_descendant(kind) {
                return Some(found);
            }
        }
        None
    }

    pub fn text_content(&self) -> String {
        let mut out = String::new();
        for child in &self.children {
            child.push_text(&mut out);
        }
        out
    }

    /// Visit this element and every descendant element in document order.
    pub fn walk<'a>(&'a self, visit: &mut impl FnMut(&'a Element)) {
        visit(self);
        for child in self.child_elements() {
            child.walk(&mut *visit);
        }
    }
}

/// Items that may appear before the root element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PrologItem {
    DocType(String),
    Comment(String),
    Instruction(String),
}

/// A parsed JATS document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub prolog: Vec<PrologItem>,
    pub root: Element,
}

impl Document {
    pub fn body(&self) -> Option<&Element> {
        self.root.child("body")
    }

    pub fn body_mut(&mut self) -> Option<&mut Element> {
        self.root.child_mut("body")
    }

    /// Every `id` value in the document, in document order, duplicates kept.
    pub fn ids(&self) -> Vec<String> {
        let mut ids = Vec::new();
        self.root.walk(&mut |e| {
            if let Some(id) = e.id() {
                ids.push(id.to_string());
            }
        });
        ids
    }
}
