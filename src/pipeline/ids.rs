//! Identifier Allocator and the final identifier audit.
//!
//! Every identifier minted during one conversion goes through a single
//! [`IdAllocator`] owned by that conversion's [`PipelineContext`]. Uniqueness
//! is enforced by checking the run-scoped used-set and retrying, not by
//! trusting the width of the random suffix. Allocators are never shared
//! between conversions, so concurrent requests cannot influence each other.

use super::PipelineContext;
use crate::jats::{Document, Element, TagKind};
use std::collections::HashSet;
use tracing::{debug, warn};
use uuid::Uuid;

/// Default hexadecimal suffix width.
pub const DEFAULT_SUFFIX_LEN: usize = 24;
/// Narrowest suffix accepted by the builder.
pub const MIN_SUFFIX_LEN: usize = 8;
/// A v4 UUID has 32 hex digits.
pub const MAX_SUFFIX_LEN: usize = 32;

type SuffixSource = Box<dyn FnMut(usize) -> String + Send>;

/// Run-scoped identifier allocator.
pub struct IdAllocator {
    used: HashSet<String>,
    suffix_len: usize,
    minted: usize,
    source: SuffixSource,
}

impl std::fmt::Debug for IdAllocator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdAllocator")
            .field("used", &self.used.len())
            .field("suffix_len", &self.suffix_len)
            .field("minted", &self.minted)
            .finish()
    }
}

impl Default for IdAllocator {
    fn default() -> Self {
        Self::new(DEFAULT_SUFFIX_LEN)
    }
}

impl IdAllocator {
    /// Allocator with random v4-UUID suffixes of `suffix_len` hex digits.
    pub fn new(suffix_len: usize) -> Self {
        Self::with_source(suffix_len, Box::new(random_hex))
    }

    /// Allocator drawing suffixes from `source`, called with the suffix width.
    pub fn with_source(suffix_len: usize, source: SuffixSource) -> Self {
        Self {
            used: HashSet::new(),
            suffix_len: suffix_len.clamp(MIN_SUFFIX_LEN, MAX_SUFFIX_LEN),
            minted: 0,
            source,
        }
    }

    /// Mint a fresh identifier `prefix` + hex suffix, never issued before in
    /// this run. Collisions are retried until a free value comes up.
    pub fn allocate(&mut self, prefix: &str) -> String {
        loop {
            let suffix = (self.source)(self.suffix_len);
            let id = format!("{prefix}{suffix}");
            if self.used.insert(id.clone()) {
                self.minted += 1;
                return id;
            }
            debug!("Identifier collision on {id}, retrying");
        }
    }

    /// Record an identifier that already exists in the document so it is
    /// never minted. Returns false if it was already known.
    pub fn reserve(&mut self, id: &str) -> bool {
        self.used.insert(id.to_string())
    }

    pub fn is_used(&self, id: &str) -> bool {
        self.used.contains(id)
    }

    /// Number of identifiers minted (reservations excluded).
    pub fn minted(&self) -> usize {
        self.minted
    }

    pub fn suffix_len(&self) -> usize {
        self.suffix_len
    }
}

fn random_hex(len: usize) -> String {
    let mut hex = Uuid::new_v4().simple().to_string();
    hex.truncate(len);
    hex
}

/// Reserve every identifier already present anywhere in the document.
pub fn reserve_existing(doc: &Document, ids: &mut IdAllocator) {
    for id in doc.ids() {
        ids.reserve(&id);
    }
}

/// Final pass: every addressable body element gets an id, and any repeat of
/// an id seen earlier in document order is replaced.
///
/// Ids outside the body count as seen first; front and back matter are
/// never rewritten.
pub fn audit_identifiers(mut doc: Document, ctx: &mut PipelineContext) -> Document {
    let mut seen: HashSet<String> = HashSet::new();
    for child in doc.root.child_elements().filter(|e| e.name != "body") {
        child.walk(&mut |e| {
            if let Some(id) = e.id() {
                seen.insert(id.to_string());
            }
        });
    }

    if let Some(body) = doc.body_mut() {
        if let Some(id) = body.id() {
            seen.insert(id.to_string());
        }
        for child in body.child_elements_mut() {
            audit_element(child, false, &mut seen, ctx);
        }
    }
    doc
}

fn audit_element(
    element: &mut Element,
    in_caption: bool,
    seen: &mut HashSet<String>,
    ctx: &mut PipelineContext,
) {
    let kind = element.kind();
    let addressable = match kind {
        TagKind::Paragraph => in_caption,
        other => other.id_prefix().is_some(),
    };
    let prefix = kind
        .id_prefix()
        .map(str::to_string)
        .unwrap_or_else(|| fallback_prefix(&element.name));

    match element.id().map(str::to_string) {
        Some(id) if !seen.insert(id.clone()) => {
            let fresh = ctx.ids.allocate(&prefix);
            warn!("Duplicate id '{}' on <{}>, replaced with '{}'", id, element.name, fresh);
            seen.insert(fresh.clone());
            element.set_id(fresh);
            ctx.report.ids_repaired += 1;
        }
        Some(_) => {}
        None if addressable => {
            let fresh = ctx.ids.allocate(&prefix);
            seen.insert(fresh.clone());
            element.set_id(fresh);
        }
        None => {}
    }

    let child_in_caption = in_caption || kind == TagKind::Caption;
    for child in element.child_elements_mut() {
        audit_element(child, child_in_caption, seen, ctx);
    }
}

/// Prefix for unclassified elements: the tag name made NCName-safe, so
/// `mml:math` mints `mml-math-…`.
fn fallback_prefix(name: &str) -> String {
    let safe: String = name
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '-' || c == '_' || c == '.' { c } else { '-' })
        .collect();
    match safe.chars().next() {
        Some(c) if c.is_alphabetic() || c == '_' => format!("{safe}-"),
        _ => format!("id-{safe}-"),
    }
}
