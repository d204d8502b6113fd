//! Wrap text ranges of a subtree in annotation links.
//!
//! Offsets count UTF-16 code units of text nodes in document order from the
//! start of the subtree being annotated. Each wrapper is an `<a>` carrying the
//! epoch of the pass that created it in [`ANNOTATION_ATTR`]; wrappers from any
//! other epoch are dissolved on the way down so a text run is never wrapped
//! twice.

use std::ops::Range;

use crate::dom::{Document, DomError, NodeId};
use crate::epoch::Epoch;
use crate::splitter::split_run;

pub const ANNOTATION_ATTR: &str = "data-xref";
pub const ANNOTATION_TAG: &str = "a";

/// One link to place: an offset interval, its target and its epoch
#[derive(Debug, Clone)]
pub struct Annotation<'a> {
    pub range: Range<usize>,
    pub url: &'a str,
    pub epoch: Epoch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tag {
    Untagged,
    Current,
    Stale,
}

fn tag_of(doc: &Document, node: NodeId, epoch: Epoch) -> Tag {
    match doc.attr(node, ANNOTATION_ATTR) {
        None => Tag::Untagged,
        Some(value) if value.parse::<Epoch>() == Ok(epoch) => Tag::Current,
        Some(_) => Tag::Stale,
    }
}

/// Annotate the subtree at `node`, whose text starts at `offset`.
///
/// Returns the offset just past the subtree so several intervals can be
/// chained left to right. Applying the same annotation twice in one epoch
/// leaves the tree unchanged the second time.
pub fn annotate(
    doc: &mut Document,
    node: NodeId,
    offset: usize,
    annotation: &Annotation<'_>,
) -> Result<usize, DomError> {
    walk(doc, node, offset, annotation, false)
}

fn walk(
    doc: &mut Document,
    node: NodeId,
    offset: usize,
    annotation: &Annotation<'_>,
    linked: bool,
) -> Result<usize, DomError> {
    if !doc.has_children(node) {
        let Some(len) = doc.text_len(node) else {
            return Ok(offset);
        };
        // Already inside a link of this pass.
        if linked {
            return Ok(offset + len);
        }
        let split = split_run(doc, node, offset, &annotation.range)?;
        if let Some(run) = split.matched {
            wrap(doc, run, annotation)?;
        }
        return Ok(split.end);
    }

    // Recursion rewires this node's children; walk the list as it was.
    let children = doc.children(node).to_vec();

    let mut linked = linked;
    match tag_of(doc, node, annotation.epoch) {
        Tag::Untagged => {}
        Tag::Current => linked = true,
        Tag::Stale => hoist(doc, node, &children)?,
    }

    let mut offset = offset;
    for child in children {
        offset = walk(doc, child, offset, annotation, linked)?;
    }
    Ok(offset)
}

/// Move `children` out in front of `node`, then drop `node` for good
fn hoist(doc: &mut Document, node: NodeId, children: &[NodeId]) -> Result<(), DomError> {
    let Some(parent) = doc.parent(node) else {
        return Ok(());
    };
    for &child in children {
        doc.insert_before(parent, child, node)?;
    }
    doc.remove_child(parent, node)?;
    doc.release(node)
}

fn wrap(doc: &mut Document, run: NodeId, annotation: &Annotation<'_>) -> Result<(), DomError> {
    let Some(parent) = doc.parent(run) else {
        return Ok(());
    };
    let link = doc.create_element(ANNOTATION_TAG);
    doc.set_attr(link, ANNOTATION_ATTR, &annotation.epoch.to_string())?;
    doc.set_attr(link, "href", annotation.url)?;
    doc.replace_child(parent, link, run)?;
    doc.append_child(link, run)
}
