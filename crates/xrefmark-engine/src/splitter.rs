use std::ops::Range;

use crate::dom::{Document, DomError, NodeId};

/// Result of aligning a text run with a requested interval
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Split {
    /// Document-relative offset just past the original run
    pub end: usize,
    /// The run whose bounds equal the intersection, if it is non-empty
    pub matched: Option<NodeId>,
}

/// Intersection of the run `[base, base + len)` with `range`, if non-empty
pub fn overlap(base: usize, len: usize, range: &Range<usize>) -> Option<Range<usize>> {
    let start = range.start.max(base);
    let end = range.end.min(base + len);
    (start < end).then_some(start..end)
}

/// Split the text node `node`, which starts at document offset `base`, so
/// that the part covered by `range` becomes a run of its own. Offsets are
/// UTF-16 code units.
///
/// At most two splits happen (pre / match / post). The concatenated text of
/// the resulting runs always equals the original text. Empty runs, empty
/// intervals and intervals outside the run leave the tree untouched.
pub fn split_run(
    doc: &mut Document,
    node: NodeId,
    base: usize,
    range: &Range<usize>,
) -> Result<Split, DomError> {
    let len = doc.text_len(node).ok_or(DomError::NotText(node))?;
    let end = base + len;

    let Some(hit) = overlap(base, len, range) else {
        return Ok(Split { end, matched: None });
    };

    let mut matched = node;
    let leading = hit.start - base;
    if leading > 0 {
        matched = doc.split_text(matched, leading)?;
    }
    if end > hit.end {
        doc.split_text(matched, hit.len())?;
    }

    Ok(Split {
        end,
        matched: Some(matched),
    })
}
