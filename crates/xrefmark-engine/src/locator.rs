//! Resolve the element a symbol should be annotated in.
//!
//! Two page shapes are understood:
//!
//! - **Single-file view**: every line lives in an element with id `LC{line}`.
//! - **Split diff view**: each file is a `div.file-header[data-path]` directly
//!   followed by a `div.js-file-content`. Rows hold, per side, a line-number
//!   cell (`td[data-line-number]`) followed by a `td.blob-code` whose
//!   `span.blob-code-inner` carries the code. The old side's line-number cell
//!   is the first cell of its row; the new side's is not.
//!
//! Every lookup answers `None` on a miss; callers skip the symbol.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use crate::dom::{Document, NodeId};

pub const LINE_ID_PREFIX: &str = "LC";

/// Element holding line `line` of a single-file view
pub fn line_element(doc: &Document, line: u32) -> Option<NodeId> {
    doc.element_by_id(&format!("{LINE_ID_PREFIX}{line}"))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiffSide {
    Old,
    New,
}

impl DiffSide {
    pub fn as_str(self) -> &'static str {
        match self {
            DiffSide::Old => "old",
            DiffSide::New => "new",
        }
    }
}

impl fmt::Display for DiffSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unsupported diff type: {0:?}")]
pub struct UnsupportedSide(pub String);

impl FromStr for DiffSide {
    type Err = UnsupportedSide;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "old" => Ok(DiffSide::Old),
            "new" => Ok(DiffSide::New),
            other => Err(UnsupportedSide(other.to_string())),
        }
    }
}

/// Escape a value for use inside a single-quoted selector attribute value
pub fn escape_selector_value(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "\\'")
}

/// Selector text describing the file container lookup for `path`
pub fn file_selector(path: &str) -> String {
    format!(
        "div.file-header[data-path = '{}'] + div.js-file-content",
        escape_selector_value(path)
    )
}

/// First `div.js-file-content` whose preceding element sibling is the
/// `div.file-header` for `path`.
pub fn file_content(doc: &Document, path: &str) -> Option<NodeId> {
    doc.descendants(doc.root()).find(|&node| {
        is_div_with_class(doc, node, "js-file-content")
            && doc.previous_element_sibling(node).is_some_and(|header| {
                is_div_with_class(doc, header, "file-header")
                    && doc.attr(header, "data-path") == Some(path)
            })
    })
}

fn is_div_with_class(doc: &Document, node: NodeId, class: &str) -> bool {
    doc.tag(node) == Some("div") && doc.has_class(node, class)
}

/// Path → file container lookups for one epoch, misses included
#[derive(Debug, Default)]
pub struct FileCache {
    entries: HashMap<String, Option<NodeId>>,
}

impl FileCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_locate(&mut self, doc: &Document, path: &str) -> Option<NodeId> {
        if let Some(&cached) = self.entries.get(path) {
            return cached;
        }
        let found = file_content(doc, path);
        if found.is_none() {
            log::debug!("[xrefmark] No file container for {}", file_selector(path));
        }
        self.entries.insert(path.to_string(), found);
        found
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

/// Code span for `line` on `side` within a file container
pub fn diff_cell(doc: &Document, file: NodeId, side: DiffSide, line: u32) -> Option<NodeId> {
    let line = line.to_string();
    doc.descendants(file).find(|&node| {
        if doc.tag(node) != Some("span") || !doc.has_class(node, "blob-code-inner") {
            return false;
        }
        let Some(cell) = doc.parent(node) else {
            return false;
        };
        if doc.tag(cell) != Some("td") || !doc.has_class(cell, "blob-code") {
            return false;
        }
        doc.preceding_element_siblings(cell)
            .into_iter()
            .any(|gutter| {
                doc.tag(gutter) == Some("td")
                    && doc.attr(gutter, "data-line-number") == Some(line.as_str())
                    && match side {
                        DiffSide::Old => doc.is_first_element_child(gutter),
                        DiffSide::New => !doc.is_first_element_child(gutter),
                    }
            })
    })
}

/// [`diff_cell`] for a side given as a raw tag. Unknown tags are a caller
/// defect: they are logged as errors and resolve to nothing.
pub fn diff_cell_for_tag(doc: &Document, file: NodeId, side: &str, line: u32) -> Option<NodeId> {
    match side.parse::<DiffSide>() {
        Ok(side) => diff_cell(doc, file, side, line),
        Err(err) => {
            log::error!("[xrefmark] {err}");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::views::{DiffFile, blob_view, split_diff_view};
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    fn diff_doc() -> Document {
        split_diff_view(&[
            DiffFile::new("a.go", "old one\nold two\n", "new one\nnew two\nnew three\n"),
            DiffFile::new("b'q\\.go", "b old\n", "b new\n"),
        ])
    }

    #[test]
    fn finds_single_file_lines() {
        let doc = blob_view("first\nsecond\n");

        let line = line_element(&doc, 2).unwrap();

        assert_eq!(doc.text_content(line), "second");
        assert_eq!(line_element(&doc, 3), None);
        assert_eq!(line_element(&doc, 0), None);
    }

    #[rstest]
    #[case(DiffSide::Old, 1, Some("old one"))]
    #[case(DiffSide::Old, 2, Some("old two"))]
    #[case(DiffSide::Old, 3, None)]
    #[case(DiffSide::New, 1, Some("new one"))]
    #[case(DiffSide::New, 3, Some("new three"))]
    #[case(DiffSide::New, 4, None)]
    fn finds_diff_cells_per_side(
        #[case] side: DiffSide,
        #[case] line: u32,
        #[case] expected: Option<&str>,
    ) {
        let doc = diff_doc();
        let file = file_content(&doc, "a.go").unwrap();

        let cell = diff_cell(&doc, file, side, line);

        assert_eq!(cell.map(|c| doc.text_content(c)).as_deref(), expected);
    }

    #[test]
    fn file_lookup_matches_paths_with_quotes_and_backslashes() {
        let doc = diff_doc();

        let file = file_content(&doc, "b'q\\.go").unwrap();

        assert_eq!(
            diff_cell(&doc, file, DiffSide::New, 1).map(|c| doc.text_content(c)),
            Some("b new".to_string())
        );
        assert_eq!(file_content(&doc, "missing.go"), None);
    }

    #[test]
    fn selector_escapes_backslash_then_quote() {
        assert_eq!(escape_selector_value(r"a\b'c"), r"a\\b\'c");
        assert_eq!(
            file_selector("it's.go"),
            r"div.file-header[data-path = 'it\'s.go'] + div.js-file-content"
        );
    }

    #[test]
    fn cache_remembers_misses_until_cleared() {
        let doc = diff_doc();
        let mut cache = FileCache::new();

        assert!(cache.get_or_locate(&doc, "a.go").is_some());
        assert_eq!(cache.get_or_locate(&doc, "gone.go"), None);
        assert_eq!(cache.len(), 2);

        cache.clear();
        assert!(cache.is_empty());
    }

    #[test]
    fn unknown_side_tags_resolve_to_nothing() {
        let doc = diff_doc();
        let file = file_content(&doc, "a.go").unwrap();

        assert_eq!(diff_cell_for_tag(&doc, file, "both", 1), None);
        assert!(diff_cell_for_tag(&doc, file, "old", 1).is_some());
        assert_eq!(
            "both".parse::<DiffSide>(),
            Err(UnsupportedSide("both".to_string()))
        );
    }
}
