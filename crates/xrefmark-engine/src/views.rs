//! Build document trees in the page shapes the locator understands.

use crate::dom::{Document, NodeId};

/// Render `text` as a single-file view, one row per line
pub fn blob_view(text: &str) -> Document {
    let mut doc = Document::new("table");
    let root = doc.root();

    for (index, line) in text.lines().enumerate() {
        let number = index + 1;
        let row = doc.append_element(root, "tr", []);
        doc.append_element(
            row,
            "td",
            [
                ("id", format!("L{number}")),
                ("class", "blob-num".to_string()),
                ("data-line-number", number.to_string()),
            ],
        );
        let code = doc.append_element(
            row,
            "td",
            [
                ("id", format!("LC{number}")),
                ("class", "blob-code blob-code-inner".to_string()),
            ],
        );
        doc.append_text(code, line);
    }
    doc
}

/// One file of a split diff: its path and both versions of its text
#[derive(Debug, Clone)]
pub struct DiffFile {
    pub path: String,
    pub old: String,
    pub new: String,
}

impl DiffFile {
    pub fn new(path: impl Into<String>, old: impl Into<String>, new: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            old: old.into(),
            new: new.into(),
        }
    }
}

/// Render files as a split diff with old lines on the left, new on the right.
///
/// Rows pair the n-th old line with the n-th new line; the shorter side is
/// padded with empty cells.
pub fn split_diff_view(files: &[DiffFile]) -> Document {
    let mut doc = Document::new("div");
    let root = doc.root();

    for file in files {
        doc.append_element(
            root,
            "div",
            [
                ("class", "file-header".to_string()),
                ("data-path", file.path.clone()),
            ],
        );
        let content = doc.append_element(root, "div", [("class", "js-file-content".to_string())]);
        let table = doc.append_element(content, "table", []);

        let old: Vec<&str> = file.old.lines().collect();
        let new: Vec<&str> = file.new.lines().collect();
        for index in 0..old.len().max(new.len()) {
            let row = doc.append_element(table, "tr", []);
            append_side(&mut doc, row, index + 1, old.get(index).copied());
            append_side(&mut doc, row, index + 1, new.get(index).copied());
        }
    }
    doc
}

fn append_side(doc: &mut Document, row: NodeId, number: usize, line: Option<&str>) {
    let Some(line) = line else {
        doc.append_element(row, "td", [("class", "blob-num empty-cell".to_string())]);
        doc.append_element(row, "td", [("class", "blob-code empty-cell".to_string())]);
        return;
    };
    doc.append_element(
        row,
        "td",
        [
            ("class", "blob-num".to_string()),
            ("data-line-number", number.to_string()),
        ],
    );
    let code = doc.append_element(row, "td", [("class", "blob-code".to_string())]);
    let inner = doc.append_element(code, "span", [("class", "blob-code-inner".to_string())]);
    doc.append_text(inner, line);
}
