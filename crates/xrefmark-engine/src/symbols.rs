//! Resolved symbols and resolution results as delivered by the resolver.

use serde::{Deserialize, Deserializer, Serialize};
use std::ops::Range;

/// A line number as sent by the resolver.
///
/// The service is not strict about types: lines arrive as JSON numbers or as
/// numeric strings. [`LineRef::number`] normalizes both and rejects anything
/// that does not name a whole, non-negative line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LineRef {
    Number(serde_json::Number),
    Text(String),
}

impl LineRef {
    pub fn number(&self) -> Option<u32> {
        match self {
            LineRef::Number(n) => match n.as_u64() {
                Some(whole) => u32::try_from(whole).ok(),
                None => n
                    .as_f64()
                    .filter(|f| f.fract() == 0.0 && *f >= 0.0 && *f <= f64::from(u32::MAX))
                    .map(|f| f as u32),
            },
            LineRef::Text(text) => text.trim().parse().ok(),
        }
    }
}

impl From<u32> for LineRef {
    fn from(line: u32) -> Self {
        LineRef::Number(line.into())
    }
}

/// A character range on one line (or, for skipped symbols, spanning lines)
/// paired with the URL it should link to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Symbol {
    pub start_line: LineRef,
    pub end_line: LineRef,
    pub start_offset: usize,
    pub end_offset: usize,
    pub url: String,
}

impl Symbol {
    pub fn new(line: u32, range: Range<usize>, url: impl Into<String>) -> Self {
        Self {
            start_line: line.into(),
            end_line: line.into(),
            start_offset: range.start,
            end_offset: range.end,
            url: url.into(),
        }
    }

    /// The symbol's line, or `None` for multi-line or malformed symbols,
    /// which are never annotated.
    pub fn line(&self) -> Option<u32> {
        let start = self.start_line.number()?;
        (self.end_line.number() == Some(start)).then_some(start)
    }

    pub fn range(&self) -> Range<usize> {
        self.start_offset..self.end_offset
    }
}

/// Decode a symbol array one entry at a time, dropping entries that are not
/// valid symbols so the rest of the response survives.
fn lenient_symbols<'de, D>(deserializer: D) -> Result<Vec<Symbol>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Vec::<serde_json::Value>::deserialize(deserializer)?;
    let total = raw.len();
    let symbols: Vec<Symbol> = raw
        .into_iter()
        .filter_map(|value| serde_json::from_value(value).ok())
        .collect();
    if symbols.len() < total {
        log::warn!(
            "[xrefmark] Skipped {} malformed symbols out of {total}",
            total - symbols.len()
        );
    }
    Ok(symbols)
}

/// Symbols for a single file (blob and commit requests)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SymbolList {
    #[serde(deserialize_with = "lenient_symbols")]
    pub syms: Vec<Symbol>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileSymbols {
    pub path: String,
    #[serde(deserialize_with = "lenient_symbols")]
    pub syms: Vec<Symbol>,
}

/// Symbols for both sides of a diff (pull request requests)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiffSymbols {
    pub new_files: Vec<FileSymbols>,
    pub old_files: Vec<FileSymbols>,
}

impl DiffSymbols {
    pub fn symbol_count(&self) -> usize {
        self.new_files
            .iter()
            .chain(&self.old_files)
            .map(|file| file.syms.len())
            .sum()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ResolutionResult {
    File(SymbolList),
    Diff(DiffSymbols),
}

/// Why an [`Envelope`] carries no usable result
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EnvelopeError {
    #[error("{0}")]
    Remote(String),
    #[error("response carries neither a result nor an error")]
    Invalid,
}

/// Response to one resolution request: either an error message or a result
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<ResolutionResult>,
}

impl Envelope {
    pub fn ok(result: ResolutionResult) -> Self {
        Self {
            error: None,
            result: Some(result),
        }
    }

    pub fn err(message: impl Into<String>) -> Self {
        Self {
            error: Some(message.into()),
            result: None,
        }
    }

    /// An error wins over a result when both are present.
    pub fn into_result(self) -> Result<ResolutionResult, EnvelopeError> {
        match (self.error, self.result) {
            (Some(message), _) => Err(EnvelopeError::Remote(message)),
            (None, Some(result)) => Ok(result),
            (None, None) => Err(EnvelopeError::Invalid),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;
    use serde_json::json;

    #[rstest]
    #[case(json!(12), Some(12))]
    #[case(json!("12"), Some(12))]
    #[case(json!(" 7 "), Some(7))]
    #[case(json!(3.0), Some(3))]
    #[case(json!(3.5), None)]
    #[case(json!(-1), None)]
    #[case(json!("twelve"), None)]
    #[case(json!(""), None)]
    fn line_refs_normalize(#[case] raw: serde_json::Value, #[case] expected: Option<u32>) {
        let line: LineRef = serde_json::from_value(raw).unwrap();
        assert_eq!(line.number(), expected);
    }

    #[test]
    fn decodes_wire_symbols() {
        let sym: Symbol = serde_json::from_value(json!({
            "startLine": "12",
            "endLine": 12,
            "startOffset": 3,
            "endOffset": 7,
            "url": "https://x/y",
        }))
        .unwrap();

        assert_eq!(sym.line(), Some(12));
        assert_eq!(sym.range(), 3..7);
    }

    #[test]
    fn multi_line_symbols_have_no_line() {
        let mut sym = Symbol::new(4, 0..2, "u");
        sym.end_line = 5.into();
        assert_eq!(sym.line(), None);
    }

    #[test]
    fn malformed_symbols_are_dropped_individually() {
        let envelope: Envelope = serde_json::from_value(json!({
            "result": {"kind": "file", "syms": [
                {"startLine": 1, "endLine": 1, "startOffset": 0, "endOffset": 4, "url": "good"},
                {"startLine": 1, "endLine": 1, "startOffset": null, "endOffset": 2, "url": "bad"},
                {"startLine": 2, "endLine": 2, "startOffset": 1, "endOffset": 3},
                "not a symbol",
                {"startLine": "3", "endLine": 3, "startOffset": 5, "endOffset": 9, "url": "also good"}
            ]}
        }))
        .unwrap();

        let Ok(ResolutionResult::File(list)) = envelope.into_result() else {
            panic!("expected a file result");
        };
        let urls: Vec<&str> = list.syms.iter().map(|sym| sym.url.as_str()).collect();
        assert_eq!(urls, vec!["good", "also good"]);
    }

    #[test]
    fn malformed_diff_symbols_keep_their_siblings() {
        let diff: DiffSymbols = serde_json::from_value(json!({
            "newFiles": [{"path": "a.go", "syms": [
                {"startLine": 1, "endLine": 1, "startOffset": -1, "endOffset": 2, "url": "u"},
                {"startLine": 1, "endLine": 1, "startOffset": 0, "endOffset": 2, "url": "v"}
            ]}],
            "oldFiles": [],
        }))
        .unwrap();

        assert_eq!(diff.symbol_count(), 1);
        assert_eq!(diff.new_files[0].syms[0].url, "v");
    }

    #[test]
    fn decodes_diff_symbols() {
        let diff: DiffSymbols = serde_json::from_value(json!({
            "newFiles": [{"path": "a.go", "syms": [
                {"startLine": 1, "endLine": 1, "startOffset": 0, "endOffset": 4, "url": "u"}
            ]}],
            "oldFiles": [],
        }))
        .unwrap();

        assert_eq!(diff.new_files[0].path, "a.go");
        assert_eq!(diff.symbol_count(), 1);
    }

    #[test]
    fn envelope_prefers_error_and_flags_empty() {
        let ok = Envelope::ok(ResolutionResult::File(SymbolList::default()));
        assert_eq!(
            ok.into_result(),
            Ok(ResolutionResult::File(SymbolList::default()))
        );

        let both = Envelope {
            error: Some("boom".to_string()),
            result: Some(ResolutionResult::Diff(DiffSymbols::default())),
        };
        assert_eq!(
            both.into_result(),
            Err(EnvelopeError::Remote("boom".to_string()))
        );

        let empty: Envelope = serde_json::from_str("{}").unwrap();
        assert_eq!(empty.into_result(), Err(EnvelopeError::Invalid));
    }

    #[test]
    fn result_kind_is_explicit_on_the_wire() {
        let value = serde_json::to_value(ResolutionResult::File(SymbolList {
            syms: vec![Symbol::new(1, 0..1, "u")],
        }))
        .unwrap();

        assert_eq!(value["kind"], "file");
        let back: ResolutionResult = serde_json::from_value(value).unwrap();
        assert!(matches!(back, ResolutionResult::File(list) if list.syms.len() == 1));
    }
}
