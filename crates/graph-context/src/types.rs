//
// types.rs
//
// Keys and items shared by the cache, the orchestrator and fetchers
//

use std::fmt;

use serde::Serialize;
use tower_lsp::lsp_types::Url;

/// Stable identity of an open document
pub type DocumentId = Url;

/// Half-open span of lines `[start, end)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LineRange {
    pub start: u32,
    pub end: u32,
}

impl LineRange {
    pub fn new(start: u32, end: u32) -> Self {
        Self { start, end }
    }

    /// The range covering exactly `line`
    pub fn single(line: u32) -> Self {
        Self {
            start: line,
            end: line.saturating_add(1),
        }
    }

    /// The line directly above this range, if the range does not start at line 0
    pub fn previous_line(&self) -> Option<Self> {
        self.start.checked_sub(1).map(Self::single)
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }
}

impl fmt::Display for LineRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.start, self.end)
    }
}

/// How far the fetcher follows references from the queried lines.
///
/// `DIRECT` returns symbols referenced in the range; `ONE_HOP` additionally
/// follows each of them to its definition site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecursionDepth(pub u8);

impl RecursionDepth {
    pub const DIRECT: Self = Self(0);
    pub const ONE_HOP: Self = Self(1);
}

impl fmt::Display for RecursionDepth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Cache key for one fetcher query
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub document: DocumentId,
    pub range: LineRange,
    pub depth: RecursionDepth,
}

impl CacheKey {
    pub fn new(document: DocumentId, range: LineRange, depth: RecursionDepth) -> Self {
        Self {
            document,
            range,
            depth,
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}@{}", self.document, self.range, self.depth)
    }
}

/// A symbol snippet produced by a fetcher
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextItem {
    pub symbol_name: String,
    pub content: Vec<String>,
    pub source_uri: DocumentId,
}

impl ContextItem {
    pub fn new(
        symbol_name: impl Into<String>,
        content: Vec<String>,
        source_uri: DocumentId,
    ) -> Self {
        Self {
            symbol_name: symbol_name.into(),
            content,
            source_uri,
        }
    }

    /// Content lines joined the way they are handed to the prompt
    pub fn joined_content(&self) -> String {
        self.content.join("\n")
    }

    /// Character count of [`Self::joined_content`], computed without allocating
    pub fn content_chars(&self) -> usize {
        let separators = self.content.len().saturating_sub(1);
        self.content
            .iter()
            .map(|line| line.chars().count())
            .sum::<usize>()
            + separators
    }
}

/// Context item in the shape handed to prompt builders
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphContextItem {
    pub symbol: String,
    pub file_name: String,
    pub content: String,
}

impl From<&ContextItem> for GraphContextItem {
    fn from(item: &ContextItem) -> Self {
        Self {
            symbol: item.symbol_name.clone(),
            file_name: file_name_from_uri(&item.source_uri),
            content: item.joined_content(),
        }
    }
}

/// File-system path for `file:` URIs, the raw URI path otherwise
pub fn file_name_from_uri(uri: &Url) -> String {
    if uri.scheme() == "file" {
        if let Ok(path) = uri.to_file_path() {
            return path.to_string_lossy().into_owned();
        }
    }
    uri.path().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_uri(name: &str) -> Url {
        Url::parse(&format!("file:///{}", name)).unwrap()
    }

    #[test]
    fn test_line_range_single_and_previous() {
        let current = LineRange::single(4);
        assert_eq!(current, LineRange::new(4, 5));
        assert_eq!(current.previous_line(), Some(LineRange::new(3, 4)));
        assert_eq!(LineRange::single(0).previous_line(), None);
        assert!(!current.is_empty());
        assert!(LineRange::new(3, 3).is_empty());
    }

    #[test]
    fn test_cache_key_value_equality() {
        let a = CacheKey::new(test_uri("a.ts"), LineRange::single(1), RecursionDepth::ONE_HOP);
        let b = CacheKey::new(test_uri("a.ts"), LineRange::single(1), RecursionDepth::ONE_HOP);
        let c = CacheKey::new(test_uri("a.ts"), LineRange::single(1), RecursionDepth::DIRECT);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_content_chars_matches_joined_length() {
        let item = ContextItem::new(
            "foo",
            vec!["function foo() {".into(), "  return 1".into(), "}".into()],
            test_uri("foo.ts"),
        );
        assert_eq!(item.content_chars(), item.joined_content().chars().count());

        let empty = ContextItem::new("bar", Vec::new(), test_uri("bar.ts"));
        assert_eq!(empty.content_chars(), 0);
    }

    #[test]
    fn test_graph_context_item_shape() {
        let item = ContextItem::new(
            "foo",
            vec!["a".into(), "b".into()],
            Url::parse("file:///src/my%20dir/foo.ts").unwrap(),
        );
        let out = GraphContextItem::from(&item);
        assert_eq!(out.symbol, "foo");
        assert_eq!(out.content, "a\nb");
        #[cfg(unix)]
        assert_eq!(out.file_name, "/src/my dir/foo.ts");

        let json = serde_json::to_value(&out).unwrap();
        assert_eq!(json["symbol"], "foo");
        assert!(json.get("fileName").is_some());
    }

    #[test]
    fn test_file_name_for_non_file_uri() {
        let uri = Url::parse("untitled:/Untitled-1").unwrap();
        assert_eq!(file_name_from_uri(&uri), "/Untitled-1");
    }
}
