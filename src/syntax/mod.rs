//! Lightweight JavaScript/TypeScript scanning shared by the stages
//!
//! Stages work on token spans and apply span edits to the original text, so
//! untouched regions (comments, formatting) survive byte-for-byte.

pub mod imports;
pub mod lexer;
pub mod token;

pub use imports::{scan_imports, ImportKind, ImportRef};
pub use lexer::{is_ident_part, is_ident_start, tokenize, LexError, Lexer};
pub use token::{Span, Token, TokenKind};

/// 1-based line and column of a byte offset
pub fn line_col(src: &str, offset: usize) -> (usize, usize) {
    let offset = offset.min(src.len());
    let before = &src[..offset];
    let line = before.matches('\n').count() + 1;
    let column = before
        .rfind('\n')
        .map_or(before.chars().count(), |nl| before[nl + 1..].chars().count())
        + 1;
    (line, column)
}

/// Whether `name` can be used as a plain identifier
pub fn is_valid_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first != '\\' && is_ident_start(first) => {
            chars.all(|c| c != '\\' && is_ident_part(c))
        }
        _ => false,
    }
}

/// Index of the bracket closing the one at `open`
///
/// Only the bracket kind at `open` is counted, so mismatched brackets of
/// other kinds inside do not confuse the search.
pub fn find_matching(src: &str, tokens: &[Token], open: usize) -> Option<usize> {
    let open_text = tokens.get(open)?.text(src);
    let close_text = match open_text {
        "(" => ")",
        "[" => "]",
        "{" => "}",
        _ => return None,
    };

    let mut depth = 0usize;
    for (i, token) in tokens.iter().enumerate().skip(open) {
        if token.kind != TokenKind::Punct {
            continue;
        }
        let text = token.text(src);
        if text == open_text {
            depth += 1;
        } else if text == close_text {
            depth -= 1;
            if depth == 0 {
                return Some(i);
            }
        }
    }
    None
}

/// Decode the value of a string literal token (quotes removed, simple
/// escapes resolved)
pub fn string_value(literal: &str) -> String {
    let inner = if literal.len() >= 2 {
        &literal[1..literal.len() - 1]
    } else {
        literal
    };

    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('0') => out.push('\0'),
            Some('\n') | None => {}
            Some(other) => out.push(other),
        }
    }
    out
}

/// Quote a string as a JavaScript string literal
pub fn quote(value: &str) -> String {
    // JSON strings are valid JS string literals
    serde_json::Value::String(value.to_string()).to_string()
}

/// A batch of non-overlapping text edits against one source string
#[derive(Debug, Default, Clone)]
pub struct Edits {
    edits: Vec<(usize, usize, String)>,
}

impl Edits {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.edits.is_empty()
    }

    pub fn replace(&mut self, start: usize, end: usize, text: impl Into<String>) {
        self.edits.push((start, end, text.into()));
    }

    pub fn delete(&mut self, start: usize, end: usize) {
        self.replace(start, end, String::new());
    }

    pub fn insert(&mut self, at: usize, text: impl Into<String>) {
        self.replace(at, at, text);
    }

    /// Whether a deletion or replacement already covers `pos`
    pub fn covers(&self, pos: usize) -> bool {
        self.edits
            .iter()
            .any(|(start, end, _)| *start <= pos && pos < *end)
    }

    /// Apply all edits; an edit overlapping an earlier-starting one is dropped
    pub fn apply(mut self, src: &str) -> String {
        // Stable sort keeps insertion order for edits at the same offset
        self.edits.sort_by_key(|(start, end, _)| (*start, *end));

        let mut out = String::with_capacity(src.len());
        let mut cursor = 0;
        for (start, end, text) in self.edits {
            if start < cursor {
                continue;
            }
            out.push_str(&src[cursor..start]);
            out.push_str(&text);
            cursor = end;
        }
        out.push_str(&src[cursor..]);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_col() {
        let src = "a\nbc\nd";
        assert_eq!(line_col(src, 0), (1, 1));
        assert_eq!(line_col(src, 3), (2, 2));
        assert_eq!(line_col(src, 5), (3, 1));
    }

    #[test]
    fn test_edits_apply_in_order() {
        let mut edits = Edits::new();
        edits.delete(7, 10);
        edits.insert(0, "// head\n");
        edits.replace(0, 5, "let");
        assert_eq!(edits.apply("const x: T = 1"), "// head\nlet x = 1");
    }

    #[test]
    fn test_find_matching() {
        let src = "f(a, (b), [c])";
        let tokens = tokenize(src).unwrap();
        assert_eq!(find_matching(src, &tokens, 1), Some(tokens.len() - 1));
    }

    #[test]
    fn test_identifier_validation() {
        assert!(is_valid_identifier("fooBar_1"));
        assert!(is_valid_identifier("$el"));
        assert!(!is_valid_identifier("1abc"));
        assert!(!is_valid_identifier("with-dash"));
        assert!(!is_valid_identifier(""));
    }

    #[test]
    fn test_string_value_and_quote() {
        assert_eq!(string_value(r#"'it\'s'"#), "it's");
        assert_eq!(quote("a\"b"), r#""a\"b""#);
    }
}
