//! Discovery of module specifiers referenced by static and literal dynamic imports

use crate::syntax::token::{Span, Token, TokenKind};

/// How a specifier is referenced
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportKind {
    /// `import ... from "x"` / `import "x"`
    Static,
    /// `export ... from "x"`
    ReExport,
    /// `import("x")`
    Dynamic,
}

/// A specifier string literal found in module code
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportRef {
    pub specifier: String,
    /// Span of the string literal, quotes included
    pub span: Span,
    pub kind: ImportKind,
}

/// Find every import/re-export specifier and every dynamic import whose
/// argument is a single string literal
pub fn scan_imports(src: &str, tokens: &[Token]) -> Vec<ImportRef> {
    let mut refs = Vec::new();

    for (i, token) in tokens.iter().enumerate() {
        let after_dot = i > 0 && (tokens[i - 1].is_punct(src, ".") || tokens[i - 1].is_punct(src, "?."));
        if after_dot || token.kind != TokenKind::Ident {
            continue;
        }

        match token.text(src) {
            "import" => {
                let Some(next) = tokens.get(i + 1) else {
                    continue;
                };
                if next.is_punct(src, "(") {
                    let literal = tokens.get(i + 2);
                    let closed = tokens
                        .get(i + 3)
                        .is_some_and(|t| t.is_punct(src, ")") || t.is_punct(src, ","));
                    if let Some(literal) = literal.filter(|t| t.kind == TokenKind::String && closed) {
                        refs.push(make_ref(src, literal, ImportKind::Dynamic));
                    }
                } else if next.kind == TokenKind::String {
                    refs.push(make_ref(src, next, ImportKind::Static));
                } else if !next.is_punct(src, ".") {
                    if let Some(literal) = from_clause(src, tokens, i + 1) {
                        refs.push(make_ref(src, literal, ImportKind::Static));
                    }
                }
            }
            "export" => {
                let starts_reexport = tokens
                    .get(i + 1)
                    .is_some_and(|t| t.is_punct(src, "*") || t.is_punct(src, "{"));
                if starts_reexport {
                    if let Some(literal) = from_clause(src, tokens, i + 1) {
                        refs.push(make_ref(src, literal, ImportKind::ReExport));
                    }
                }
            }
            _ => {}
        }
    }

    refs
}

fn make_ref(src: &str, literal: &Token, kind: ImportKind) -> ImportRef {
    ImportRef {
        specifier: crate::syntax::string_value(literal.text(src)),
        span: literal.span,
        kind,
    }
}

/// The string literal after `from` in the clause starting at `start`
fn from_clause<'t>(src: &str, tokens: &'t [Token], start: usize) -> Option<&'t Token> {
    let mut depth = 0usize;
    for (i, token) in tokens.iter().enumerate().skip(start) {
        if token.kind == TokenKind::Punct {
            match token.text(src) {
                "{" => depth += 1,
                "}" => depth = depth.saturating_sub(1),
                ";" | "(" | "=" if depth == 0 => return None,
                _ => {}
            }
            continue;
        }
        if depth == 0 && token.is_ident(src, "from") {
            return tokens.get(i + 1).filter(|t| t.kind == TokenKind::String);
        }
    }
    None
}
