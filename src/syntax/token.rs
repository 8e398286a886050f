//! Token model produced by the scanner

/// Byte range into the scanned source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

/// Kinds of tokens the scanner distinguishes
///
/// Keywords are not split out from identifiers; consumers compare text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Ident,
    Number,
    String,
    /// Template literal without substitutions
    Template,
    /// `` `...${ ``
    TemplateHead,
    /// `` }...${ ``
    TemplateMiddle,
    /// `` }...` ``
    TemplateTail,
    Regex,
    Punct,
    /// `#name` inside a class body
    PrivateName,
}

/// A single token with its position in the source
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
    /// A line terminator appeared between the previous token and this one
    pub newline_before: bool,
}

/// Keywords after which an expression (and so a regex or JSX) may start
const EXPRESSION_KEYWORDS: &[&str] = &[
    "return", "typeof", "instanceof", "in", "of", "new", "delete", "void", "throw", "case", "do",
    "else", "yield", "await", "extends",
];

/// Reserved words that can never be a binding or a referenced identifier
const RESERVED_WORDS: &[&str] = &[
    "break", "case", "catch", "class", "const", "continue", "debugger", "default", "delete", "do",
    "else", "export", "extends", "false", "finally", "for", "function", "if", "import", "in",
    "instanceof", "new", "null", "return", "super", "switch", "this", "throw", "true", "try",
    "typeof", "var", "void", "while", "with",
];

impl Token {
    pub fn text<'a>(&self, src: &'a str) -> &'a str {
        &src[self.span.start..self.span.end]
    }

    pub fn is_punct(&self, src: &str, punct: &str) -> bool {
        self.kind == TokenKind::Punct && self.text(src) == punct
    }

    pub fn is_ident(&self, src: &str, name: &str) -> bool {
        self.kind == TokenKind::Ident && self.text(src) == name
    }

    /// Identifier that is not a reserved word
    pub fn is_name(&self, src: &str) -> bool {
        self.kind == TokenKind::Ident && !RESERVED_WORDS.contains(&self.text(src))
    }

    pub fn is_template_start(&self) -> bool {
        matches!(self.kind, TokenKind::Template | TokenKind::TemplateHead)
    }

    /// Whether an expression is complete after this token, so a following
    /// `/` divides and a following `<` compares
    pub fn ends_expression(&self, src: &str) -> bool {
        match self.kind {
            TokenKind::Number
            | TokenKind::String
            | TokenKind::Template
            | TokenKind::TemplateTail
            | TokenKind::Regex
            | TokenKind::PrivateName => true,
            TokenKind::Ident => !EXPRESSION_KEYWORDS.contains(&self.text(src)),
            TokenKind::Punct => matches!(self.text(src), ")" | "]" | "++" | "--"),
            TokenKind::TemplateHead | TokenKind::TemplateMiddle => false,
        }
    }

    /// Whether a statement may end right after this token
    pub fn can_end_statement(&self, src: &str) -> bool {
        self.ends_expression(src) || self.is_punct(src, "}")
    }

    /// Whether a statement may start with this token
    pub fn can_start_statement(&self, src: &str) -> bool {
        match self.kind {
            TokenKind::Punct => matches!(
                self.text(src),
                "(" | "[" | "{" | "+" | "-" | "!" | "~" | "++" | "--" | "/" | "@" | "..." | "<"
            ),
            TokenKind::TemplateMiddle | TokenKind::TemplateTail => false,
            _ => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ends_expression() {
        let src = "return )";
        let ret = Token {
            kind: TokenKind::Ident,
            span: Span::new(0, 6),
            newline_before: false,
        };
        let paren = Token {
            kind: TokenKind::Punct,
            span: Span::new(7, 8),
            newline_before: false,
        };
        assert!(!ret.ends_expression(src));
        assert!(paren.ends_expression(src));
        assert!(!ret.is_name(src));
    }
}
