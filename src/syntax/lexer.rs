//! Scanner for JavaScript/TypeScript source
//!
//! Produces a flat token stream with byte spans. Comments and whitespace are
//! skipped, but every token remembers whether a line terminator preceded it.
//! JSX text is not understood here; the JSX lowering pass drives the scanner
//! around element boundaries itself.

use crate::syntax::token::{Span, Token, TokenKind};
use thiserror::Error;

/// Scanning failure (unterminated literal or comment)
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct LexError {
    pub offset: usize,
    pub message: String,
}

impl LexError {
    fn new(offset: usize, message: impl Into<String>) -> Self {
        Self {
            offset,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Brace {
    Block,
    Template,
}

/// Punctuators, longest first
const PUNCTUATORS: &[&str] = &[
    ">>>=", "...", "===", "!==", "**=", "<<=", ">>=", ">>>", "&&=", "||=", "??=", "=>", "==",
    "!=", "<=", ">=", "&&", "||", "??", "?.", "++", "--", "+=", "-=", "*=", "/=", "%=", "&=",
    "|=", "^=", "**", "<<", ">>", "{", "}", "(", ")", "[", "]", ";", ",", "<", ">", "+", "-",
    "*", "/", "%", "&", "|", "^", "!", "~", "?", ":", "=", ".", "@", "#",
];

pub fn is_ident_start(ch: char) -> bool {
    ch.is_ascii_alphabetic() || ch == '_' || ch == '$' || ch == '\\' || (!ch.is_ascii() && ch.is_alphabetic())
}

pub fn is_ident_part(ch: char) -> bool {
    is_ident_start(ch) || ch.is_ascii_digit() || ch == '\u{200c}' || ch == '\u{200d}' || (!ch.is_ascii() && ch.is_alphanumeric())
}

fn is_line_terminator(ch: char) -> bool {
    matches!(ch, '\n' | '\r' | '\u{2028}' | '\u{2029}')
}

/// The scanner
pub struct Lexer<'a> {
    src: &'a str,
    pos: usize,
    braces: Vec<Brace>,
    /// Previous token completed an expression (decides `/` and `<`)
    expression_ended: bool,
}

impl<'a> Lexer<'a> {
    pub fn new(src: &'a str) -> Self {
        Self::at(src, 0, false)
    }

    /// Start scanning at `pos`, as if the previous token did (or did not)
    /// complete an expression
    pub fn at(src: &'a str, pos: usize, expression_ended: bool) -> Self {
        Self {
            src,
            pos,
            braces: Vec::new(),
            expression_ended,
        }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    /// Continue scanning from `pos`, keeping template nesting
    pub fn seek(&mut self, pos: usize, expression_ended: bool) {
        self.pos = pos;
        self.expression_ended = expression_ended;
    }

    /// Scan the whole input
    pub fn tokenize(mut self) -> Result<Vec<Token>, LexError> {
        let mut tokens = Vec::new();
        while let Some(token) = self.next_token()? {
            tokens.push(token);
        }
        Ok(tokens)
    }

    fn peek(&self) -> Option<char> {
        self.src[self.pos..].chars().next()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.src.get(self.pos + offset..).and_then(|rest| rest.chars().next())
    }

    fn bump(&mut self) -> Option<char> {
        let ch = self.peek()?;
        self.pos += ch.len_utf8();
        Some(ch)
    }

    fn rest(&self) -> &'a str {
        &self.src[self.pos..]
    }

    /// Skip whitespace and comments; returns whether a newline was crossed
    fn skip_trivia(&mut self) -> Result<bool, LexError> {
        let mut newline = false;

        // Interpreter directive only counts at the very start
        if self.pos == 0 && self.rest().starts_with("#!") {
            while let Some(ch) = self.peek() {
                if is_line_terminator(ch) {
                    break;
                }
                self.bump();
            }
        }

        loop {
            match self.peek() {
                Some(ch) if is_line_terminator(ch) => {
                    newline = true;
                    self.bump();
                }
                Some(ch) if ch.is_whitespace() || ch == '\u{feff}' => {
                    self.bump();
                }
                Some('/') if self.peek_at(1) == Some('/') => {
                    while let Some(ch) = self.peek() {
                        if is_line_terminator(ch) {
                            break;
                        }
                        self.bump();
                    }
                }
                Some('/') if self.peek_at(1) == Some('*') => {
                    let start = self.pos;
                    match self.rest()[2..].find("*/") {
                        Some(end) => {
                            let body = &self.rest()[2..2 + end];
                            if body.chars().any(is_line_terminator) {
                                newline = true;
                            }
                            self.pos += end + 4;
                        }
                        None => return Err(LexError::new(start, "unterminated comment")),
                    }
                }
                _ => return Ok(newline),
            }
        }
    }

    /// Scan the next token, or `None` at end of input
    pub fn next_token(&mut self) -> Result<Option<Token>, LexError> {
        let newline_before = self.skip_trivia()?;
        let start = self.pos;

        let Some(ch) = self.peek() else {
            return Ok(None);
        };

        let kind = match ch {
            '"' | '\'' => self.string(ch)?,
            '`' => {
                self.bump();
                self.template_rest(start, true)?
            }
            '0'..='9' => self.number(),
            '.' if self.peek_at(1).is_some_and(|c| c.is_ascii_digit()) => self.number(),
            '#' if self.peek_at(1).is_some_and(is_ident_start) => {
                self.bump();
                self.identifier();
                TokenKind::PrivateName
            }
            '}' if self.braces.last() == Some(&Brace::Template) => {
                self.braces.pop();
                self.bump();
                self.template_rest(start, false)?
            }
            '/' if !self.expression_ended => self.regex()?,
            c if is_ident_start(c) => {
                self.identifier();
                TokenKind::Ident
            }
            _ => self.punctuator(start)?,
        };

        let token = Token {
            kind,
            span: Span::new(start, self.pos),
            newline_before,
        };
        self.expression_ended = token.ends_expression(self.src);
        Ok(Some(token))
    }

    fn identifier(&mut self) {
        while let Some(ch) = self.peek() {
            if !is_ident_part(ch) {
                break;
            }
            self.bump();
            // `a` style escapes
            if ch == '\\' && self.peek() == Some('u') {
                self.bump();
            }
        }
    }

    fn number(&mut self) -> TokenKind {
        let radix_prefix = self.peek() == Some('0')
            && matches!(self.peek_at(1), Some('x' | 'X' | 'o' | 'O' | 'b' | 'B'));

        if radix_prefix {
            self.pos += 2;
            while self.peek().is_some_and(|c| c.is_ascii_hexdigit() || c == '_') {
                self.bump();
            }
        } else {
            while self.peek().is_some_and(|c| c.is_ascii_digit() || c == '_') {
                self.bump();
            }
            if self.peek() == Some('.') {
                self.bump();
                while self.peek().is_some_and(|c| c.is_ascii_digit() || c == '_') {
                    self.bump();
                }
            }
            if matches!(self.peek(), Some('e' | 'E')) {
                let sign = matches!(self.peek_at(1), Some('+' | '-'));
                let digit_at = if sign { 2 } else { 1 };
                if self.peek_at(digit_at).is_some_and(|c| c.is_ascii_digit()) {
                    self.pos += digit_at;
                    while self.peek().is_some_and(|c| c.is_ascii_digit() || c == '_') {
                        self.bump();
                    }
                }
            }
        }

        if self.peek() == Some('n') {
            self.bump();
        }
        TokenKind::Number
    }

    fn string(&mut self, quote: char) -> Result<TokenKind, LexError> {
        let start = self.pos;
        self.bump();
        loop {
            match self.bump() {
                None => return Err(LexError::new(start, "unterminated string literal")),
                Some('\\') => {
                    // Line continuations and escaped quotes
                    if self.bump() == Some('\r') && self.peek() == Some('\n') {
                        self.bump();
                    }
                }
                Some(c) if c == quote => return Ok(TokenKind::String),
                Some('\n' | '\r') => {
                    return Err(LexError::new(start, "unterminated string literal"));
                }
                Some(_) => {}
            }
        }
    }

    /// Scan template characters after `` ` `` or a substitution's `}`
    fn template_rest(&mut self, start: usize, opening: bool) -> Result<TokenKind, LexError> {
        loop {
            match self.bump() {
                None => return Err(LexError::new(start, "unterminated template literal")),
                Some('\\') => {
                    self.bump();
                }
                Some('`') => {
                    return Ok(if opening {
                        TokenKind::Template
                    } else {
                        TokenKind::TemplateTail
                    });
                }
                Some('$') if self.peek() == Some('{') => {
                    self.bump();
                    self.braces.push(Brace::Template);
                    return Ok(if opening {
                        TokenKind::TemplateHead
                    } else {
                        TokenKind::TemplateMiddle
                    });
                }
                Some(_) => {}
            }
        }
    }

    fn regex(&mut self) -> Result<TokenKind, LexError> {
        let start = self.pos;
        self.bump();
        let mut in_class = false;
        loop {
            match self.bump() {
                None => return Err(LexError::new(start, "unterminated regular expression")),
                Some(c) if is_line_terminator(c) => {
                    return Err(LexError::new(start, "unterminated regular expression"));
                }
                Some('\\') => {
                    self.bump();
                }
                Some('[') => in_class = true,
                Some(']') => in_class = false,
                Some('/') if !in_class => break,
                Some(_) => {}
            }
        }
        // Flags
        while self.peek().is_some_and(is_ident_part) {
            self.bump();
        }
        Ok(TokenKind::Regex)
    }

    fn punctuator(&mut self, start: usize) -> Result<TokenKind, LexError> {
        let rest = self.rest();
        let punct = PUNCTUATORS
            .iter()
            .find(|p| rest.starts_with(**p))
            // `a?.5:b` is a conditional, not optional chaining
            .filter(|p| !(**p == "?." && rest[2..].starts_with(|c: char| c.is_ascii_digit())))
            .copied()
            .or_else(|| rest.starts_with('?').then_some("?"));

        match punct {
            Some(p) => {
                self.pos += p.len();
                match p {
                    "{" => self.braces.push(Brace::Block),
                    "}" => {
                        self.braces.pop();
                    }
                    _ => {}
                }
                Ok(TokenKind::Punct)
            }
            None => {
                let ch = self.peek().unwrap_or('\0');
                Err(LexError::new(start, format!("unexpected character '{}'", ch)))
            }
        }
    }
}

/// Scan a whole source text
pub fn tokenize(src: &str) -> Result<Vec<Token>, LexError> {
    Lexer::new(src).tokenize()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(src: &str) -> Vec<String> {
        tokenize(src)
            .unwrap()
            .iter()
            .map(|t| t.text(src).to_string())
            .collect()
    }

    #[test]
    fn test_basic_tokens() {
        assert_eq!(
            texts("const a = b ?? 1.5e3; // trailing"),
            vec!["const", "a", "=", "b", "??", "1.5e3", ";"]
        );
    }

    #[test]
    fn test_regex_versus_division() {
        let src = "x = a / b; y = /re[/]/g.test(s)";
        let tokens = tokenize(src).unwrap();
        let kinds: Vec<_> = tokens.iter().map(|t| t.kind).collect();
        assert_eq!(kinds[3], TokenKind::Punct);
        assert_eq!(tokens[8].kind, TokenKind::Regex);
        assert_eq!(tokens[8].text(src), "/re[/]/g");
    }

    #[test]
    fn test_template_substitutions() {
        let src = "`a${b + `c${d}`}e`";
        let tokens = tokenize(src).unwrap();
        let kinds: Vec<_> = tokens.iter().map(|t| t.kind).collect();
        assert_eq!(
            kinds,
            vec![
                TokenKind::TemplateHead,
                TokenKind::Ident,
                TokenKind::Punct,
                TokenKind::TemplateHead,
                TokenKind::Ident,
                TokenKind::TemplateTail,
                TokenKind::TemplateTail,
            ]
        );
    }

    #[test]
    fn test_newline_tracking() {
        let src = "a\n/* x\n */ b c";
        let tokens = tokenize(src).unwrap();
        assert!(!tokens[0].newline_before);
        assert!(tokens[1].newline_before);
        assert!(!tokens[2].newline_before);
    }

    #[test]
    fn test_hashbang_is_skipped() {
        assert_eq!(texts("#!/usr/bin/env node\nrun()"), vec!["run", "(", ")"]);
    }

    #[test]
    fn test_unterminated_string() {
        let err = tokenize("let s = 'oops\n").unwrap_err();
        assert_eq!(err.offset, 8);
        assert!(err.message.contains("unterminated string"));
    }

    #[test]
    fn test_optional_chaining_versus_conditional() {
        assert_eq!(texts("a?.b"), vec!["a", "?.", "b"]);
        assert_eq!(texts("a?.5:1"), vec!["a", "?", ".5", ":", "1"]);
    }

    #[test]
    fn test_private_name() {
        let src = "this.#count";
        let tokens = tokenize(src).unwrap();
        assert_eq!(tokens[2].kind, TokenKind::PrivateName);
    }
}
