//! Token cursor that can step over TypeScript type syntax
//!
//! Types are never rewritten, only measured: every method returns the index
//! of the first token after the construct so the caller can delete the span.

use crate::syntax::{find_matching, Token, TokenKind};

#[derive(Clone, Copy)]
pub struct TokenCursor<'a> {
    pub src: &'a str,
    pub tokens: &'a [Token],
}

/// Tokens that never appear at the top level of a type argument list
const NOT_IN_TYPE_ARGS: &[&str] = &[
    ";", "&&", "||", "??", "==", "===", "!=", "!==", "+", "*", "/", "%", "!", "++", "--", "+=",
    "-=", "*=", "/=", "<=", ">=",
];

impl<'a> TokenCursor<'a> {
    pub fn new(src: &'a str, tokens: &'a [Token]) -> Self {
        Self { src, tokens }
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn text(&self, i: usize) -> &'a str {
        self.tokens.get(i).map_or("", |t| t.text(self.src))
    }

    pub fn is(&self, i: usize, punct: &str) -> bool {
        self.tokens.get(i).is_some_and(|t| t.is_punct(self.src, punct))
    }

    pub fn is_ident(&self, i: usize, name: &str) -> bool {
        self.tokens.get(i).is_some_and(|t| t.is_ident(self.src, name))
    }

    pub fn is_name(&self, i: usize) -> bool {
        self.tokens.get(i).is_some_and(|t| t.kind == TokenKind::Ident)
    }

    pub fn newline_before(&self, i: usize) -> bool {
        self.tokens.get(i).is_some_and(|t| t.newline_before)
    }

    /// Index after the bracket matching the one at `open`
    pub fn after_matching(&self, open: usize) -> usize {
        find_matching(self.src, self.tokens, open).map_or(self.tokens.len(), |close| close + 1)
    }

    /// Index after the `>` closing the type parameter/argument list at `open`
    ///
    /// `None` when the tokens cannot be a type list (an unbalanced bracket,
    /// or an operator only expressions use).
    pub fn skip_angle(&self, open: usize) -> Option<usize> {
        if !self.is(open, "<") {
            return None;
        }

        let mut angles = 0i32;
        let mut brackets = 0i32;
        for (i, token) in self.tokens.iter().enumerate().skip(open) {
            if token.kind != TokenKind::Punct {
                continue;
            }
            let text = token.text(self.src);
            match text {
                "(" | "[" | "{" => brackets += 1,
                ")" | "]" | "}" => {
                    brackets -= 1;
                    if brackets < 0 {
                        return None;
                    }
                }
                _ if brackets > 0 => {}
                "<" => angles += 1,
                ">" | ">>" | ">>>" => {
                    angles -= text.len() as i32;
                    if angles == 0 {
                        return Some(i + 1);
                    }
                    if angles < 0 {
                        return None;
                    }
                }
                _ if NOT_IN_TYPE_ARGS.contains(&text) => return None,
                _ => {}
            }
        }
        None
    }

    /// Index after the type starting at `i` (`i` itself when there is none)
    pub fn skip_type(&self, i: usize) -> usize {
        let j = self.skip_union(i);
        if j > i && self.is_ident(j, "extends") && !self.newline_before(j) {
            let check = self.skip_union(j + 1);
            if self.is(check, "?") {
                let when_true = self.skip_type(check + 1);
                if self.is(when_true, ":") {
                    return self.skip_type(when_true + 1);
                }
            }
        }
        j
    }

    fn skip_union(&self, i: usize) -> usize {
        let mut j = i;
        if self.is(j, "|") || self.is(j, "&") {
            j += 1;
        }
        j = self.skip_operand(j);
        while self.is(j, "|") || self.is(j, "&") {
            j = self.skip_operand(j + 1);
        }
        j
    }

    fn skip_operand(&self, i: usize) -> usize {
        let Some(token) = self.tokens.get(i) else {
            return i;
        };
        let text = token.text(self.src);

        if token.kind == TokenKind::Ident {
            let next_is_type = self
                .tokens
                .get(i + 1)
                .is_some_and(|t| !t.newline_before && self.can_start_type(i + 1));
            match text {
                "keyof" | "unique" | "readonly" | "new" if next_is_type => {
                    return self.skip_operand(i + 1);
                }
                "abstract" if self.is_ident(i + 1, "new") => return self.skip_operand(i + 2),
                "infer" if self.is_name(i + 1) => {
                    let j = i + 2;
                    if self.is_ident(j, "extends") {
                        // `infer U extends X ?` belongs to the conditional
                        let constraint = self.skip_union(j + 1);
                        if !self.is(constraint, "?") {
                            return constraint;
                        }
                    }
                    return j;
                }
                "asserts" if self.is_name(i + 1) && !self.newline_before(i + 1) => {
                    let j = i + 2;
                    return if self.is_ident(j, "is") {
                        self.skip_type(j + 1)
                    } else {
                        j
                    };
                }
                "typeof" => {
                    let j = self.skip_entity(i + 1);
                    let j = self.skip_type_args(j);
                    return self.skip_postfix(j);
                }
                _ => {}
            }
        }

        let j = match text {
            "(" if token.kind == TokenKind::Punct => {
                let close = self.after_matching(i);
                if self.is(close, "=>") {
                    return self.skip_type(close + 1);
                }
                close
            }
            "<" if token.kind == TokenKind::Punct => {
                // Generic function type
                let Some(params) = self.skip_angle(i) else {
                    return i;
                };
                if !self.is(params, "(") {
                    return i;
                }
                let close = self.after_matching(params);
                if !self.is(close, "=>") {
                    return i;
                }
                return self.skip_type(close + 1);
            }
            "{" | "[" if token.kind == TokenKind::Punct => self.after_matching(i),
            "-" if token.kind == TokenKind::Punct => i + 2,
            _ => match token.kind {
                TokenKind::String | TokenKind::Number | TokenKind::Template => i + 1,
                TokenKind::TemplateHead => self.skip_template(i),
                TokenKind::Ident => {
                    let mut j = self.skip_entity(i);
                    j = self.skip_type_args(j);
                    if self.is_ident(j, "is") && !self.newline_before(j) {
                        return self.skip_type(j + 1);
                    }
                    j
                }
                _ => return i,
            },
        };

        self.skip_postfix(j)
    }

    fn can_start_type(&self, i: usize) -> bool {
        match self.tokens.get(i) {
            Some(t) if t.kind == TokenKind::Punct => {
                matches!(t.text(self.src), "(" | "[" | "{" | "<" | "-")
            }
            Some(_) => true,
            None => false,
        }
    }

    /// `a.b.c`, `import("x").Y`
    fn skip_entity(&self, i: usize) -> usize {
        let mut j = i;
        if self.is_ident(j, "import") && self.is(j + 1, "(") {
            j = self.after_matching(j + 1);
        } else if self.is_name(j) {
            j += 1;
        } else {
            return j;
        }
        while self.is(j, ".") && self.is_name(j + 1) {
            j += 2;
        }
        j
    }

    fn skip_type_args(&self, i: usize) -> usize {
        if self.is(i, "<") && !self.newline_before(i) {
            self.skip_angle(i).unwrap_or(i)
        } else {
            i
        }
    }

    /// `T[]`, `T[K]`
    fn skip_postfix(&self, i: usize) -> usize {
        let mut j = i;
        while self.is(j, "[") && !self.newline_before(j) {
            j = self.after_matching(j);
        }
        j
    }

    fn skip_template(&self, head: usize) -> usize {
        let mut depth = 0usize;
        for (i, token) in self.tokens.iter().enumerate().skip(head) {
            match token.kind {
                TokenKind::TemplateHead => depth += 1,
                TokenKind::TemplateTail => {
                    depth -= 1;
                    if depth == 0 {
                        return i + 1;
                    }
                }
                _ => {}
            }
        }
        self.tokens.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::syntax::tokenize;

    /// Source text of the type starting at token `start`
    fn type_text(src: &str, start: usize) -> String {
        let tokens = tokenize(src).unwrap();
        let cursor = TokenCursor::new(src, &tokens);
        let end = cursor.skip_type(start);
        if end == start {
            return String::new();
        }
        src[tokens[start].span.start..tokens[end - 1].span.end].to_string()
    }

    #[test]
    fn test_simple_and_generic_types() {
        assert_eq!(type_text("x: string = 1", 2), "string");
        assert_eq!(type_text("x: Map<string, Array<number>> = m", 2), "Map<string, Array<number>>");
        assert_eq!(type_text("x: A | B & C[] ;", 2), "A | B & C[]");
        assert_eq!(type_text("x: { a: number; b?: string } = o", 2), "{ a: number; b?: string }");
    }

    #[test]
    fn test_function_and_conditional_types() {
        assert_eq!(type_text("f: (a: T) => void, g", 2), "(a: T) => void");
        assert_eq!(
            type_text("t: T extends string ? 'a' : 'b';", 2),
            "T extends string ? 'a' : 'b'"
        );
        assert_eq!(type_text("r: x is Foo {", 2), "x is Foo");
        assert_eq!(type_text("k: keyof typeof obj)", 2), "keyof typeof obj");
    }

    #[test]
    fn test_type_ends_at_newline_statement() {
        assert_eq!(type_text("type A = string\nconst x = 1", 3), "string");
        assert_eq!(type_text("type A =\n  | 'a'\n  | 'b'\nfoo()", 3), "| 'a'\n  | 'b'");
    }

    #[test]
    fn test_skip_angle_rejects_comparisons() {
        let src = "a < b && c > (d)";
        let tokens = tokenize(src).unwrap();
        let cursor = TokenCursor::new(src, &tokens);
        assert_eq!(cursor.skip_angle(1), None);

        let src = "f<T, U>(x)";
        let tokens = tokenize(src).unwrap();
        let cursor = TokenCursor::new(src, &tokens);
        assert_eq!(cursor.skip_angle(1), Some(6));
    }
}
