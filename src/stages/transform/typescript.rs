//! TypeScript type erasure
//!
//! Annotations, type-only declarations and TS-only modifiers are deleted in
//! place; enums, parameter properties and `import x = require()` are
//! rewritten as plain JavaScript. Namespaces holding values and decorators
//! are rejected.
//!
//! The walker keeps a stack of bracket scopes so that a `:` is only treated
//! as an annotation where one can appear (parameter lists, class members,
//! variable declarators, return positions).

use super::types::TokenCursor;
use crate::stages::StageError;
use crate::syntax::{find_matching, quote, string_value, tokenize, Edits, Token, TokenKind};
use std::collections::HashSet;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StripOptions {
    /// Keep every import as written (no unused-import elision)
    pub verbatim_module_syntax: bool,
    /// Accept `<T>expr` assertions (not available in `.tsx`)
    pub angle_assertions: bool,
}

/// Erase types from `src`
pub fn strip_types(src: &str, options: StripOptions) -> Result<String, StageError> {
    let tokens = tokenize(src).map_err(|e| StageError::from_lex(src, e))?;
    let mut stripper = Stripper::new(src, &tokens, options);
    stripper.run()?;
    let stripped = stripper.edits.apply(src);

    if options.verbatim_module_syntax {
        return Ok(stripped);
    }
    elide_unused_imports(&stripped)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Scope {
    Block,
    ClassBody,
    Object,
    Params,
    Paren,
    Bracket,
}

#[derive(Debug)]
struct Frame {
    scope: Scope,
    /// `let`/`const`/`var` declarators follow commas at this level
    declaring: bool,
    /// Inside a parameter default value
    in_default: bool,
    /// Class body: the next token starts a member
    member_start: bool,
    /// Params: first token of the owning declaration, for bodiless signatures
    signature_start: Option<usize>,
    constructor: bool,
    /// Constructor parameter properties
    properties: Vec<String>,
}

impl Frame {
    fn new(scope: Scope) -> Self {
        Self {
            scope,
            declaring: false,
            in_default: false,
            member_start: scope == Scope::ClassBody,
            signature_start: None,
            constructor: false,
            properties: Vec::new(),
        }
    }
}

const PARAM_MODIFIERS: &[&str] = &["public", "private", "protected", "readonly", "override"];

const MEMBER_MODIFIERS: &[&str] = &[
    "public", "private", "protected", "readonly", "override", "declare", "abstract", "static",
    "async", "get", "set", "accessor",
];

/// Keywords after which `{` opens an object literal
const OBJECT_AFTER: &[&str] = &[
    "return", "typeof", "in", "of", "yield", "await", "case", "throw", "new", "delete", "void",
    "default",
];

struct Stripper<'a> {
    src: &'a str,
    tokens: &'a [Token],
    cur: TokenCursor<'a>,
    options: StripOptions,
    edits: Edits,
    frames: Vec<Frame>,
    /// `{` opening a class body
    class_body: Option<usize>,
    /// `{` opening a function body, with parameter properties to assign
    function_body: Option<(usize, Vec<String>)>,
}

impl<'a> Stripper<'a> {
    fn new(src: &'a str, tokens: &'a [Token], options: StripOptions) -> Self {
        Self {
            src,
            tokens,
            cur: TokenCursor::new(src, tokens),
            options,
            edits: Edits::new(),
            frames: vec![Frame::new(Scope::Block)],
            class_body: None,
            function_body: None,
        }
    }

    fn run(&mut self) -> Result<(), StageError> {
        let mut i = 0;
        while i < self.tokens.len() {
            i = self.step(i)?;
        }
        Ok(())
    }

    fn top(&self) -> &Frame {
        &self.frames[self.frames.len() - 1]
    }

    fn top_mut(&mut self) -> &mut Frame {
        let last = self.frames.len() - 1;
        &mut self.frames[last]
    }

    /// Delete tokens `from..to` (exclusive) with the text between them
    fn delete_tokens(&mut self, from: usize, to: usize) {
        let to = to.min(self.tokens.len());
        if to > from {
            self.edits
                .delete(self.tokens[from].span.start, self.tokens[to - 1].span.end);
        }
    }

    /// Delete a keyword and the whitespace after it
    fn delete_keyword(&mut self, i: usize) {
        let end = self
            .tokens
            .get(i + 1)
            .map_or(self.tokens[i].span.end, |next| next.span.start);
        self.edits.delete(self.tokens[i].span.start, end);
    }

    fn ends_expression(&self, i: usize) -> bool {
        self.tokens.get(i).is_some_and(|t| t.ends_expression(self.src))
    }

    fn at_statement_start(&self, i: usize) -> bool {
        if self.top().scope != Scope::Block {
            return false;
        }
        match i.checked_sub(1).map(|p| &self.tokens[p]) {
            None => true,
            Some(prev) => {
                prev.is_punct(self.src, ";")
                    || prev.is_punct(self.src, "{")
                    || prev.is_punct(self.src, "}")
                    || (self.tokens[i].newline_before && prev.can_end_statement(self.src))
            }
        }
    }

    /// Index after the statement starting at `start`
    fn statement_end(&self, start: usize) -> usize {
        let src = self.src;
        let tokens = self.tokens;
        let mut depth = 0usize;
        let mut j = start;
        while j < tokens.len() {
            let token = &tokens[j];
            if token.kind == TokenKind::Punct {
                match token.text(src) {
                    "(" | "[" | "{" => depth += 1,
                    ")" | "]" | "}" if depth == 0 => return j,
                    ")" | "]" | "}" => depth -= 1,
                    ";" if depth == 0 => return j + 1,
                    _ => {}
                }
            }
            if depth == 0
                && j > start
                && token.newline_before
                && tokens[j - 1].can_end_statement(src)
                && token.can_start_statement(src)
                && !matches!(token.text(src), "(" | "[" | "+" | "-" | "/" | "<")
                && !matches!(token.text(src), "as" | "satisfies" | "extends" | "is" | "in" | "of" | "instanceof")
            {
                return j;
            }
            j += 1;
        }
        tokens.len()
    }

    fn step(&mut self, i: usize) -> Result<usize, StageError> {
        let src = self.src;
        let token = self.tokens[i];
        let text = token.text(src);

        if token.kind == TokenKind::Punct && matches!(text, ")" | "]" | "}") {
            return self.close(i);
        }

        if token.is_punct(src, "@") && matches!(self.top().scope, Scope::Block | Scope::ClassBody) {
            return Err(StageError::unsupported(src, token.span.start, "decorators are not supported"));
        }

        if self.top().scope == Scope::ClassBody {
            let newline_start = token.newline_before
                && i > 0
                && self.tokens[i - 1].can_end_statement(src)
                && token.can_start_statement(src);
            if self.top().member_start || newline_start {
                return self.class_member(i);
            }
        }

        if self.at_statement_start(i) {
            self.top_mut().declaring = false;
            if let Some(next) = self.statement(i)? {
                return Ok(next);
            }
        }

        match (token.kind, text) {
            (TokenKind::Punct, "(") => return self.open_paren(i),
            (TokenKind::Punct, "[") => {
                self.frames.push(Frame::new(Scope::Bracket));
            }
            (TokenKind::Punct, "{") => self.open_brace(i),
            (TokenKind::Ident, "let" | "const" | "var") if self.binding_follows(i + 1) => {
                self.top_mut().declaring = true;
                return Ok(self.declarator(i + 1));
            }
            (TokenKind::Ident, "function") => return self.function_head(i),
            (TokenKind::Ident, "class") => return Ok(self.class_head(i)),
            (TokenKind::Ident, "as" | "satisfies")
                if i > 0 && self.ends_expression(i - 1) && !token.newline_before =>
            {
                let end = self.cur.skip_type(i + 1);
                if end > i + 1 {
                    self.edits
                        .delete(self.tokens[i - 1].span.end, self.tokens[end - 1].span.end);
                    return Ok(end);
                }
            }
            (TokenKind::Punct, "!") if i > 0 && self.ends_expression(i - 1) && !token.newline_before => {
                self.delete_tokens(i, i + 1);
            }
            (TokenKind::Punct, "<") => {
                if let Some(next) = self.angle(i) {
                    return Ok(next);
                }
            }
            (TokenKind::Punct, ":") if self.top().scope == Scope::Params && !self.top().in_default => {
                let end = self.cur.skip_type(i + 1);
                self.delete_tokens(i, end);
                return Ok(end.max(i + 1));
            }
            (TokenKind::Punct, "?")
                if self.top().scope == Scope::Params
                    && !self.top().in_default
                    && [":", ",", ")", "="].iter().any(|p| self.cur.is(i + 1, p)) =>
            {
                self.delete_tokens(i, i + 1);
            }
            (TokenKind::Punct, "=") if self.top().scope == Scope::Params => {
                self.top_mut().in_default = true;
            }
            (TokenKind::Punct, ",") => {
                if self.top().scope == Scope::Params {
                    self.top_mut().in_default = false;
                    return self.param_start(i + 1);
                }
                if self.top().declaring {
                    return Ok(self.declarator(i + 1));
                }
            }
            (TokenKind::Punct, ";") => {
                self.top_mut().declaring = false;
                if self.top().scope == Scope::ClassBody {
                    self.top_mut().member_start = true;
                }
            }
            _ => {}
        }
        Ok(i + 1)
    }

    fn close(&mut self, i: usize) -> Result<usize, StageError> {
        if self.frames.len() == 1 {
            return Ok(i + 1);
        }
        let Some(frame) = self.frames.pop() else {
            return Ok(i + 1);
        };
        match frame.scope {
            Scope::Params => return self.after_params(i, frame),
            Scope::Block if self.top().scope == Scope::ClassBody => {
                self.top_mut().member_start = true;
            }
            _ => {}
        }
        Ok(i + 1)
    }

    // Statements

    fn statement(&mut self, i: usize) -> Result<Option<usize>, StageError> {
        let cur = self.cur;
        let same_line_name = cur.is_name(i + 1) && !cur.newline_before(i + 1);

        let next = match cur.text(i) {
            "import" if self.tokens[i].kind == TokenKind::Ident => return self.import_statement(i),
            "export" if self.tokens[i].kind == TokenKind::Ident => return self.export_statement(i),
            "interface" if same_line_name => {
                let end = self.interface_end(i);
                self.delete_tokens(i, end);
                end
            }
            "type" if same_line_name && (cur.is(i + 2, "=") || cur.is(i + 2, "<")) => {
                let end = self.type_alias_end(i);
                self.delete_tokens(i, end);
                end
            }
            "declare" if same_line_name => {
                let end = self.declaration_end(i);
                self.delete_tokens(i, end);
                end
            }
            "enum" if cur.is_name(i + 1) => self.lower_enum(i, i)?,
            "const" if cur.is_ident(i + 1, "enum") && cur.is_name(i + 2) => self.lower_enum(i, i + 1)?,
            "namespace" | "module" if self.namespace_body(i).is_some() => self.namespace(i, i)?,
            "abstract" if cur.is_ident(i + 1, "class") && !cur.newline_before(i + 1) => {
                self.delete_keyword(i);
                i + 1
            }
            _ => return Ok(None),
        };
        Ok(Some(next))
    }

    /// Index after `import ... from "x" [with {...}] [;]`, starting inside the clause
    fn import_end(&self, from: usize) -> usize {
        let cur = self.cur;
        let mut k = from;
        while k < cur.len() && self.tokens[k].kind != TokenKind::String {
            if cur.is(k, "{") {
                k = cur.after_matching(k);
                continue;
            }
            k += 1;
        }
        k += 1;
        if (cur.is_ident(k, "with") || cur.is_ident(k, "assert")) && cur.is(k + 1, "{") {
            k = cur.after_matching(k + 1);
        }
        if cur.is(k, ";") {
            k += 1;
        }
        k.min(cur.len())
    }

    fn import_statement(&mut self, i: usize) -> Result<Option<usize>, StageError> {
        let j = i + 1;
        let cur = self.cur;
        if cur.is(j, "(") || cur.is(j, ".") || j >= cur.len() {
            return Ok(None);
        }
        if self.tokens[j].kind == TokenKind::String {
            return Ok(Some(self.import_end(j)));
        }

        // `import type X = require("x")`
        if cur.is_ident(j, "type") && cur.is_name(j + 1) && cur.is(j + 2, "=") {
            let end = self.statement_end(i);
            self.delete_tokens(i, end);
            return Ok(Some(end));
        }
        let type_only = cur.is_ident(j, "type")
            && !cur.is(j + 1, ",")
            && !cur.is_ident(j + 1, "from")
            && !cur.is(j + 1, "=");
        if type_only {
            let end = self.import_end(j);
            self.delete_tokens(i, end);
            return Ok(Some(end));
        }

        // `import fs = require("fs")`, `import Alias = NS.Member`
        if cur.is_name(j) && cur.is(j + 1, "=") {
            let token = self.tokens[i];
            self.edits.replace(token.span.start, token.span.end, "const");
            return Ok(Some(j + 1));
        }

        let end = self.import_end(j);
        if let Some(open) = (j..end).find(|&k| self.cur.is(k, "{")) {
            let close = find_matching(self.src, self.tokens, open).unwrap_or(end);
            let (removed, total) = self.remove_type_specifiers(open, close);
            let has_default = open > j;
            if total > 0 && removed == total && !has_default {
                if self.options.verbatim_module_syntax {
                    if let Some(source) = (close..end).find(|&k| self.tokens[k].kind == TokenKind::String) {
                        let literal = self.tokens[source].text(self.src);
                        self.edits.replace(
                            self.tokens[i].span.start,
                            self.tokens[end - 1].span.end,
                            format!("import {};", literal),
                        );
                    }
                } else {
                    self.delete_tokens(i, end);
                }
            }
        }
        Ok(Some(end))
    }

    /// Delete `type X` specifiers between braces; returns (removed, total)
    fn remove_type_specifiers(&mut self, open: usize, close: usize) -> (usize, usize) {
        let mut removed = 0;
        let mut total = 0;
        let mut k = open + 1;
        while k < close {
            let mut e = k;
            while e < close && !self.cur.is(e, ",") {
                e += 1;
            }
            if e == k {
                k += 1;
                continue;
            }
            total += 1;
            if self.cur.is_ident(k, "type") && e - k >= 2 {
                removed += 1;
                let with_comma = if e < close { e + 1 } else { e };
                self.delete_tokens(k, with_comma);
            }
            k = e + 1;
        }
        (removed, total)
    }

    fn export_statement(&mut self, i: usize) -> Result<Option<usize>, StageError> {
        let j = i + 1;
        let cur = self.cur;
        let src = self.src;

        let end = match cur.text(j) {
            "type" if cur.is(j + 1, "{") || cur.is(j + 1, "*") => {
                let end = self.statement_end(j);
                self.delete_tokens(i, end);
                end
            }
            "type" if cur.is_name(j + 1) && (cur.is(j + 2, "=") || cur.is(j + 2, "<")) => {
                let end = self.type_alias_end(j);
                self.delete_tokens(i, end);
                end
            }
            "interface" if cur.is_name(j + 1) => {
                let end = self.interface_end(j);
                self.delete_tokens(i, end);
                end
            }
            "declare" if cur.is_name(j + 1) => {
                let end = self.declaration_end(j);
                self.delete_tokens(i, end);
                end
            }
            "default" if cur.is_ident(j + 1, "interface") => {
                let end = self.interface_end(j + 1);
                self.delete_tokens(i, end);
                end
            }
            "default" if cur.is_ident(j + 1, "abstract") && cur.is_ident(j + 2, "class") => {
                self.delete_keyword(j + 1);
                j + 2
            }
            "abstract" if cur.is_ident(j + 1, "class") => {
                self.delete_keyword(j);
                j + 1
            }
            "enum" if cur.is_name(j + 1) => self.lower_enum(i, j)?,
            "const" if cur.is_ident(j + 1, "enum") => self.lower_enum(i, j + 1)?,
            "namespace" | "module" if self.namespace_body(j).is_some() => self.namespace(i, j)?,
            "import" if cur.is_name(j + 1) && cur.is(j + 2, "=") => {
                let token = self.tokens[j];
                self.edits.replace(token.span.start, token.span.end, "const");
                j + 1
            }
            "=" => {
                return Err(StageError::unsupported(
                    src,
                    self.tokens[i].span.start,
                    "`export =` is not supported in ES modules",
                ));
            }
            "as" if cur.is_ident(j + 1, "namespace") => {
                let end = self.statement_end(j);
                self.delete_tokens(i, end);
                end
            }
            "{" if self.tokens.get(j).is_some_and(|t| t.kind == TokenKind::Punct) => {
                let close = find_matching(src, self.tokens, j).unwrap_or(cur.len());
                let mut end = close + 1;
                if self.cur.is_ident(end, "from") {
                    end += 2;
                }
                if self.cur.is(end, ";") {
                    end += 1;
                }
                let (removed, total) = self.remove_type_specifiers(j, close);
                if total > 0 && removed == total {
                    self.delete_tokens(i, end);
                }
                end.min(self.cur.len())
            }
            _ => return Ok(None),
        };
        Ok(Some(end))
    }

    fn interface_end(&self, keyword: usize) -> usize {
        let cur = self.cur;
        let mut j = keyword + 2;
        if cur.is(j, "<") {
            j = cur.skip_angle(j).unwrap_or(j + 1);
        }
        if cur.is_ident(j, "extends") {
            j = self.type_list_end(j + 1);
        }
        if cur.is(j, "{") {
            cur.after_matching(j)
        } else {
            j
        }
    }

    fn type_alias_end(&self, keyword: usize) -> usize {
        let cur = self.cur;
        let mut j = keyword + 2;
        if cur.is(j, "<") {
            j = cur.skip_angle(j).unwrap_or(j + 1);
        }
        if !cur.is(j, "=") {
            return j;
        }
        let end = cur.skip_type(j + 1);
        if cur.is(end, ";") {
            end + 1
        } else {
            end
        }
    }

    fn declaration_end(&self, keyword: usize) -> usize {
        let cur = self.cur;
        let braced = matches!(
            cur.text(keyword + 1),
            "class" | "module" | "namespace" | "global" | "enum" | "interface" | "abstract"
        );
        if !braced {
            return self.statement_end(keyword + 1);
        }

        let mut j = keyword + 1;
        while j < cur.len() && !cur.is(j, "{") && !cur.is(j, ";") {
            j = if cur.is(j, "<") {
                cur.skip_angle(j).unwrap_or(j + 1)
            } else {
                j + 1
            };
        }
        if cur.is(j, "{") {
            cur.after_matching(j)
        } else {
            (j + 1).min(cur.len())
        }
    }

    /// `A, B<C>` in `extends`/`implements` clauses
    fn type_list_end(&self, start: usize) -> usize {
        let mut j = start;
        loop {
            j = self.cur.skip_type(j);
            if self.cur.is(j, ",") {
                j += 1;
            } else {
                return j;
            }
        }
    }

    /// `{` of `namespace A.B {` / `module X {` at `keyword`
    fn namespace_body(&self, keyword: usize) -> Option<usize> {
        let cur = self.cur;
        let name = keyword + 1;
        let named = cur.is_name(name) || self.tokens.get(name).is_some_and(|t| t.kind == TokenKind::String);
        if !named || cur.newline_before(name) {
            return None;
        }
        let mut j = name + 1;
        while cur.is(j, ".") && cur.is_name(j + 1) {
            j += 2;
        }
        cur.is(j, "{").then_some(j)
    }

    fn namespace(&mut self, start: usize, keyword: usize) -> Result<usize, StageError> {
        let Some(open) = self.namespace_body(keyword) else {
            return Ok(keyword + 1);
        };
        let end = self.cur.after_matching(open);
        if !self.type_only_body(open + 1, end.saturating_sub(1)) {
            return Err(StageError::unsupported(
                self.src,
                self.tokens[keyword].span.start,
                "namespaces containing values are not supported",
            ));
        }
        self.delete_tokens(start, end);
        Ok(end)
    }

    /// Whether the statements in `from..to` only declare types
    fn type_only_body(&self, from: usize, to: usize) -> bool {
        let cur = self.cur;
        let mut k = from;
        while k < to {
            if cur.is(k, ";") {
                k += 1;
                continue;
            }
            let s = if cur.is_ident(k, "export") { k + 1 } else { k };
            k = match cur.text(s) {
                "interface" => self.interface_end(s),
                "type" => self.type_alias_end(s),
                "declare" => self.declaration_end(s),
                "namespace" | "module" => match self.namespace_body(s) {
                    Some(open) => {
                        let end = cur.after_matching(open);
                        if !self.type_only_body(open + 1, end - 1) {
                            return false;
                        }
                        end
                    }
                    None => return false,
                },
                _ => return false,
            };
        }
        true
    }

    fn lower_enum(&mut self, start: usize, keyword: usize) -> Result<usize, StageError> {
        let src = self.src;
        let name = self.cur.text(keyword + 1).to_string();
        let open = keyword + 2;
        let close = match find_matching(src, self.tokens, open) {
            Some(close) if self.cur.is(open, "{") => close,
            _ => {
                return Err(StageError::syntax(
                    src,
                    self.tokens[keyword].span.start,
                    "expected an enum body",
                ));
            }
        };

        let mut members: Vec<String> = Vec::new();
        let mut body = String::new();
        let mut next_value: Option<f64> = Some(0.0);
        let mut k = open + 1;

        while k < close {
            if self.cur.is(k, ",") {
                k += 1;
                continue;
            }
            let member = match self.tokens[k].kind {
                TokenKind::String => string_value(self.cur.text(k)),
                _ => self.cur.text(k).to_string(),
            };
            let key = quote(&member);
            k += 1;

            if self.cur.is(k, "=") {
                let init_start = k + 1;
                let mut e = init_start;
                let mut depth = 0usize;
                while e < close {
                    match self.cur.text(e) {
                        "(" | "[" | "{" => depth += 1,
                        ")" | "]" | "}" => depth = depth.saturating_sub(1),
                        "," if depth == 0 => break,
                        _ => {}
                    }
                    e += 1;
                }
                if e == init_start {
                    return Err(StageError::syntax(src, self.tokens[k].span.start, "expected an enum initializer"));
                }
                let raw = &src[self.tokens[init_start].span.start..self.tokens[e - 1].span.end];
                let init = qualify_members(raw, &name, &members);

                if self.tokens[init_start].kind == TokenKind::String && e == init_start + 1 {
                    body.push_str(&format!(" {name}[{key}] = {init};"));
                    next_value = None;
                } else {
                    body.push_str(&format!(" {name}[{name}[{key}] = {init}] = {key};"));
                    next_value = numeric_literal(raw).map(|v| v + 1.0);
                }
                k = e;
            } else {
                let value = match (next_value, members.last()) {
                    (Some(v), _) => format_number(v),
                    (None, Some(prev)) => format!("{name}[{}] + 1", quote(prev)),
                    (None, None) => "0".to_string(),
                };
                body.push_str(&format!(" {name}[{name}[{key}] = {value}] = {key};"));
                next_value = next_value.map(|v| v + 1.0);
            }
            members.push(member);
        }

        let export = if self.cur.is_ident(start, "export") { "export " } else { "" };
        let code = format!(
            "{export}var {name};\n(function ({name}) {{{body} }})({name} || ({name} = {{}}));"
        );
        self.edits
            .replace(self.tokens[start].span.start, self.tokens[close].span.end, code);
        Ok(close + 1)
    }

    // Declarations inside code

    fn binding_follows(&self, j: usize) -> bool {
        self.tokens.get(j).is_some_and(|t| t.is_name(self.src)) || self.cur.is(j, "{") || self.cur.is(j, "[")
    }

    /// Strip `!` and `: T` after the binding at `j`
    fn declarator(&mut self, j: usize) -> usize {
        let mut k = if self.cur.is(j, "{") || self.cur.is(j, "[") {
            self.cur.after_matching(j)
        } else {
            j + 1
        };
        if self.cur.is(k, "!") {
            self.delete_tokens(k, k + 1);
            k += 1;
        }
        if self.cur.is(k, ":") {
            let end = self.cur.skip_type(k + 1);
            self.delete_tokens(k, end);
            k = end;
        }
        k
    }

    fn function_head(&mut self, i: usize) -> Result<usize, StageError> {
        let mut j = i + 1;
        if self.cur.is(j, "*") {
            j += 1;
        }
        if self.cur.is_name(j) {
            j += 1;
        }
        if self.cur.is(j, "<") {
            if let Some(end) = self.cur.skip_angle(j) {
                self.delete_tokens(j, end);
                j = end;
            }
        }
        if !self.cur.is(j, "(") {
            return Ok(j);
        }

        let mut start = i;
        while start > 0 && matches!(self.cur.text(start - 1), "async" | "export" | "default" | "declare") {
            start -= 1;
        }
        let signature_start = self.at_statement_start(start).then_some(start);
        self.push_params(signature_start, false);
        self.param_start(j + 1)
    }

    fn push_params(&mut self, signature_start: Option<usize>, constructor: bool) {
        let mut frame = Frame::new(Scope::Params);
        frame.signature_start = signature_start;
        frame.constructor = constructor;
        self.frames.push(frame);
    }

    /// Handle `this` parameters and parameter property modifiers at `j`
    fn param_start(&mut self, j: usize) -> Result<usize, StageError> {
        if self.cur.is_ident(j, "this") && self.cur.is(j + 1, ":") {
            let mut end = self.cur.skip_type(j + 2);
            if self.cur.is(end, ",") {
                end += 1;
            }
            self.delete_tokens(j, end);
            return Ok(end);
        }

        let mut k = j;
        let mut property = false;
        while PARAM_MODIFIERS.contains(&self.cur.text(k))
            && self.tokens[k].kind == TokenKind::Ident
            && (self.cur.is_name(k + 1) || self.cur.is(k + 1, "{") || self.cur.is(k + 1, "["))
        {
            self.delete_keyword(k);
            property = true;
            k += 1;
        }
        if property && self.top().constructor && self.cur.is_name(k) {
            let name = self.cur.text(k).to_string();
            self.top_mut().properties.push(name);
        }
        Ok(k)
    }

    fn after_params(&mut self, close: usize, frame: Frame) -> Result<usize, StageError> {
        let mut j = close + 1;
        if self.cur.is(j, ":") {
            let end = self.cur.skip_type(j + 1);
            self.delete_tokens(j, end);
            j = end;
        }

        if let Some(start) = frame.signature_start {
            if !self.cur.is(j, "{") {
                // Overload or abstract signature
                let end = if self.cur.is(j, ";") { j + 1 } else { j };
                self.delete_tokens(start, end);
                if self.top().scope == Scope::ClassBody {
                    self.top_mut().member_start = true;
                }
                return Ok(end);
            }
        }
        if self.cur.is(j, "{") {
            self.function_body = Some((j, frame.properties));
        }
        Ok(j)
    }

    fn open_paren(&mut self, i: usize) -> Result<usize, StageError> {
        if self.is_parameter_list(i) {
            self.push_params(None, false);
            return self.param_start(i + 1);
        }
        self.frames.push(Frame::new(Scope::Paren));
        Ok(i + 1)
    }

    fn is_parameter_list(&self, i: usize) -> bool {
        let cur = self.cur;
        let prev = i.checked_sub(1);
        if prev.is_some_and(|p| cur.is_ident(p, "catch")) {
            return true;
        }

        let after = cur.after_matching(i);
        if cur.is(after, "=>") {
            return true;
        }
        if cur.is(after, ":") {
            let end = cur.skip_type(after + 1);
            // `c ? (a) : b => d` is a conditional; `c ? (a): T => a : b` is not
            let consequent = prev.is_some_and(|p| cur.is(p, "?"));
            if cur.is(end, "=>") && (!consequent || self.alternate_follows(end + 1)) {
                return true;
            }
        }

        // Object literal methods: `{ name(...) {`, `get name()`, `async *name()`
        let Some(name) = prev else {
            return false;
        };
        if self.top().scope != Scope::Object {
            return false;
        }
        let named = self.tokens[name].kind != TokenKind::Punct || cur.is(name, "]");
        let before = if cur.is(name, "]") {
            (0..name)
                .rev()
                .find(|&k| cur.is(k, "[") && find_matching(self.src, self.tokens, k) == Some(name))
                .and_then(|open| open.checked_sub(1))
        } else {
            name.checked_sub(1)
        };
        named
            && before.is_some_and(|b| {
                cur.is(b, "{")
                    || cur.is(b, ",")
                    || cur.is(b, "*")
                    || ["get", "set", "async"].iter().any(|m| cur.is_ident(b, m))
            })
    }

    /// Whether the arrow body starting at `k` is followed by the `:` of an
    /// enclosing conditional
    fn alternate_follows(&self, k: usize) -> bool {
        let cur = self.cur;
        let mut depth = 0usize;
        let mut pending = 0usize;
        for j in k..cur.len() {
            if self.tokens[j].kind != TokenKind::Punct {
                continue;
            }
            match cur.text(j) {
                "(" | "[" | "{" => depth += 1,
                ")" | "]" | "}" if depth == 0 => return false,
                ")" | "]" | "}" => depth -= 1,
                "?" if depth == 0 => pending += 1,
                ":" if depth == 0 && pending == 0 => return true,
                ":" if depth == 0 => pending -= 1,
                "," | ";" if depth == 0 => return false,
                _ => {}
            }
        }
        false
    }

    fn open_brace(&mut self, i: usize) {
        let scope = if self.class_body == Some(i) {
            self.class_body = None;
            Scope::ClassBody
        } else if self.function_body.as_ref().is_some_and(|(at, _)| *at == i) {
            if let Some((_, properties)) = self.function_body.take() {
                self.assign_properties(i, &properties);
            }
            Scope::Block
        } else {
            self.brace_scope(i)
        };
        self.frames.push(Frame::new(scope));
    }

    fn brace_scope(&self, i: usize) -> Scope {
        let src = self.src;
        let Some(prev) = i.checked_sub(1).map(|p| &self.tokens[p]) else {
            return Scope::Block;
        };
        match prev.kind {
            TokenKind::Punct => match prev.text(src) {
                ")" | ";" | "{" | "}" | "=>" => Scope::Block,
                ":" if self.top().scope == Scope::Block && self.after_case_label(i - 1) => Scope::Block,
                _ => Scope::Object,
            },
            TokenKind::Ident if OBJECT_AFTER.contains(&prev.text(src)) => Scope::Object,
            TokenKind::TemplateHead | TokenKind::TemplateMiddle => Scope::Object,
            _ => Scope::Block,
        }
    }

    /// `case x:` / `default:` before the colon at `colon`
    fn after_case_label(&self, colon: usize) -> bool {
        let floor = colon.saturating_sub(6);
        (floor..colon).rev().any(|k| self.cur.is_ident(k, "case") || self.cur.is_ident(k, "default"))
    }

    /// Assign constructor parameter properties after `super(...)` or at
    /// the start of the body opened at `open`
    fn assign_properties(&mut self, open: usize, properties: &[String]) {
        if properties.is_empty() {
            return;
        }
        let cur = self.cur;
        let close = find_matching(self.src, self.tokens, open).unwrap_or(cur.len());
        let mut at = self.tokens[open].span.end;
        let mut depth = 0usize;
        for k in open + 1..close {
            match cur.text(k) {
                "(" | "[" | "{" => depth += 1,
                ")" | "]" | "}" => depth = depth.saturating_sub(1),
                "super" if depth == 0 && cur.is(k + 1, "(") => {
                    let mut end = cur.after_matching(k + 1);
                    if cur.is(end, ";") {
                        end += 1;
                    }
                    at = self.tokens[end - 1].span.end;
                    break;
                }
                _ => {}
            }
        }
        let assignments: String = properties
            .iter()
            .map(|name| format!(" this.{name} = {name};"))
            .collect();
        self.edits.insert(at, assignments);
    }

    fn class_head(&mut self, i: usize) -> usize {
        let cur = self.cur;
        let mut j = i + 1;
        if cur.is_name(j) && !cur.is_ident(j, "extends") && !cur.is_ident(j, "implements") {
            j += 1;
        }
        if cur.is(j, "<") {
            if let Some(end) = cur.skip_angle(j) {
                self.delete_tokens(j, end);
                j = end;
            }
        }

        if self.cur.is_ident(j, "extends") {
            j += 1;
            let mut depth = 0usize;
            while j < self.cur.len() {
                if depth == 0 && (self.cur.is(j, "{") || self.cur.is_ident(j, "implements")) {
                    break;
                }
                match self.cur.text(j) {
                    "(" | "[" => depth += 1,
                    ")" | "]" => depth = depth.saturating_sub(1),
                    "<" if depth == 0 && self.ends_expression(j - 1) => {
                        if let Some(end) = self.cur.skip_angle(j) {
                            self.delete_tokens(j, end);
                            j = end;
                            continue;
                        }
                    }
                    _ => {}
                }
                j += 1;
            }
        }

        if self.cur.is_ident(j, "implements") {
            let end = self.type_list_end(j + 1);
            self.delete_tokens(j, end);
            j = end;
        }
        if self.cur.is(j, "{") {
            self.class_body = Some(j);
        }
        j
    }

    fn modifier_applies(&self, j: usize) -> bool {
        let Some(next) = self.tokens.get(j + 1) else {
            return false;
        };
        match next.kind {
            TokenKind::Punct => matches!(next.text(self.src), "[" | "*" | "{"),
            _ => true,
        }
    }

    fn class_member(&mut self, i: usize) -> Result<usize, StageError> {
        let start = i;
        self.top_mut().member_start = false;
        let cur = self.cur;

        if cur.is(i, ";") {
            self.top_mut().member_start = true;
            return Ok(i + 1);
        }

        // Index signature
        if cur.is(i, "[") && cur.is_name(i + 1) && cur.is(i + 2, ":") {
            let end = self.statement_end(i);
            self.delete_tokens(start, end);
            self.top_mut().member_start = true;
            return Ok(end);
        }

        let mut j = i;
        while self.tokens.get(j).is_some_and(|t| t.kind == TokenKind::Ident)
            && MEMBER_MODIFIERS.contains(&self.cur.text(j))
            && self.modifier_applies(j)
        {
            match self.cur.text(j) {
                "declare" | "abstract" => {
                    let end = self.statement_end(j);
                    self.delete_tokens(start, end);
                    self.top_mut().member_start = true;
                    return Ok(end);
                }
                "public" | "private" | "protected" | "readonly" | "override" => self.delete_keyword(j),
                _ => {}
            }
            j += 1;
        }

        // `static { ... }`
        if self.cur.is(j, "{") {
            self.function_body = Some((j, Vec::new()));
            return Ok(j);
        }
        if self.cur.is(j, "*") {
            j += 1;
        }
        let name = j;
        if self.cur.is(j, "[") {
            j = self.cur.after_matching(j);
        } else if j < self.cur.len() {
            j += 1;
        }
        if self.cur.is(j, "?") || self.cur.is(j, "!") {
            self.delete_tokens(j, j + 1);
            j += 1;
        }
        if self.cur.is(j, "<") {
            if let Some(end) = self.cur.skip_angle(j) {
                self.delete_tokens(j, end);
                j = end;
            }
        }
        if self.cur.is(j, "(") {
            let constructor = self.cur.is_ident(name, "constructor");
            self.push_params(Some(start), constructor);
            return self.param_start(j + 1);
        }
        if self.cur.is(j, ":") {
            let end = self.cur.skip_type(j + 1);
            self.delete_tokens(j, end);
            j = end;
        }
        Ok(j)
    }

    /// `<` as type arguments, type parameters or an old-style assertion
    fn angle(&mut self, i: usize) -> Option<usize> {
        let end = self.cur.skip_angle(i)?;

        if i > 0 && self.ends_expression(i - 1) {
            // `f<T>(x)`, `new Map<K, V>()`, tag<T>`...`
            let call = self.cur.is(end, "(")
                || self.tokens.get(end).is_some_and(Token::is_template_start);
            if !call {
                return None;
            }
            self.delete_tokens(i, end);
            return Some(end);
        }

        // `<T>(x: T) => x`
        if self.cur.is(end, "(") {
            let after = self.cur.after_matching(end);
            if self.cur.is(after, "=>") || self.cur.is(after, ":") {
                self.delete_tokens(i, end);
                return Some(end);
            }
        }
        // `<T>value`
        if self.options.angle_assertions
            && self.tokens.get(end).is_some_and(|t| t.can_start_statement(self.src))
        {
            self.delete_tokens(i, end);
            return Some(end);
        }
        None
    }
}

/// Prefix references to earlier members inside an enum initializer
fn qualify_members(raw: &str, name: &str, members: &[String]) -> String {
    let Ok(tokens) = tokenize(raw) else {
        return raw.to_string();
    };
    let mut edits = Edits::new();
    for (i, token) in tokens.iter().enumerate() {
        let after_dot = i > 0 && tokens[i - 1].is_punct(raw, ".");
        if token.kind == TokenKind::Ident && !after_dot && members.iter().any(|m| m == token.text(raw)) {
            edits.insert(token.span.start, format!("{}.", name));
        }
    }
    edits.apply(raw)
}

fn numeric_literal(raw: &str) -> Option<f64> {
    let raw = raw.trim();
    let digits = raw.strip_prefix('-').unwrap_or(raw);
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit() || c == '.') {
        return None;
    }
    raw.parse().ok()
}

fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        value.to_string()
    }
}

struct ImportDecl {
    start: usize,
    end: usize,
    source: usize,
    default: Option<String>,
    namespace: Option<String>,
    /// (specifier text, local name)
    named: Vec<(String, String)>,
}

/// Parse `import a, * as ns, { b as c } from "x"` starting at `i`
fn parse_import(src: &str, tokens: &[Token], i: usize) -> Option<ImportDecl> {
    let cur = TokenCursor::new(src, tokens);
    let mut k = i + 1;
    let mut decl = ImportDecl {
        start: i,
        end: 0,
        source: 0,
        default: None,
        namespace: None,
        named: Vec::new(),
    };

    if cur.is_name(k) {
        decl.default = Some(cur.text(k).to_string());
        k += 1;
        if cur.is(k, ",") {
            k += 1;
        }
    }
    if cur.is(k, "*") && cur.is_ident(k + 1, "as") && cur.is_name(k + 2) {
        decl.namespace = Some(cur.text(k + 2).to_string());
        k += 3;
    } else if cur.is(k, "{") {
        let close = find_matching(src, tokens, k)?;
        let mut s = k + 1;
        while s < close {
            let mut e = s;
            while e < close && !cur.is(e, ",") {
                e += 1;
            }
            if e > s {
                let text = src[tokens[s].span.start..tokens[e - 1].span.end].to_string();
                let local = cur.text(e - 1).to_string();
                decl.named.push((text, local));
            }
            s = e + 1;
        }
        k = close + 1;
    }

    if !cur.is_ident(k, "from") || tokens.get(k + 1)?.kind != TokenKind::String {
        return None;
    }
    decl.source = k + 1;
    k += 2;
    if (cur.is_ident(k, "with") || cur.is_ident(k, "assert")) && cur.is(k + 1, "{") {
        k = cur.after_matching(k + 1);
    }
    if cur.is(k, ";") {
        k += 1;
    }
    decl.end = k.min(tokens.len());
    Some(decl)
}

/// Drop import bindings that are never referenced once types are gone
fn elide_unused_imports(code: &str) -> Result<String, StageError> {
    let tokens = tokenize(code).map_err(|e| StageError::from_lex(code, e))?;

    let mut imports = Vec::new();
    let mut i = 0;
    while i < tokens.len() {
        let statement_start = i == 0
            || tokens[i].newline_before
            || tokens[i - 1].is_punct(code, ";")
            || tokens[i - 1].is_punct(code, "}");
        if statement_start && tokens[i].is_ident(code, "import") {
            if let Some(decl) = parse_import(code, &tokens, i) {
                i = decl.end;
                imports.push(decl);
                continue;
            }
        }
        i += 1;
    }
    if imports.is_empty() {
        return Ok(code.to_string());
    }

    let mut used: HashSet<&str> = HashSet::new();
    let mut ranges = imports.iter().map(|d| (d.start, d.end));
    let mut current = ranges.next();
    for (i, token) in tokens.iter().enumerate() {
        while current.is_some_and(|(_, end)| i >= end) {
            current = ranges.next();
        }
        if current.is_some_and(|(start, end)| i >= start && i < end) {
            continue;
        }
        let after_dot = i > 0 && (tokens[i - 1].is_punct(code, ".") || tokens[i - 1].is_punct(code, "?."));
        if token.kind == TokenKind::Ident && !after_dot {
            used.insert(token.text(code));
        }
    }

    let mut edits = Edits::new();
    for decl in &imports {
        let total = decl.default.iter().count() + decl.namespace.iter().count() + decl.named.len();
        if total == 0 {
            continue;
        }
        let default = decl.default.as_ref().filter(|name| used.contains(name.as_str()));
        let namespace = decl.namespace.as_ref().filter(|name| used.contains(name.as_str()));
        let named: Vec<&str> = decl
            .named
            .iter()
            .filter(|(_, local)| used.contains(local.as_str()))
            .map(|(text, _)| text.as_str())
            .collect();
        let kept = default.iter().count() + namespace.iter().count() + named.len();
        if kept == total {
            continue;
        }

        let span_start = tokens[decl.start].span.start;
        let span_end = tokens[decl.end - 1].span.end;
        if kept == 0 {
            edits.delete(span_start, span_end);
            continue;
        }

        let mut parts: Vec<String> = Vec::new();
        if let Some(name) = default {
            parts.push(name.clone());
        }
        if let Some(name) = namespace {
            parts.push(format!("* as {}", name));
        }
        if !named.is_empty() {
            parts.push(format!("{{ {} }}", named.join(", ")));
        }
        let source = &tokens[decl.source];
        let tail = &code[source.span.end..span_end];
        edits.replace(
            span_start,
            span_end,
            format!("import {} from {}{}", parts.join(", "), source.text(code), tail),
        );
    }
    Ok(edits.apply(code))
}
