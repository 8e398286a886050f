//! JSX lowering
//!
//! Elements become factory calls (`React.createElement("div", props, ...children)`)
//! or, with the automatic runtime, `jsx`/`jsxs` calls imported from
//! `<source>/jsx-runtime`. Code between elements is scanned with the regular
//! scanner so strings, comments and templates never confuse element detection.

use crate::stages::StageError;
use crate::syntax::{is_ident_part, is_ident_start, is_valid_identifier, quote, tokenize, Lexer, TokenKind};
use std::collections::BTreeSet;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JsxRuntime {
    Classic { factory: String, fragment: String },
    Automatic { import_source: String },
}

impl Default for JsxRuntime {
    fn default() -> Self {
        JsxRuntime::Classic {
            factory: "React.createElement".to_string(),
            fragment: "React.Fragment".to_string(),
        }
    }
}

enum Attr {
    Named(String, String),
    Spread(String),
}

enum Child {
    Text(String),
    Expr(String),
    Spread(String),
}

struct Lowering<'a> {
    src: &'a str,
    runtime: &'a JsxRuntime,
    /// Automatic runtime helpers referenced so far
    helpers: BTreeSet<&'static str>,
    elements: usize,
}

/// Lower every JSX element in `src`; `None` when there are none
pub fn lower_jsx(src: &str, runtime: &JsxRuntime) -> Result<Option<String>, StageError> {
    let mut lowering = Lowering {
        src,
        runtime,
        helpers: BTreeSet::new(),
        elements: 0,
    };
    let (code, _) = lowering.region(0, false)?;
    if lowering.elements == 0 {
        return Ok(None);
    }

    match runtime {
        JsxRuntime::Automatic { import_source } if !lowering.helpers.is_empty() => {
            let names: Vec<String> = lowering
                .helpers
                .iter()
                .map(|helper| format!("{} as _{}", helper, helper))
                .collect();
            Ok(Some(format!(
                "import {{ {} }} from {};\n{}",
                names.join(", "),
                quote(&format!("{}/jsx-runtime", import_source)),
                code
            )))
        }
        _ => Ok(Some(code)),
    }
}

impl<'a> Lowering<'a> {
    fn error(&self, offset: usize, message: impl Into<String>) -> StageError {
        StageError::syntax(self.src, offset, message)
    }

    /// Copy code from `pos`, lowering elements, up to the end of input or
    /// (with `stop_at_brace`) the unmatched `}` closing an expression container
    fn region(&mut self, pos: usize, stop_at_brace: bool) -> Result<(String, usize), StageError> {
        let src = self.src;
        let mut out = String::new();
        let mut cursor = pos;
        let mut lexer = Lexer::at(src, pos, false);
        let mut depth = 0usize;
        let mut ended = false;

        while let Some(token) = lexer.next_token().map_err(|e| StageError::from_lex(src, e))? {
            if token.kind == TokenKind::Punct {
                match token.text(src) {
                    "{" => depth += 1,
                    "}" if depth == 0 && stop_at_brace => {
                        out.push_str(&src[cursor..token.span.start]);
                        return Ok((out, token.span.start));
                    }
                    "}" => depth = depth.saturating_sub(1),
                    "<" if !ended && self.starts_element(token.span.start) => {
                        out.push_str(&src[cursor..token.span.start]);
                        let (code, end) = self.element(token.span.start)?;
                        out.push_str(&code);
                        cursor = end;
                        lexer.seek(end, true);
                        ended = true;
                        continue;
                    }
                    _ => {}
                }
            }
            ended = token.ends_expression(src);
        }

        if stop_at_brace {
            return Err(self.error(pos, "unterminated JSX expression"));
        }
        out.push_str(&src[cursor..]);
        Ok((out, src.len()))
    }

    /// `<` at `pos` opens an element (not a type parameter list like `<T,>`)
    fn starts_element(&self, pos: usize) -> bool {
        let rest = self.src[pos + 1..].trim_start();
        match rest.chars().next() {
            Some('>') => true,
            Some(c) if is_ident_start(c) => {
                let name_len = rest
                    .find(|c: char| !(is_ident_part(c) || matches!(c, '.' | '-' | ':')))
                    .unwrap_or(rest.len());
                let after = rest[name_len..].trim_start();
                if after.starts_with(',') {
                    return false;
                }
                match after.strip_prefix("extends") {
                    Some(tail) if tail.starts_with(char::is_whitespace) => {
                        tail.trim_start().starts_with('=')
                    }
                    _ => true,
                }
            }
            _ => false,
        }
    }

    /// Skip whitespace and comments inside a tag
    fn skip_space(&self, mut pos: usize) -> Result<usize, StageError> {
        loop {
            let rest = &self.src[pos..];
            let trimmed = rest.trim_start();
            pos += rest.len() - trimmed.len();
            if trimmed.starts_with("//") {
                pos += trimmed.find('\n').unwrap_or(trimmed.len());
            } else if trimmed.starts_with("/*") {
                let end = trimmed[2..]
                    .find("*/")
                    .ok_or_else(|| self.error(pos, "unterminated comment"))?;
                pos += end + 4;
            } else {
                return Ok(pos);
            }
        }
    }

    fn name_at(&self, pos: usize) -> (String, usize) {
        let rest = &self.src[pos..];
        let len = rest
            .find(|c: char| !(is_ident_part(c) || matches!(c, '.' | '-' | ':')))
            .unwrap_or(rest.len());
        (rest[..len].to_string(), pos + len)
    }

    fn element(&mut self, start: usize) -> Result<(String, usize), StageError> {
        self.elements += 1;
        let mut pos = self.skip_space(start + 1)?;

        if self.src[pos..].starts_with('>') {
            let (children, end) = self.children(pos + 1, None)?;
            return Ok((self.call(None, Vec::new(), children), end));
        }

        let (name, after_name) = self.name_at(pos);
        if name.is_empty() {
            return Err(self.error(pos, "expected a JSX element name"));
        }
        let mut attrs = Vec::new();
        pos = after_name;

        loop {
            pos = self.skip_space(pos)?;
            let rest = &self.src[pos..];

            if rest.starts_with("/>") {
                return Ok((self.call(Some(&name), attrs, Vec::new()), pos + 2));
            }
            if rest.starts_with('>') {
                let (children, end) = self.children(pos + 1, Some(&name))?;
                return Ok((self.call(Some(&name), attrs, children), end));
            }
            if rest.starts_with('{') {
                let inner = self.skip_space(pos + 1)?;
                if !self.src[inner..].starts_with("...") {
                    return Err(self.error(inner, "expected '...' in JSX spread attribute"));
                }
                let (code, close) = self.region(inner + 3, true)?;
                attrs.push(Attr::Spread(code.trim().to_string()));
                pos = close + 1;
                continue;
            }
            if rest.is_empty() {
                return Err(self.error(start, format!("unterminated JSX element <{}>", name)));
            }

            let (attr, after) = self.name_at(pos);
            if attr.is_empty() {
                return Err(self.error(pos, "unexpected character in JSX element"));
            }
            let eq = self.skip_space(after)?;
            if !self.src[eq..].starts_with('=') {
                attrs.push(Attr::Named(attr, "true".to_string()));
                pos = eq;
                continue;
            }
            let value_at = self.skip_space(eq + 1)?;
            let (value, end) = self.attr_value(value_at)?;
            attrs.push(Attr::Named(attr, value));
            pos = end;
        }
    }

    fn attr_value(&mut self, pos: usize) -> Result<(String, usize), StageError> {
        let rest = &self.src[pos..];
        match rest.chars().next() {
            Some(q @ ('"' | '\'')) => {
                let len = rest[1..]
                    .find(q)
                    .ok_or_else(|| self.error(pos, "unterminated JSX attribute string"))?;
                let raw = &rest[1..1 + len];
                Ok((quote(&decode_entities(raw)), pos + len + 2))
            }
            Some('{') => {
                let (code, close) = self.region(pos + 1, true)?;
                let code = code.trim();
                if code.is_empty() {
                    return Err(self.error(pos, "JSX attributes must be assigned a non-empty expression"));
                }
                Ok((code.to_string(), close + 1))
            }
            Some('<') => self.element(pos),
            _ => Err(self.error(pos, "expected a JSX attribute value")),
        }
    }

    fn children(&mut self, mut pos: usize, name: Option<&str>) -> Result<(Vec<Child>, usize), StageError> {
        let src = self.src;
        let mut children = Vec::new();

        loop {
            let rest = &src[pos..];
            let Some(offset) = rest.find(['<', '{']) else {
                let tag = name.unwrap_or("");
                return Err(self.error(pos, format!("unterminated JSX contents of <{}>", tag)));
            };
            if let Some(text) = clean_text(&rest[..offset]) {
                children.push(Child::Text(quote(&decode_entities(&text))));
            }
            pos += offset;

            if src[pos..].starts_with('{') {
                let (code, close) = self.region(pos + 1, true)?;
                pos = close + 1;
                if tokenize(&code).is_ok_and(|tokens| tokens.is_empty()) {
                    continue;
                }
                let code = code.trim();
                match code.strip_prefix("...") {
                    Some(spread) => children.push(Child::Spread(spread.trim().to_string())),
                    None => children.push(Child::Expr(code.to_string())),
                }
                continue;
            }

            let after_lt = self.skip_space(pos + 1)?;
            if src[after_lt..].starts_with('/') {
                let at = self.skip_space(after_lt + 1)?;
                let (closing, after) = self.name_at(at);
                let gt = self.skip_space(after)?;
                if !src[gt..].starts_with('>') || closing != name.unwrap_or("") {
                    let expected = name.map_or("<>".to_string(), |n| format!("<{}>", n));
                    return Err(self.error(pos, format!("expected corresponding JSX closing tag for {}", expected)));
                }
                return Ok((children, gt + 1));
            }

            let (code, end) = self.element(pos)?;
            children.push(Child::Expr(code));
            pos = end;
        }
    }

    fn call(&mut self, name: Option<&str>, attrs: Vec<Attr>, children: Vec<Child>) -> String {
        match self.runtime {
            JsxRuntime::Classic { factory, fragment } => {
                let tag = name.map_or_else(|| fragment.clone(), tag_expression);
                let props = if attrs.is_empty() {
                    "null".to_string()
                } else {
                    object_literal(attrs.into_iter().map(property).collect())
                };

                let mut args = vec![tag, props];
                args.extend(children.into_iter().map(|child| match child {
                    Child::Text(text) | Child::Expr(text) => text,
                    Child::Spread(code) => format!("...{}", code),
                }));
                format!("{}({})", factory, args.join(", "))
            }
            JsxRuntime::Automatic { .. } => {
                let tag = match name {
                    Some(name) => tag_expression(name),
                    None => {
                        self.helpers.insert("Fragment");
                        "_Fragment".to_string()
                    }
                };

                let mut key = None;
                let mut props = Vec::new();
                for attr in attrs {
                    match attr {
                        Attr::Named(name, value) if name == "key" => key = Some(value),
                        other => props.push(property(other)),
                    }
                }

                let static_children = children.len() > 1;
                let values: Vec<String> = children
                    .into_iter()
                    .map(|child| match child {
                        Child::Text(text) | Child::Expr(text) => text,
                        Child::Spread(code) => format!("...{}", code),
                    })
                    .collect();
                match values.len() {
                    0 => {}
                    1 => props.push(format!("children: {}", values[0])),
                    _ => props.push(format!("children: [{}]", values.join(", "))),
                }

                let helper = if static_children { "jsxs" } else { "jsx" };
                self.helpers.insert(helper);
                let props = if props.is_empty() {
                    "{}".to_string()
                } else {
                    object_literal(props)
                };
                match key {
                    Some(key) => format!("_{}({}, {}, {})", helper, tag, props, key),
                    None => format!("_{}({}, {})", helper, tag, props),
                }
            }
        }
    }
}

/// Lowercase and namespaced names are intrinsic elements
fn tag_expression(name: &str) -> String {
    let intrinsic = name.starts_with(|c: char| c.is_ascii_lowercase()) && !name.contains('.')
        || name.contains('-')
        || name.contains(':');
    if intrinsic {
        quote(name)
    } else {
        name.to_string()
    }
}

fn property(attr: Attr) -> String {
    match attr {
        Attr::Named(name, value) if is_valid_identifier(&name) => format!("{}: {}", name, value),
        Attr::Named(name, value) => format!("{}: {}", quote(&name), value),
        Attr::Spread(code) => format!("...{}", code),
    }
}

fn object_literal(props: Vec<String>) -> String {
    format!("{{ {} }}", props.join(", "))
}

/// Collapse JSX text the way React does: lines are trimmed, blank lines
/// dropped and the remaining lines joined with single spaces
fn clean_text(text: &str) -> Option<String> {
    let lines: Vec<&str> = text.split('\n').map(|l| l.trim_end_matches('\r')).collect();
    let last_non_empty = lines
        .iter()
        .rposition(|line| line.chars().any(|c| c != ' ' && c != '\t'))
        .unwrap_or(0);

    let mut out = String::new();
    for (i, line) in lines.iter().enumerate() {
        let line = line.replace('\t', " ");
        let mut trimmed = line.as_str();
        if i != 0 {
            trimmed = trimmed.trim_start_matches(' ');
        }
        if i != lines.len() - 1 {
            trimmed = trimmed.trim_end_matches(' ');
        }
        if trimmed.is_empty() {
            continue;
        }
        out.push_str(trimmed);
        if i != last_non_empty {
            out.push(' ');
        }
    }
    (!out.is_empty()).then_some(out)
}

fn decode_entities(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        rest = &rest[amp..];
        let decoded = rest[1..].find(';').filter(|&len| len <= 10).and_then(|len| {
            let entity = &rest[1..1 + len];
            let ch = match entity {
                "amp" => Some('&'),
                "lt" => Some('<'),
                "gt" => Some('>'),
                "quot" => Some('"'),
                "apos" => Some('\''),
                "nbsp" => Some('\u{a0}'),
                _ => entity
                    .strip_prefix("#x")
                    .and_then(|hex| u32::from_str_radix(hex, 16).ok())
                    .or_else(|| entity.strip_prefix('#').and_then(|dec| dec.parse().ok()))
                    .and_then(char::from_u32),
            };
            ch.map(|ch| (ch, len + 2))
        });
        match decoded {
            Some((ch, len)) => {
                out.push(ch);
                rest = &rest[len..];
            }
            None => {
                out.push('&');
                rest = &rest[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classic(src: &str) -> String {
        lower_jsx(src, &JsxRuntime::default()).unwrap().unwrap()
    }

    #[test]
    fn test_elements_and_attributes() {
        assert_eq!(
            classic(r#"const el = <div className="box" data-id={id} hidden />;"#),
            r#"const el = React.createElement("div", { className: "box", "data-id": id, hidden: true });"#
        );
        assert_eq!(
            classic("<Foo.Bar {...props} key=\"k\">hi</Foo.Bar>"),
            "React.createElement(Foo.Bar, { ...props, key: \"k\" }, \"hi\")"
        );
    }

    #[test]
    fn test_nested_children_and_expressions() {
        let out = classic("const list = <ul>\n  {items.map(i => <li>{i}</li>)}\n  {/* note */}\n</ul>;");
        assert_eq!(
            out,
            "const list = React.createElement(\"ul\", null, items.map(i => React.createElement(\"li\", null, i)));"
        );
    }

    #[test]
    fn test_text_whitespace_and_entities() {
        assert_eq!(
            classic("<p>\n  Hello &amp;\n  welcome   back\n</p>"),
            "React.createElement(\"p\", null, \"Hello & welcome   back\")"
        );
        assert_eq!(
            classic("<p><b>a</b> <i>b</i></p>"),
            "React.createElement(\"p\", null, React.createElement(\"b\", null, \"a\"), \" \", React.createElement(\"i\", null, \"b\"))"
        );
    }

    #[test]
    fn test_fragments_and_custom_factory() {
        let runtime = JsxRuntime::Classic {
            factory: "h".to_string(),
            fragment: "Fragment".to_string(),
        };
        assert_eq!(
            lower_jsx("<><A /></>", &runtime).unwrap().unwrap(),
            "h(Fragment, null, h(A, null))"
        );
    }

    #[test]
    fn test_comparisons_and_generics_untouched() {
        assert_eq!(lower_jsx("if (a < b && c > d) f();", &JsxRuntime::default()).unwrap(), None);
        assert_eq!(
            lower_jsx("const id = <T,>(x: T) => x;", &JsxRuntime::default()).unwrap(),
            None
        );
        assert_eq!(lower_jsx("const s = '<div>';", &JsxRuntime::default()).unwrap(), None);
    }

    #[test]
    fn test_automatic_runtime() {
        let runtime = JsxRuntime::Automatic {
            import_source: "preact".to_string(),
        };
        let out = lower_jsx("export const A = () => <div key={k}><b /><i /></div>;", &runtime)
            .unwrap()
            .unwrap();
        assert_eq!(
            out,
            "import { jsx as _jsx, jsxs as _jsxs } from \"preact/jsx-runtime\";\nexport const A = () => _jsxs(\"div\", { children: [_jsx(\"b\", {}), _jsx(\"i\", {})] }, k);"
        );
    }

    #[test]
    fn test_mismatched_closing_tag() {
        let err = lower_jsx("<a></b>", &JsxRuntime::default()).unwrap_err();
        assert!(err.to_string().contains("closing tag for <a>"));
    }
}
