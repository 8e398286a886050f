//! Target syntax support
//!
//! Newer constructs whose operands can be repeated without side effects
//! are rewritten into equivalents every target understands; anything else
//! a target lacks is reported as unsupported.

use crate::core::{Feature, Target};
use crate::stages::StageError;
use crate::syntax::{find_matching, tokenize, Edits, Token, TokenKind};

type Pass = fn(&str, &[Target]) -> Result<Option<String>, StageError>;

const MEMBER_LINKS: &[&str] = &["."];
const CHAIN_LINKS: &[&str] = &[".", "?."];

fn first_unsupported(targets: &[Target], feature: Feature) -> Option<&Target> {
    targets.iter().find(|target| !target.supports(feature))
}

fn lexed(src: &str) -> Result<Vec<Token>, StageError> {
    tokenize(src).map_err(|e| StageError::from_lex(src, e))
}

fn applied(src: &str, edits: Edits) -> Option<String> {
    if edits.is_empty() {
        None
    } else {
        Some(edits.apply(src))
    }
}

/// Lower what some target lacks, one pass per group of features; `None`
/// when nothing changed
pub fn lower_features(src: &str, targets: &[Target]) -> Result<Option<String>, StageError> {
    const PASSES: [Pass; 4] = [lower_simple, lower_nullish, lower_optional_chains, lower_exponent];

    let mut current: Option<String> = None;
    for pass in PASSES {
        let code = current.as_deref().unwrap_or(src);
        if let Some(lowered) = pass(code, targets)? {
            current = Some(lowered);
        }
    }
    Ok(current)
}

/// Numeric separators, optional catch bindings and logical assignments
fn lower_simple(src: &str, targets: &[Target]) -> Result<Option<String>, StageError> {
    let lower_separators = first_unsupported(targets, Feature::NumericSeparator).is_some();
    let lower_catch = first_unsupported(targets, Feature::OptionalCatchBinding).is_some();
    let lower_assignment = first_unsupported(targets, Feature::LogicalAssignment).is_some();
    let nullish = first_unsupported(targets, Feature::NullishCoalescing).is_none();
    if !(lower_separators || lower_catch || lower_assignment) {
        return Ok(None);
    }

    let tokens = lexed(src)?;
    let mut edits = Edits::new();
    for (i, token) in tokens.iter().enumerate() {
        let text = token.text(src);
        match token.kind {
            TokenKind::Number if lower_separators && text.contains('_') => {
                edits.replace(token.span.start, token.span.end, text.replace('_', ""));
            }
            TokenKind::Ident
                if lower_catch
                    && text == "catch"
                    && tokens.get(i + 1).is_some_and(|t| t.is_punct(src, "{")) =>
            {
                edits.insert(token.span.end, " (_unused)");
            }
            TokenKind::Punct if lower_assignment && matches!(text, "||=" | "&&=" | "??=") => {
                if let Some((start, end, code)) = lower_logical_assignment(src, &tokens, i, nullish) {
                    if !edits.covers(start) {
                        edits.replace(start, end, code);
                    }
                }
            }
            _ => {}
        }
    }
    Ok(applied(src, edits))
}

/// `a.b ??= c` as `a.b ?? (a.b = c)`; `None` when the target expression
/// could have side effects
fn lower_logical_assignment(
    src: &str,
    tokens: &[Token],
    op: usize,
    nullish: bool,
) -> Option<(usize, usize, String)> {
    let lhs_start = simple_target_start(src, tokens, op, MEMBER_LINKS)?;
    let rhs_end = assignment_end(src, tokens, op + 1);
    if rhs_end <= op + 1 {
        return None;
    }

    let lhs = &src[tokens[lhs_start].span.start..tokens[op - 1].span.end];
    let rhs = &src[tokens[op + 1].span.start..tokens[rhs_end - 1].span.end];
    let code = match tokens[op].text(src) {
        "||=" => format!("{lhs} || ({lhs} = {rhs})"),
        "&&=" => format!("{lhs} && ({lhs} = {rhs})"),
        _ if nullish => format!("{lhs} ?? ({lhs} = {rhs})"),
        _ => format!("({lhs} != null ? {lhs} : ({lhs} = {rhs}))"),
    };
    Some((tokens[lhs_start].span.start, tokens[rhs_end - 1].span.end, code))
}

/// `a ?? b ?? c` as `(a != null ? a : b != null ? b : c)` when every
/// operand but the last is a reference
fn lower_nullish(src: &str, targets: &[Target]) -> Result<Option<String>, StageError> {
    if first_unsupported(targets, Feature::NullishCoalescing).is_none() {
        return Ok(None);
    }
    let tokens = lexed(src)?;
    let mut edits = Edits::new();
    for i in 0..tokens.len() {
        if !tokens[i].is_punct(src, "??") {
            continue;
        }
        let Some(start) = simple_target_start(src, &tokens, i, CHAIN_LINKS) else {
            continue;
        };
        if edits.covers(tokens[start].span.start) || !starts_operand(src, &tokens, start) {
            continue;
        }
        if let Some((end, code)) = nullish_chain(src, &tokens, start, i, targets) {
            edits.replace(tokens[start].span.start, tokens[end - 1].span.end, code);
        }
    }
    Ok(applied(src, edits))
}

fn nullish_chain(
    src: &str,
    tokens: &[Token],
    start: usize,
    first_op: usize,
    targets: &[Target],
) -> Option<(usize, String)> {
    let text = |from: usize, to: usize| &src[tokens[from].span.start..tokens[to - 1].span.end];

    let mut operands = vec![text(start, first_op)];
    let mut j = first_op + 1;
    let end = loop {
        let end = operand_end(src, tokens, j);
        if end == j {
            return None;
        }
        if !tokens.get(end).is_some_and(|t| t.is_punct(src, "??")) {
            break end;
        }
        if simple_target_start(src, tokens, end, CHAIN_LINKS) != Some(j) {
            return None;
        }
        operands.push(text(j, end));
        j = end + 1;
    };

    let last = text(j, end);
    let mut code = lower_nullish(last, targets)
        .ok()
        .flatten()
        .unwrap_or_else(|| last.to_string());
    for operand in operands.iter().rev() {
        code = format!("{operand} != null ? {operand} : {code}");
    }
    Some((end, format!("({code})")))
}

/// `a?.b.c` as `(a == null ? void 0 : a.b.c)`
fn lower_optional_chains(src: &str, targets: &[Target]) -> Result<Option<String>, StageError> {
    if first_unsupported(targets, Feature::OptionalChaining).is_none() {
        return Ok(None);
    }
    let tokens = lexed(src)?;
    let mut edits = Edits::new();
    for i in 0..tokens.len() {
        if !tokens[i].is_punct(src, "?.") {
            continue;
        }
        let Some(start) = simple_target_start(src, &tokens, i, MEMBER_LINKS) else {
            continue;
        };
        let deleted = start > 0 && tokens[start - 1].is_ident(src, "delete");
        if deleted || edits.covers(tokens[start].span.start) {
            continue;
        }
        if let Some((end, code)) = optional_chain(src, &tokens, start, i, targets) {
            edits.replace(tokens[start].span.start, tokens[end - 1].span.end, code);
        }
    }
    Ok(applied(src, edits))
}

/// One link of a member chain: `.name`, `[key]` or `(args)`
struct Link {
    optional: bool,
    text: String,
    repeatable: bool,
}

fn optional_chain(
    src: &str,
    tokens: &[Token],
    start: usize,
    first: usize,
    targets: &[Target],
) -> Option<(usize, String)> {
    let mut links = Vec::new();
    let mut j = first;
    while j < tokens.len() {
        let optional = tokens[j].is_punct(src, "?.");
        let k = if optional { j + 1 } else { j };
        let token = tokens.get(k)?;

        if token.is_punct(src, "(") || token.is_punct(src, "[") {
            let close = find_matching(src, tokens, k)?;
            let inner = &src[token.span.start..tokens[close].span.end];
            let repeatable = token.is_punct(src, "[")
                && tokens[k + 1..close]
                    .iter()
                    .all(|t| matches!(t.kind, TokenKind::Ident | TokenKind::String | TokenKind::Number));
            let text = lower_optional_chains(inner, targets)
                .ok()
                .flatten()
                .unwrap_or_else(|| inner.to_string());
            links.push(Link {
                optional,
                text,
                repeatable,
            });
            j = close + 1;
        } else if optional || token.is_punct(src, ".") {
            let at = if optional { k } else { k + 1 };
            let name = tokens
                .get(at)
                .filter(|t| matches!(t.kind, TokenKind::Ident | TokenKind::PrivateName))?;
            links.push(Link {
                optional,
                text: format!(".{}", name.text(src)),
                repeatable: true,
            });
            j = at + 1;
        } else {
            break;
        }
    }

    let mut access = src[tokens[start].span.start..tokens[first - 1].span.end].to_string();
    let mut repeatable = true;
    let mut guards = Vec::new();
    for link in &links {
        if link.optional {
            if !repeatable {
                return None;
            }
            guards.push(access.clone());
        }
        access.push_str(&link.text);
        repeatable &= link.repeatable;
    }

    let mut code = access;
    for guard in guards.iter().rev() {
        code = format!("{guard} == null ? void 0 : {code}");
    }
    Some((j, format!("({code})")))
}

/// `a ** b` as `Math.pow(a, b)` and `a **= b` as `a = Math.pow(a, b)`
/// for references, numbers and parenthesized operands
fn lower_exponent(src: &str, targets: &[Target]) -> Result<Option<String>, StageError> {
    if first_unsupported(targets, Feature::Exponent).is_none() {
        return Ok(None);
    }
    let tokens = lexed(src)?;
    let mut edits = Edits::new();
    for i in 0..tokens.len() {
        let assign = tokens[i].is_punct(src, "**=");
        if !assign && !tokens[i].is_punct(src, "**") {
            continue;
        }
        let Some(start) = exponent_base(src, &tokens, i) else {
            continue;
        };
        if edits.covers(tokens[start].span.start) {
            continue;
        }
        let lhs = &src[tokens[start].span.start..tokens[i - 1].span.end];

        let (end, code) = if assign {
            if simple_target_start(src, &tokens, i, MEMBER_LINKS) != Some(start) {
                continue;
            }
            let end = assignment_end(src, &tokens, i + 1);
            if end <= i + 1 {
                continue;
            }
            let rhs = &src[tokens[i + 1].span.start..tokens[end - 1].span.end];
            (end, format!("{lhs} = Math.pow({lhs}, {rhs})"))
        } else {
            let Some(end) = exponent_end(src, &tokens, i + 1) else {
                continue;
            };
            let rhs = &src[tokens[i + 1].span.start..tokens[end - 1].span.end];
            (end, format!("Math.pow({lhs}, {rhs})"))
        };
        edits.replace(tokens[start].span.start, tokens[end - 1].span.end, code);
    }
    Ok(applied(src, edits))
}

fn exponent_base(src: &str, tokens: &[Token], op: usize) -> Option<usize> {
    let prev = op.checked_sub(1)?;
    let start = if tokens[prev].is_punct(src, ")") {
        let open = (0..prev)
            .rev()
            .find(|&k| tokens[k].is_punct(src, "(") && find_matching(src, tokens, k) == Some(prev))?;
        // `f(x) ** 2`
        if open > 0 && tokens[open - 1].ends_expression(src) {
            return None;
        }
        open
    } else if tokens[prev].kind == TokenKind::Number {
        prev
    } else {
        simple_target_start(src, tokens, op, MEMBER_LINKS)?
    };
    let before = start.checked_sub(1).map(|p| &tokens[p]);
    if before.is_some_and(|t| {
        t.kind == TokenKind::Punct && matches!(t.text(src), "**" | "++" | "--" | "." | "?.")
    }) {
        return None;
    }
    Some(start)
}

fn exponent_end(src: &str, tokens: &[Token], start: usize) -> Option<usize> {
    let first = tokens.get(start)?;
    let end = if first.is_punct(src, "(") {
        find_matching(src, tokens, start)? + 1
    } else if first.kind == TokenKind::Number {
        start + 1
    } else if first.kind == TokenKind::Ident {
        let mut j = start + 1;
        while tokens.get(j).is_some_and(|t| t.is_punct(src, "."))
            && tokens.get(j + 1).is_some_and(|t| t.kind == TokenKind::Ident)
        {
            j += 2;
        }
        j
    } else {
        return None;
    };

    // The operand continues, or `**` binds to the right
    let continues = tokens.get(end).is_some_and(|t| {
        t.is_template_start()
            || (t.kind == TokenKind::Punct && matches!(t.text(src), "(" | "[" | "." | "?." | "**"))
            || (!t.newline_before && t.kind != TokenKind::Punct)
            || (!t.newline_before && matches!(t.text(src), "++" | "--"))
    });
    if continues {
        None
    } else {
        Some(end)
    }
}

/// Whether an operand of a short-circuit operator may begin at `start`
fn starts_operand(src: &str, tokens: &[Token], start: usize) -> bool {
    let Some(prev) = start.checked_sub(1).map(|p| &tokens[p]) else {
        return true;
    };
    if tokens[start].newline_before && prev.can_end_statement(src) {
        return true;
    }
    let text = prev.text(src);
    match prev.kind {
        TokenKind::Punct => {
            matches!(text, "(" | "[" | "{" | "," | ";" | ":" | "?" | "=>" | "...")
                || (text.ends_with('=') && !matches!(text, "==" | "===" | "!=" | "!==" | "<=" | ">="))
        }
        TokenKind::Ident => matches!(text, "return" | "throw" | "case" | "yield" | "default" | "else"),
        TokenKind::TemplateHead | TokenKind::TemplateMiddle => true,
        _ => false,
    }
}

/// Start of an identifier or member chain (`a`, `this.x.y`, `a[0]`) ending
/// right before `op`, following only the given member links
fn simple_target_start(src: &str, tokens: &[Token], op: usize, links: &[&str]) -> Option<usize> {
    let linked = |k: usize| links.iter().any(|l| tokens[k].is_punct(src, l));
    let mut j = op.checked_sub(1)?;
    loop {
        let token = &tokens[j];
        if token.kind == TokenKind::Ident || token.kind == TokenKind::PrivateName {
            if j >= 2 && linked(j - 1) {
                j -= 2;
                continue;
            }
            return Some(j);
        }
        if token.is_punct(src, "]") {
            let open = (0..j).rev().find(|&k| {
                tokens[k].is_punct(src, "[") && find_matching(src, tokens, k) == Some(j)
            })?;
            let plain = tokens[open + 1..j]
                .iter()
                .all(|t| matches!(t.kind, TokenKind::Ident | TokenKind::String | TokenKind::Number));
            if !plain || open == 0 {
                return None;
            }
            j = open - 1;
            if j >= 1 && tokens[j].is_punct(src, "?.") && links.contains(&"?.") {
                j -= 1;
            }
            continue;
        }
        return None;
    }
}

/// Index after the operand of a short-circuit operator starting at `start`
fn operand_end(src: &str, tokens: &[Token], start: usize) -> usize {
    let mut depth = 0usize;
    let mut j = start;
    while j < tokens.len() {
        let token = &tokens[j];
        match token.kind {
            TokenKind::TemplateHead => depth += 1,
            TokenKind::TemplateTail => depth = depth.saturating_sub(1),
            TokenKind::Punct => match token.text(src) {
                "(" | "[" | "{" => depth += 1,
                ")" | "]" | "}" if depth == 0 => return j,
                ")" | "]" | "}" => depth -= 1,
                "," | ";" | ":" | "?" | "??" | "||" | "&&" if depth == 0 => return j,
                _ => {}
            },
            _ => {}
        }
        if depth == 0
            && j > start
            && token.newline_before
            && tokens[j - 1].can_end_statement(src)
            && token.can_start_statement(src)
            && !matches!(token.text(src), "(" | "[" | "+" | "-" | "/" | "<")
        {
            return j;
        }
        j += 1;
    }
    j
}

/// Index after the last token of the assignment expression starting at `start`
fn assignment_end(src: &str, tokens: &[Token], start: usize) -> usize {
    let mut depth = 0usize;
    let mut j = start;
    while j < tokens.len() {
        let token = &tokens[j];
        if token.kind == TokenKind::Punct {
            match token.text(src) {
                "(" | "[" | "{" => depth += 1,
                ")" | "]" | "}" if depth == 0 => return j,
                ")" | "]" | "}" => depth -= 1,
                "," | ";" | ":" if depth == 0 => return j,
                _ => {}
            }
        }
        if depth == 0
            && j > start
            && token.newline_before
            && tokens[j - 1].can_end_statement(src)
            && token.can_start_statement(src)
            && !matches!(token.text(src), "(" | "[" | "+" | "-" | "/" | "<")
        {
            return j;
        }
        j += 1;
    }
    j
}

/// Reject syntax some target cannot run
pub fn check_features(src: &str, tokens: &[Token], targets: &[Target]) -> Result<(), StageError> {
    let mut brackets: Vec<&str> = Vec::new();

    for (i, token) in tokens.iter().enumerate() {
        let text = token.text(src);
        let next = tokens.get(i + 1);
        let mut found: Vec<Feature> = Vec::new();

        match token.kind {
            TokenKind::Punct => match text {
                "(" | "[" | "{" => brackets.push(text),
                ")" | "]" | "}" => {
                    brackets.pop();
                }
                "**" | "**=" => found.push(Feature::Exponent),
                "?." => found.push(Feature::OptionalChaining),
                "??" => found.push(Feature::NullishCoalescing),
                "??=" => found.extend([Feature::NullishCoalescing, Feature::LogicalAssignment]),
                "||=" | "&&=" => found.push(Feature::LogicalAssignment),
                "..." if brackets.last() == Some(&"{") => found.push(Feature::ObjectRestSpread),
                _ => {}
            },
            TokenKind::Number => {
                if text.contains('_') {
                    found.push(Feature::NumericSeparator);
                }
                if text.ends_with('n') {
                    found.push(Feature::BigInt);
                }
            }
            TokenKind::Regex => {
                let flags = text.rsplit('/').next().unwrap_or("");
                if flags.contains('s') {
                    found.push(Feature::RegexpDotAll);
                }
            }
            TokenKind::PrivateName => found.push(Feature::ClassPrivateFields),
            TokenKind::Ident => match text {
                "catch" if next.is_some_and(|t| t.is_punct(src, "{")) => {
                    found.push(Feature::OptionalCatchBinding)
                }
                "static" if next.is_some_and(|t| t.is_punct(src, "{")) => {
                    found.push(Feature::ClassStaticBlocks)
                }
                "import"
                    if next.is_some_and(|t| t.is_punct(src, "."))
                        && tokens.get(i + 2).is_some_and(|t| t.is_ident(src, "meta")) =>
                {
                    found.push(Feature::ImportMeta)
                }
                "async" if starts_async_function(src, tokens, i) => found.push(Feature::AsyncAwait),
                _ => {}
            },
            _ => {}
        }

        for feature in found {
            if let Some(target) = first_unsupported(targets, feature) {
                return Err(StageError::unsupported(
                    src,
                    token.span.start,
                    format!("{} is not available in {}", feature.description(), target),
                ));
            }
        }
    }
    Ok(())
}

fn starts_async_function(src: &str, tokens: &[Token], i: usize) -> bool {
    let Some(next) = tokens.get(i + 1).filter(|t| !t.newline_before) else {
        return false;
    };
    if next.is_ident(src, "function") {
        return true;
    }
    if next.is_punct(src, "(") {
        return find_matching(src, tokens, i + 1)
            .and_then(|close| tokens.get(close + 1))
            .is_some_and(|t| t.is_punct(src, "=>"));
    }
    // `async x => ...` and `async method() {}`
    next.kind == TokenKind::Ident
        && tokens
            .get(i + 2)
            .is_some_and(|t| t.is_punct(src, "=>") || t.is_punct(src, "("))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Engine;

    fn node(major: u32, minor: u32) -> Vec<Target> {
        vec![Target::new(Engine::Node, (major, minor, 0))]
    }

    fn check(src: &str, targets: &[Target]) -> Result<(), StageError> {
        let tokens = tokenize(src).unwrap();
        check_features(src, &tokens, targets)
    }

    #[test]
    fn test_lowering_for_old_targets() {
        let targets = node(8, 0);
        assert_eq!(
            lower_features("const n = 1_000_000;", &targets).unwrap().as_deref(),
            Some("const n = 1000000;")
        );
        assert_eq!(
            lower_features("try { f() } catch { g() }", &targets).unwrap().as_deref(),
            Some("try { f() } catch (_unused) { g() }")
        );
        assert_eq!(
            lower_features("opts.retries ||= 3;", &targets).unwrap().as_deref(),
            Some("opts.retries || (opts.retries = 3);")
        );
        assert_eq!(
            lower_features("cache[key] ??= load(key)\nnext()", &targets).unwrap().as_deref(),
            Some("(cache[key] != null ? cache[key] : (cache[key] = load(key)))\nnext()")
        );
    }

    #[test]
    fn test_modern_targets_unchanged() {
        let source = "a ??= b; try {} catch {} const n = 1_0;";
        assert_eq!(lower_features(source, &node(20, 0)).unwrap(), None);
    }

    #[test]
    fn test_nullish_kept_when_supported() {
        assert_eq!(
            lower_features("x ??= 1;", &node(14, 0)).unwrap().as_deref(),
            Some("x ?? (x = 1);")
        );
    }

    #[test]
    fn test_optional_chains_lowered() {
        let targets = node(12, 0);
        let lower = |src: &str| lower_features(src, &targets).unwrap();
        assert_eq!(
            lower("const v = a?.b;").as_deref(),
            Some("const v = (a == null ? void 0 : a.b);")
        );
        assert_eq!(
            lower("const k = a?.b.c?.[key];").as_deref(),
            Some("const k = (a == null ? void 0 : a.b.c == null ? void 0 : a.b.c[key]);")
        );
        assert_eq!(
            lower("cb?.(err);").as_deref(),
            Some("(cb == null ? void 0 : cb(err));")
        );
        // A call would run twice
        assert_eq!(lower("load()?.value;"), None);
        assert_eq!(lower("a?.get(k)?.value;"), None);
    }

    #[test]
    fn test_nullish_coalescing_lowered() {
        let targets = node(12, 0);
        let lower = |src: &str| lower_features(src, &targets).unwrap();
        assert_eq!(
            lower("const n = opts.retries ?? 3;").as_deref(),
            Some("const n = (opts.retries != null ? opts.retries : 3);")
        );
        assert_eq!(
            lower("f(a ?? b ?? c + 1);").as_deref(),
            Some("f((a != null ? a : b != null ? b : c + 1));")
        );
        assert_eq!(
            lower("const label = user?.name ?? 'anon';").as_deref(),
            Some("const label = ((user == null ? void 0 : user.name) != null ? (user == null ? void 0 : user.name) : 'anon');")
        );
        // `a + b` is the left operand
        assert_eq!(lower("const s = a + b ?? c;"), None);
    }

    #[test]
    fn test_exponent_lowered() {
        let targets = node(6, 0);
        let lower = |src: &str| lower_features(src, &targets).unwrap();
        assert_eq!(lower("const area = r ** 2;").as_deref(), Some("const area = Math.pow(r, 2);"));
        assert_eq!(
            lower("const v = (a + b) ** c.d;").as_deref(),
            Some("const v = Math.pow((a + b), c.d);")
        );
        assert_eq!(
            lower("total **= (n + 1);").as_deref(),
            Some("total = Math.pow(total, (n + 1));")
        );
        assert_eq!(lower("x = a ** b ** c;"), None);
    }

    #[test]
    fn test_lowered_output_passes_feature_check() {
        let targets = node(12, 0);
        let lowered = lower_features("export const v = cfg?.limits?.max ?? 10;", &targets)
            .unwrap()
            .unwrap();
        assert!(check(&lowered, &targets).is_ok());
        assert!(check("export const v = load()?.max;", &targets).is_err());
    }

    #[test]
    fn test_unsupported_features_rejected() {
        let err = check("const v = a?.b;", &node(12, 0)).unwrap_err();
        assert!(matches!(err, StageError::UnsupportedSyntax { line: 1, column: 12, .. }));
        assert!(err.to_string().contains("optional chaining"));

        assert!(check("class A { #x = 1 }", &node(10, 0)).is_err());
        assert!(check("const big = 10n;", &node(8, 0)).is_err());
        assert!(check("const { a, ...rest } = o;", &node(8, 0)).is_err());
        assert!(check("const r = /a.b/s;", &node(8, 0)).is_err());
        assert!(check("const f = async () => {};", &node(6, 0)).is_err());
        assert!(check("f(...args); const r = /x/g;", &node(6, 0)).is_ok());
    }

    #[test]
    fn test_everything_allowed_for_esnext() {
        let targets = vec!["esnext".parse().unwrap()];
        assert!(check("a?.b ?? c ** 2; class A { static {} #p }", &targets).is_ok());
    }
}
