//! Environment identifier substitution
//!
//! Free references to configured names (`DEBUG`, `process.env.NODE_ENV`) are
//! replaced with their JSON-encoded values. Member accesses on an unrelated
//! base (`obj.DEBUG`), further property access (`process.env.NODE_ENV.length`)
//! and assignment targets are left alone.

use crate::core::{EnvMap, StageId};
use crate::stages::{Stage, StageError, TransformContext};
use crate::syntax::{is_ident_part, quote, tokenize, Edits, Token, TokenKind};
use std::collections::BTreeSet;
use tracing::debug;

const ASSIGNMENT_OPERATORS: &[&str] = &[
    "=", "+=", "-=", "*=", "/=", "%=", "**=", "<<=", ">>=", ">>>=", "&=", "|=", "^=", "&&=",
    "||=", "??=", "++", "--",
];

struct Key {
    segments: Vec<String>,
    replacement: String,
}

pub struct EnvReplaceStage {
    /// Longest dotted names first
    keys: Vec<Key>,
    prevent_assignment: bool,
    /// Proper prefixes of dotted names, for `typeof` guards
    guards: BTreeSet<Vec<String>>,
}

impl EnvReplaceStage {
    pub fn new(values: &EnvMap, prevent_assignment: bool, object_guards: bool) -> Self {
        let mut keys: Vec<Key> = values
            .iter()
            .map(|(name, value)| Key {
                segments: name.split('.').map(str::to_string).collect(),
                replacement: quote(value),
            })
            .collect();
        keys.sort_by(|a, b| b.segments.len().cmp(&a.segments.len()));

        let mut guards = BTreeSet::new();
        if object_guards {
            for key in &keys {
                for len in 1..key.segments.len() {
                    guards.insert(key.segments[..len].to_vec());
                }
            }
        }

        Self {
            keys,
            prevent_assignment,
            guards,
        }
    }

    /// Length in tokens of `segments` matched at `start`
    fn match_at(src: &str, tokens: &[Token], start: usize, segments: &[String]) -> Option<usize> {
        for (n, segment) in segments.iter().enumerate() {
            let ident = tokens.get(start + n * 2)?;
            if !ident.is_ident(src, segment) {
                return None;
            }
            if n + 1 < segments.len() && !tokens.get(start + n * 2 + 1)?.is_punct(src, ".") {
                return None;
            }
        }
        Some(segments.len() * 2 - 1)
    }

    fn is_assignment(&self, src: &str, token: Option<&Token>) -> bool {
        self.prevent_assignment
            && token.is_some_and(|t| {
                t.kind == TokenKind::Punct && ASSIGNMENT_OPERATORS.contains(&t.text(src))
            })
    }

    fn replace_tokens(&self, src: &str, tokens: &[Token]) -> Edits {
        let mut edits = Edits::new();
        let mut i = 0;

        while i < tokens.len() {
            let token = &tokens[i];
            let prev = i.checked_sub(1).map(|p| &tokens[p]);

            if token.kind != TokenKind::Ident
                || prev.is_some_and(|p| p.is_punct(src, ".") || p.is_punct(src, "?."))
            {
                i += 1;
                continue;
            }

            if token.is_ident(src, "typeof") {
                if let Some((len, _)) = self.match_guard(src, tokens, i + 1) {
                    let end = tokens[i + len].span.end;
                    edits.replace(token.span.start, end, "\"object\"");
                    i += len + 1;
                    continue;
                }
            }

            let matched = self.keys.iter().find_map(|key| {
                Self::match_at(src, tokens, i, &key.segments).map(|len| (len, key))
            });

            if let Some((len, key)) = matched {
                let next = tokens.get(i + len);
                let member_access = next.is_some_and(|t| t.is_punct(src, ".") || t.is_punct(src, "?."));
                let prefix_update = prev.is_some_and(|p| p.is_punct(src, "++") || p.is_punct(src, "--"));
                let assigned = self.is_assignment(src, next) || (self.prevent_assignment && prefix_update);

                if !member_access && !assigned {
                    let end = tokens[i + len - 1].span.end;
                    edits.replace(token.span.start, end, key.replacement.clone());
                }
                i += len;
                continue;
            }

            i += 1;
        }

        edits
    }

    /// A guard prefix matched at `start` that is not followed by more access
    fn match_guard(&self, src: &str, tokens: &[Token], start: usize) -> Option<(usize, &Vec<String>)> {
        self.guards
            .iter()
            .rev()
            .filter_map(|guard| Self::match_at(src, tokens, start, guard).map(|len| (len, guard)))
            .filter(|(len, _)| {
                !tokens
                    .get(start + len)
                    .is_some_and(|t| t.is_punct(src, ".") || t.is_punct(src, "?."))
            })
            .max_by_key(|(len, _)| *len)
    }

    /// Fallback for sources the scanner rejects (JSX text, for instance):
    /// plain text search with identifier boundaries
    fn replace_text(&self, src: &str) -> Edits {
        let mut edits = Edits::new();
        for key in &self.keys {
            let name = key.segments.join(".");
            for (start, _) in src.match_indices(&name) {
                let end = start + name.len();
                if edits.covers(start) {
                    continue;
                }
                let before = src[..start].chars().next_back();
                let after = src[end..].chars().next();
                if before.is_some_and(|c| is_ident_part(c) || c == '.')
                    || after.is_some_and(|c| is_ident_part(c) || c == '.')
                {
                    continue;
                }
                let rest = src[end..].trim_start();
                let assigned = self.prevent_assignment
                    && ASSIGNMENT_OPERATORS
                        .iter()
                        .any(|op| rest.starts_with(op) && !rest.starts_with("==") && !rest.starts_with("=>"));
                if !assigned {
                    edits.replace(start, end, key.replacement.clone());
                }
            }
        }
        edits
    }
}

impl Stage for EnvReplaceStage {
    fn id(&self) -> StageId {
        StageId::EnvReplace
    }

    fn transform(&self, code: &str, ctx: &mut TransformContext) -> Result<Option<String>, StageError> {
        let edits = match tokenize(code) {
            Ok(tokens) => self.replace_tokens(code, &tokens),
            Err(e) => {
                debug!(
                    "Scanning {} failed ({}); substituting by text",
                    ctx.id.display(),
                    e
                );
                self.replace_text(code)
            }
        };

        if edits.is_empty() {
            return Ok(None);
        }
        Ok(Some(edits.apply(code)))
    }
}
