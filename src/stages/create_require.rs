//! `require` shim for ES module output
//!
//! Chunks that still call a free `require` get one built with
//! `createRequire(import.meta.url)`, placed after any interpreter directive.

use crate::core::StageId;
use crate::stages::hashbang::split_hashbang;
use crate::stages::{ChunkInfo, Stage, StageError};
use crate::syntax::{tokenize, Token, TokenKind};
use tracing::debug;

pub const SHIM: &str =
    "import { createRequire } from \"node:module\";\nconst require = createRequire(import.meta.url);\n";

#[derive(Debug, Clone, Default)]
pub struct CreateRequireStage;

impl CreateRequireStage {
    pub fn new() -> Self {
        Self
    }
}

/// Whether `src` references `require` without declaring it
pub fn references_free_require(src: &str, tokens: &[Token]) -> bool {
    let mut referenced = false;
    for (i, token) in tokens.iter().enumerate() {
        if !token.is_ident(src, "require") {
            continue;
        }
        let prev = i.checked_sub(1).map(|p| &tokens[p]);
        if prev.is_some_and(|p| p.is_punct(src, ".") || p.is_punct(src, "?.")) {
            continue;
        }
        let declares = prev.is_some_and(|p| {
            p.kind == TokenKind::Ident && matches!(p.text(src), "const" | "let" | "var" | "function" | "class")
        });
        if declares {
            return false;
        }
        // `{ require: x }` property keys
        let key = tokens.get(i + 1).is_some_and(|t| t.is_punct(src, ":"))
            && prev.is_some_and(|p| p.is_punct(src, "{") || p.is_punct(src, ","));
        if !key {
            referenced = true;
        }
    }
    referenced
}

impl Stage for CreateRequireStage {
    fn id(&self) -> StageId {
        StageId::CreateRequire
    }

    fn render_chunk(&self, code: &str, chunk: &ChunkInfo) -> Result<Option<String>, StageError> {
        let (directive, body) = match split_hashbang(code) {
            Some((directive, rest)) => (directive, rest),
            None => ("", code),
        };
        let tokens = tokenize(body).map_err(|e| StageError::from_lex(body, e))?;
        if !references_free_require(body, &tokens) {
            return Ok(None);
        }

        debug!("Injecting require shim into {}", chunk.file.display());
        if directive.is_empty() {
            return Ok(Some(format!("{}{}", SHIM, body)));
        }
        let body = body.strip_prefix("\r\n").or_else(|| body.strip_prefix('\n')).unwrap_or(body);
        Ok(Some(format!("{}\n{}{}", directive, SHIM, body)))
    }
}
