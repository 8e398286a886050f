//! Whitespace and comment removal on rendered output
//!
//! Tokens are re-emitted with a separator only where two tokens would
//! otherwise merge or where a line break carries meaning. Output is checked
//! against the targets again so minification never introduces syntax.

use crate::core::{StageId, Target};
use crate::stages::hashbang::split_hashbang;
use crate::stages::transform::check_features;
use crate::stages::{ChunkInfo, Stage, StageError};
use crate::syntax::{is_ident_part, tokenize, Token, TokenKind};
use tracing::debug;

/// Keywords after which a line break ends the statement
const RESTRICTED: &[&str] = &["return", "break", "continue", "throw", "yield", "async"];

pub struct MinifyStage {
    target: Vec<Target>,
}

impl MinifyStage {
    pub fn new(target: Vec<Target>) -> Self {
        Self { target }
    }
}

fn needs_newline(src: &str, prev: &Token, next: &Token) -> bool {
    if !next.newline_before {
        return false;
    }
    (prev.can_end_statement(src) && next.can_start_statement(src))
        || (prev.kind == TokenKind::Ident && RESTRICTED.contains(&prev.text(src)))
}

fn needs_space(src: &str, prev: &Token, next: &Token) -> bool {
    let a = prev.text(src);
    let b = next.text(src);
    let (Some(last), Some(first)) = (a.chars().last(), b.chars().next()) else {
        return false;
    };
    (is_ident_part(last) && is_ident_part(first))
        || (prev.kind == TokenKind::Number && first == '.')
        || (last == '+' && first == '+')
        || (last == '-' && first == '-')
        || (last == '/' && first == '/')
        || (a == "<" && first == '!')
}

/// Minify `code`
pub fn minify(code: &str) -> Result<String, StageError> {
    let (directive, body) = split_hashbang(code).unwrap_or(("", code));
    let tokens = tokenize(body).map_err(|e| StageError::from_lex(body, e))?;

    let mut out = String::with_capacity(body.len() / 2 + directive.len());
    if !directive.is_empty() {
        out.push_str(directive);
        out.push('\n');
    }
    for (i, token) in tokens.iter().enumerate() {
        if let Some(prev) = i.checked_sub(1).map(|p| &tokens[p]) {
            if needs_newline(body, prev, token) {
                out.push('\n');
            } else if needs_space(body, prev, token) {
                out.push(' ');
            }
        }
        out.push_str(token.text(body));
    }
    Ok(out)
}

impl Stage for MinifyStage {
    fn id(&self) -> StageId {
        StageId::Minify
    }

    fn render_chunk(&self, code: &str, chunk: &ChunkInfo) -> Result<Option<String>, StageError> {
        let minified = minify(code)?;
        let body = split_hashbang(&minified).map_or(minified.as_str(), |(_, rest)| rest);
        let tokens = tokenize(body).map_err(|e| StageError::from_lex(body, e))?;
        check_features(body, &tokens, &self.target)?;

        debug!(
            "minified {} ({} -> {} bytes)",
            chunk.file.display(),
            code.len(),
            minified.len()
        );
        Ok(Some(minified))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Engine;
    use std::path::PathBuf;

    fn chunk() -> ChunkInfo {
        ChunkInfo {
            module: PathBuf::from("/src/index.ts"),
            file: PathBuf::from("dist/index.mjs"),
            is_entry: true,
        }
    }

    #[test]
    fn test_whitespace_and_comments_removed() {
        let code = "const answer = 42; // note\n/* block */\nfunction add(a, b) {\n  return a + +b;\n}\n";
        assert_eq!(minify(code).unwrap(), "const answer=42;function add(a,b){return a+ +b;}");
    }

    #[test]
    fn test_line_breaks_kept_where_meaningful() {
        assert_eq!(
            minify("let a = 1\nlet b = 2\nreturn\nx").unwrap(),
            "let a=1\nlet b=2\nreturn\nx"
        );
        assert_eq!(
            minify("if (x) return /a b/g.test(s) ? typeof y : void 0").unwrap(),
            "if(x)return/a b/g.test(s)?typeof y:void 0"
        );
        assert_eq!(minify("const s = `a  ${ b }  c`;").unwrap(), "const s=`a  ${b}  c`;");
    }

    #[test]
    fn test_directive_preserved() {
        assert_eq!(
            minify("#!/usr/bin/env node\nconsole.log( 'hi' )\n").unwrap(),
            "#!/usr/bin/env node\nconsole.log('hi')"
        );
    }

    #[test]
    fn test_target_constraints_reapplied() {
        let stage = MinifyStage::new(vec![Target::new(Engine::Node, (12, 0, 0))]);
        let err = stage.render_chunk("export const v = a?.b;", &chunk()).unwrap_err();
        assert!(matches!(err, StageError::UnsupportedSyntax { .. }));

        let stage = MinifyStage::new(vec![Target::new(Engine::Node, (18, 0, 0))]);
        let out = stage.render_chunk("export const v = a?.b;\n", &chunk()).unwrap();
        assert_eq!(out.as_deref(), Some("export const v=a?.b;"));
    }
}
