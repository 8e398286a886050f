//! CommonJS interop
//!
//! Literal `require("x")` calls become namespace imports read through an
//! interop helper, and modules that assign to `module.exports`/`exports`
//! get a local `module` object exported as the default. Requires with a
//! computed argument stay as written with a warning.

use crate::core::StageId;
use crate::stages::{Stage, StageError, TransformContext};
use crate::syntax::{quote, string_value, tokenize, Edits, Token, TokenKind};
use std::collections::HashMap;
use tracing::debug;

const INTEROP_HELPER: &str =
    "function __cjsInterop(m) { return m && Object.prototype.hasOwnProperty.call(m, \"default\") ? m.default : m; }\n";

const DYNAMIC_REQUIRE_HELPER: &str =
    "function __commonjsRequire(id) { throw new Error('Could not dynamically require \"' + id + '\"'); }\n";

pub struct CommonJsStage {
    extensions: Vec<String>,
    ignore_dynamic_requires: bool,
    transform_mixed_es_modules: bool,
}

/// What a module does with the CommonJS globals
#[derive(Debug, Default)]
struct Usage {
    /// `import`/`export` statements
    esm: bool,
    /// `require` declared locally
    require_bound: bool,
    /// Token indices of `require(...)` calls
    requires: Vec<usize>,
    /// `module.exports`, `exports.x`
    exports: bool,
}

fn after_dot(src: &str, tokens: &[Token], i: usize) -> bool {
    i > 0 && (tokens[i - 1].is_punct(src, ".") || tokens[i - 1].is_punct(src, "?."))
}

fn analyze(src: &str, tokens: &[Token]) -> Usage {
    let mut usage = Usage::default();
    for (i, token) in tokens.iter().enumerate() {
        if token.kind != TokenKind::Ident || after_dot(src, tokens, i) {
            continue;
        }
        let next = tokens.get(i + 1);
        let prev = i.checked_sub(1).map(|p| tokens[p].text(src));
        match token.text(src) {
            "import" if next.is_some_and(|t| !t.is_punct(src, "(") && !t.is_punct(src, ".")) => {
                usage.esm = true;
            }
            "export" => usage.esm = true,
            "require" if matches!(prev, Some("const" | "let" | "var" | "function" | "class")) => {
                usage.require_bound = true;
            }
            "require" if next.is_some_and(|t| t.is_punct(src, "(")) => usage.requires.push(i),
            "module"
                if next.is_some_and(|t| t.is_punct(src, "."))
                    && tokens.get(i + 2).is_some_and(|t| t.is_ident(src, "exports")) =>
            {
                usage.exports = true;
            }
            "exports"
                if !matches!(prev, Some("const" | "let" | "var" | "function"))
                    && next.is_some_and(|t| t.is_punct(src, ".") || t.is_punct(src, "[") || t.is_punct(src, "=")) =>
            {
                usage.exports = true;
            }
            _ => {}
        }
    }
    usage
}

impl CommonJsStage {
    pub fn new(extensions: Vec<String>, ignore_dynamic_requires: bool, transform_mixed_es_modules: bool) -> Self {
        Self {
            extensions,
            ignore_dynamic_requires,
            transform_mixed_es_modules,
        }
    }

    fn applies_to(&self, ctx: &TransformContext) -> bool {
        let ext = ctx.extension();
        self.extensions.iter().any(|e| e == ext)
    }
}

impl Stage for CommonJsStage {
    fn id(&self) -> StageId {
        StageId::CommonJs
    }

    fn transform(&self, code: &str, ctx: &mut TransformContext) -> Result<Option<String>, StageError> {
        if !self.applies_to(ctx) {
            return Ok(None);
        }
        let tokens = tokenize(code).map_err(|e| StageError::from_lex(code, e))?;
        let usage = analyze(code, &tokens);

        if usage.require_bound || (usage.requires.is_empty() && !usage.exports) {
            return Ok(None);
        }
        if usage.esm && !self.transform_mixed_es_modules {
            debug!("{} mixes import and require; left as is", ctx.id.display());
            return Ok(None);
        }

        let mut edits = Edits::new();
        let mut bindings: HashMap<String, usize> = HashMap::new();
        let mut header = String::new();
        let mut dynamic = false;

        for &i in &usage.requires {
            let literal = tokens
                .get(i + 2)
                .filter(|t| t.kind == TokenKind::String)
                .filter(|_| tokens.get(i + 3).is_some_and(|t| t.is_punct(code, ")")));

            match literal {
                Some(literal) => {
                    let specifier = string_value(literal.text(code));
                    let next = bindings.len();
                    let n = *bindings.entry(specifier.clone()).or_insert_with(|| {
                        header.push_str(&format!("import * as __require_{} from {};\n", next, quote(&specifier)));
                        next
                    });
                    edits.replace(
                        tokens[i].span.start,
                        tokens[i + 3].span.end,
                        format!("__cjsInterop(__require_{})", n),
                    );
                }
                None => {
                    let close = crate::syntax::find_matching(code, &tokens, i + 1).unwrap_or(i + 1);
                    let call = &code[tokens[i].span.start..tokens[close].span.end];
                    ctx.warn(format!("Dynamic require cannot be resolved at build time: {}", call));
                    if !self.ignore_dynamic_requires {
                        edits.replace(tokens[i].span.start, tokens[i].span.end, "__commonjsRequire");
                        dynamic = true;
                    }
                }
            }
        }

        if !bindings.is_empty() {
            header.push_str(INTEROP_HELPER);
        }
        if dynamic {
            header.push_str(DYNAMIC_REQUIRE_HELPER);
        }
        if usage.exports {
            header.push_str("var module = { exports: {} };\nvar exports = module.exports;\n");
        }
        if header.is_empty() && edits.is_empty() {
            return Ok(None);
        }

        edits.insert(0, header);
        let mut out = edits.apply(code);
        if usage.exports {
            if !out.ends_with('\n') {
                out.push('\n');
            }
            out.push_str("export default module.exports;\n");
        }
        debug!(
            "converted {} ({} static requires)",
            ctx.id.display(),
            bindings.len()
        );
        Ok(Some(out))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stage() -> CommonJsStage {
        CommonJsStage::new(
            [".js", ".ts", ".jsx", ".tsx"].iter().map(|e| e.to_string()).collect(),
            true,
            true,
        )
    }

    fn convert(code: &str) -> (Option<String>, Vec<String>) {
        let mut ctx = TransformContext::new("/src/legacy.js");
        let out = stage().transform(code, &mut ctx).unwrap();
        (out, ctx.warnings)
    }

    #[test]
    fn test_esm_only_module_unchanged() {
        let (out, warnings) = convert("import a from './a.js';\nexport const b = a + 1;\n");
        assert_eq!(out, None);
        assert!(warnings.is_empty());
    }

    #[test]
    fn test_requires_and_exports_converted() {
        let (out, warnings) = convert("const fs = require('fs');\nconst a = require(\"./a\");\nconst again = require('fs');\nmodule.exports = { fs, a, again };\n");
        let out = out.unwrap();
        assert!(out.starts_with(
            "import * as __require_0 from \"fs\";\nimport * as __require_1 from \"./a\";\nfunction __cjsInterop(m)"
        ));
        assert!(out.contains("var module = { exports: {} };\nvar exports = module.exports;\nconst fs = __cjsInterop(__require_0);"));
        assert!(out.contains("const again = __cjsInterop(__require_0);"));
        assert!(out.ends_with("module.exports = { fs, a, again };\nexport default module.exports;\n"));
        assert!(warnings.is_empty());
    }

    #[test]
    fn test_dynamic_require_left_with_one_warning() {
        let (out, warnings) = convert("exports.load = name => require('./plugins/' + name);\n");
        let out = out.unwrap();
        assert!(out.contains("exports.load = name => require('./plugins/' + name);"));
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("require('./plugins/' + name)"));
    }

    #[test]
    fn test_dynamic_require_helper_when_not_ignored() {
        let stage = CommonJsStage::new(vec![".js".to_string()], false, true);
        let mut ctx = TransformContext::new("/src/a.js");
        let out = stage.transform("const m = require(name);", &mut ctx).unwrap().unwrap();
        assert!(out.contains("const m = __commonjsRequire(name);"));
        assert!(out.contains("function __commonjsRequire(id)"));
    }

    #[test]
    fn test_local_require_binding_skipped() {
        let (out, _) = convert("function require(x) { return x; }\nrequire('a');\n");
        assert_eq!(out, None);
    }

    #[test]
    fn test_mixed_module_converted() {
        let (out, _) = convert("import x from './x.js';\nconst y = require('./y.js');\nexport { x, y };\n");
        let out = out.unwrap();
        assert!(out.starts_with("import * as __require_0 from \"./y.js\";\n"));
        assert!(out.contains("const y = __cjsInterop(__require_0);"));
        assert!(!out.contains("export default module.exports"));
    }

    #[test]
    fn test_other_extensions_ignored() {
        let mut ctx = TransformContext::new("/src/data.json");
        assert_eq!(stage().transform("{\"require\": 1}", &mut ctx).unwrap(), None);
    }
}
