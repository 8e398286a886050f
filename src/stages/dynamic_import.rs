//! Variable dynamic imports
//!
//! `import(\`./locales/${lang}.js\`)` and `import('./locales/' + lang + '.js')`
//! are expanded against the files on disk: each variable part matches one
//! path segment, and the call is routed through a generated function that
//! maps every matching path to a literal `import()`. Imports that cannot be
//! enumerated are left unchanged with a warning.

use crate::core::StageId;
use crate::stages::{Stage, StageError, TransformContext};
use crate::syntax::{find_matching, quote, string_value, tokenize, Edits, Token, TokenKind};
use regex::Regex;
use std::path::{Path, PathBuf};
use tracing::debug;

pub struct DynamicImportVarsStage {
    warn_on_error: bool,
}

/// Why a dynamic import was left alone
type Rejection = String;

impl DynamicImportVarsStage {
    pub fn new(warn_on_error: bool) -> Self {
        Self { warn_on_error }
    }
}

/// Glob for the argument tokens `open + 1 .. close`; `Ok(None)` for a
/// plain literal
fn to_glob(src: &str, tokens: &[Token], open: usize, close: usize) -> Result<Option<String>, Rejection> {
    let args = &tokens[open + 1..close];
    match args {
        [] => return Err("import() without an argument".to_string()),
        [single] if matches!(single.kind, TokenKind::String | TokenKind::Template) => return Ok(None),
        _ => {}
    }

    let glob = if args[0].kind == TokenKind::TemplateHead {
        template_glob(src, args)?
    } else {
        concat_glob(src, args)?
    };

    let mut collapsed = String::with_capacity(glob.len());
    for ch in glob.chars() {
        if !(ch == '*' && collapsed.ends_with('*')) {
            collapsed.push(ch);
        }
    }
    Ok(Some(collapsed))
}

fn template_glob(src: &str, args: &[Token]) -> Result<String, Rejection> {
    let mut glob = String::new();
    let mut depth = 0usize;
    for (n, token) in args.iter().enumerate() {
        let text = token.text(src);
        match token.kind {
            TokenKind::TemplateHead if depth == 0 && n == 0 => {
                glob.push_str(&text[1..text.len() - 2]);
                glob.push('*');
                depth = 1;
            }
            TokenKind::TemplateMiddle if depth == 1 => {
                glob.push_str(&text[1..text.len() - 2]);
                glob.push('*');
            }
            TokenKind::TemplateTail if depth == 1 => {
                if n + 1 != args.len() {
                    return Err("the import argument is not a single template literal".to_string());
                }
                glob.push_str(&text[1..text.len() - 1]);
                return Ok(glob);
            }
            TokenKind::TemplateHead => depth += 1,
            TokenKind::TemplateTail => depth -= 1,
            _ => {}
        }
    }
    Err("unterminated template".to_string())
}

fn concat_glob(src: &str, args: &[Token]) -> Result<String, Rejection> {
    let mut parts: Vec<&[Token]> = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (n, token) in args.iter().enumerate() {
        match token.text(src) {
            "(" | "[" | "{" if token.kind == TokenKind::Punct => depth += 1,
            ")" | "]" | "}" if token.kind == TokenKind::Punct => depth = depth.saturating_sub(1),
            "+" if depth == 0 && token.kind == TokenKind::Punct => {
                parts.push(&args[start..n]);
                start = n + 1;
            }
            _ => {}
        }
    }
    parts.push(&args[start..]);

    if parts.len() < 2 {
        return Err("the import argument is neither a template literal nor a string concatenation".to_string());
    }
    let mut glob = String::new();
    for part in parts {
        match part {
            [literal] if literal.kind == TokenKind::String => glob.push_str(&string_value(literal.text(src))),
            [] => return Err("malformed concatenation".to_string()),
            _ => glob.push('*'),
        }
    }
    Ok(glob)
}

fn validate(glob: &str) -> Result<(), Rejection> {
    if !glob.starts_with("./") && !glob.starts_with("../") {
        return Err("variable imports must start with ./ or ../".to_string());
    }
    if glob.starts_with("./*.") {
        return Err("variable imports cannot import their own directory".to_string());
    }
    let file = glob.rsplit('/').next().unwrap_or(glob);
    let static_tail = file.rsplit('*').next().unwrap_or(file);
    if !static_tail.contains('.') {
        return Err("a file extension must be included in the static part of the import".to_string());
    }
    Ok(())
}

fn segment_regex(segment: &str) -> Option<Regex> {
    let pattern = segment
        .split('*')
        .map(regex::escape)
        .collect::<Vec<_>>()
        .join("[^/]*");
    Regex::new(&format!("^{}$", pattern)).ok()
}

/// Relative specifiers of the files under `dir` that match `glob`, sorted
fn expand(dir: &Path, glob: &str, importer: &Path) -> Vec<String> {
    let segments: Vec<&str> = glob.split('/').collect();
    let mut current: Vec<(PathBuf, String)> = vec![(dir.to_path_buf(), String::new())];

    for (n, segment) in segments.iter().enumerate() {
        let last = n + 1 == segments.len();
        let mut next = Vec::new();

        for (path, rel) in &current {
            let join = |name: &str| {
                if rel.is_empty() {
                    name.to_string()
                } else {
                    format!("{}/{}", rel, name)
                }
            };
            match *segment {
                "." => next.push((path.clone(), join("."))),
                ".." => {
                    if let Some(parent) = path.parent() {
                        next.push((parent.to_path_buf(), join("..")));
                    }
                }
                literal if !literal.contains('*') => {
                    let candidate = path.join(literal);
                    if (last && candidate.is_file()) || (!last && candidate.is_dir()) {
                        next.push((candidate, join(literal)));
                    }
                }
                pattern => {
                    let Some(re) = segment_regex(pattern) else {
                        continue;
                    };
                    let Ok(entries) = std::fs::read_dir(path) else {
                        continue;
                    };
                    for entry in entries.flatten() {
                        let name = entry.file_name().to_string_lossy().into_owned();
                        if name.starts_with('.') || !re.is_match(&name) {
                            continue;
                        }
                        let candidate = entry.path();
                        if (last && candidate.is_file()) || (!last && candidate.is_dir()) {
                            next.push((candidate, join(&name)));
                        }
                    }
                }
            }
        }
        current = next;
    }

    let mut found: Vec<String> = current
        .into_iter()
        .filter(|(path, _)| path != importer)
        .map(|(_, rel)| rel)
        .collect();
    found.sort();
    found
}

fn runtime_function(n: usize, paths: &[String]) -> String {
    let mut out = format!("\nfunction __variableDynamicImportRuntime{}__(path) {{\n  switch (path) {{\n", n);
    for path in paths {
        let literal = quote(path);
        out.push_str(&format!("    case {}: return import({});\n", literal, literal));
    }
    out.push_str(
        "    default: return new Promise(function (resolve, reject) {\n      (typeof queueMicrotask === \"function\" ? queueMicrotask : setTimeout)(reject.bind(null, new Error(\"Unknown variable dynamic import: \" + path)));\n    });\n  }\n}\n",
    );
    out
}

impl Stage for DynamicImportVarsStage {
    fn id(&self) -> StageId {
        StageId::DynamicImportVars
    }

    fn transform(&self, code: &str, ctx: &mut TransformContext) -> Result<Option<String>, StageError> {
        if ctx.extension() == ".json" || !code.contains("import") {
            return Ok(None);
        }
        let tokens = tokenize(code).map_err(|e| StageError::from_lex(code, e))?;
        let dir = ctx.id.parent().map(Path::to_path_buf).unwrap_or_default();

        let mut edits = Edits::new();
        let mut runtimes = String::new();
        let mut count = 0;

        for (i, token) in tokens.iter().enumerate() {
            let after_dot = i > 0 && tokens[i - 1].is_punct(code, ".");
            if after_dot || !token.is_ident(code, "import") || !tokens.get(i + 1).is_some_and(|t| t.is_punct(code, "(")) {
                continue;
            }
            let Some(close) = find_matching(code, &tokens, i + 1) else {
                continue;
            };
            let expression = &code[token.span.start..tokens[close].span.end];

            let outcome = to_glob(code, &tokens, i + 1, close).and_then(|glob| match glob {
                None => Ok(None),
                Some(glob) => {
                    validate(&glob)?;
                    let paths = expand(&dir, &glob, &ctx.id);
                    if paths.is_empty() {
                        return Err(format!("no files match {}", glob));
                    }
                    Ok(Some((glob, paths)))
                }
            });

            match outcome {
                Ok(None) => {}
                Ok(Some((glob, paths))) => {
                    debug!("{} matches {} files in {}", glob, paths.len(), ctx.id.display());
                    let argument = &code[tokens[i + 1].span.end..tokens[close].span.start];
                    edits.replace(
                        token.span.start,
                        tokens[close].span.end,
                        format!("__variableDynamicImportRuntime{}__({})", count, argument),
                    );
                    runtimes.push_str(&runtime_function(count, &paths));
                    count += 1;
                }
                Err(reason) if self.warn_on_error => {
                    ctx.warn(format!("{} cannot be analyzed: {}; left unchanged", expression, reason));
                }
                Err(reason) => {
                    return Err(StageError::unsupported(
                        code,
                        token.span.start,
                        format!("{} cannot be analyzed: {}", expression, reason),
                    ));
                }
            }
        }

        if edits.is_empty() {
            return Ok(None);
        }
        let mut out = edits.apply(code);
        out.push_str(&runtimes);
        Ok(Some(out))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn fixture() -> TempDir {
        let dir = TempDir::new().unwrap();
        for file in ["locales/en.js", "locales/fr.js", "locales/README.md", "main.js", "util.js"] {
            let full = dir.path().join(file);
            std::fs::create_dir_all(full.parent().unwrap()).unwrap();
            std::fs::write(full, "export default 1;\n").unwrap();
        }
        dir
    }

    fn run(dir: &TempDir, code: &str) -> (Option<String>, Vec<String>) {
        let mut ctx = TransformContext::new(dir.path().join("main.js"));
        let out = DynamicImportVarsStage::new(true).transform(code, &mut ctx).unwrap();
        (out, ctx.warnings)
    }

    #[test]
    fn test_template_expanded() {
        let dir = fixture();
        let (out, warnings) = run(&dir, "export const load = (l) => import(`./locales/${l}.js`);\n");
        let out = out.unwrap();
        assert!(out.starts_with("export const load = (l) => __variableDynamicImportRuntime0__(`./locales/${l}.js`);\n"));
        assert!(out.contains("    case \"./locales/en.js\": return import(\"./locales/en.js\");\n    case \"./locales/fr.js\""));
        assert!(!out.contains("README"));
        assert!(warnings.is_empty());
    }

    #[test]
    fn test_concatenation_expanded() {
        let dir = fixture();
        let (out, _) = run(&dir, "import('./locales/' + name + '.js');");
        let out = out.unwrap();
        assert!(out.starts_with("__variableDynamicImportRuntime0__('./locales/' + name + '.js');"));
        assert!(out.contains("case \"./locales/fr.js\""));
    }

    #[test]
    fn test_unanalyzable_imports_warn_once_each() {
        let dir = fixture();
        for code in [
            "import(name);",
            "import(`${name}.js`);",
            "import(`./${name}.js`);",
            "import(`./locales/${name}`);",
            "import(`./missing/${name}.js`);",
        ] {
            let (out, warnings) = run(&dir, code);
            assert_eq!(out, None, "{}", code);
            assert_eq!(warnings.len(), 1, "{}", code);
        }
    }

    #[test]
    fn test_static_imports_untouched() {
        let dir = fixture();
        let (out, warnings) = run(&dir, "import('./util.js'); import(`./util.js`); import.meta.url;");
        assert_eq!(out, None);
        assert!(warnings.is_empty());
    }

    #[test]
    fn test_errors_when_warnings_disabled() {
        let dir = fixture();
        let mut ctx = TransformContext::new(dir.path().join("main.js"));
        let err = DynamicImportVarsStage::new(false)
            .transform("import(name);", &mut ctx)
            .unwrap_err();
        assert!(matches!(err, StageError::UnsupportedSyntax { .. }));
    }

    #[test]
    fn test_validation_rules() {
        assert!(validate("./a/*.js").is_ok());
        assert!(validate("../a/*/index.js").is_ok());
        assert!(validate("a/*.js").is_err());
        assert!(validate("./*.js").is_err());
        assert!(validate("./a/*").is_err());
    }
}
