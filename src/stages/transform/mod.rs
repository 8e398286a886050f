//! Syntax transform stage
//!
//! Lowers JSX, erases TypeScript and brings every module down to what the
//! configured targets can run. JSX settings come from the raw tsconfig
//! `compilerOptions` (`jsx`, `jsxFactory`, `jsxFragmentFactory`,
//! `jsxImportSource`); `verbatimModuleSyntax` turns off import elision.

mod features;
mod jsx;
mod types;
mod typescript;

pub use features::{check_features, lower_features};
pub use jsx::{lower_jsx, JsxRuntime};
pub use typescript::{strip_types, StripOptions};

use crate::core::{StageId, Target};
use crate::stages::{is_typescript, Stage, StageError, TransformContext};
use crate::syntax::tokenize;
use serde_json::Value;
use tracing::debug;

pub struct SyntaxTransformStage {
    target: Vec<Target>,
    jsx: JsxRuntime,
    verbatim_module_syntax: bool,
}

fn option_str<'v>(options: Option<&'v Value>, key: &str) -> Option<&'v str> {
    options.and_then(|o| o.get(key)).and_then(Value::as_str)
}

impl SyntaxTransformStage {
    pub fn new(target: Vec<Target>, compiler_options: Option<&Value>) -> Self {
        let jsx = match option_str(compiler_options, "jsx") {
            Some("react-jsx" | "react-jsxdev") => JsxRuntime::Automatic {
                import_source: option_str(compiler_options, "jsxImportSource")
                    .unwrap_or("react")
                    .to_string(),
            },
            _ => JsxRuntime::Classic {
                factory: option_str(compiler_options, "jsxFactory")
                    .unwrap_or("React.createElement")
                    .to_string(),
                fragment: option_str(compiler_options, "jsxFragmentFactory")
                    .unwrap_or("React.Fragment")
                    .to_string(),
            },
        };
        let verbatim_module_syntax = compiler_options
            .and_then(|o| o.get("verbatimModuleSyntax"))
            .and_then(Value::as_bool)
            .unwrap_or(false);

        Self {
            target,
            jsx,
            verbatim_module_syntax,
        }
    }

    pub fn jsx_runtime(&self) -> &JsxRuntime {
        &self.jsx
    }
}

impl Stage for SyntaxTransformStage {
    fn id(&self) -> StageId {
        StageId::SyntaxTransform
    }

    fn transform(&self, code: &str, ctx: &mut TransformContext) -> Result<Option<String>, StageError> {
        let ext = ctx.extension();
        if ext == ".json" {
            return Ok(None);
        }

        let mut current = code.to_string();
        if matches!(ext, ".jsx" | ".tsx") {
            if let Some(lowered) = lower_jsx(&current, &self.jsx)? {
                current = lowered;
            }
        }
        if is_typescript(&ctx.id) {
            let options = StripOptions {
                verbatim_module_syntax: self.verbatim_module_syntax,
                angle_assertions: ext != ".tsx",
            };
            current = strip_types(&current, options)?;
        }
        if let Some(lowered) = lower_features(&current, &self.target)? {
            current = lowered;
        }

        let tokens = tokenize(&current).map_err(|e| StageError::from_lex(&current, e))?;
        check_features(&current, &tokens, &self.target)?;

        if current == code {
            return Ok(None);
        }
        debug!("transformed {}", ctx.id.display());
        Ok(Some(current))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Engine;
    use serde_json::json;

    fn node(major: u32) -> Vec<Target> {
        vec![Target::new(Engine::Node, (major, 0, 0))]
    }

    fn run(stage: &SyntaxTransformStage, id: &str, code: &str) -> Result<Option<String>, StageError> {
        stage.transform(code, &mut TransformContext::new(id))
    }

    #[test]
    fn test_typescript_and_jsx_together() {
        let stage = SyntaxTransformStage::new(node(18), None);
        let out = run(
            &stage,
            "/src/App.tsx",
            "export const App = (props: Props): Element => <div className=\"app\">{props.title}</div>;",
        )
        .unwrap();
        assert_eq!(
            out.as_deref(),
            Some("export const App = (props) => React.createElement(\"div\", { className: \"app\" }, props.title);")
        );
    }

    #[test]
    fn test_jsx_factory_from_compiler_options() {
        let options = json!({ "jsxFactory": "h", "jsxFragmentFactory": "Fragment" });
        let stage = SyntaxTransformStage::new(node(18), Some(&options));
        let out = run(&stage, "/src/view.jsx", "export default () => <><br /></>;").unwrap();
        assert_eq!(out.as_deref(), Some("export default () => h(Fragment, null, h(\"br\", null));"));
    }

    #[test]
    fn test_automatic_runtime_selected() {
        let options = json!({ "jsx": "react-jsx", "jsxImportSource": "preact" });
        let stage = SyntaxTransformStage::new(node(18), Some(&options));
        assert_eq!(
            stage.jsx_runtime(),
            &JsxRuntime::Automatic {
                import_source: "preact".to_string()
            }
        );
    }

    #[test]
    fn test_plain_javascript_untouched() {
        let stage = SyntaxTransformStage::new(node(18), None);
        assert_eq!(run(&stage, "/src/a.js", "export const a = b ?? c;").unwrap(), None);
        assert_eq!(run(&stage, "/src/data.json", "{\"a\": 1}").unwrap(), None);
    }

    #[test]
    fn test_logical_assignment_lowered_for_old_node() {
        let stage = SyntaxTransformStage::new(node(14), None);
        let out = run(&stage, "/src/a.js", "opts.level ||= 1;").unwrap();
        assert_eq!(out.as_deref(), Some("opts.level || (opts.level = 1);"));
    }

    #[test]
    fn test_optional_chain_lowered_for_old_node() {
        let stage = SyntaxTransformStage::new(node(12), None);
        let out = run(&stage, "/src/a.ts", "export const v: number = a?.b ?? 0;").unwrap();
        assert_eq!(
            out.as_deref(),
            Some("export const v = ((a == null ? void 0 : a.b) != null ? (a == null ? void 0 : a.b) : 0);")
        );
    }

    #[test]
    fn test_unsupported_feature_is_fatal() {
        let stage = SyntaxTransformStage::new(node(12), None);
        let err = run(&stage, "/src/a.ts", "export const v = load()?.b;").unwrap_err();
        assert!(matches!(err, StageError::UnsupportedSyntax { .. }));
    }

    #[test]
    fn test_lexing_failure_is_fatal() {
        let stage = SyntaxTransformStage::new(node(18), None);
        let err = run(&stage, "/src/a.js", "const s = 'unterminated").unwrap_err();
        assert!(matches!(err, StageError::Syntax { .. }));
    }

    #[test]
    fn test_verbatim_module_syntax_keeps_imports() {
        let options = json!({ "verbatimModuleSyntax": true });
        let stage = SyntaxTransformStage::new(node(18), Some(&options));
        let out = run(&stage, "/src/a.ts", "import { unused } from './u';\nexport const a: number = 1;").unwrap();
        assert_eq!(out.as_deref(), Some("import { unused } from './u';\nexport const a = 1;"));

        let stage = SyntaxTransformStage::new(node(18), None);
        let out = run(&stage, "/src/a.ts", "import { unused } from './u';\nexport const a: number = 1;").unwrap();
        assert_eq!(out.as_deref(), Some("\nexport const a = 1;"));
    }
}
