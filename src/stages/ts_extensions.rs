//! Maps `.js`-family specifiers written in TypeScript sources to their
//! TypeScript twins (`./util.js` -> `./util.ts`)

use crate::core::StageId;
use crate::stages::{is_typescript, ResolveStep, Stage, StageError};
use std::path::Path;

const TWINS: [(&str, &str); 4] = [(".js", ".ts"), (".jsx", ".tsx"), (".mjs", ".mts"), (".cjs", ".cts")];

#[derive(Debug, Clone, Default)]
pub struct TypescriptExtensionsStage;

impl TypescriptExtensionsStage {
    pub fn new() -> Self {
        Self
    }
}

impl Stage for TypescriptExtensionsStage {
    fn id(&self) -> StageId {
        StageId::TypescriptExtensions
    }

    fn resolve_id(&self, specifier: &str, importer: Option<&Path>) -> Result<ResolveStep, StageError> {
        if !importer.is_some_and(is_typescript) {
            return Ok(ResolveStep::Pass);
        }

        for (js, ts) in TWINS {
            if let Some(stem) = specifier.strip_suffix(js) {
                return Ok(ResolveStep::Candidates(vec![
                    format!("{}{}", stem, ts),
                    specifier.to_string(),
                ]));
            }
        }
        Ok(ResolveStep::Pass)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_twins_offered_first() {
        let stage = TypescriptExtensionsStage::new();
        let importer = Path::new("/src/index.ts");
        assert_eq!(
            stage.resolve_id("./util.js", Some(importer)).unwrap(),
            ResolveStep::Candidates(vec!["./util.ts".to_string(), "./util.js".to_string()])
        );
        assert_eq!(
            stage.resolve_id("./view.jsx", Some(importer)).unwrap(),
            ResolveStep::Candidates(vec!["./view.tsx".to_string(), "./view.jsx".to_string()])
        );
        assert_eq!(
            stage.resolve_id("./esm.mjs", Some(importer)).unwrap(),
            ResolveStep::Candidates(vec!["./esm.mts".to_string(), "./esm.mjs".to_string()])
        );
    }

    #[test]
    fn test_javascript_importers_untouched() {
        let stage = TypescriptExtensionsStage::new();
        assert_eq!(
            stage.resolve_id("./util.js", Some(Path::new("/src/index.js"))).unwrap(),
            ResolveStep::Pass
        );
        assert_eq!(stage.resolve_id("./util.js", None).unwrap(), ResolveStep::Pass);
        assert_eq!(
            stage.resolve_id("./util", Some(Path::new("/src/index.ts"))).unwrap(),
            ResolveStep::Pass
        );
    }
}
