//! Exact specifier aliases

use crate::core::{AliasMap, StageId};
use crate::stages::{ResolveStep, Stage, StageError};
use std::path::Path;

#[derive(Debug, Clone)]
pub struct AliasStage {
    entries: AliasMap,
}

impl AliasStage {
    pub fn new(entries: AliasMap) -> Self {
        Self { entries }
    }
}

impl Stage for AliasStage {
    fn id(&self) -> StageId {
        StageId::Alias
    }

    fn resolve_id(&self, specifier: &str, _importer: Option<&Path>) -> Result<ResolveStep, StageError> {
        Ok(match self.entries.get(specifier) {
            Some(target) => ResolveStep::Rewrite(target.to_string()),
            None => ResolveStep::Pass,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_match_only() {
        let stage = AliasStage::new([("#utils", "./src/utils.ts")].into_iter().collect());
        assert_eq!(
            stage.resolve_id("#utils", None).unwrap(),
            ResolveStep::Rewrite("./src/utils.ts".to_string())
        );
        assert_eq!(stage.resolve_id("#utils/x", None).unwrap(), ResolveStep::Pass);
        assert_eq!(stage.resolve_id("other", None).unwrap(), ResolveStep::Pass);
    }
}
