//! Resolves compiler-config `paths` aliases (`@/*` -> `src/*`)

use crate::core::{PathPattern, StageId};
use crate::stages::{is_path_like, ResolveStep, Stage, StageError};
use std::path::{Path, PathBuf};
use tracing::trace;

#[derive(Debug, Clone)]
pub struct TsconfigPathsStage {
    base: PathBuf,
    patterns: Vec<PathPattern>,
}

impl TsconfigPathsStage {
    pub fn new(base: PathBuf, patterns: Vec<PathPattern>) -> Self {
        Self { base, patterns }
    }

    /// Best pattern for `specifier` and the text its `*` captured
    ///
    /// An exact pattern wins; among wildcard patterns the longest prefix
    /// before the `*` wins.
    fn best_match<'a>(&'a self, specifier: &'a str) -> Option<(&'a PathPattern, &'a str)> {
        if let Some(exact) = self.patterns.iter().find(|p| p.pattern == specifier) {
            return Some((exact, ""));
        }

        self.patterns
            .iter()
            .filter_map(|p| {
                let (prefix, suffix) = p.pattern.split_once('*')?;
                let captured = specifier
                    .strip_prefix(prefix)?
                    .strip_suffix(suffix)?;
                Some((p, prefix.len(), captured))
            })
            .max_by_key(|(_, prefix_len, _)| *prefix_len)
            .map(|(p, _, captured)| (p, captured))
    }
}

impl Stage for TsconfigPathsStage {
    fn id(&self) -> StageId {
        StageId::TsconfigPaths
    }

    fn resolve_id(&self, specifier: &str, _importer: Option<&Path>) -> Result<ResolveStep, StageError> {
        if is_path_like(specifier) || specifier.starts_with('\0') {
            return Ok(ResolveStep::Pass);
        }

        let Some((pattern, captured)) = self.best_match(specifier) else {
            return Ok(ResolveStep::Pass);
        };

        let mut candidates: Vec<String> = pattern
            .targets
            .iter()
            .map(|target| {
                let substituted = target.replacen('*', captured, 1);
                self.base.join(substituted).to_string_lossy().into_owned()
            })
            .collect();

        if candidates.is_empty() {
            return Ok(ResolveStep::Pass);
        }

        trace!("Path alias '{}' matched '{}'", specifier, pattern.pattern);
        candidates.push(specifier.to_string());
        Ok(ResolveStep::Candidates(candidates))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pattern(pattern: &str, targets: &[&str]) -> PathPattern {
        PathPattern {
            pattern: pattern.to_string(),
            targets: targets.iter().map(|t| t.to_string()).collect(),
        }
    }

    fn stage() -> TsconfigPathsStage {
        TsconfigPathsStage::new(
            PathBuf::from("/p"),
            vec![
                pattern("*", &["types/*"]),
                pattern("@/*", &["src/*", "lib/*"]),
                pattern("@/utils/*", &["src/shared/utils/*"]),
                pattern("config", &["src/config.ts"]),
            ],
        )
    }

    #[test]
    fn test_longest_prefix_wins() {
        assert_eq!(
            stage().resolve_id("@/utils/fmt", None).unwrap(),
            ResolveStep::Candidates(vec![
                "/p/src/shared/utils/fmt".to_string(),
                "@/utils/fmt".to_string(),
            ])
        );
        assert_eq!(
            stage().resolve_id("@/a", None).unwrap(),
            ResolveStep::Candidates(vec![
                "/p/src/a".to_string(),
                "/p/lib/a".to_string(),
                "@/a".to_string(),
            ])
        );
    }

    #[test]
    fn test_exact_pattern_wins() {
        assert_eq!(
            stage().resolve_id("config", None).unwrap(),
            ResolveStep::Candidates(vec!["/p/src/config.ts".to_string(), "config".to_string()])
        );
    }

    #[test]
    fn test_relative_and_virtual_specifiers_skipped() {
        assert_eq!(stage().resolve_id("./a", None).unwrap(), ResolveStep::Pass);
        assert_eq!(stage().resolve_id("\0virtual", None).unwrap(), ResolveStep::Pass);
    }

    #[test]
    fn test_no_match_passes() {
        let stage = TsconfigPathsStage::new(PathBuf::from("/p"), vec![pattern("@/*", &["src/*"])]);
        assert_eq!(stage.resolve_id("lodash", None).unwrap(), ResolveStep::Pass);
    }
}
