//! Pipeline assembly
//!
//! The stage order lives in one declarative table. Conditional stages are
//! filtered out of it; nothing is ever moved, so the relative order of the
//! remaining stages is the same for every configuration.

use crate::core::descriptor::{PipelineDescriptor, StageConfig, StageDescriptor, StageId};
use crate::core::options::{AliasMap, BuildOptions, EnvMap, ExecutablePaths};
use crate::core::tsconfig::TsconfigResult;
use tracing::debug;

/// Extension priority used by the module resolver
pub const RESOLVE_EXTENSIONS: [&str; 6] = [".mjs", ".js", ".ts", ".jsx", ".tsx", ".json"];

/// Extensions the CommonJS adapter looks at
pub const COMMONJS_EXTENSIONS: [&str; 4] = [".js", ".ts", ".jsx", ".tsx"];

/// When a template entry participates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Inclusion {
    Always,
    /// A compiler configuration was supplied
    WhenCompilerConfig,
    /// The environment map has at least one entry
    WhenEnvNonEmpty,
    /// The minify flag is set
    WhenMinify,
}

/// Every stage in its fixed position
pub const TEMPLATE: [(StageId, Inclusion); 14] = [
    (StageId::ExternalizeBuiltins, Inclusion::Always),
    (StageId::TsconfigPaths, Inclusion::WhenCompilerConfig),
    (StageId::TypescriptExtensions, Inclusion::Always),
    (StageId::Alias, Inclusion::Always),
    (StageId::NodeResolve, Inclusion::Always),
    (StageId::EnvReplace, Inclusion::WhenEnvNonEmpty),
    (StageId::StripHashbang, Inclusion::Always),
    (StageId::Json, Inclusion::Always),
    (StageId::SyntaxTransform, Inclusion::Always),
    (StageId::CommonJs, Inclusion::Always),
    (StageId::DynamicImportVars, Inclusion::Always),
    (StageId::Minify, Inclusion::WhenMinify),
    (StageId::PatchBinary, Inclusion::Always),
    (StageId::CreateRequire, Inclusion::Always),
];

/// Inputs to one assembly, borrowed from the caller
struct Inputs<'a> {
    options: &'a BuildOptions,
    aliases: &'a AliasMap,
    env: &'a EnvMap,
    executables: &'a ExecutablePaths,
    tsconfig: Option<&'a TsconfigResult>,
}

impl Inputs<'_> {
    fn includes(&self, inclusion: Inclusion) -> bool {
        match inclusion {
            Inclusion::Always => true,
            Inclusion::WhenCompilerConfig => self.tsconfig.is_some(),
            Inclusion::WhenEnvNonEmpty => !self.env.is_empty(),
            Inclusion::WhenMinify => self.options.minify,
        }
    }

    /// Configuration for a stage; `None` only if its input is missing
    fn configure(&self, id: StageId) -> Option<StageConfig> {
        let config = match id {
            StageId::ExternalizeBuiltins => StageConfig::ExternalizeBuiltins {
                node_platform: self.options.targets_node_platform(),
                keep_node_prefix: self.options.supports_node_prefix(),
            },
            StageId::TsconfigPaths => {
                let tsconfig = self.tsconfig?;
                StageConfig::TsconfigPaths {
                    base: tsconfig.paths_base().to_path_buf(),
                    patterns: tsconfig.paths.clone(),
                }
            }
            StageId::TypescriptExtensions => StageConfig::TypescriptExtensions,
            StageId::Alias => StageConfig::Alias {
                entries: self.aliases.clone(),
            },
            StageId::NodeResolve => StageConfig::NodeResolve {
                extensions: RESOLVE_EXTENSIONS.iter().map(|e| e.to_string()).collect(),
                export_conditions: self.options.export_conditions.clone(),
                node_platform: self.options.targets_node_platform(),
            },
            StageId::EnvReplace => StageConfig::EnvReplace {
                values: self.env.clone(),
                prevent_assignment: true,
                object_guards: true,
            },
            StageId::StripHashbang => StageConfig::StripHashbang,
            StageId::Json => StageConfig::Json,
            StageId::SyntaxTransform => StageConfig::SyntaxTransform {
                target: self.options.target.clone(),
                compiler_options: self.tsconfig.map(|t| t.compiler_options.clone()),
            },
            StageId::CommonJs => StageConfig::CommonJs {
                extensions: COMMONJS_EXTENSIONS.iter().map(|e| e.to_string()).collect(),
                ignore_dynamic_requires: true,
                transform_mixed_es_modules: true,
            },
            StageId::DynamicImportVars => StageConfig::DynamicImportVars {
                warn_on_error: true,
            },
            StageId::Minify => StageConfig::Minify {
                target: self.options.target.clone(),
            },
            StageId::PatchBinary => StageConfig::PatchBinary {
                executables: self.executables.clone(),
            },
            StageId::CreateRequire => StageConfig::CreateRequire,
        };
        Some(config)
    }
}

/// Compose the stage list for one build
///
/// The maps are copied into the descriptor; later changes to the caller's
/// values do not affect it. The input, output and external fields are left
/// empty for the caller to fill.
pub fn assemble(
    options: &BuildOptions,
    aliases: &AliasMap,
    env: &EnvMap,
    executables: &ExecutablePaths,
    tsconfig: Option<&TsconfigResult>,
) -> PipelineDescriptor {
    let inputs = Inputs {
        options,
        aliases,
        env,
        executables,
        tsconfig,
    };

    let stages: Vec<StageDescriptor> = TEMPLATE
        .iter()
        .filter(|(_, inclusion)| inputs.includes(*inclusion))
        .filter_map(|(id, _)| inputs.configure(*id))
        .map(StageDescriptor::from)
        .collect();

    debug!(
        "Assembled pipeline: {}",
        stages
            .iter()
            .map(|s| s.id.name())
            .collect::<Vec<_>>()
            .join(" -> ")
    );

    PipelineDescriptor::new(stages)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::path::PathBuf;

    fn tsconfig() -> TsconfigResult {
        TsconfigResult::from_parts(
            PathBuf::from("/project/tsconfig.json"),
            json!({ "baseUrl": ".", "paths": { "@/*": ["src/*"] } }),
        )
    }

    #[test]
    fn test_template_matches_stage_order() {
        let ids: Vec<StageId> = TEMPLATE.iter().map(|(id, _)| *id).collect();
        assert_eq!(ids, StageId::ALL.to_vec());
    }

    #[test]
    fn test_minimal_configuration() {
        let descriptor = assemble(
            &BuildOptions::default(),
            &AliasMap::new(),
            &EnvMap::new(),
            &ExecutablePaths::new(),
            None,
        );
        assert_eq!(
            descriptor.stage_ids(),
            vec![
                StageId::ExternalizeBuiltins,
                StageId::TypescriptExtensions,
                StageId::Alias,
                StageId::NodeResolve,
                StageId::StripHashbang,
                StageId::Json,
                StageId::SyntaxTransform,
                StageId::CommonJs,
                StageId::DynamicImportVars,
                StageId::PatchBinary,
                StageId::CreateRequire,
            ]
        );
        assert!(descriptor.input.is_empty());
        assert!(descriptor.external.is_empty());
        assert_eq!(descriptor.output, crate::core::descriptor::OutputSpec::default());
    }

    #[test]
    fn test_full_configuration_includes_every_stage() {
        let env: EnvMap = [("DEBUG", "false")].into_iter().collect();
        let tsconfig = tsconfig();
        let descriptor = assemble(
            &BuildOptions::default().with_minify(true),
            &AliasMap::new(),
            &env,
            &ExecutablePaths::new(),
            Some(&tsconfig),
        );
        assert_eq!(descriptor.stage_ids(), StageId::ALL.to_vec());
    }

    #[test]
    fn test_stage_configs_carry_inputs() {
        let tsconfig = tsconfig();
        let options = BuildOptions::new(vec!["node14".parse().unwrap()])
            .with_export_conditions(["worker"]);
        let descriptor = assemble(
            &options,
            &AliasMap::new(),
            &EnvMap::new(),
            &ExecutablePaths::new(),
            Some(&tsconfig),
        );

        match descriptor.stage(StageId::TsconfigPaths) {
            Some(StageConfig::TsconfigPaths { base, patterns }) => {
                assert_eq!(base, &PathBuf::from("/project/."));
                assert_eq!(patterns[0].pattern, "@/*");
            }
            other => panic!("unexpected config {:?}", other),
        }
        match descriptor.stage(StageId::ExternalizeBuiltins) {
            Some(StageConfig::ExternalizeBuiltins {
                node_platform,
                keep_node_prefix,
            }) => {
                assert!(*node_platform);
                assert!(!*keep_node_prefix);
            }
            other => panic!("unexpected config {:?}", other),
        }
        match descriptor.stage(StageId::NodeResolve) {
            Some(StageConfig::NodeResolve {
                extensions,
                export_conditions,
                node_platform,
            }) => {
                assert!(*node_platform);
                assert_eq!(extensions.first().map(String::as_str), Some(".mjs"));
                assert_eq!(export_conditions, &vec!["worker".to_string()]);
            }
            other => panic!("unexpected config {:?}", other),
        }
    }

    #[test]
    fn test_maps_are_copied() {
        let mut aliases: AliasMap = [("a", "./b.js")].into_iter().collect();
        let descriptor = assemble(
            &BuildOptions::default(),
            &aliases,
            &EnvMap::new(),
            &ExecutablePaths::new(),
            None,
        );
        aliases.insert("late", "./late.js");

        match descriptor.stage(StageId::Alias) {
            Some(StageConfig::Alias { entries }) => {
                assert_eq!(entries.len(), 1);
                assert_eq!(entries.get("late"), None);
            }
            other => panic!("unexpected config {:?}", other),
        }
    }
}
