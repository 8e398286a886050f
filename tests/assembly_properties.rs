//! Stage ordering and inclusion across configurations

mod helpers;

use bundle_pipeline::core::{
    assemble, AliasMap, BuildOptions, EnvMap, ExecutablePaths, StageId, Target, TsconfigResult,
};
use helpers::assert_ordered;
use serde_json::json;
use std::path::PathBuf;

fn tsconfig() -> TsconfigResult {
    TsconfigResult::from_parts(
        PathBuf::from("/project/tsconfig.json"),
        json!({ "baseUrl": ".", "paths": { "~/*": ["src/*"] } }),
    )
}

fn target_sets() -> Vec<Vec<Target>> {
    ["node12", "node18", "es2015", "chrome90", "node14.18,es2020", "esnext"]
        .iter()
        .map(|set| set.split(',').map(|t| t.parse().unwrap()).collect())
        .collect()
}

/// Every combination of the three conditional inputs, for every target set
fn configurations() -> Vec<(BuildOptions, EnvMap, Option<TsconfigResult>)> {
    let mut out = Vec::new();
    for target in target_sets() {
        for minify in [false, true] {
            for with_env in [false, true] {
                for with_tsconfig in [false, true] {
                    let mut env = EnvMap::new();
                    if with_env {
                        env.insert("process.env.NODE_ENV", "production");
                    }
                    out.push((
                        BuildOptions::new(target.clone()).with_minify(minify),
                        env,
                        with_tsconfig.then(tsconfig),
                    ));
                }
            }
        }
    }
    out
}

#[test]
fn test_core_stages_strictly_ordered() {
    for (options, env, tsconfig) in configurations() {
        let descriptor = assemble(&options, &AliasMap::new(), &env, &ExecutablePaths::new(), tsconfig.as_ref());
        let mut expected = vec![
            StageId::ExternalizeBuiltins,
            StageId::NodeResolve,
            StageId::SyntaxTransform,
            StageId::CommonJs,
        ];
        if options.minify {
            expected.push(StageId::Minify);
        }
        expected.extend([StageId::PatchBinary, StageId::CreateRequire]);
        assert_ordered(&descriptor, &expected);
    }
}

#[test]
fn test_env_stage_between_alias_and_stripper() {
    for (options, env, tsconfig) in configurations() {
        let descriptor = assemble(&options, &AliasMap::new(), &env, &ExecutablePaths::new(), tsconfig.as_ref());
        let count = descriptor.stage_ids().iter().filter(|id| **id == StageId::EnvReplace).count();
        if env.is_empty() {
            assert_eq!(count, 0);
        } else {
            assert_eq!(count, 1);
            assert_ordered(
                &descriptor,
                &[StageId::Alias, StageId::EnvReplace, StageId::StripHashbang],
            );
        }
    }
}

#[test]
fn test_tsconfig_adds_exactly_one_stage() {
    for (options, env, _) in configurations() {
        let without = assemble(&options, &AliasMap::new(), &env, &ExecutablePaths::new(), None);
        let tsconfig = tsconfig();
        let with = assemble(&options, &AliasMap::new(), &env, &ExecutablePaths::new(), Some(&tsconfig));

        assert!(!without.contains(StageId::TsconfigPaths));
        assert!(with.contains(StageId::TsconfigPaths));
        assert_eq!(with.stages.len(), without.stages.len() + 1);

        let mut remaining = with.stage_ids();
        remaining.retain(|id| *id != StageId::TsconfigPaths);
        assert_eq!(remaining, without.stage_ids());
    }
}

#[test]
fn test_unconditional_stages_never_move_relative_to_each_other() {
    let unconditional: Vec<StageId> = StageId::ALL
        .iter()
        .copied()
        .filter(|id| {
            !matches!(
                id,
                StageId::TsconfigPaths | StageId::EnvReplace | StageId::Minify
            )
        })
        .collect();

    for (options, env, tsconfig) in configurations() {
        let descriptor = assemble(&options, &AliasMap::new(), &env, &ExecutablePaths::new(), tsconfig.as_ref());
        let mut present = descriptor.stage_ids();
        present.retain(|id| unconditional.contains(id));
        assert_eq!(present, unconditional);
    }
}

#[test]
fn test_descriptor_leaves_caller_fields_empty() {
    let tsconfig = tsconfig();
    let mut env = EnvMap::new();
    env.insert("DEBUG", "false");
    let executables: ExecutablePaths = ["dist/cli.mjs"].into_iter().collect();
    let options = BuildOptions::new(vec!["node18".parse().unwrap()]).with_minify(true);

    let descriptor = assemble(&options, &AliasMap::new(), &env, &executables, Some(&tsconfig));
    assert!(descriptor.input.is_empty());
    assert!(descriptor.external.is_empty());
    assert_eq!(descriptor.output.dir, None);
    assert_eq!(descriptor.output.root, None);
    assert_eq!(descriptor.stages.len(), 14);
}

#[test]
fn test_descriptor_serializes_for_inspection() {
    let options = BuildOptions::new(vec!["node18".parse().unwrap()]);
    let descriptor = assemble(&options, &AliasMap::new(), &EnvMap::new(), &ExecutablePaths::new(), None);
    let value = serde_json::to_value(&descriptor).unwrap();

    let stages = value["stages"].as_array().unwrap();
    assert_eq!(stages.len(), descriptor.stages.len());
    assert_eq!(value["preserve_entry_signatures"], json!("strict"));
}
