//! Stage instances for one build
//!
//! A descriptor names stages and their configuration; the plan turns each
//! entry into a live [`Stage`] in the same order. The directive store is
//! created here, once per plan, and handed only to the hashbang stripper
//! and the executable patcher.

use crate::core::{DirectiveStore, PipelineDescriptor, StageConfig, StageId};
use crate::stages::*;

pub struct StagePlan {
    stages: Vec<Box<dyn Stage>>,
}

impl StagePlan {
    pub fn instantiate(descriptor: &PipelineDescriptor) -> Self {
        let directives = DirectiveStore::new();
        let stages = descriptor
            .stages
            .iter()
            .map(|stage| build_stage(&stage.config, &directives))
            .collect();
        Self { stages }
    }

    pub fn stages(&self) -> &[Box<dyn Stage>] {
        &self.stages
    }

    pub fn ids(&self) -> Vec<StageId> {
        self.stages.iter().map(|s| s.id()).collect()
    }

}

fn build_stage(config: &StageConfig, directives: &DirectiveStore) -> Box<dyn Stage> {
    match config.clone() {
        StageConfig::ExternalizeBuiltins {
            node_platform,
            keep_node_prefix,
        } => Box::new(ExternalizeBuiltinsStage::new(node_platform, keep_node_prefix)),
        StageConfig::TsconfigPaths { base, patterns } => Box::new(TsconfigPathsStage::new(base, patterns)),
        StageConfig::TypescriptExtensions => Box::new(TypescriptExtensionsStage::new()),
        StageConfig::Alias { entries } => Box::new(AliasStage::new(entries)),
        StageConfig::NodeResolve {
            extensions,
            export_conditions,
            node_platform,
        } => Box::new(NodeResolveStage::new(extensions, export_conditions, node_platform)),
        StageConfig::EnvReplace {
            values,
            prevent_assignment,
            object_guards,
        } => Box::new(EnvReplaceStage::new(&values, prevent_assignment, object_guards)),
        StageConfig::StripHashbang => Box::new(StripHashbangStage::new(directives.clone())),
        StageConfig::Json => Box::new(JsonStage::new()),
        StageConfig::SyntaxTransform {
            target,
            compiler_options,
        } => Box::new(SyntaxTransformStage::new(target, compiler_options.as_ref())),
        StageConfig::CommonJs {
            extensions,
            ignore_dynamic_requires,
            transform_mixed_es_modules,
        } => Box::new(CommonJsStage::new(
            extensions,
            ignore_dynamic_requires,
            transform_mixed_es_modules,
        )),
        StageConfig::DynamicImportVars { warn_on_error } => Box::new(DynamicImportVarsStage::new(warn_on_error)),
        StageConfig::Minify { target } => Box::new(MinifyStage::new(target)),
        StageConfig::PatchBinary { executables } => {
            Box::new(PatchBinaryStage::new(executables, directives.clone()))
        }
        StageConfig::CreateRequire => Box::new(CreateRequireStage::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{assemble, AliasMap, BuildOptions, EnvMap, ExecutablePaths};

    #[test]
    fn test_plan_follows_descriptor_order() {
        let options = BuildOptions::new(vec!["node18".parse().unwrap()]).with_minify(true);
        let mut env = EnvMap::new();
        env.insert("DEBUG", "false");
        let descriptor = assemble(&options, &AliasMap::new(), &env, &ExecutablePaths::new(), None);

        let plan = StagePlan::instantiate(&descriptor);
        assert_eq!(plan.ids(), descriptor.stage_ids());
        for (stage, id) in plan.stages().iter().zip(descriptor.stage_ids()) {
            assert_eq!(stage.name(), id.name());
        }
    }

    #[test]
    fn test_directives_shared_between_stripper_and_patcher() {
        let options = BuildOptions::new(vec!["node18".parse().unwrap()]);
        let executables: ExecutablePaths = ["dist/cli.mjs"].into_iter().collect();
        let descriptor = assemble(&options, &AliasMap::new(), &EnvMap::new(), &executables, None);
        let plan = StagePlan::instantiate(&descriptor);

        let stripper = &plan.stages()[descriptor.index_of(StageId::StripHashbang).unwrap()];
        let mut ctx = TransformContext::new("/src/cli.ts");
        stripper.transform("#!/usr/bin/env bun\nrun();", &mut ctx).unwrap();

        let patcher = &plan.stages()[descriptor.index_of(StageId::PatchBinary).unwrap()];
        let chunk = ChunkInfo {
            module: "/src/cli.ts".into(),
            file: "dist/cli.mjs".into(),
            is_entry: true,
        };
        let out = patcher.render_chunk("run();", &chunk).unwrap();
        assert_eq!(out.as_deref(), Some("#!/usr/bin/env bun\nrun();"));
    }
}
