//! Reference execution engine - runs an assembled pipeline over real modules
//!
//! Every reachable module becomes one output file. Specifiers are resolved by
//! the resolve stages in order, module code flows through every transform
//! stage, import literals are rewritten to point at the other output files,
//! and the render stages see each file before it is written.

use crate::core::PipelineDescriptor;
use crate::execution::plan::StagePlan;
use crate::execution::source::SourceProvider;
use crate::stages::node_resolve::clean_path;
use crate::stages::{ChunkInfo, ResolveStep, ResolvedId, StageError, TransformContext, WrittenChunk};
use crate::syntax::{quote, scan_imports, tokenize, Edits};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeSet, HashSet, VecDeque};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

/// Build failures
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("No input modules")]
    NoInput,

    #[error("[{stage}] {}: {source}", .module.display())]
    Stage {
        stage: &'static str,
        module: PathBuf,
        #[source]
        source: StageError,
    },

    #[error("Failed to read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl BuildError {
    fn stage(stage: &'static str, module: &Path, source: StageError) -> Self {
        BuildError::Stage {
            stage,
            module: module.to_path_buf(),
            source,
        }
    }
}

/// Events that can occur during a build
#[derive(Debug, Clone)]
pub enum BuildEvent {
    BuildStarted {
        build_id: Uuid,
        stages: Vec<&'static str>,
    },
    ModuleTransformed {
        module: PathBuf,
    },
    Warning(BuildWarning),
    ChunkWritten {
        file: PathBuf,
        bytes: usize,
    },
    BuildFinished {
        build_id: Uuid,
        outputs: usize,
        warnings: usize,
    },
}

/// Type for event handlers
pub type EventHandler = Arc<dyn Fn(BuildEvent) + Send + Sync>;

/// A non-fatal problem reported by a stage
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BuildWarning {
    pub module: PathBuf,
    pub stage: &'static str,
    pub message: String,
}

/// One output file, rendered but not yet written
#[derive(Debug, Clone)]
pub struct RenderedChunk {
    pub module: PathBuf,
    pub file: PathBuf,
    pub is_entry: bool,
    pub code: String,
}

/// Everything a build produced before touching the output directory
#[derive(Debug, Clone, Default)]
pub struct Bundle {
    pub chunks: Vec<RenderedChunk>,
    pub warnings: Vec<BuildWarning>,
    pub externals: BTreeSet<String>,
}

impl Bundle {
    pub fn chunk(&self, module: &Path) -> Option<&RenderedChunk> {
        self.chunks.iter().find(|c| c.module == module)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct OutputFile {
    pub module: PathBuf,
    pub file: PathBuf,
    pub is_entry: bool,
    pub bytes: usize,
}

/// Summary of a finished build
#[derive(Debug, Clone, Serialize)]
pub struct BuildReport {
    pub build_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub outputs: Vec<OutputFile>,
    pub warnings: Vec<BuildWarning>,
    pub externals: BTreeSet<String>,
}

/// A module after every transform stage
struct LoadedModule {
    id: PathBuf,
    code: String,
}

pub struct BuildEngine<S> {
    descriptor: PipelineDescriptor,
    plan: StagePlan,
    source: S,
    event_handlers: Vec<EventHandler>,
}

impl<S: SourceProvider> BuildEngine<S> {
    /// Instantiate the descriptor's stages; the descriptor's input, output and
    /// external fields must already be filled
    pub fn new(descriptor: PipelineDescriptor, source: S) -> Self {
        let plan = StagePlan::instantiate(&descriptor);
        Self {
            descriptor,
            plan,
            source,
            event_handlers: Vec::new(),
        }
    }

    pub fn descriptor(&self) -> &PipelineDescriptor {
        &self.descriptor
    }

    pub fn plan(&self) -> &StagePlan {
        &self.plan
    }

    /// Add an event handler
    pub fn add_event_handler<F>(&mut self, handler: F)
    where
        F: Fn(BuildEvent) + Send + Sync + 'static,
    {
        self.event_handlers.push(Arc::new(handler));
    }

    /// Emit an event to all handlers
    fn emit_event(&self, event: BuildEvent) {
        for handler in &self.event_handlers {
            handler(event.clone());
        }
    }

    /// Resolve `specifier` through the resolve stages, externals first
    pub fn resolve(&self, specifier: &str, importer: Option<&Path>) -> Result<ResolvedId, BuildError> {
        if self.descriptor.is_external(specifier) {
            return Ok(ResolvedId::External(specifier.to_string()));
        }
        let module = importer.unwrap_or(Path::new(""));
        self.resolve_from(0, specifier, importer)
            .map_err(|(stage, source)| BuildError::stage(stage, module, source))
    }

    fn resolve_from(
        &self,
        from: usize,
        specifier: &str,
        importer: Option<&Path>,
    ) -> Result<ResolvedId, (&'static str, StageError)> {
        let stages = self.plan.stages();
        let mut specifier = specifier.to_string();
        let mut k = from;

        while k < stages.len() {
            let stage = &stages[k];
            let step = stage
                .resolve_id(&specifier, importer)
                .map_err(|e| (stage.name(), e))?;
            match step {
                ResolveStep::Pass => {}
                ResolveStep::Rewrite(next) => {
                    debug!("[{}] '{}' -> '{}'", stage.name(), specifier, next);
                    specifier = next;
                }
                ResolveStep::Candidates(candidates) => {
                    // Each candidate restarts the walk one stage further on
                    for candidate in candidates {
                        match self.resolve_from(k + 1, &candidate, importer) {
                            Ok(resolved) => return Ok(resolved),
                            Err((_, StageError::Unresolved { .. })) => continue,
                            Err(other) => return Err(other),
                        }
                    }
                }
                ResolveStep::Resolved(resolved) => return Ok(resolved),
            }
            k += 1;
        }

        Err((
            crate::core::StageId::NodeResolve.name(),
            StageError::unresolved(&specifier, importer),
        ))
    }

    async fn load(&self, id: &Path) -> Result<(LoadedModule, Vec<BuildWarning>), BuildError> {
        let mut code = self.source.read(id).await.map_err(|source| BuildError::Read {
            path: id.to_path_buf(),
            source,
        })?;

        let mut warnings = Vec::new();
        for stage in self.plan.stages() {
            let mut ctx = TransformContext::new(id);
            if let Some(next) = stage
                .transform(&code, &mut ctx)
                .map_err(|e| BuildError::stage(stage.name(), id, e))?
            {
                code = next;
            }
            warnings.extend(ctx.warnings.into_iter().map(|message| BuildWarning {
                module: id.to_path_buf(),
                stage: stage.name(),
                message,
            }));
        }

        Ok((
            LoadedModule {
                id: id.to_path_buf(),
                code,
            },
            warnings,
        ))
    }

    fn entries(&self) -> Result<Vec<PathBuf>, BuildError> {
        let mut entries = Vec::new();
        for input in &self.descriptor.input {
            if input.is_file() {
                entries.push(clean_path(input));
                continue;
            }
            match self.resolve(&input.to_string_lossy(), None)? {
                ResolvedId::File(file) => entries.push(file),
                ResolvedId::External(id) => {
                    return Err(BuildError::stage(
                        crate::core::StageId::NodeResolve.name(),
                        input,
                        StageError::unresolved(&id, None),
                    ))
                }
            }
        }
        Ok(entries)
    }

    /// Transform every reachable module and render its output file
    pub async fn render(&self) -> Result<Bundle, BuildError> {
        let entries = self.entries()?;
        if entries.is_empty() {
            return Err(BuildError::NoInput);
        }

        let output = &self.descriptor.output;
        let entry_set: HashSet<PathBuf> = entries.iter().cloned().collect();
        let mut seen: HashSet<PathBuf> = entry_set.clone();
        let mut queue: VecDeque<PathBuf> = entries.into_iter().collect();
        let mut bundle = Bundle::default();

        while let Some(id) = queue.pop_front() {
            let (module, warnings) = self.load(&id).await?;
            for warning in warnings {
                self.emit_event(BuildEvent::Warning(warning.clone()));
                bundle.warnings.push(warning);
            }
            self.emit_event(BuildEvent::ModuleTransformed { module: id.clone() });

            let file = output.file_for(&module.id);
            let tokens = tokenize(&module.code)
                .map_err(|e| BuildError::stage("scan", &id, StageError::from_lex(&module.code, e)))?;

            let mut edits = Edits::new();
            for import in scan_imports(&module.code, &tokens) {
                let replacement = match self.resolve(&import.specifier, Some(&module.id))? {
                    ResolvedId::File(target) => {
                        let target = clean_path(&target);
                        let specifier = relative_specifier(&file, &output.file_for(&target));
                        if seen.insert(target.clone()) {
                            queue.push_back(target);
                        }
                        specifier
                    }
                    ResolvedId::External(external) => {
                        bundle.externals.insert(external.clone());
                        external
                    }
                };
                if replacement != import.specifier {
                    edits.replace(import.span.start, import.span.end, quote(&replacement));
                }
            }

            let is_entry = entry_set.contains(&id);
            let mut code = edits.apply(&module.code);
            let chunk = ChunkInfo {
                module: id.clone(),
                file: file.clone(),
                is_entry,
            };
            for stage in self.plan.stages() {
                if let Some(next) = stage
                    .render_chunk(&code, &chunk)
                    .map_err(|e| BuildError::stage(stage.name(), &id, e))?
                {
                    code = next;
                }
            }

            bundle.chunks.push(RenderedChunk {
                module: id,
                file,
                is_entry,
                code,
            });
        }

        Ok(bundle)
    }

    /// Render and write every output file, then run the write hooks
    pub async fn build(&self) -> Result<BuildReport, BuildError> {
        let build_id = Uuid::new_v4();
        let started_at = Utc::now();
        info!("Starting build {} with {} stages", build_id, self.plan.stages().len());
        self.emit_event(BuildEvent::BuildStarted {
            build_id,
            stages: self.plan.stages().iter().map(|s| s.name()).collect(),
        });

        let bundle = self.render().await?;

        let mut outputs = Vec::with_capacity(bundle.chunks.len());
        let mut written = Vec::with_capacity(bundle.chunks.len());
        for chunk in &bundle.chunks {
            if let Some(dir) = chunk.file.parent().filter(|d| !d.as_os_str().is_empty()) {
                tokio::fs::create_dir_all(dir).await.map_err(|source| BuildError::Write {
                    path: dir.to_path_buf(),
                    source,
                })?;
            }
            tokio::fs::write(&chunk.file, &chunk.code)
                .await
                .map_err(|source| BuildError::Write {
                    path: chunk.file.clone(),
                    source,
                })?;
            debug!("Wrote {} ({} bytes)", chunk.file.display(), chunk.code.len());
            self.emit_event(BuildEvent::ChunkWritten {
                file: chunk.file.clone(),
                bytes: chunk.code.len(),
            });

            written.push(WrittenChunk {
                module: chunk.module.clone(),
                file: chunk.file.clone(),
                is_entry: chunk.is_entry,
            });
            outputs.push(OutputFile {
                module: chunk.module.clone(),
                file: chunk.file.clone(),
                is_entry: chunk.is_entry,
                bytes: chunk.code.len(),
            });
        }

        for stage in self.plan.stages() {
            stage
                .write_bundle(&written)
                .map_err(|e| BuildError::stage(stage.name(), self.descriptor.output.dir(), e))?;
        }

        info!(
            "Build {} finished: {} files, {} warnings",
            build_id,
            outputs.len(),
            bundle.warnings.len()
        );
        self.emit_event(BuildEvent::BuildFinished {
            build_id,
            outputs: outputs.len(),
            warnings: bundle.warnings.len(),
        });

        Ok(BuildReport {
            build_id,
            started_at,
            finished_at: Utc::now(),
            outputs,
            warnings: bundle.warnings,
            externals: bundle.externals,
        })
    }
}

/// Import specifier leading from output file `from` to output file `to`
pub fn relative_specifier(from: &Path, to: &Path) -> String {
    let base: Vec<Component> = from.parent().map(|p| p.components().collect()).unwrap_or_default();
    let target: Vec<Component> = to.components().collect();
    let common = base.iter().zip(&target).take_while(|(a, b)| a == b).count();

    let mut parts: Vec<String> = vec!["..".to_string(); base.len() - common];
    parts.extend(
        target[common..]
            .iter()
            .map(|c| c.as_os_str().to_string_lossy().into_owned()),
    );
    let joined = parts.join("/");
    if joined.starts_with("../") {
        joined
    } else {
        format!("./{}", joined)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{assemble, AliasMap, BuildOptions, EnvMap, ExecutablePaths, OutputSpec};
    use crate::execution::source::{DiskSource, MemorySource};
    use std::sync::Mutex;
    use tempfile::TempDir;

    fn write(root: &Path, path: &str, content: &str) -> PathBuf {
        let full = root.join(path);
        std::fs::create_dir_all(full.parent().unwrap()).unwrap();
        std::fs::write(&full, content).unwrap();
        full
    }

    fn descriptor(root: &Path, input: &[&str], env: &EnvMap) -> PipelineDescriptor {
        let options = BuildOptions::new(vec!["node18".parse().unwrap()]);
        let mut descriptor = assemble(&options, &AliasMap::new(), env, &ExecutablePaths::new(), None);
        descriptor.input = input.iter().map(|i| root.join("src").join(i)).collect();
        descriptor.output = OutputSpec {
            dir: Some(root.join("dist")),
            root: Some(root.join("src")),
        };
        descriptor
    }

    #[test]
    fn test_relative_specifier() {
        let dist = Path::new("/out");
        assert_eq!(relative_specifier(&dist.join("index.mjs"), &dist.join("util.mjs")), "./util.mjs");
        assert_eq!(
            relative_specifier(&dist.join("index.mjs"), &dist.join("lib/a.mjs")),
            "./lib/a.mjs"
        );
        assert_eq!(
            relative_specifier(&dist.join("lib/a.mjs"), &dist.join("b.json.mjs")),
            "../b.json.mjs"
        );
    }

    #[tokio::test]
    async fn test_render_rewrites_specifiers() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        write(root, "src/index.ts", "import { add } from './math.js';\nimport fs from 'fs';\nconsole.log(add(1, 2), fs);\n");
        write(root, "src/math.ts", "export const add = (a: number, b: number): number => a + b;\n");

        let engine = BuildEngine::new(descriptor(root, &["index.ts"], &EnvMap::new()), DiskSource);
        let bundle = engine.render().await.unwrap();

        assert_eq!(bundle.chunks.len(), 2);
        let index = bundle.chunk(&root.join("src/index.ts")).unwrap();
        assert!(index.is_entry);
        assert!(index.code.contains("from \"./math.mjs\""));
        assert!(index.code.contains("from 'fs'"));
        let math = bundle.chunk(&root.join("src/math.ts")).unwrap();
        assert!(!math.is_entry);
        assert_eq!(math.file, root.join("dist/math.mjs"));
        assert!(math.code.contains("(a, b) => a + b"));
        assert!(bundle.externals.contains("fs"));
    }

    #[tokio::test]
    async fn test_configured_externals_are_not_resolved() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        write(root, "src/index.js", "import _ from 'lodash/fp';\nexport default _;\n");

        let mut descriptor = descriptor(root, &["index.js"], &EnvMap::new());
        descriptor.external = vec![crate::core::ExternalMatcher::parse("lodash").unwrap()];
        let bundle = BuildEngine::new(descriptor, DiskSource).render().await.unwrap();
        assert_eq!(bundle.chunks.len(), 1);
        assert!(bundle.externals.contains("lodash/fp"));
    }

    #[tokio::test]
    async fn test_unresolved_import_names_stage_and_module() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        let index = write(root, "src/index.js", "import './missing.js';\n");

        let engine = BuildEngine::new(descriptor(root, &["index.js"], &EnvMap::new()), DiskSource);
        match engine.render().await.unwrap_err() {
            BuildError::Stage { stage, module, source } => {
                assert_eq!(stage, "node-resolve");
                assert_eq!(module, index);
                assert!(matches!(source, StageError::Unresolved { .. }));
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[tokio::test]
    async fn test_memory_source_and_events() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        let index = write(root, "src/index.js", "placeholder");

        let mut env = EnvMap::new();
        env.insert("process.env.NODE_ENV", "production");
        let source = MemorySource::new().with_file(&index, "export const mode = process.env.NODE_ENV;\n");

        let mut engine = BuildEngine::new(descriptor(root, &["index.js"], &env), source);
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        engine.add_event_handler(move |event| {
            let label = match event {
                BuildEvent::BuildStarted { .. } => "started",
                BuildEvent::ModuleTransformed { .. } => "module",
                BuildEvent::Warning(_) => "warning",
                BuildEvent::ChunkWritten { .. } => "written",
                BuildEvent::BuildFinished { .. } => "finished",
            };
            sink.lock().unwrap().push(label);
        });

        let report = engine.build().await.unwrap();
        assert_eq!(report.outputs.len(), 1);
        assert!(report.finished_at >= report.started_at);
        let written = std::fs::read_to_string(root.join("dist/index.mjs")).unwrap();
        assert_eq!(written, "export const mode = \"production\";\n");
        assert_eq!(*events.lock().unwrap(), vec!["started", "module", "written", "finished"]);
    }

    #[tokio::test]
    async fn test_no_input() {
        let dir = TempDir::new().unwrap();
        let engine = BuildEngine::new(descriptor(dir.path(), &[], &EnvMap::new()), DiskSource);
        assert!(matches!(engine.render().await.unwrap_err(), BuildError::NoInput));
    }
}
