//! Pipeline descriptor: the ordered stage list plus the caller-filled fields

use crate::core::options::{AliasMap, EnvMap, ExecutablePaths};
use crate::core::target::Target;
use crate::core::tsconfig::PathPattern;
use regex::Regex;
use serde::{Serialize, Serializer};
use serde_json::Value;
use std::fmt;
use std::path::{Path, PathBuf};

/// Stage identities, declared in pipeline order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum StageId {
    ExternalizeBuiltins,
    TsconfigPaths,
    TypescriptExtensions,
    Alias,
    NodeResolve,
    EnvReplace,
    StripHashbang,
    Json,
    SyntaxTransform,
    CommonJs,
    DynamicImportVars,
    Minify,
    PatchBinary,
    CreateRequire,
}

impl StageId {
    pub const ALL: [StageId; 14] = [
        StageId::ExternalizeBuiltins,
        StageId::TsconfigPaths,
        StageId::TypescriptExtensions,
        StageId::Alias,
        StageId::NodeResolve,
        StageId::EnvReplace,
        StageId::StripHashbang,
        StageId::Json,
        StageId::SyntaxTransform,
        StageId::CommonJs,
        StageId::DynamicImportVars,
        StageId::Minify,
        StageId::PatchBinary,
        StageId::CreateRequire,
    ];

    pub fn name(self) -> &'static str {
        match self {
            StageId::ExternalizeBuiltins => "externalize-builtins",
            StageId::TsconfigPaths => "tsconfig-paths",
            StageId::TypescriptExtensions => "typescript-extensions",
            StageId::Alias => "alias",
            StageId::NodeResolve => "node-resolve",
            StageId::EnvReplace => "env-replace",
            StageId::StripHashbang => "strip-hashbang",
            StageId::Json => "json",
            StageId::SyntaxTransform => "syntax-transform",
            StageId::CommonJs => "commonjs",
            StageId::DynamicImportVars => "dynamic-import-vars",
            StageId::Minify => "minify",
            StageId::PatchBinary => "patch-binary",
            StageId::CreateRequire => "create-require",
        }
    }
}

impl fmt::Display for StageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Per-stage configuration, fixed at assembly time
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum StageConfig {
    ExternalizeBuiltins {
        node_platform: bool,
        keep_node_prefix: bool,
    },
    TsconfigPaths {
        base: PathBuf,
        patterns: Vec<PathPattern>,
    },
    TypescriptExtensions,
    Alias {
        entries: AliasMap,
    },
    NodeResolve {
        extensions: Vec<String>,
        export_conditions: Vec<String>,
        node_platform: bool,
    },
    EnvReplace {
        values: EnvMap,
        prevent_assignment: bool,
        object_guards: bool,
    },
    StripHashbang,
    Json,
    SyntaxTransform {
        target: Vec<Target>,
        compiler_options: Option<Value>,
    },
    CommonJs {
        extensions: Vec<String>,
        ignore_dynamic_requires: bool,
        transform_mixed_es_modules: bool,
    },
    DynamicImportVars {
        warn_on_error: bool,
    },
    Minify {
        target: Vec<Target>,
    },
    PatchBinary {
        executables: ExecutablePaths,
    },
    CreateRequire,
}

impl StageConfig {
    pub fn id(&self) -> StageId {
        match self {
            StageConfig::ExternalizeBuiltins { .. } => StageId::ExternalizeBuiltins,
            StageConfig::TsconfigPaths { .. } => StageId::TsconfigPaths,
            StageConfig::TypescriptExtensions => StageId::TypescriptExtensions,
            StageConfig::Alias { .. } => StageId::Alias,
            StageConfig::NodeResolve { .. } => StageId::NodeResolve,
            StageConfig::EnvReplace { .. } => StageId::EnvReplace,
            StageConfig::StripHashbang => StageId::StripHashbang,
            StageConfig::Json => StageId::Json,
            StageConfig::SyntaxTransform { .. } => StageId::SyntaxTransform,
            StageConfig::CommonJs { .. } => StageId::CommonJs,
            StageConfig::DynamicImportVars { .. } => StageId::DynamicImportVars,
            StageConfig::Minify { .. } => StageId::Minify,
            StageConfig::PatchBinary { .. } => StageId::PatchBinary,
            StageConfig::CreateRequire => StageId::CreateRequire,
        }
    }
}

/// One included stage
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StageDescriptor {
    pub id: StageId,
    pub config: StageConfig,
}

impl From<StageConfig> for StageDescriptor {
    fn from(config: StageConfig) -> Self {
        Self {
            id: config.id(),
            config,
        }
    }
}

/// Module ids excluded from bundling
#[derive(Debug, Clone)]
pub enum ExternalMatcher {
    /// Package name; also matches its subpaths (`pkg/sub`)
    Exact(String),
    Pattern(Regex),
}

impl ExternalMatcher {
    /// `/re/` becomes a pattern, anything else an exact name
    pub fn parse(raw: &str) -> Result<Self, regex::Error> {
        if raw.len() >= 2 && raw.starts_with('/') && raw.ends_with('/') {
            Ok(ExternalMatcher::Pattern(Regex::new(&raw[1..raw.len() - 1])?))
        } else {
            Ok(ExternalMatcher::Exact(raw.to_string()))
        }
    }

    pub fn matches(&self, id: &str) -> bool {
        match self {
            ExternalMatcher::Exact(name) => {
                id == name
                    || id
                        .strip_prefix(name.as_str())
                        .is_some_and(|rest| rest.starts_with('/'))
            }
            ExternalMatcher::Pattern(re) => re.is_match(id),
        }
    }
}

impl PartialEq for ExternalMatcher {
    fn eq(&self, other: &Self) -> bool {
        self.to_string() == other.to_string()
    }
}

impl fmt::Display for ExternalMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExternalMatcher::Exact(name) => f.write_str(name),
            ExternalMatcher::Pattern(re) => write!(f, "/{}/", re.as_str()),
        }
    }
}

impl Serialize for ExternalMatcher {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Where output files go
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct OutputSpec {
    /// Output directory (`dist` when unset)
    pub dir: Option<PathBuf>,

    /// Source root that output names are relative to
    pub root: Option<PathBuf>,
}

impl OutputSpec {
    pub fn dir(&self) -> &Path {
        self.dir.as_deref().unwrap_or(Path::new("dist"))
    }

    /// Output file for a source module
    ///
    /// The extension becomes `.mjs`; `.json` modules keep their extension
    /// and gain `.mjs`.
    pub fn file_for(&self, module: &Path) -> PathBuf {
        let relative = self
            .root
            .as_deref()
            .and_then(|root| module.strip_prefix(root).ok())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| module.file_name().map(PathBuf::from).unwrap_or_default());

        let mut out = self.dir().join(relative);
        if out.extension().is_some_and(|ext| ext == "json") {
            let mut name = out.file_name().unwrap_or_default().to_os_string();
            name.push(".mjs");
            out.set_file_name(name);
        } else {
            out.set_extension("mjs");
        }
        out
    }
}

/// Entry export preservation; always strict
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EntrySignatures {
    #[default]
    Strict,
}

/// The assembled pipeline, consumed once by an execution engine
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelineDescriptor {
    /// Entry modules (caller-filled)
    pub input: Vec<PathBuf>,

    pub stages: Vec<StageDescriptor>,

    /// Output layout (caller-filled)
    pub output: OutputSpec,

    /// External matchers (caller-filled)
    pub external: Vec<ExternalMatcher>,

    pub preserve_entry_signatures: EntrySignatures,
}

impl PipelineDescriptor {
    pub fn new(stages: Vec<StageDescriptor>) -> Self {
        Self {
            input: Vec::new(),
            stages,
            output: OutputSpec::default(),
            external: Vec::new(),
            preserve_entry_signatures: EntrySignatures::Strict,
        }
    }

    pub fn stage_ids(&self) -> Vec<StageId> {
        self.stages.iter().map(|s| s.id).collect()
    }

    pub fn index_of(&self, id: StageId) -> Option<usize> {
        self.stages.iter().position(|s| s.id == id)
    }

    pub fn contains(&self, id: StageId) -> bool {
        self.index_of(id).is_some()
    }

    pub fn stage(&self, id: StageId) -> Option<&StageConfig> {
        self.stages.iter().find(|s| s.id == id).map(|s| &s.config)
    }

    pub fn is_external(&self, id: &str) -> bool {
        self.external.iter().any(|m| m.matches(id))
    }
}
