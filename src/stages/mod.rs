//! Pipeline stages
//!
//! Each stage implements the hooks it needs from [`Stage`]; the rest default
//! to no-ops. Stages hold only the configuration they were built with and
//! are shared across modules.

pub mod alias;
pub mod builtins;
pub mod commonjs;
pub mod create_require;
pub mod dynamic_import;
pub mod env_replace;
pub mod hashbang;
pub mod json;
pub mod minify;
pub mod node_resolve;
pub mod package_json;
pub mod patch_binary;
pub mod transform;
pub mod ts_extensions;
pub mod tsconfig_paths;

use crate::core::StageId;
use crate::syntax::{line_col, LexError};
use std::path::{Path, PathBuf};
use thiserror::Error;

pub use alias::AliasStage;
pub use builtins::ExternalizeBuiltinsStage;
pub use commonjs::CommonJsStage;
pub use create_require::CreateRequireStage;
pub use dynamic_import::DynamicImportVarsStage;
pub use env_replace::EnvReplaceStage;
pub use hashbang::StripHashbangStage;
pub use json::JsonStage;
pub use minify::MinifyStage;
pub use node_resolve::NodeResolveStage;
pub use patch_binary::PatchBinaryStage;
pub use transform::SyntaxTransformStage;
pub use ts_extensions::TypescriptExtensionsStage;
pub use tsconfig_paths::TsconfigPathsStage;

/// Fatal stage failures
#[derive(Debug, Error)]
pub enum StageError {
    #[error("Could not resolve '{specifier}'{}", .importer.as_ref().map(|p| format!(" from {}", p.display())).unwrap_or_default())]
    Unresolved {
        specifier: String,
        importer: Option<PathBuf>,
    },

    #[error("Malformed data in {}: {source}", .path.display())]
    DataParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Syntax error at {line}:{column}: {message}")]
    Syntax {
        line: usize,
        column: usize,
        message: String,
    },

    #[error("Unsupported syntax at {line}:{column}: {message}")]
    UnsupportedSyntax {
        line: usize,
        column: usize,
        message: String,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl StageError {
    pub fn syntax(src: &str, offset: usize, message: impl Into<String>) -> Self {
        let (line, column) = line_col(src, offset);
        StageError::Syntax {
            line,
            column,
            message: message.into(),
        }
    }

    pub fn unsupported(src: &str, offset: usize, message: impl Into<String>) -> Self {
        let (line, column) = line_col(src, offset);
        StageError::UnsupportedSyntax {
            line,
            column,
            message: message.into(),
        }
    }

    pub fn from_lex(src: &str, err: LexError) -> Self {
        Self::syntax(src, err.offset, err.message)
    }

    pub fn unresolved(specifier: &str, importer: Option<&Path>) -> Self {
        StageError::Unresolved {
            specifier: specifier.to_string(),
            importer: importer.map(Path::to_path_buf),
        }
    }
}

/// A resolved module id
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedId {
    /// A file to load and transform
    File(PathBuf),
    /// Left as a runtime import with this specifier
    External(String),
}

/// Outcome of a resolve hook
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolveStep {
    /// Not handled; the next stage sees the same specifier
    Pass,
    /// Continue with a different specifier
    Rewrite(String),
    /// Try each specifier with the remaining stages, first success wins;
    /// if none resolves, continue with the original
    Candidates(Vec<String>),
    Resolved(ResolvedId),
}

/// Per-module state handed to transform hooks
#[derive(Debug, Clone)]
pub struct TransformContext {
    /// Module id (absolute path)
    pub id: PathBuf,
    pub warnings: Vec<String>,
}

impl TransformContext {
    pub fn new(id: impl Into<PathBuf>) -> Self {
        Self {
            id: id.into(),
            warnings: Vec::new(),
        }
    }

    /// Record a non-fatal problem
    pub fn warn(&mut self, message: impl Into<String>) {
        let message = message.into();
        tracing::warn!("{}: {}", self.id.display(), message);
        self.warnings.push(message);
    }

    pub fn extension(&self) -> &str {
        extension(&self.id)
    }
}

/// An output file about to be written
#[derive(Debug, Clone)]
pub struct ChunkInfo {
    /// Source module
    pub module: PathBuf,
    /// Output path
    pub file: PathBuf,
    pub is_entry: bool,
}

/// An output file after writing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrittenChunk {
    pub module: PathBuf,
    pub file: PathBuf,
    pub is_entry: bool,
}

/// A pipeline stage
pub trait Stage: Send + Sync {
    fn id(&self) -> StageId;

    fn name(&self) -> &'static str {
        self.id().name()
    }

    /// Resolve `specifier` imported by `importer` (`None` for entries)
    fn resolve_id(&self, _specifier: &str, _importer: Option<&Path>) -> Result<ResolveStep, StageError> {
        Ok(ResolveStep::Pass)
    }

    /// Rewrite module code; `None` leaves it unchanged
    fn transform(&self, _code: &str, _ctx: &mut TransformContext) -> Result<Option<String>, StageError> {
        Ok(None)
    }

    /// Rewrite an output file's code before it is written
    fn render_chunk(&self, _code: &str, _chunk: &ChunkInfo) -> Result<Option<String>, StageError> {
        Ok(None)
    }

    /// Act on written files
    fn write_bundle(&self, _written: &[WrittenChunk]) -> Result<(), StageError> {
        Ok(())
    }
}

/// File extension including the dot, or `""`
pub fn extension(path: &Path) -> &str {
    path.file_name()
        .and_then(|n| n.to_str())
        .and_then(|n| n.rfind('.').filter(|i| *i > 0).map(|i| &n[i..]))
        .unwrap_or("")
}

pub fn is_typescript(path: &Path) -> bool {
    matches!(extension(path), ".ts" | ".tsx" | ".mts" | ".cts")
}

/// Relative (`./`, `../`) or absolute specifier
pub fn is_path_like(specifier: &str) -> bool {
    specifier.starts_with("./")
        || specifier.starts_with("../")
        || specifier == "."
        || specifier == ".."
        || Path::new(specifier).is_absolute()
}
