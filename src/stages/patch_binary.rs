//! Executable outputs
//!
//! Entry chunks written to one of the configured executable paths get their
//! interpreter directive back and, once written, the executable bit.

use crate::core::{DirectiveStore, ExecutablePaths, StageId};
use crate::stages::{ChunkInfo, Stage, StageError, WrittenChunk};
use tracing::{debug, info};

const DEFAULT_DIRECTIVE: &str = "#!/usr/bin/env node";

pub struct PatchBinaryStage {
    executables: ExecutablePaths,
    store: DirectiveStore,
}

impl PatchBinaryStage {
    pub fn new(executables: ExecutablePaths, store: DirectiveStore) -> Self {
        Self { executables, store }
    }

    fn is_executable(&self, is_entry: bool, file: &std::path::Path) -> bool {
        is_entry && self.executables.contains(file)
    }
}

impl Stage for PatchBinaryStage {
    fn id(&self) -> StageId {
        StageId::PatchBinary
    }

    fn render_chunk(&self, code: &str, chunk: &ChunkInfo) -> Result<Option<String>, StageError> {
        if !self.is_executable(chunk.is_entry, &chunk.file) || code.starts_with("#!") {
            return Ok(None);
        }
        let directive = self
            .store
            .get(&chunk.module)
            .unwrap_or_else(|| DEFAULT_DIRECTIVE.to_string());
        debug!("Prepending '{}' to {}", directive, chunk.file.display());
        Ok(Some(format!("{}\n{}", directive, code)))
    }

    fn write_bundle(&self, written: &[WrittenChunk]) -> Result<(), StageError> {
        for chunk in written {
            if !self.is_executable(chunk.is_entry, &chunk.file) {
                continue;
            }
            make_executable(&chunk.file)?;
            info!("Marked {} executable", chunk.file.display());
        }
        Ok(())
    }
}

#[cfg(unix)]
fn make_executable(path: &std::path::Path) -> Result<(), StageError> {
    use std::os::unix::fs::PermissionsExt;
    let mut permissions = std::fs::metadata(path)?.permissions();
    permissions.set_mode(0o755);
    std::fs::set_permissions(path, permissions)?;
    Ok(())
}

#[cfg(not(unix))]
fn make_executable(_path: &std::path::Path) -> Result<(), StageError> {
    Ok(())
}
