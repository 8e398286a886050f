//! Where module code comes from

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Loads module source text for the engine
#[async_trait]
pub trait SourceProvider: Send + Sync {
    async fn read(&self, path: &Path) -> std::io::Result<String>;
}

/// Reads modules from the filesystem
#[derive(Debug, Clone, Copy, Default)]
pub struct DiskSource;

#[async_trait]
impl SourceProvider for DiskSource {
    async fn read(&self, path: &Path) -> std::io::Result<String> {
        tokio::fs::read_to_string(path).await
    }
}

/// In-memory overlay over the filesystem
///
/// Registered paths are served from memory; anything else is read from disk.
/// Resolution still consults the filesystem, so overlaid files must exist.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    files: HashMap<PathBuf, String>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(mut self, path: impl Into<PathBuf>, code: impl Into<String>) -> Self {
        self.insert(path, code);
        self
    }

    pub fn insert(&mut self, path: impl Into<PathBuf>, code: impl Into<String>) {
        self.files.insert(path.into(), code.into());
    }
}

#[async_trait]
impl SourceProvider for MemorySource {
    async fn read(&self, path: &Path) -> std::io::Result<String> {
        match self.files.get(path) {
            Some(code) => Ok(code.clone()),
            None => DiskSource.read(path).await,
        }
    }
}
