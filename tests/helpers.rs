//! Test utility functions for bundle-pipeline

#![allow(dead_code)]

use bundle_pipeline::core::{BuildConfig, PipelineDescriptor, StageId};
use bundle_pipeline::execution::{BuildEngine, BuildError, BuildReport, Bundle, DiskSource};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// A project directory with a build file and sources
pub struct Fixture {
    dir: TempDir,
}

impl Fixture {
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().expect("create temp dir"),
        }
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn path(&self, relative: &str) -> PathBuf {
        self.dir.path().join(relative)
    }

    /// Write a file, creating parent directories
    pub fn write(&self, relative: &str, content: &str) -> &Self {
        let path = self.path(relative);
        std::fs::create_dir_all(path.parent().expect("file has a parent")).expect("create dirs");
        std::fs::write(&path, content).expect("write fixture file");
        self
    }

    /// Write `bundle.yaml` and load it the way the CLI does
    pub fn config(&self, yaml: &str) -> BuildConfig {
        self.write("bundle.yaml", yaml);
        BuildConfig::from_file(self.path("bundle.yaml")).expect("load build config")
    }

    pub fn descriptor(&self, yaml: &str) -> PipelineDescriptor {
        let config = self.config(yaml);
        let tsconfig = config.load_tsconfig().expect("load tsconfig");
        config.descriptor(tsconfig.as_ref()).expect("assemble descriptor")
    }

    pub async fn render(&self, yaml: &str) -> Result<Bundle, BuildError> {
        BuildEngine::new(self.descriptor(yaml), DiskSource).render().await
    }

    pub async fn build(&self, yaml: &str) -> Result<BuildReport, BuildError> {
        BuildEngine::new(self.descriptor(yaml), DiskSource).build().await
    }

    pub fn read(&self, relative: &str) -> String {
        std::fs::read_to_string(self.path(relative))
            .unwrap_or_else(|e| panic!("read {}: {}", relative, e))
    }
}

/// Assert `ids` appear in `descriptor` at strictly increasing positions
pub fn assert_ordered(descriptor: &PipelineDescriptor, ids: &[StageId]) {
    let positions: Vec<usize> = ids
        .iter()
        .map(|id| {
            descriptor
                .index_of(*id)
                .unwrap_or_else(|| panic!("stage {} missing", id))
        })
        .collect();
    assert!(
        positions.windows(2).all(|w| w[0] < w[1]),
        "stages out of order: {:?} at {:?}",
        ids,
        positions
    );
}
