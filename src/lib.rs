//! bundle-pipeline - assembles the resolve/transform/output pipeline that
//! packages JavaScript and TypeScript libraries as ES modules

pub mod cli;
pub mod core;
pub mod execution;
pub mod stages;
pub mod syntax;

// Re-export commonly used types
pub use core::{assemble, BuildConfig, BuildOptions, PipelineDescriptor, StageConfig, StageId, Target};
pub use execution::{BuildEngine, BuildError, BuildEvent, BuildReport, DiskSource, MemorySource};
pub use stages::{Stage, StageError};
