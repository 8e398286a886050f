//! Reference build execution

pub mod engine;
pub mod plan;
pub mod source;

pub use engine::{
    relative_specifier, BuildEngine, BuildError, BuildEvent, BuildReport, BuildWarning, Bundle, EventHandler,
    OutputFile, RenderedChunk,
};
pub use plan::StagePlan;
pub use source::{DiskSource, MemorySource, SourceProvider};
