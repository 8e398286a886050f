//! Core build model
//!
//! This module defines the immutable build inputs, the pipeline descriptor
//! and the assembler that turns the former into the latter.

pub mod assembler;
pub mod config;
pub mod descriptor;
pub mod directives;
pub mod options;
pub mod target;
pub mod tsconfig;

pub use assembler::{assemble, Inclusion, TEMPLATE};
pub use config::{BuildConfig, OneOrMany, OutputConfig};
pub use descriptor::*;
pub use directives::DirectiveStore;
pub use options::*;
pub use target::{Engine, Feature, Target};
pub use tsconfig::{PathPattern, TsconfigResult};
