//! Externalizes Node.js built-in modules

use crate::core::StageId;
use crate::stages::{ResolveStep, ResolvedId, Stage, StageError};
use std::path::Path;
use tracing::trace;

/// Built-in modules importable without the `node:` prefix
pub const NODE_BUILTINS: &[&str] = &[
    "assert",
    "assert/strict",
    "async_hooks",
    "buffer",
    "child_process",
    "cluster",
    "console",
    "constants",
    "crypto",
    "dgram",
    "diagnostics_channel",
    "dns",
    "dns/promises",
    "domain",
    "events",
    "fs",
    "fs/promises",
    "http",
    "http2",
    "https",
    "inspector",
    "inspector/promises",
    "module",
    "net",
    "os",
    "path",
    "path/posix",
    "path/win32",
    "perf_hooks",
    "process",
    "punycode",
    "querystring",
    "readline",
    "readline/promises",
    "repl",
    "stream",
    "stream/consumers",
    "stream/promises",
    "stream/web",
    "string_decoder",
    "sys",
    "timers",
    "timers/promises",
    "tls",
    "trace_events",
    "tty",
    "url",
    "util",
    "util/types",
    "v8",
    "vm",
    "wasi",
    "worker_threads",
    "zlib",
];

pub fn is_builtin(name: &str) -> bool {
    NODE_BUILTINS.contains(&name)
}

/// Marks built-in specifiers external on Node-platform builds
#[derive(Debug, Clone)]
pub struct ExternalizeBuiltinsStage {
    node_platform: bool,
    keep_node_prefix: bool,
}

impl ExternalizeBuiltinsStage {
    pub fn new(node_platform: bool, keep_node_prefix: bool) -> Self {
        Self {
            node_platform,
            keep_node_prefix,
        }
    }
}

impl Stage for ExternalizeBuiltinsStage {
    fn id(&self) -> StageId {
        StageId::ExternalizeBuiltins
    }

    fn resolve_id(&self, specifier: &str, _importer: Option<&Path>) -> Result<ResolveStep, StageError> {
        if !self.node_platform {
            return Ok(ResolveStep::Pass);
        }

        let stripped = specifier.strip_prefix("node:");
        let bare = stripped.unwrap_or(specifier);
        if stripped.is_none() && !is_builtin(bare) {
            return Ok(ResolveStep::Pass);
        }

        // Prefix-only modules (`node:test`) keep the prefix regardless
        let external = if stripped.is_some() && (self.keep_node_prefix || !is_builtin(bare)) {
            specifier.to_string()
        } else {
            bare.to_string()
        };

        trace!("Externalizing built-in '{}' as '{}'", specifier, external);
        Ok(ResolveStep::Resolved(ResolvedId::External(external)))
    }
}
