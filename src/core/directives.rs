//! Captured interpreter directives
//!
//! The hashbang stripper writes here and the executable patcher reads; no
//! other stage receives a handle.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

/// Interpreter directive lines keyed by module id
#[derive(Debug, Clone, Default)]
pub struct DirectiveStore {
    inner: Arc<Mutex<HashMap<PathBuf, String>>>,
}

impl DirectiveStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the directive removed from `module`
    pub fn record(&self, module: &Path, directive: impl Into<String>) {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(module.to_path_buf(), directive.into());
    }

    pub fn get(&self, module: &Path) -> Option<String> {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(module)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clones_share_entries() {
        let store = DirectiveStore::new();
        let writer = store.clone();
        writer.record(Path::new("/src/cli.ts"), "#!/usr/bin/env node");
        assert_eq!(
            store.get(Path::new("/src/cli.ts")).as_deref(),
            Some("#!/usr/bin/env node")
        );
        assert_eq!(store.get(Path::new("/src/other.ts")), None);
        assert_eq!(store.len(), 1);
    }
}
