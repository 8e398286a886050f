//! Module resolution: relative paths, directories and `node_modules` packages
//!
//! Relative specifiers are probed as an exact file, then with each configured
//! extension appended, then as a directory. Bare specifiers walk up the
//! `node_modules` directories from the importer and use the package's
//! `exports` map when it has one, `module`/`main` otherwise.

use crate::core::StageId;
use crate::stages::package_json::{split_specifier, PackageJson};
use crate::stages::{is_path_like, ResolveStep, ResolvedId, Stage, StageError};
use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, trace};

pub struct NodeResolveStage {
    extensions: Vec<String>,
    conditions: Vec<String>,
    packages: Mutex<HashMap<PathBuf, Option<Arc<PackageJson>>>>,
}

impl NodeResolveStage {
    /// `export_conditions` are tried first, then `import`, `module` and
    /// `default` (and `node` on Node platforms)
    pub fn new(extensions: Vec<String>, export_conditions: Vec<String>, node_platform: bool) -> Self {
        let mut conditions = export_conditions;
        let mut base = vec!["import", "module", "default"];
        if node_platform {
            base.insert(0, "node");
        }
        for condition in base {
            if !conditions.iter().any(|c| c == condition) {
                conditions.push(condition.to_string());
            }
        }

        Self {
            extensions,
            conditions,
            packages: Mutex::new(HashMap::new()),
        }
    }

    pub fn conditions(&self) -> &[String] {
        &self.conditions
    }

    fn package(&self, dir: &Path) -> Result<Option<Arc<PackageJson>>, StageError> {
        let path = dir.join("package.json");
        if let Some(cached) = self
            .packages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&path)
        {
            return Ok(cached.clone());
        }

        let package = PackageJson::read(&path)?.map(Arc::new);
        self.packages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(path, package.clone());
        Ok(package)
    }

    /// Exact file, then each extension appended
    fn resolve_file(&self, path: &Path) -> Option<PathBuf> {
        if path.is_file() {
            return Some(path.to_path_buf());
        }
        let name = path.file_name()?.to_str()?;
        self.extensions
            .iter()
            .map(|ext| path.with_file_name(format!("{}{}", name, ext)))
            .find(|candidate| candidate.is_file())
    }

    /// File, or directory (package entry, then `index`)
    fn resolve_path(&self, path: &Path) -> Result<Option<PathBuf>, StageError> {
        if let Some(file) = self.resolve_file(path) {
            return Ok(Some(file));
        }
        if !path.is_dir() {
            return Ok(None);
        }

        if let Some(package) = self.package(path)? {
            for entry in [&package.module, &package.main].into_iter().flatten() {
                if let Some(file) = self.resolve_file(&clean_path(&path.join(entry))) {
                    return Ok(Some(file));
                }
            }
        }
        Ok(self.resolve_file(&path.join("index")))
    }

    fn resolve_package(&self, dir: &Path, subpath: &str) -> Result<Option<PathBuf>, StageError> {
        let package = self.package(dir)?;

        if let Some(exported) = package
            .as_ref()
            .and_then(|p| p.resolve_export(subpath, &self.conditions))
        {
            return Ok(exported
                .map(|target| clean_path(&dir.join(target)))
                .and_then(|file| self.resolve_file(&file)));
        }

        if subpath == "." {
            self.resolve_path(dir)
        } else {
            self.resolve_path(&clean_path(&dir.join(subpath)))
        }
    }

    fn resolve_bare(&self, specifier: &str, from: &Path) -> Result<Option<PathBuf>, StageError> {
        let (name, subpath) = split_specifier(specifier);

        for ancestor in from.ancestors() {
            let package_dir = ancestor.join("node_modules").join(name);
            if package_dir.is_dir() {
                trace!("Found package '{}' at {}", name, package_dir.display());
                return self.resolve_package(&package_dir, &subpath);
            }
        }
        Ok(None)
    }
}

impl Stage for NodeResolveStage {
    fn id(&self) -> StageId {
        StageId::NodeResolve
    }

    fn resolve_id(&self, specifier: &str, importer: Option<&Path>) -> Result<ResolveStep, StageError> {
        if specifier.starts_with('\0') {
            return Ok(ResolveStep::Pass);
        }

        let from = match importer.and_then(Path::parent) {
            Some(dir) => dir.to_path_buf(),
            None => std::env::current_dir()?,
        };

        let resolved = if is_path_like(specifier) {
            self.resolve_path(&clean_path(&from.join(specifier)))?
        } else {
            self.resolve_bare(specifier, &from)?
        };

        match resolved {
            Some(file) => {
                debug!("Resolved '{}' to {}", specifier, file.display());
                Ok(ResolveStep::Resolved(ResolvedId::File(file)))
            }
            None => Err(StageError::unresolved(specifier, importer)),
        }
    }
}

/// Lexically remove `.` components and fold `..` into the parent
pub fn clean_path(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::assembler::RESOLVE_EXTENSIONS;
    use tempfile::TempDir;

    fn stage(conditions: &[&str]) -> NodeResolveStage {
        NodeResolveStage::new(
            RESOLVE_EXTENSIONS.iter().map(|e| e.to_string()).collect(),
            conditions.iter().map(|c| c.to_string()).collect(),
            true,
        )
    }

    fn write(root: &Path, path: &str, content: &str) {
        let full = root.join(path);
        std::fs::create_dir_all(full.parent().unwrap()).unwrap();
        std::fs::write(full, content).unwrap();
    }

    fn resolved(step: ResolveStep) -> PathBuf {
        match step {
            ResolveStep::Resolved(ResolvedId::File(path)) => path,
            other => panic!("expected a file, got {:?}", other),
        }
    }

    #[test]
    fn test_condition_order() {
        assert_eq!(
            stage(&["worker", "import"]).conditions(),
            &["worker", "import", "node", "module", "default"]
        );
    }

    #[test]
    fn test_relative_extension_probing() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        write(root, "src/index.ts", "");
        write(root, "src/util.mjs", "");
        write(root, "src/util.js", "");
        write(root, "src/lib/index.tsx", "");
        write(root, "src/data.json", "{}");

        let stage = stage(&[]);
        let importer = root.join("src/index.ts");
        let resolve = |s: &str| resolved(stage.resolve_id(s, Some(&importer)).unwrap());

        // `.mjs` outranks `.js`
        assert_eq!(resolve("./util"), root.join("src/util.mjs"));
        assert_eq!(resolve("./util.js"), root.join("src/util.js"));
        assert_eq!(resolve("./lib"), root.join("src/lib/index.tsx"));
        assert_eq!(resolve("./data"), root.join("src/data.json"));
        assert_eq!(resolve("../src/./util.js"), root.join("src/util.js"));
    }

    #[test]
    fn test_package_exports_with_conditions() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        write(root, "src/index.ts", "");
        write(
            root,
            "node_modules/pkg/package.json",
            r#"{ "name": "pkg", "exports": { ".": { "worker": "./worker.mjs", "import": "./esm.mjs", "require": "./cjs.js" }, "./sub/*": "./lib/*.mjs" } }"#,
        );
        write(root, "node_modules/pkg/worker.mjs", "");
        write(root, "node_modules/pkg/esm.mjs", "");
        write(root, "node_modules/pkg/lib/a.mjs", "");

        let importer = root.join("src/index.ts");
        assert_eq!(
            resolved(stage(&[]).resolve_id("pkg", Some(&importer)).unwrap()),
            root.join("node_modules/pkg/esm.mjs")
        );
        assert_eq!(
            resolved(stage(&["worker"]).resolve_id("pkg", Some(&importer)).unwrap()),
            root.join("node_modules/pkg/worker.mjs")
        );
        assert_eq!(
            resolved(stage(&[]).resolve_id("pkg/sub/a", Some(&importer)).unwrap()),
            root.join("node_modules/pkg/lib/a.mjs")
        );
        assert!(stage(&[]).resolve_id("pkg/hidden", Some(&importer)).is_err());
    }

    #[test]
    fn test_package_main_and_module_fields() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        write(root, "a/b/index.js", "");
        write(root, "node_modules/@scope/legacy/package.json", r#"{ "main": "lib/main" }"#);
        write(root, "node_modules/@scope/legacy/lib/main.js", "");
        write(root, "node_modules/modern/package.json", r#"{ "main": "cjs.js", "module": "esm.js" }"#);
        write(root, "node_modules/modern/cjs.js", "");
        write(root, "node_modules/modern/esm.js", "");

        let stage = stage(&[]);
        let importer = root.join("a/b/index.js");
        assert_eq!(
            resolved(stage.resolve_id("@scope/legacy", Some(&importer)).unwrap()),
            root.join("node_modules/@scope/legacy/lib/main.js")
        );
        assert_eq!(
            resolved(stage.resolve_id("modern", Some(&importer)).unwrap()),
            root.join("node_modules/modern/esm.js")
        );
    }

    #[test]
    fn test_unresolvable_is_fatal() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "index.js", "");
        let importer = dir.path().join("index.js");

        let err = stage(&[]).resolve_id("./missing", Some(&importer)).unwrap_err();
        assert!(matches!(err, StageError::Unresolved { ref specifier, .. } if specifier == "./missing"));
        assert!(stage(&[]).resolve_id("not-installed-anywhere-xyz", Some(&importer)).is_err());
    }

    #[test]
    fn test_clean_path() {
        assert_eq!(clean_path(Path::new("/a/./b/../c")), PathBuf::from("/a/c"));
        assert_eq!(clean_path(Path::new("a/../../b")), PathBuf::from("../b"));
    }
}
