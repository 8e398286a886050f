//! package.json reading and `exports` map resolution

use serde::Deserialize;
use serde_json::Value;
use std::path::Path;

/// The package.json fields entry resolution looks at
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PackageJson {
    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub main: Option<String>,

    #[serde(default)]
    pub module: Option<String>,

    #[serde(default)]
    pub exports: Option<Value>,
}

impl PackageJson {
    /// Read and parse `path`; a missing file is `Ok(None)`
    pub fn read(path: &Path) -> std::io::Result<Option<Self>> {
        match std::fs::read_to_string(path) {
            Ok(content) => serde_json::from_str(&content)
                .map(Some)
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Resolve `subpath` (`.` or `./x`) through the `exports` map
    ///
    /// `None` when there is no `exports` field. `Some(None)` when there is
    /// one but it does not expose `subpath` under `conditions`.
    pub fn resolve_export(&self, subpath: &str, conditions: &[String]) -> Option<Option<String>> {
        let exports = self.exports.as_ref()?;
        Some(resolve_exports(exports, subpath, conditions))
    }
}

/// Split `pkg/sub/path` or `@scope/pkg/sub` into name and `./sub/path`
pub fn split_specifier(specifier: &str) -> (&str, String) {
    let name_segments = if specifier.starts_with('@') { 2 } else { 1 };
    let mut slashes = specifier.match_indices('/').map(|(i, _)| i);
    match slashes.nth(name_segments - 1) {
        Some(split) => (&specifier[..split], format!(".{}", &specifier[split..])),
        None => (specifier, ".".to_string()),
    }
}

fn is_subpath_map(exports: &Value) -> bool {
    exports
        .as_object()
        .and_then(|map| map.keys().next())
        .is_some_and(|key| key.starts_with('.'))
}

fn resolve_exports(exports: &Value, subpath: &str, conditions: &[String]) -> Option<String> {
    if !is_subpath_map(exports) {
        return if subpath == "." {
            resolve_target(exports, "", conditions)
        } else {
            None
        };
    }

    let map = exports.as_object()?;

    if let Some(target) = map.get(subpath) {
        if !subpath.contains('*') {
            return resolve_target(target, "", conditions);
        }
    }

    // Longest matching key with a single `*`, or a legacy folder key
    let mut best: Option<(&str, &Value, &str)> = None;
    for (key, target) in map {
        let captured = if let Some((prefix, suffix)) = key.split_once('*') {
            subpath
                .strip_prefix(prefix)
                .and_then(|rest| rest.strip_suffix(suffix))
                .filter(|_| subpath.len() >= key.len() - 1)
        } else if key.ends_with('/') {
            subpath.strip_prefix(key.as_str())
        } else {
            None
        };

        if let Some(captured) = captured {
            if best.map_or(true, |(k, _, _)| key.len() > k.len()) {
                best = Some((key.as_str(), target, captured));
            }
        }
    }

    let (key, target, captured) = best?;
    if key.ends_with('/') {
        resolve_target(target, "", conditions).map(|t| format!("{}{}", t, captured))
    } else {
        resolve_target(target, captured, conditions)
    }
}

fn resolve_target(target: &Value, captured: &str, conditions: &[String]) -> Option<String> {
    match target {
        Value::String(path) => Some(path.replace('*', captured)),
        Value::Array(options) => options
            .iter()
            .find_map(|option| resolve_target(option, captured, conditions)),
        Value::Object(map) => map.iter().find_map(|(condition, nested)| {
            if conditions.iter().any(|c| c == condition) {
                resolve_target(nested, captured, conditions)
            } else {
                None
            }
        }),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn conditions(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    fn package(exports: Value) -> PackageJson {
        PackageJson {
            exports: Some(exports),
            ..Default::default()
        }
    }

    #[test]
    fn test_split_specifier() {
        assert_eq!(split_specifier("lodash"), ("lodash", ".".to_string()));
        assert_eq!(split_specifier("lodash/fp/map"), ("lodash", "./fp/map".to_string()));
        assert_eq!(split_specifier("@scope/pkg"), ("@scope/pkg", ".".to_string()));
        assert_eq!(split_specifier("@scope/pkg/sub"), ("@scope/pkg", "./sub".to_string()));
    }

    #[test]
    fn test_string_and_condition_exports() {
        let conds = conditions(&["import", "default"]);
        assert_eq!(
            package(json!("./index.mjs")).resolve_export(".", &conds),
            Some(Some("./index.mjs".to_string()))
        );
        assert_eq!(
            package(json!({ "require": "./index.cjs", "import": "./index.mjs" }))
                .resolve_export(".", &conds),
            Some(Some("./index.mjs".to_string()))
        );
    }

    #[test]
    fn test_condition_order_follows_package() {
        let pkg = package(json!({ ".": { "node": "./node.mjs", "default": "./browser.mjs" } }));
        assert_eq!(
            pkg.resolve_export(".", &conditions(&["default", "node"])),
            Some(Some("./node.mjs".to_string()))
        );
        assert_eq!(
            pkg.resolve_export(".", &conditions(&["default"])),
            Some(Some("./browser.mjs".to_string()))
        );
    }

    #[test]
    fn test_subpath_patterns() {
        let pkg = package(json!({
            ".": "./index.js",
            "./features/*": { "import": "./dist/features/*.mjs" },
            "./features/internal/*": null,
            "./legacy/": "./lib/legacy/"
        }));
        let conds = conditions(&["import", "default"]);
        assert_eq!(
            pkg.resolve_export("./features/a", &conds),
            Some(Some("./dist/features/a.mjs".to_string()))
        );
        assert_eq!(pkg.resolve_export("./features/internal/x", &conds), Some(None));
        assert_eq!(
            pkg.resolve_export("./legacy/x.js", &conds),
            Some(Some("./lib/legacy/x.js".to_string()))
        );
        assert_eq!(pkg.resolve_export("./missing", &conds), Some(None));
    }

    #[test]
    fn test_no_exports_field() {
        assert_eq!(PackageJson::default().resolve_export(".", &[]), None);
    }
}
