//! Immutable build inputs handed to the assembler

use crate::core::target::{Engine, Feature, Target};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Component, Path, PathBuf};

/// Target runtimes, export conditions and the minify flag for one build
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildOptions {
    pub target: Vec<Target>,

    #[serde(default)]
    pub export_conditions: Vec<String>,

    #[serde(default)]
    pub minify: bool,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            target: vec![Target::new(Engine::Node, (20, 0, 0))],
            export_conditions: Vec::new(),
            minify: false,
        }
    }
}

impl BuildOptions {
    pub fn new(target: Vec<Target>) -> Self {
        Self {
            target,
            ..Self::default()
        }
    }

    pub fn with_export_conditions<I, S>(mut self, conditions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.export_conditions = conditions.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_minify(mut self, minify: bool) -> Self {
        self.minify = minify;
        self
    }

    /// Built-ins are externalized when a Node target is present, or when no
    /// target names a platform at all
    pub fn targets_node_platform(&self) -> bool {
        self.target.iter().any(Target::is_node)
            || self.target.iter().all(|t| t.engine == Engine::Es)
    }

    /// Whether every Node target accepts `node:`-prefixed specifiers
    pub fn supports_node_prefix(&self) -> bool {
        self.target
            .iter()
            .filter(|t| t.is_node())
            .all(Target::supports_node_prefix)
    }

    /// Whether every target supports `feature`
    pub fn supports(&self, feature: Feature) -> bool {
        self.target.iter().all(|t| t.supports(feature))
    }

    /// First target lacking `feature`, for error messages
    pub fn first_unsupported(&self, feature: Feature) -> Option<&Target> {
        self.target.iter().find(|t| !t.supports(feature))
    }
}

/// Environment identifiers to substitute, name to raw value
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EnvMap(BTreeMap<String, String>);

impl EnvMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for EnvMap {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

/// Exact specifier rewrites
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AliasMap(BTreeMap<String, String>);

impl AliasMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, from: impl Into<String>, to: impl Into<String>) {
        self.0.insert(from.into(), to.into());
    }

    pub fn get(&self, specifier: &str) -> Option<&str> {
        self.0.get(specifier).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for AliasMap {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

/// Output files that get an interpreter directive and the executable bit
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExecutablePaths(BTreeSet<PathBuf>);

impl ExecutablePaths {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, path: impl AsRef<Path>) {
        self.0.insert(normalize(path.as_ref()));
    }

    pub fn contains(&self, path: impl AsRef<Path>) -> bool {
        self.0.contains(&normalize(path.as_ref()))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Path> {
        self.0.iter().map(PathBuf::as_path)
    }
}

impl<P: AsRef<Path>> FromIterator<P> for ExecutablePaths {
    fn from_iter<T: IntoIterator<Item = P>>(iter: T) -> Self {
        let mut paths = Self::new();
        for path in iter {
            paths.insert(path);
        }
        paths
    }
}

/// Drop `.` components so `./dist/cli.mjs` and `dist/cli.mjs` compare equal
pub fn normalize(path: &Path) -> PathBuf {
    path.components()
        .filter(|c| !matches!(c, Component::CurDir))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_executable_paths_normalized() {
        let paths: ExecutablePaths = ["./dist/cli.mjs"].into_iter().collect();
        assert!(paths.contains("dist/cli.mjs"));
        assert!(paths.contains("./dist/./cli.mjs"));
        assert!(!paths.contains("dist/index.mjs"));
    }

    #[test]
    fn test_node_platform_detection() {
        let node = BuildOptions::new(vec!["node18".parse().unwrap()]);
        let es_only = BuildOptions::new(vec!["es2020".parse().unwrap()]);
        let browser = BuildOptions::new(vec!["chrome100".parse().unwrap()]);
        assert!(node.targets_node_platform());
        assert!(es_only.targets_node_platform());
        assert!(!browser.targets_node_platform());
    }

    #[test]
    fn test_node_prefix_requires_every_node_target() {
        let mixed = BuildOptions::new(vec!["node12".parse().unwrap(), "node18".parse().unwrap()]);
        let modern = BuildOptions::new(vec!["node16".parse().unwrap(), "es2020".parse().unwrap()]);
        assert!(!mixed.supports_node_prefix());
        assert!(modern.supports_node_prefix());
    }

    #[test]
    fn test_env_map_from_pairs() {
        let env: EnvMap = [("process.env.NODE_ENV", "production")].into_iter().collect();
        assert_eq!(env.get("process.env.NODE_ENV"), Some("production"));
        assert_eq!(env.len(), 1);
        assert!(EnvMap::new().is_empty());
    }
}
