//! Build configuration from YAML

use crate::core::assembler::assemble;
use crate::core::descriptor::{ExternalMatcher, OutputSpec, PipelineDescriptor};
use crate::core::options::{AliasMap, BuildOptions, EnvMap, ExecutablePaths};
use crate::core::target::{Engine, Target};
use crate::core::tsconfig::TsconfigResult;
use crate::syntax::is_valid_identifier;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// One value or a list of them
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany<T> {
    One(T),
    Many(Vec<T>),
}

impl<T: Clone> OneOrMany<T> {
    pub fn to_vec(&self) -> Vec<T> {
        match self {
            OneOrMany::One(value) => vec![value.clone()],
            OneOrMany::Many(values) => values.clone(),
        }
    }
}

fn default_target() -> OneOrMany<Target> {
    OneOrMany::One(Target::new(Engine::Node, (20, 0, 0)))
}

/// Output location as written in YAML
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Output directory (default `dist`)
    #[serde(default)]
    pub dir: Option<PathBuf>,

    /// Source root output names are computed from (default: directory of
    /// the first input)
    #[serde(default)]
    pub root: Option<PathBuf>,
}

/// Top-level build configuration loaded from YAML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildConfig {
    /// Target runtime identifier(s), e.g. `node18` or `[node16, es2020]`
    #[serde(default = "default_target")]
    pub target: OneOrMany<Target>,

    /// Extra export conditions tried before `import`/`module`/`default`
    #[serde(default)]
    pub export_conditions: Vec<String>,

    #[serde(default)]
    pub minify: bool,

    /// Identifiers replaced with JSON-encoded literals
    #[serde(default)]
    pub env: BTreeMap<String, String>,

    /// Exact specifier rewrites
    #[serde(default)]
    pub aliases: BTreeMap<String, String>,

    /// Output files that receive an interpreter directive and mode 0755
    #[serde(default)]
    pub executables: Vec<PathBuf>,

    /// Compiler configuration file; discovered from the source root if unset
    #[serde(default)]
    pub tsconfig: Option<PathBuf>,

    /// Entry modules
    #[serde(default)]
    pub input: Vec<PathBuf>,

    #[serde(default)]
    pub output: OutputConfig,

    /// External module names, or `/regex/` patterns
    #[serde(default)]
    pub external: Vec<String>,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            target: default_target(),
            export_conditions: Vec::new(),
            minify: false,
            env: BTreeMap::new(),
            aliases: BTreeMap::new(),
            executables: Vec::new(),
            tsconfig: None,
            input: Vec::new(),
            output: OutputConfig::default(),
            external: Vec::new(),
        }
    }
}

impl BuildConfig {
    /// Load build configuration from a YAML file
    ///
    /// Relative paths in the file are resolved against its directory.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read build config {}", path.display()))?;
        let mut config: BuildConfig = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse build config {}", path.display()))?;

        if let Some(base) = path.parent() {
            config.rebase(base);
        }
        config.validate()?;
        Ok(config)
    }

    /// Parse build configuration from a YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: BuildConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Resolve relative input, output, executable and tsconfig paths
    /// against `base`
    ///
    /// The output directory is pinned to `base/dist` when unset so that
    /// executables and output files agree on where `dist` is.
    pub fn rebase(&mut self, base: &Path) {
        let join = |p: &PathBuf| if p.is_relative() { base.join(p) } else { p.clone() };

        self.input = self.input.iter().map(join).collect();
        self.executables = self.executables.iter().map(join).collect();
        self.tsconfig = self.tsconfig.as_ref().map(join);
        let dir = self.output.dir.clone().unwrap_or_else(|| PathBuf::from("dist"));
        self.output.dir = Some(join(&dir));
        self.output.root = self.output.root.as_ref().map(join);
    }

    /// Validate the build configuration
    pub fn validate(&self) -> Result<()> {
        if self.target.to_vec().is_empty() {
            anyhow::bail!("At least one target is required");
        }

        for key in self.env.keys() {
            if !key.split('.').all(is_valid_identifier) {
                anyhow::bail!("Environment key '{}' is not a (dotted) identifier", key);
            }
        }

        for key in self.aliases.keys() {
            if key.is_empty() {
                anyhow::bail!("Alias keys must not be empty");
            }
        }

        for raw in &self.external {
            ExternalMatcher::parse(raw)
                .with_context(|| format!("Invalid external pattern '{}'", raw))?;
        }

        for executable in &self.executables {
            if executable.extension().map_or(true, |ext| ext != "mjs") {
                anyhow::bail!(
                    "Executable '{}' is not an output file (expected .mjs)",
                    executable.display()
                );
            }
        }

        Ok(())
    }

    /// Check that every input exists on disk
    pub fn validate_inputs(&self) -> Result<()> {
        if self.input.is_empty() {
            anyhow::bail!("No input modules configured");
        }
        for input in &self.input {
            if !input.is_file() {
                anyhow::bail!("Input module doesn't exist: {}", input.display());
            }
        }
        Ok(())
    }

    pub fn build_options(&self) -> BuildOptions {
        BuildOptions::new(self.target.to_vec())
            .with_export_conditions(self.export_conditions.iter().cloned())
            .with_minify(self.minify)
    }

    pub fn env_map(&self) -> EnvMap {
        self.env.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
    }

    pub fn alias_map(&self) -> AliasMap {
        self.aliases.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
    }

    pub fn executable_paths(&self) -> ExecutablePaths {
        self.executables.iter().collect()
    }

    pub fn external_matchers(&self) -> Result<Vec<ExternalMatcher>> {
        self.external
            .iter()
            .map(|raw| {
                ExternalMatcher::parse(raw)
                    .with_context(|| format!("Invalid external pattern '{}'", raw))
            })
            .collect()
    }

    /// Source root: configured, else the directory of the first input
    pub fn source_root(&self) -> Option<PathBuf> {
        self.output.root.clone().or_else(|| {
            self.input
                .first()
                .and_then(|i| i.parent())
                .map(Path::to_path_buf)
        })
    }

    /// Load the configured compiler config, or discover one near the source
    /// root; `None` when there is none
    pub fn load_tsconfig(&self) -> Result<Option<TsconfigResult>> {
        match &self.tsconfig {
            Some(path) => TsconfigResult::load(path).map(Some),
            None => match self.source_root() {
                Some(root) => TsconfigResult::discover(root),
                None => Ok(None),
            },
        }
    }

    /// Fill the caller-owned descriptor fields
    pub fn apply_to(&self, descriptor: &mut PipelineDescriptor) -> Result<()> {
        descriptor.input = self.input.clone();
        descriptor.output = OutputSpec {
            dir: self.output.dir.clone(),
            root: self.source_root(),
        };
        descriptor.external = self.external_matchers()?;
        Ok(())
    }

    /// Assemble the pipeline and fill in input, output and externals
    pub fn descriptor(&self, tsconfig: Option<&TsconfigResult>) -> Result<PipelineDescriptor> {
        let mut descriptor = assemble(
            &self.build_options(),
            &self.alias_map(),
            &self.env_map(),
            &self.executable_paths(),
            tsconfig,
        );
        self.apply_to(&mut descriptor)?;
        Ok(descriptor)
    }
}
