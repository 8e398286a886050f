//! Project compiler configuration (`tsconfig.json`) loading
//!
//! Only the parts the pipeline consumes are interpreted: `compilerOptions`
//! (kept raw for the syntax transformer), `baseUrl` and `paths`. Relative
//! `extends` chains are followed; package-name `extends` are not.

use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use tracing::debug;

const MAX_EXTENDS_DEPTH: usize = 16;

/// One `paths` entry: a pattern with at most one `*` and its substitutions
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PathPattern {
    pub pattern: String,
    pub targets: Vec<String>,
}

/// A loaded compiler configuration
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TsconfigResult {
    /// File the configuration was loaded from
    pub path: PathBuf,

    /// Merged raw `compilerOptions`
    pub compiler_options: Value,

    /// `baseUrl`, resolved against the file that declared it
    pub base_url: Option<PathBuf>,

    pub paths: Vec<PathPattern>,

    /// Directory of the file that declared `paths`
    #[serde(skip)]
    paths_dir: PathBuf,
}

#[derive(Default)]
struct Layer {
    compiler_options: Map<String, Value>,
    base_url: Option<PathBuf>,
    paths: Option<(Vec<PathPattern>, PathBuf)>,
}

impl TsconfigResult {
    /// Load a configuration file, following relative `extends`
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let layer = read_layer(path, 0)?;
        let config_dir = parent_dir(path);

        let (paths, paths_dir) = layer.paths.unwrap_or_else(|| (Vec::new(), config_dir));

        debug!(
            "Loaded compiler config {} ({} path patterns)",
            path.display(),
            paths.len()
        );

        Ok(Self {
            path: path.to_path_buf(),
            compiler_options: Value::Object(layer.compiler_options),
            base_url: layer.base_url,
            paths,
            paths_dir,
        })
    }

    /// Look for `tsconfig.json` in `dir` and its ancestors
    pub fn discover<P: AsRef<Path>>(dir: P) -> Result<Option<Self>> {
        for ancestor in dir.as_ref().ancestors() {
            let candidate = ancestor.join("tsconfig.json");
            if candidate.is_file() {
                return Self::load(candidate).map(Some);
            }
        }
        Ok(None)
    }

    /// Build a configuration from already-parsed parts, without touching disk
    pub fn from_parts(path: PathBuf, compiler_options: Value) -> Self {
        let dir = parent_dir(&path);
        let base_url = compiler_options
            .get("baseUrl")
            .and_then(Value::as_str)
            .map(|b| dir.join(b));
        let paths = compiler_options
            .get("paths")
            .map(parse_paths)
            .unwrap_or_default();

        Self {
            path,
            compiler_options,
            base_url,
            paths,
            paths_dir: dir,
        }
    }

    /// Directory `paths` substitutions are relative to
    pub fn paths_base(&self) -> &Path {
        self.base_url.as_deref().unwrap_or(&self.paths_dir)
    }

    pub fn option_str(&self, key: &str) -> Option<&str> {
        self.compiler_options.get(key).and_then(Value::as_str)
    }

    pub fn option_bool(&self, key: &str) -> bool {
        self.compiler_options
            .get(key)
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }
}

fn parent_dir(path: &Path) -> PathBuf {
    path.parent().map(Path::to_path_buf).unwrap_or_default()
}

fn read_layer(path: &Path, depth: usize) -> Result<Layer> {
    if depth > MAX_EXTENDS_DEPTH {
        anyhow::bail!("Compiler config extends chain is too deep at {}", path.display());
    }

    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read compiler config {}", path.display()))?;
    let json: Value = serde_json::from_str(&strip_json_comments(&raw))
        .with_context(|| format!("Failed to parse compiler config {}", path.display()))?;

    let dir = parent_dir(path);

    let mut layer = match json.get("extends").and_then(Value::as_str) {
        Some(parent) if parent.starts_with('.') => {
            let mut parent_path = dir.join(parent);
            if parent_path.extension().is_none() {
                parent_path.set_extension("json");
            }
            read_layer(&parent_path, depth + 1)?
        }
        Some(parent) => {
            debug!("Ignoring non-relative extends '{}' in {}", parent, path.display());
            Layer::default()
        }
        None => Layer::default(),
    };

    if let Some(Value::Object(options)) = json.get("compilerOptions") {
        if let Some(base) = options.get("baseUrl").and_then(Value::as_str) {
            layer.base_url = Some(dir.join(base));
        }
        if let Some(paths) = options.get("paths") {
            layer.paths = Some((parse_paths(paths), dir.clone()));
        }
        for (key, value) in options {
            layer.compiler_options.insert(key.clone(), value.clone());
        }
    }

    Ok(layer)
}

fn parse_paths(value: &Value) -> Vec<PathPattern> {
    let Some(map) = value.as_object() else {
        return Vec::new();
    };
    map.iter()
        .map(|(pattern, targets)| PathPattern {
            pattern: pattern.clone(),
            targets: targets
                .as_array()
                .map(|list| {
                    list.iter()
                        .filter_map(Value::as_str)
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default(),
        })
        .collect()
}

/// Remove `//` and `/* */` comments and trailing commas outside strings
pub fn strip_json_comments(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();
    let mut in_string = false;

    while let Some(ch) = chars.next() {
        if in_string {
            out.push(ch);
            match ch {
                '\\' => {
                    if let Some(escaped) = chars.next() {
                        out.push(escaped);
                    }
                }
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }

        match ch {
            '"' => {
                in_string = true;
                out.push(ch);
            }
            '/' if chars.peek() == Some(&'/') => {
                while let Some(&next) = chars.peek() {
                    if next == '\n' {
                        break;
                    }
                    chars.next();
                }
            }
            '/' if chars.peek() == Some(&'*') => {
                chars.next();
                let mut prev = '\0';
                for next in chars.by_ref() {
                    if prev == '*' && next == '/' {
                        break;
                    }
                    prev = next;
                }
            }
            _ => out.push(ch),
        }
    }

    remove_trailing_commas(&out)
}

fn remove_trailing_commas(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut in_string = false;
    let mut escaped = false;
    let chars: Vec<char> = input.chars().collect();

    for (i, &ch) in chars.iter().enumerate() {
        if in_string {
            out.push(ch);
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }
        if ch == '"' {
            in_string = true;
        }
        if ch == ',' {
            let next = chars[i + 1..].iter().find(|c| !c.is_whitespace());
            if matches!(next, Some('}') | Some(']')) {
                continue;
            }
        }
        out.push(ch);
    }
    out
}
