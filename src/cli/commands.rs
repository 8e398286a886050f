//! CLI command definitions

use crate::core::{BuildConfig, OneOrMany, Target};
use clap::Args;

/// Settings that override the build file
#[derive(Debug, Args, Clone, Default)]
pub struct OverrideArgs {
    /// Target runtime(s), comma separated (e.g. node18,es2020)
    #[arg(short, long, value_delimiter = ',')]
    pub target: Vec<Target>,

    /// Minify output files
    #[arg(long)]
    pub minify: bool,

    /// Environment substitutions (KEY=VALUE)
    #[arg(short, long, value_parser = parse_key_value)]
    pub env: Vec<(String, String)>,
}

impl OverrideArgs {
    pub fn apply(&self, config: &mut BuildConfig) {
        if !self.target.is_empty() {
            config.target = OneOrMany::Many(self.target.clone());
        }
        config.minify |= self.minify;
        for (key, value) in &self.env {
            config.env.insert(key.clone(), value.clone());
        }
    }

    pub fn is_empty(&self) -> bool {
        self.target.is_empty() && !self.minify && self.env.is_empty()
    }
}

/// Print the assembled pipeline
#[derive(Debug, Args, Clone)]
pub struct PlanCommand {
    #[command(flatten)]
    pub overrides: OverrideArgs,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}

/// Assemble the pipeline and build the configured inputs
#[derive(Debug, Args, Clone)]
pub struct BuildCommand {
    #[command(flatten)]
    pub overrides: OverrideArgs,

    /// Print the build report as JSON
    #[arg(long)]
    pub json: bool,
}

/// Validate a build configuration
#[derive(Debug, Args, Clone)]
pub struct ValidateCommand {
    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}

/// Parse key=value pairs
pub fn parse_key_value(s: &str) -> Result<(String, String), String> {
    let parts: Vec<&str> = s.splitn(2, '=').collect();
    if parts.len() != 2 {
        return Err(format!("Invalid key=value pair: {}", s));
    }
    Ok((parts[0].to_string(), parts[1].to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_key_value() {
        assert_eq!(
            parse_key_value("process.env.NODE_ENV=production").unwrap(),
            ("process.env.NODE_ENV".to_string(), "production".to_string())
        );
        assert_eq!(parse_key_value("A=b=c").unwrap().1, "b=c");
        assert!(parse_key_value("novalue").is_err());
    }

    #[test]
    fn test_overrides_apply() {
        let mut config = BuildConfig::from_yaml("target: node16\nenv:\n  DEBUG: \"true\"\n").unwrap();
        let overrides = OverrideArgs {
            target: vec!["node20".parse().unwrap()],
            minify: true,
            env: vec![("DEBUG".to_string(), "false".to_string())],
        };
        overrides.apply(&mut config);

        assert_eq!(config.target.to_vec(), vec!["node20".parse::<Target>().unwrap()]);
        assert!(config.minify);
        assert_eq!(config.env_map().get("DEBUG"), Some("false"));
    }
}
