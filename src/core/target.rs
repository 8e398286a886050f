//! Target runtime identifiers and the syntax features each one supports

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TargetParseError {
    #[error("Unknown target engine in '{0}'")]
    UnknownEngine(String),

    #[error("Invalid version in target '{0}'")]
    InvalidVersion(String),
}

/// Runtime or language level a target names
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Engine {
    /// Language edition only (`es2020`, `esnext`)
    Es,
    Node,
    Chrome,
    Edge,
    Firefox,
    Safari,
}

impl Engine {
    fn name(self) -> &'static str {
        match self {
            Engine::Es => "es",
            Engine::Node => "node",
            Engine::Chrome => "chrome",
            Engine::Edge => "edge",
            Engine::Firefox => "firefox",
            Engine::Safari => "safari",
        }
    }

    fn from_name(name: &str) -> Option<Self> {
        match name {
            "es" => Some(Engine::Es),
            "node" => Some(Engine::Node),
            "chrome" => Some(Engine::Chrome),
            "edge" => Some(Engine::Edge),
            "firefox" => Some(Engine::Firefox),
            "safari" => Some(Engine::Safari),
            _ => None,
        }
    }
}

/// `(major, minor, patch)`; for [`Engine::Es`] the major is the edition year
pub type Version = (u32, u32, u32);

const ESNEXT: u32 = u32::MAX;

/// A parsed target identifier such as `node18`, `node14.18`, `es2020`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Target {
    pub engine: Engine,
    pub version: Version,
}

impl Target {
    pub fn new(engine: Engine, version: Version) -> Self {
        Self { engine, version }
    }

    pub fn is_node(&self) -> bool {
        self.engine == Engine::Node
    }

    /// Whether the runtime accepts `node:`-prefixed built-in specifiers
    /// (`>=14.18 <15` or `>=16`)
    pub fn supports_node_prefix(&self) -> bool {
        match self.engine {
            Engine::Node => {
                let (major, minor, _) = self.version;
                (major == 14 && minor >= 18) || major >= 16
            }
            _ => true,
        }
    }

    /// Whether code using `feature` runs on this target unmodified
    pub fn supports(&self, feature: Feature) -> bool {
        if self.engine == Engine::Es && self.version.0 == ESNEXT {
            return true;
        }
        match feature.min_version(self.engine) {
            Some(min) => self.version >= min,
            None => false,
        }
    }
}

impl FromStr for Target {
    type Err = TargetParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();

        match lower.as_str() {
            "esnext" => return Ok(Target::new(Engine::Es, (ESNEXT, 0, 0))),
            "es5" => return Ok(Target::new(Engine::Es, (2009, 0, 0))),
            "es6" => return Ok(Target::new(Engine::Es, (2015, 0, 0))),
            _ => {}
        }

        let split = lower
            .find(|c: char| c.is_ascii_digit())
            .ok_or_else(|| TargetParseError::InvalidVersion(s.to_string()))?;
        let (name, version) = lower.split_at(split);
        let engine =
            Engine::from_name(name).ok_or_else(|| TargetParseError::UnknownEngine(s.to_string()))?;

        let mut parts = version.split('.').map(|p| p.parse::<u32>());
        let mut next = || -> Result<u32, TargetParseError> {
            match parts.next() {
                Some(Ok(n)) => Ok(n),
                Some(Err(_)) => Err(TargetParseError::InvalidVersion(s.to_string())),
                None => Ok(0),
            }
        };
        let version = (next()?, next()?, next()?);

        if engine == Engine::Es && version.0 < 2015 {
            return Err(TargetParseError::InvalidVersion(s.to_string()));
        }

        Ok(Target::new(engine, version))
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (major, minor, patch) = self.version;
        match self.engine {
            Engine::Es if major == ESNEXT => write!(f, "esnext"),
            Engine::Es if major == 2009 => write!(f, "es5"),
            Engine::Es => write!(f, "es{}", major),
            engine => {
                write!(f, "{}{}", engine.name(), major)?;
                if minor > 0 || patch > 0 {
                    write!(f, ".{}", minor)?;
                }
                if patch > 0 {
                    write!(f, ".{}", patch)?;
                }
                Ok(())
            }
        }
    }
}

impl TryFrom<String> for Target {
    type Error = TargetParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Target> for String {
    fn from(target: Target) -> Self {
        target.to_string()
    }
}

/// Syntax features newer than ES2015 that the pipeline checks against targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Feature {
    Exponent,
    AsyncAwait,
    ObjectRestSpread,
    RegexpDotAll,
    OptionalCatchBinding,
    OptionalChaining,
    NullishCoalescing,
    BigInt,
    ImportMeta,
    LogicalAssignment,
    NumericSeparator,
    ClassPrivateFields,
    ClassStaticBlocks,
}

impl Feature {
    pub fn description(self) -> &'static str {
        match self {
            Feature::Exponent => "exponent operator",
            Feature::AsyncAwait => "async functions",
            Feature::ObjectRestSpread => "object rest/spread",
            Feature::RegexpDotAll => "regular expression dotAll flag",
            Feature::OptionalCatchBinding => "optional catch binding",
            Feature::OptionalChaining => "optional chaining",
            Feature::NullishCoalescing => "nullish coalescing",
            Feature::BigInt => "big integer literals",
            Feature::ImportMeta => "import.meta",
            Feature::LogicalAssignment => "logical assignment operators",
            Feature::NumericSeparator => "numeric separators",
            Feature::ClassPrivateFields => "private class members",
            Feature::ClassStaticBlocks => "class static blocks",
        }
    }

    /// First version of `engine` with support
    fn min_version(self, engine: Engine) -> Option<Version> {
        // es, node, chrome, edge, firefox, safari
        let row: [Version; 6] = match self {
            Feature::Exponent => [(2016, 0, 0), (7, 0, 0), (52, 0, 0), (14, 0, 0), (52, 0, 0), (10, 1, 0)],
            Feature::AsyncAwait => [(2017, 0, 0), (7, 6, 0), (55, 0, 0), (15, 0, 0), (52, 0, 0), (11, 0, 0)],
            Feature::ObjectRestSpread => [(2018, 0, 0), (8, 3, 0), (60, 0, 0), (79, 0, 0), (55, 0, 0), (11, 1, 0)],
            Feature::RegexpDotAll => [(2018, 0, 0), (8, 10, 0), (62, 0, 0), (79, 0, 0), (78, 0, 0), (11, 1, 0)],
            Feature::OptionalCatchBinding => [(2019, 0, 0), (10, 0, 0), (66, 0, 0), (79, 0, 0), (58, 0, 0), (11, 1, 0)],
            Feature::OptionalChaining => [(2020, 0, 0), (14, 0, 0), (80, 0, 0), (80, 0, 0), (74, 0, 0), (13, 1, 0)],
            Feature::NullishCoalescing => [(2020, 0, 0), (14, 0, 0), (80, 0, 0), (80, 0, 0), (72, 0, 0), (13, 1, 0)],
            Feature::BigInt => [(2020, 0, 0), (10, 4, 0), (67, 0, 0), (79, 0, 0), (68, 0, 0), (14, 0, 0)],
            Feature::ImportMeta => [(2020, 0, 0), (10, 4, 0), (64, 0, 0), (79, 0, 0), (62, 0, 0), (11, 1, 0)],
            Feature::LogicalAssignment => [(2021, 0, 0), (15, 0, 0), (85, 0, 0), (85, 0, 0), (79, 0, 0), (14, 0, 0)],
            Feature::NumericSeparator => [(2021, 0, 0), (12, 5, 0), (75, 0, 0), (79, 0, 0), (70, 0, 0), (13, 0, 0)],
            Feature::ClassPrivateFields => [(2022, 0, 0), (12, 0, 0), (74, 0, 0), (79, 0, 0), (90, 0, 0), (14, 1, 0)],
            Feature::ClassStaticBlocks => [(2022, 0, 0), (16, 11, 0), (94, 0, 0), (94, 0, 0), (93, 0, 0), (16, 4, 0)],
        };
        let column = match engine {
            Engine::Es => 0,
            Engine::Node => 1,
            Engine::Chrome => 2,
            Engine::Edge => 3,
            Engine::Firefox => 4,
            Engine::Safari => 5,
        };
        row.get(column).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_targets() {
        assert_eq!("node18".parse::<Target>().unwrap(), Target::new(Engine::Node, (18, 0, 0)));
        assert_eq!(
            "node14.18".parse::<Target>().unwrap(),
            Target::new(Engine::Node, (14, 18, 0))
        );
        assert_eq!("ES2020".parse::<Target>().unwrap(), Target::new(Engine::Es, (2020, 0, 0)));
        assert!("deno1".parse::<Target>().is_err());
        assert!("node".parse::<Target>().is_err());
    }

    #[test]
    fn test_display_round_trip() {
        for raw in ["node18", "node14.18", "node12.20.1", "es2020", "esnext", "chrome90"] {
            assert_eq!(raw.parse::<Target>().unwrap().to_string(), raw);
        }
    }

    #[test]
    fn test_node_prefix_support() {
        let supports = |raw: &str| raw.parse::<Target>().unwrap().supports_node_prefix();
        assert!(!supports("node12"));
        assert!(!supports("node14.17"));
        assert!(supports("node14.18"));
        assert!(!supports("node15"));
        assert!(supports("node16"));
    }

    #[test]
    fn test_feature_support() {
        let node12: Target = "node12".parse().unwrap();
        let node16: Target = "node16".parse().unwrap();
        let esnext: Target = "esnext".parse().unwrap();
        assert!(!node12.supports(Feature::OptionalChaining));
        assert!(node16.supports(Feature::OptionalChaining));
        assert!(!node16.supports(Feature::ClassStaticBlocks));
        assert!(esnext.supports(Feature::ClassStaticBlocks));
    }
}
