//! Loads `.json` modules as a default-exported value

use crate::core::StageId;
use crate::stages::{Stage, StageError, TransformContext};
use serde_json::Value;

#[derive(Debug, Clone, Default)]
pub struct JsonStage;

impl JsonStage {
    pub fn new() -> Self {
        Self
    }
}

impl Stage for JsonStage {
    fn id(&self) -> StageId {
        StageId::Json
    }

    fn transform(&self, code: &str, ctx: &mut TransformContext) -> Result<Option<String>, StageError> {
        if ctx.extension() != ".json" {
            return Ok(None);
        }

        let value: Value = serde_json::from_str(code).map_err(|source| StageError::DataParse {
            path: ctx.id.clone(),
            source,
        })?;

        Ok(Some(format!("export default {};\n", value)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn load(code: &str) -> Result<Option<String>, StageError> {
        JsonStage::new().transform(code, &mut TransformContext::new("/src/data.json"))
    }

    #[test]
    fn test_value_exported_as_default() {
        assert_eq!(
            load(r#"{ "name": "pkg", "tags": [1, 2] }"#).unwrap().as_deref(),
            Some("export default {\"name\":\"pkg\",\"tags\":[1,2]};\n")
        );
    }

    #[test]
    fn test_reserialized_value_round_trips() {
        let original = r#"{"b": {"nested": [true, null, 1.5]}, "a": "xé"}"#;
        let out = load(original).unwrap().unwrap();
        let literal = out
            .strip_prefix("export default ")
            .and_then(|s| s.strip_suffix(";\n"))
            .unwrap();
        let reparsed: Value = serde_json::from_str(literal).unwrap();
        let expected: Value = serde_json::from_str(original).unwrap();
        assert_eq!(reparsed, expected);
    }

    #[test]
    fn test_malformed_data_is_fatal() {
        let err = load("{ \"a\": ").unwrap_err();
        assert!(matches!(err, StageError::DataParse { .. }));
        assert!(err.to_string().contains("/src/data.json"));
    }

    #[test]
    fn test_other_modules_ignored() {
        let mut ctx = TransformContext::new("/src/index.js");
        assert_eq!(JsonStage::new().transform("{", &mut ctx).unwrap(), None);
    }
}
