use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use serde_json::Value;

use super::Violations;
use crate::error::EngineError;

/// A compiled JSON schema for one message type of a standard.
pub struct JsonSchemaValidator {
    name: String,
    validator: jsonschema::Validator,
}

impl JsonSchemaValidator {
    pub fn new(name: &str, schema: &Value) -> Result<Self, EngineError> {
        let validator = jsonschema::validator_for(schema).map_err(|e| {
            EngineError::Configuration(format!("failed to compile schema '{name}': {e}"))
        })?;
        Ok(Self {
            name: name.to_string(),
            validator,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// One violation per schema error, sorted.
    pub fn validate(&self, instance: &Value) -> Violations {
        self.validator
            .iter_errors(instance)
            .map(|e| format!("{}", e))
            .collect()
    }
}

/// Compiled validators keyed by schema name; each schema is compiled once.
#[derive(Default)]
pub struct SchemaCache {
    validators: RwLock<HashMap<String, Arc<JsonSchemaValidator>>>,
}

impl SchemaCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached validator for `name`, compiling `source` on first use.
    pub fn get_or_compile(
        &self,
        name: &str,
        source: &str,
    ) -> Result<Arc<JsonSchemaValidator>, EngineError> {
        if let Some(found) = self
            .validators
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(name)
        {
            return Ok(found.clone());
        }

        let schema: Value = serde_json::from_str(source).map_err(|e| {
            EngineError::Configuration(format!("schema '{name}' is not valid JSON: {e}"))
        })?;
        let compiled = Arc::new(JsonSchemaValidator::new(name, &schema)?);
        let mut validators = self
            .validators
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        Ok(validators
            .entry(name.to_string())
            .or_insert(compiled)
            .clone())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    const SCHEMA: &str = r#"{
        "type": "object",
        "required": ["partyCode"],
        "properties": {"partyCode": {"type": "string"}}
    }"#;

    #[test]
    fn validator_reports_each_error() {
        let cache = SchemaCache::new();
        let validator = cache.get_or_compile("receiverValidation", SCHEMA).unwrap();
        assert!(validator.validate(&json!({"partyCode": "X"})).is_empty());
        assert_eq!(validator.validate(&json!({})).len(), 1);
        assert_eq!(validator.validate(&json!({"partyCode": 7})).len(), 1);
    }

    #[test]
    fn schemas_are_compiled_once() {
        let cache = SchemaCache::new();
        let first = cache.get_or_compile("s", SCHEMA).unwrap();
        let second = cache.get_or_compile("s", "not even json").unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn invalid_schema_json_is_a_configuration_error() {
        let cache = SchemaCache::new();
        assert!(matches!(
            cache.get_or_compile("broken", "{"),
            Err(EngineError::Configuration(_))
        ));
    }
}
