//! Schema validator for fetched documents
//!
//! Wraps the jsonschema crate so that IS-04 resources and IS-05
//! constraints/staged/active documents can be checked for gross structural
//! well-formedness before the conformance checks run on them.

use std::collections::HashMap;

use jsonschema::{ValidationError as JsonSchemaError, Validator};
use serde_json::Value;
use tracing::debug;

use crate::error::{Error, Result};

use super::error::{SchemaConstraint, SchemaViolation};

/// Compiled schema entry
struct CompiledSchema {
    /// Original JSON Schema
    schema: Value,
    /// Pre-compiled validator
    compiled: Validator,
}

/// Schema validator with pre-compiled schemas, indexed by name
#[derive(Default)]
pub struct SchemaValidator {
    schemas: HashMap<String, CompiledSchema>,
}

impl SchemaValidator {
    /// Create an empty validator
    pub fn empty() -> Self {
        Self::default()
    }

    /// Compile and register a schema under `name`
    pub fn add_schema(&mut self, name: &str, schema: Value) -> Result<()> {
        let compiled = jsonschema::draft7::new(&schema).map_err(|e| Error::Schema {
            name: name.to_string(),
            reason: e.to_string(),
        })?;

        self.schemas
            .insert(name.to_string(), CompiledSchema { schema, compiled });
        Ok(())
    }

    /// Check if a schema is registered
    pub fn has_schema(&self, name: &str) -> bool {
        self.schemas.contains_key(name)
    }

    /// Get the raw schema
    pub fn get_schema(&self, name: &str) -> Option<&Value> {
        self.schemas.get(name).map(|s| &s.schema)
    }

    /// Validate a document against a registered schema
    ///
    /// A document with no registered schema passes; callers that require a
    /// schema check `has_schema` first.
    pub fn validate(&self, name: &str, document: &Value) -> std::result::Result<(), Vec<SchemaViolation>> {
        let Some(compiled) = self.schemas.get(name) else {
            debug!("no schema registered for '{}'", name);
            return Ok(());
        };

        let violations: Vec<SchemaViolation> = compiled
            .compiled
            .iter_errors(document)
            .map(|error| convert_jsonschema_error(name, error))
            .collect();

        if violations.is_empty() {
            Ok(())
        } else {
            Err(violations)
        }
    }
}

fn convert_jsonschema_error(name: &str, error: JsonSchemaError) -> SchemaViolation {
    let path = format!("{}", error.instance_path);
    let (constraint, expected, received) = extract_constraint_info(&error);
    SchemaViolation::new(name, path, constraint, expected, received)
}

fn extract_constraint_info(error: &JsonSchemaError) -> (SchemaConstraint, String, String) {
    use jsonschema::error::ValidationErrorKind;

    let instance_str = error.instance.to_string();

    match &error.kind {
        ValidationErrorKind::Type { kind } => (
            SchemaConstraint::Type,
            format!("{:?}", kind).to_lowercase(),
            describe_value_type(&error.instance),
        ),
        ValidationErrorKind::Required { property } => (
            SchemaConstraint::Required,
            format!("property {}", property),
            "(missing)".to_string(),
        ),
        ValidationErrorKind::Minimum { limit } => {
            (SchemaConstraint::Minimum, limit.to_string(), instance_str)
        }
        ValidationErrorKind::Maximum { limit } => {
            (SchemaConstraint::Maximum, limit.to_string(), instance_str)
        }
        ValidationErrorKind::Enum { options } => {
            let options_str = match options.as_array() {
                Some(arr) => arr
                    .iter()
                    .map(|v| v.to_string())
                    .collect::<Vec<_>>()
                    .join(", "),
                None => options.to_string(),
            };
            (SchemaConstraint::Enum, options_str, instance_str)
        }
        ValidationErrorKind::Pattern { pattern } => {
            (SchemaConstraint::Pattern, pattern.to_string(), instance_str)
        }
        ValidationErrorKind::MinItems { limit } => {
            let count = error.instance.as_array().map(|a| a.len()).unwrap_or(0);
            (
                SchemaConstraint::MinItems,
                limit.to_string(),
                format!("{} items", count),
            )
        }
        ValidationErrorKind::MaxItems { limit } => {
            let count = error.instance.as_array().map(|a| a.len()).unwrap_or(0);
            (
                SchemaConstraint::MaxItems,
                limit.to_string(),
                format!("{} items", count),
            )
        }
        ValidationErrorKind::AdditionalProperties { unexpected } => (
            SchemaConstraint::AdditionalProperties,
            "no additional properties".to_string(),
            unexpected.join(", "),
        ),
        ValidationErrorKind::Format { format } => {
            (SchemaConstraint::Format, format.to_string(), instance_str)
        }
        _ => (
            SchemaConstraint::Other(format!("{:?}", error.kind)),
            "constraint".to_string(),
            instance_str,
        ),
    }
}

fn describe_value_type(value: &Value) -> String {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_i64() || n.is_u64() => "integer",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
    .to_string()
}
