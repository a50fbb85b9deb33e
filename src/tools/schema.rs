//! Typed input schemas for tools.
//!
//! A schema is an ordered list of named primitive fields. It renders to JSON
//! Schema for the oracle's tool catalog and validates invocation arguments
//! before a handler ever sees them.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

/// Primitive type of an input field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    String,
    Integer,
    Number,
    Boolean,
}

impl FieldKind {
    fn json_type(self) -> &'static str {
        match self {
            FieldKind::String => "string",
            FieldKind::Integer => "integer",
            FieldKind::Number => "number",
            FieldKind::Boolean => "boolean",
        }
    }

    fn accepts(self, value: &Value) -> bool {
        match self {
            FieldKind::String => value.is_string(),
            FieldKind::Integer => value.is_i64() || value.is_u64(),
            FieldKind::Number => value.is_number(),
            FieldKind::Boolean => value.is_boolean(),
        }
    }
}

/// One named input field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub name: String,
    pub kind: FieldKind,
    pub required: bool,
    pub description: String,
}

/// Ordered set of input fields.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputSchema {
    fields: Vec<FieldSpec>,
}

impl InputSchema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a required field.
    pub fn required(self, name: &str, kind: FieldKind, description: &str) -> Self {
        self.field(name, kind, true, description)
    }

    /// Add an optional field.
    pub fn optional(self, name: &str, kind: FieldKind, description: &str) -> Self {
        self.field(name, kind, false, description)
    }

    fn field(mut self, name: &str, kind: FieldKind, required: bool, description: &str) -> Self {
        self.fields.push(FieldSpec {
            name: name.to_string(),
            kind,
            required,
            description: description.to_string(),
        });
        self
    }

    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    /// Name of the first field declared twice, if any.
    pub(crate) fn duplicate_field(&self) -> Option<&str> {
        self.fields.iter().enumerate().find_map(|(i, field)| {
            self.fields[..i]
                .iter()
                .any(|earlier| earlier.name == field.name)
                .then_some(field.name.as_str())
        })
    }

    /// Render as a JSON Schema object.
    pub fn to_json_schema(&self) -> Value {
        let properties: Map<String, Value> = self
            .fields
            .iter()
            .map(|f| {
                (
                    f.name.clone(),
                    json!({ "type": f.kind.json_type(), "description": f.description }),
                )
            })
            .collect();
        let required: Vec<&str> = self
            .fields
            .iter()
            .filter(|f| f.required)
            .map(|f| f.name.as_str())
            .collect();

        json!({
            "type": "object",
            "properties": properties,
            "required": required,
            "additionalProperties": false,
        })
    }

    /// Check `args` against the schema. `null` is treated as an empty object;
    /// a `null` value for an optional field counts as absent.
    pub fn validate(&self, args: &Value) -> Result<(), String> {
        let empty = Map::new();
        let object = match args {
            Value::Null => &empty,
            Value::Object(map) => map,
            other => return Err(format!("expected an object, got {}", type_name(other))),
        };

        if let Some(unknown) = object
            .keys()
            .find(|key| !self.fields.iter().any(|f| &f.name == *key))
        {
            return Err(format!("unexpected field '{}'", unknown));
        }

        for field in &self.fields {
            match object.get(&field.name) {
                None | Some(Value::Null) if field.required => {
                    return Err(format!("missing required field '{}'", field.name));
                }
                None | Some(Value::Null) => {}
                Some(value) if !field.kind.accepts(value) => {
                    return Err(format!(
                        "field '{}' must be {}, got {}",
                        field.name,
                        field.kind.json_type(),
                        type_name(value)
                    ));
                }
                Some(_) => {}
            }
        }
        Ok(())
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_f64() => "number",
        Value::Number(_) => "integer",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema() -> InputSchema {
        InputSchema::new()
            .required("query", FieldKind::String, "What to look up")
            .optional("limit", FieldKind::Integer, "Max results")
            .optional("verbose", FieldKind::Boolean, "Include details")
    }

    #[test]
    fn json_schema_lists_required_fields_in_order() {
        let rendered = schema().to_json_schema();
        assert_eq!(rendered["type"], "object");
        assert_eq!(rendered["properties"]["query"]["type"], "string");
        assert_eq!(rendered["properties"]["limit"]["type"], "integer");
        assert_eq!(rendered["required"], json!(["query"]));
    }

    #[test]
    fn accepts_valid_arguments() {
        assert!(schema().validate(&json!({ "query": "x" })).is_ok());
        assert!(schema().validate(&json!({ "query": "x", "limit": 3, "verbose": true })).is_ok());
        assert!(schema().validate(&json!({ "query": "x", "limit": null })).is_ok());
    }

    #[test]
    fn rejects_missing_required_field() {
        let err = schema().validate(&json!({})).unwrap_err();
        assert_eq!(err, "missing required field 'query'");
        assert!(schema().validate(&Value::Null).is_err());
    }

    #[test]
    fn rejects_wrong_types_and_unknown_fields() {
        assert_eq!(
            schema().validate(&json!({ "query": 5 })).unwrap_err(),
            "field 'query' must be string, got integer"
        );
        assert_eq!(
            schema().validate(&json!({ "query": "x", "limit": 2.5 })).unwrap_err(),
            "field 'limit' must be integer, got number"
        );
        assert_eq!(
            schema().validate(&json!({ "query": "x", "extra": 1 })).unwrap_err(),
            "unexpected field 'extra'"
        );
        assert_eq!(
            schema().validate(&json!(["query"])).unwrap_err(),
            "expected an object, got array"
        );
    }

    #[test]
    fn empty_schema_accepts_null() {
        assert!(InputSchema::new().validate(&Value::Null).is_ok());
    }

    #[test]
    fn duplicate_field_is_detected() {
        let doubled = InputSchema::new()
            .required("a", FieldKind::String, "")
            .optional("a", FieldKind::Integer, "");
        assert_eq!(doubled.duplicate_field(), Some("a"));
        assert_eq!(schema().duplicate_field(), None);
    }
}
