//! Per-request output schemas built from caller-supplied field descriptors.
//!
//! A caller describes the answer it wants as a list of `{key, type, description}`
//! entries. [`OutputSchema::build`] turns that list into a typed contract that
//! renders itself as JSON Schema for prompting and validates model output.

use chrono::{DateTime, NaiveDate};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use tracing::debug;

use crate::error::{RagError, Result};

/// A caller-supplied description of one output field.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FieldDescriptor {
    /// Name of the field in the structured answer.
    pub key: String,
    /// Type tag such as `string` or `number`.
    #[serde(rename = "type")]
    pub type_tag: String,
    /// Natural-language description passed to the model.
    #[serde(default)]
    pub description: String,
}

impl FieldDescriptor {
    /// Create a descriptor.
    pub fn new(
        key: impl Into<String>,
        type_tag: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self { key: key.into(), type_tag: type_tag.into(), description: description.into() }
    }
}

/// The value type expected for an output field.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    String,
    Number,
    Boolean,
    /// Whole numbers. Accepts both `bigint` and `integer` tags.
    BigInt,
    /// RFC 3339 date-time or `YYYY-MM-DD` string.
    Date,
    Undefined,
    Null,
    /// Array of any element type.
    Array,
    Object,
    /// Catch-all for unrecognised tags. Accepts any value.
    Unknown,
}

impl FieldType {
    /// Map a type tag to a [`FieldType`]. Unrecognised tags map to [`FieldType::Unknown`].
    pub fn from_tag(tag: &str) -> Self {
        match tag {
            "string" => Self::String,
            "number" => Self::Number,
            "boolean" => Self::Boolean,
            "bigint" | "integer" => Self::BigInt,
            "date" => Self::Date,
            "undefined" => Self::Undefined,
            "null" => Self::Null,
            "array" => Self::Array,
            "object" => Self::Object,
            other => {
                debug!(tag = other, "unrecognised field type, accepting any value");
                Self::Unknown
            }
        }
    }

    /// JSON Schema fragment for this type.
    pub fn json_schema(self) -> Value {
        match self {
            Self::String => json!({ "type": "string" }),
            Self::Number => json!({ "type": "number" }),
            Self::Boolean => json!({ "type": "boolean" }),
            Self::BigInt => json!({ "type": "integer" }),
            Self::Date => json!({
                "type": "string",
                "anyOf": [{ "format": "date-time" }, { "format": "date" }]
            }),
            Self::Undefined | Self::Null => json!({ "type": "null" }),
            Self::Array => json!({ "type": "array", "items": {} }),
            Self::Object => json!({ "type": "object" }),
            Self::Unknown => json!({}),
        }
    }

    /// Whether `value` is acceptable for this type.
    pub fn accepts(self, value: &Value) -> bool {
        match self {
            Self::String => value.is_string(),
            Self::Number => value.is_number(),
            Self::Boolean => value.is_boolean(),
            Self::BigInt => value.is_i64() || value.is_u64(),
            Self::Date => value.as_str().is_some_and(is_date),
            // JSON has no undefined; null is the only way to express absence
            Self::Undefined | Self::Null => value.is_null(),
            Self::Array => value.is_array(),
            Self::Object => value.is_object(),
            Self::Unknown => true,
        }
    }

    fn label(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Number => "number",
            Self::Boolean => "boolean",
            Self::BigInt => "integer",
            Self::Date => "date",
            Self::Undefined => "undefined",
            Self::Null => "null",
            Self::Array => "array",
            Self::Object => "object",
            Self::Unknown => "unknown",
        }
    }
}

fn is_date(s: &str) -> bool {
    DateTime::parse_from_rfc3339(s).is_ok() || NaiveDate::parse_from_str(s, "%Y-%m-%d").is_ok()
}

fn describe_value(value: &Value) -> &'static str {
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

/// One field of an [`OutputSchema`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SchemaField {
    pub field_type: FieldType,
    pub description: String,
}

/// A structured output contract: field name to expected type and description.
///
/// Field order follows first appearance in the descriptor list. A later
/// descriptor with the same key replaces the earlier one in place.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct OutputSchema {
    fields: IndexMap<String, SchemaField>,
}

impl OutputSchema {
    /// Build a schema from field descriptors. Never fails.
    pub fn build(descriptors: &[FieldDescriptor]) -> Self {
        let mut fields = IndexMap::with_capacity(descriptors.len());
        for d in descriptors {
            fields.insert(
                d.key.clone(),
                SchemaField {
                    field_type: FieldType::from_tag(&d.type_tag),
                    description: d.description.clone(),
                },
            );
        }
        Self { fields }
    }

    /// Look up a field by key.
    pub fn field(&self, key: &str) -> Option<&SchemaField> {
        self.fields.get(key)
    }

    /// Iterate over fields in order.
    pub fn fields(&self) -> impl Iterator<Item = (&str, &SchemaField)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Render the schema as a JSON Schema object.
    ///
    /// Every field is required and no other properties are allowed. An empty
    /// schema allows any object.
    pub fn to_json_schema(&self) -> Value {
        let mut properties = Map::new();
        for (key, field) in &self.fields {
            let mut prop = field.field_type.json_schema();
            if let Value::Object(obj) = &mut prop {
                if !field.description.is_empty() {
                    obj.insert("description".to_string(), Value::String(field.description.clone()));
                }
            }
            properties.insert(key.clone(), prop);
        }
        let required: Vec<Value> = self.fields.keys().cloned().map(Value::String).collect();
        json!({
            "type": "object",
            "properties": properties,
            "required": required,
            "additionalProperties": self.is_empty(),
        })
    }

    /// Check `value` against the schema and return it as a JSON object.
    ///
    /// The key set must match exactly: missing and extra keys are both errors.
    /// An empty schema accepts any object.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::SchemaMismatch`] listing every problem found.
    pub fn validate(&self, value: &Value) -> Result<Map<String, Value>> {
        let Value::Object(obj) = value else {
            return Err(RagError::SchemaMismatch(vec![format!(
                "expected a JSON object, got {}",
                describe_value(value)
            )]));
        };

        if self.is_empty() {
            return Ok(obj.clone());
        }

        let mut problems = Vec::new();
        for (key, field) in &self.fields {
            match obj.get(key) {
                None => problems.push(format!("missing field `{key}`")),
                Some(v) if !field.field_type.accepts(v) => problems.push(format!(
                    "field `{key}` must be {}, got {}",
                    field.field_type.label(),
                    describe_value(v)
                )),
                Some(_) => {}
            }
        }
        for key in obj.keys() {
            if !self.fields.contains_key(key) {
                problems.push(format!("unexpected field `{key}`"));
            }
        }

        if problems.is_empty() { Ok(obj.clone()) } else { Err(RagError::SchemaMismatch(problems)) }
    }
}
