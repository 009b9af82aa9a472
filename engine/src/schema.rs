//! Payload schemas for cached entities.
//!
//! Payloads are opaque to the sync engine. The only fields it reads are the
//! references to other entities (a brew session's `recipe_id`), because
//! those are rewritten when a temporary ID resolves. A payload is accepted
//! locally as long as it is an object and those references are text IDs;
//! everything else is for the server to judge.

use crate::{error::Result, EntityKind, Error};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A reference field the engine reads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldDef {
    pub name: String,
    /// Kind of the entity the field points at
    pub target: EntityKind,
    pub required: bool,
}

impl FieldDef {
    pub fn reference(name: impl Into<String>, target: EntityKind) -> Self {
        Self {
            name: name.into(),
            target,
            required: true,
        }
    }

    /// Check the field's value (absent when the key is missing).
    ///
    /// Null and blank text count as missing.
    pub fn validate(&self, value: Option<&Value>) -> Result<()> {
        let present = value.filter(|v| match v {
            Value::Null => false,
            Value::String(s) => !s.trim().is_empty(),
            _ => true,
        });

        match present {
            None if self.required => Err(Error::MissingRequiredField(self.name.clone())),
            None | Some(Value::String(_)) => Ok(()),
            Some(other) => Err(Error::TypeMismatch {
                field: self.name.clone(),
                expected: "text".to_string(),
                got: describe(other).to_string(),
            }),
        }
    }
}

fn describe(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "text",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// The checked fields of one entity kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntitySchema {
    pub kind: EntityKind,
    pub fields: Vec<FieldDef>,
}

impl EntitySchema {
    /// Built-in schema for a kind: one required field per reference.
    pub fn for_kind(kind: EntityKind) -> Self {
        let fields = kind
            .references()
            .iter()
            .map(|&(name, target)| FieldDef::reference(name, target))
            .collect();
        Self { kind, fields }
    }

    /// Validate a payload; it must be a JSON object.
    pub fn validate_payload(&self, payload: &Value) -> Result<()> {
        let Some(obj) = payload.as_object() else {
            return Err(Error::InvalidPayload(format!(
                "{} payload must be an object, got {}",
                self.kind,
                describe(payload)
            )));
        };
        self.fields
            .iter()
            .try_for_each(|field| field.validate(obj.get(&field.name)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn recipe_fields_are_not_judged_locally() {
        let schema = EntitySchema::for_kind(EntityKind::Recipe);

        assert!(schema.validate_payload(&json!({})).is_ok());
        assert!(schema
            .validate_payload(&json!({
                "name": "Barleywine",
                "efficiency": 140,
                "boil_time": 90.5,
                "batch_size_unit": "hl"
            }))
            .is_ok());
    }

    #[test]
    fn session_needs_recipe() {
        let schema = EntitySchema::for_kind(EntityKind::BrewSession);

        let result = schema.validate_payload(&json!({"name": "Batch 7"}));
        assert!(matches!(result, Err(Error::MissingRequiredField(f)) if f == "recipe_id"));

        for payload in [json!({"recipe_id": "  "}), json!({"recipe_id": null})] {
            let result = schema.validate_payload(&payload);
            assert!(matches!(result, Err(Error::MissingRequiredField(_))));
        }
    }

    #[test]
    fn session_status_is_free_text() {
        let schema = EntitySchema::for_kind(EntityKind::BrewSession);
        let payload = json!({"recipe_id": "rcp_1", "status": "bottled", "actual_og": 1.5});
        assert!(schema.validate_payload(&payload).is_ok());
    }

    #[test]
    fn reference_must_be_text() {
        let schema = EntitySchema::for_kind(EntityKind::BrewSession);

        let result = schema.validate_payload(&json!({"recipe_id": 42}));
        assert!(matches!(
            result,
            Err(Error::TypeMismatch { field, got, .. }) if field == "recipe_id" && got == "number"
        ));
    }

    #[test]
    fn non_object_payload_rejected() {
        let schema = EntitySchema::for_kind(EntityKind::Recipe);
        let result = schema.validate_payload(&json!(["name"]));
        assert!(matches!(result, Err(Error::InvalidPayload(msg)) if msg.contains("array")));
    }
}
