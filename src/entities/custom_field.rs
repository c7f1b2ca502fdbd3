//! Field configuration documents and the dynamic attribute bag

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::{BTreeMap, HashSet};

use crate::error::{EntityError, Result};
use crate::field_type::FieldType;
use crate::identifier::validate_identifier;

/// Column names no custom field may take over
pub const RESERVED_FIELD_NAMES: [&str; 2] = ["entity_id", "id"];

/// One administrator-defined attribute of an entity type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldConfig {
    pub machine_field_name: String,
    #[serde(default)]
    pub human_field_name: String,
    /// Kept verbatim; resolve with [`FieldConfig::logical_type`]
    #[serde(default)]
    pub field_type: String,
    #[serde(default)]
    pub content_field_type: String,
    #[serde(default)]
    pub order: i32,
}

impl FieldConfig {
    pub fn new(machine_field_name: &str, field_type: FieldType) -> Self {
        Self {
            machine_field_name: machine_field_name.to_string(),
            human_field_name: machine_field_name.to_string(),
            field_type: field_type.as_str().to_string(),
            content_field_type: String::new(),
            order: 0,
        }
    }

    /// Logical type, with unknown names resolved to `string`
    pub fn logical_type(&self) -> FieldType {
        FieldType::from_config(&self.field_type)
    }
}

/// The dynamic half of a domain struct
///
/// `custom_fields` holds attribute values keyed by machine name,
/// `field_config` the configuration the values were read against.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CustomFieldEntity {
    #[serde(default)]
    pub custom_fields: BTreeMap<String, JsonValue>,
    #[serde(default)]
    pub field_config: Vec<FieldConfig>,
}

impl CustomFieldEntity {
    pub fn with_fields<I, K>(fields: I) -> Self
    where
        I: IntoIterator<Item = (K, JsonValue)>,
        K: Into<String>,
    {
        Self {
            custom_fields: fields.into_iter().map(|(k, v)| (k.into(), v)).collect(),
            field_config: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.custom_fields.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&JsonValue> {
        self.custom_fields.get(name)
    }
}

/// Parse a stored configuration document and check every machine name
///
/// The result is ordered by `order`; entries sharing an order keep their
/// document position.
pub fn parse_field_config(json: &str) -> Result<Vec<FieldConfig>> {
    let mut fields: Vec<FieldConfig> = serde_json::from_str(json)?;
    validate_field_config(&fields)?;
    fields.sort_by_key(|f| f.order);
    Ok(fields)
}

/// Reject configurations that would produce unsafe or ambiguous columns
pub fn validate_field_config(fields: &[FieldConfig]) -> Result<()> {
    let mut seen = HashSet::new();
    for field in fields {
        let name = validate_identifier(&field.machine_field_name)?;
        let lowered = name.to_ascii_lowercase();
        if RESERVED_FIELD_NAMES.contains(&lowered.as_str()) {
            return Err(EntityError::ConfigParse(format!(
                "machine_field_name '{}' is reserved",
                name
            )));
        }
        if !seen.insert(lowered) {
            return Err(EntityError::ConfigParse(format!(
                "duplicate machine_field_name '{}'",
                name
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_full_document() {
        let doc = r#"[
            {"machine_field_name": "bio", "human_field_name": "Biography",
             "field_type": "text", "content_field_type": "bbcode", "order": 2},
            {"machine_field_name": "height", "human_field_name": "Height",
             "field_type": "int", "content_field_type": "", "order": 1}
        ]"#;
        let fields = parse_field_config(doc).unwrap();
        assert_eq!(fields.len(), 2);
        assert_eq!(fields[0].machine_field_name, "height");
        assert_eq!(fields[0].logical_type(), FieldType::Int);
        assert_eq!(fields[1].human_field_name, "Biography");
        assert_eq!(fields[1].content_field_type, "bbcode");
    }

    #[test]
    fn sparse_entries_get_defaults() {
        let fields =
            parse_field_config(r#"[{"machine_field_name": "mood", "field_type": "emoji"}]"#)
                .unwrap();
        assert_eq!(fields[0].order, 0);
        assert_eq!(fields[0].human_field_name, "");
        assert_eq!(fields[0].logical_type(), FieldType::String);
        assert_eq!(fields[0].field_type, "emoji");
    }

    #[test]
    fn equal_orders_keep_document_position() {
        let doc = r#"[
            {"machine_field_name": "b", "field_type": "int"},
            {"machine_field_name": "a", "field_type": "int"}
        ]"#;
        let names: Vec<_> = parse_field_config(doc)
            .unwrap()
            .into_iter()
            .map(|f| f.machine_field_name)
            .collect();
        assert_eq!(names, ["b", "a"]);
    }

    #[test]
    fn malformed_json_is_config_parse_error() {
        assert!(matches!(
            parse_field_config("{\"machine_field_name\": 1"),
            Err(EntityError::ConfigParse(_))
        ));
        assert!(matches!(
            parse_field_config("{}"),
            Err(EntityError::ConfigParse(_))
        ));
    }

    #[test]
    fn machine_names_are_allow_listed() {
        let doc = r#"[{"machine_field_name": "bio; DROP TABLE users", "field_type": "text"}]"#;
        assert!(matches!(
            parse_field_config(doc),
            Err(EntityError::InvalidIdentifier(_))
        ));
    }

    #[test]
    fn reserved_and_duplicate_names_rejected() {
        let reserved = vec![FieldConfig::new("entity_id", FieldType::Int)];
        assert!(matches!(
            validate_field_config(&reserved),
            Err(EntityError::ConfigParse(_))
        ));

        let dup = vec![
            FieldConfig::new("bio", FieldType::Text),
            FieldConfig::new("Bio", FieldType::String),
        ];
        assert!(matches!(
            validate_field_config(&dup),
            Err(EntityError::ConfigParse(_))
        ));
    }

    #[test]
    fn bag_serializes_with_both_keys() {
        let bag = CustomFieldEntity::with_fields([("height", json!(180))]);
        let value = serde_json::to_value(&bag).unwrap();
        assert_eq!(
            value,
            json!({"custom_fields": {"height": 180}, "field_config": []})
        );
        assert_eq!(bag.get("height"), Some(&json!(180)));
    }
}
