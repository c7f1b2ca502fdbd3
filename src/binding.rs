//! Binding between scanned rows, update payloads and domain structs
//!
//! Pure functions used by the entity service: filling a struct from a joined
//! base/flattened row, and picking apart a PATCH payload.

use serde_json::{Map, Value as JsonValue};
use std::collections::{BTreeMap, HashSet};

use crate::entities::FieldConfig;
use crate::error::Result;
use crate::registry::{BaseField, CustomEntity, EntityDescriptor};
use crate::values::ScannedValue;

/// Join key of the flattened table, never surfaced as an attribute
pub const FLATTENED_KEY: &str = "entity_id";

/// Key of a PATCH payload carrying attribute updates
pub const CUSTOM_FIELDS_KEY: &str = "custom_fields";

/// Build a struct from one joined row
///
/// Columns matching `id` or a base field (case-insensitively) are assigned
/// to the struct with text kept verbatim; every other non-null column except
/// the join key goes into the custom field bag, parsed as JSON where it can be.
pub fn fill_entity<T: CustomEntity>(
    row: BTreeMap<String, ScannedValue>,
    field_config: Vec<FieldConfig>,
) -> Result<T> {
    let descriptor = T::descriptor();
    let mut entity = T::default();
    let mut custom = BTreeMap::new();

    for (column, value) in row {
        let lowered = column.to_ascii_lowercase();
        if lowered == "id" {
            entity.set_base_value("id", &value.into_raw())?;
        } else if let Some(field) = descriptor.base_field(&lowered) {
            entity.set_base_value(field.column, &value.into_raw())?;
        } else if column != FLATTENED_KEY {
            custom.insert(column, value.into_json());
        }
    }

    let bag = entity.custom_fields_mut();
    bag.custom_fields = custom;
    bag.field_config = field_config;
    Ok(entity)
}

/// A PATCH payload split into its base and attribute halves
#[derive(Debug, Default, PartialEq)]
pub struct PatchPlan {
    pub base: Vec<(&'static BaseField, JsonValue)>,
    pub custom_fields: Vec<(String, JsonValue)>,
}

impl PatchPlan {
    pub fn is_empty(&self) -> bool {
        self.base.is_empty() && self.custom_fields.is_empty()
    }
}

/// Sort the keys of a PATCH payload
///
/// Keys naming a base field (case-insensitively) become base updates; `id`
/// and unknown keys are ignored. `custom_fields` is read in any of the shapes
/// clients send: a name → value map, a list of `{field_name, field_value}`,
/// or that list wrapped again under `custom_fields`.
pub fn plan_patch(descriptor: &EntityDescriptor, updates: &Map<String, JsonValue>) -> PatchPlan {
    let mut plan = PatchPlan::default();
    let mut seen = HashSet::new();

    for (key, value) in updates {
        if key.eq_ignore_ascii_case("id") || key == CUSTOM_FIELDS_KEY {
            continue;
        }
        if let Some(field) = descriptor.base_field(key) {
            if seen.insert(field.column) {
                plan.base.push((field, value.clone()));
            }
        }
    }

    if let Some(custom) = updates.get(CUSTOM_FIELDS_KEY) {
        plan.custom_fields = custom_field_updates(custom);
    }
    plan
}

fn custom_field_updates(value: &JsonValue) -> Vec<(String, JsonValue)> {
    match value {
        JsonValue::Object(map) => match map.get(CUSTOM_FIELDS_KEY) {
            Some(nested @ JsonValue::Array(_)) => custom_field_updates(nested),
            Some(JsonValue::Object(inner)) if map.len() == 1 => inner
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            _ => map.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
        },
        JsonValue::Array(items) => items
            .iter()
            .filter_map(|item| {
                let name = item.get("field_name")?.as_str()?;
                if name.is_empty() {
                    return None;
                }
                let value = item.get("field_value").cloned().unwrap_or(JsonValue::Null);
                Some((name.to_string(), value))
            })
            .collect(),
        _ => Vec::new(),
    }
}
