//! Episodes: topic-backed story arcs

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use super::CustomFieldEntity;
use crate::error::{EntityError, Result};
use crate::registry::{AnyEntity, CustomEntity, EntityKind};
use crate::values::{base_integer, base_text, SqlValue};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Episode {
    pub id: i64,
    pub topic_id: i64,
    pub name: String,
    pub custom_fields: CustomFieldEntity,
}

impl CustomEntity for Episode {
    const KIND: EntityKind = EntityKind::Episode;

    fn id(&self) -> i64 {
        self.id
    }

    fn set_id(&mut self, id: i64) {
        self.id = id;
    }

    fn base_value(&self, column: &str) -> Option<SqlValue> {
        match column {
            "topic_id" => Some(SqlValue::BigInt(Some(self.topic_id))),
            "name" => Some(SqlValue::Text(Some(self.name.clone()))),
            _ => None,
        }
    }

    fn set_base_value(&mut self, column: &str, value: &JsonValue) -> Result<()> {
        match column {
            "id" => self.id = base_integer(column, value)?,
            "topic_id" => self.topic_id = base_integer(column, value)?,
            "name" => self.name = base_text(column, value)?,
            other => return Err(EntityError::mapping(other, "not an episode base field")),
        }
        Ok(())
    }

    fn custom_fields(&self) -> &CustomFieldEntity {
        &self.custom_fields
    }

    fn custom_fields_mut(&mut self) -> &mut CustomFieldEntity {
        &mut self.custom_fields
    }

    fn into_any(self) -> AnyEntity {
        AnyEntity::Episode(self)
    }
}
