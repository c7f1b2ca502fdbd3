//! Per-character posting profiles

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use super::CustomFieldEntity;
use crate::error::{EntityError, Result};
use crate::registry::{AnyEntity, CustomEntity, EntityKind};
use crate::values::{base_integer, base_optional_text, SqlValue};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CharacterProfile {
    pub id: i64,
    pub character_id: i64,
    pub avatar: Option<String>,
    pub custom_fields: CustomFieldEntity,
}

impl CustomEntity for CharacterProfile {
    const KIND: EntityKind = EntityKind::CharacterProfile;

    fn id(&self) -> i64 {
        self.id
    }

    fn set_id(&mut self, id: i64) {
        self.id = id;
    }

    fn base_value(&self, column: &str) -> Option<SqlValue> {
        match column {
            "character_id" => Some(SqlValue::BigInt(Some(self.character_id))),
            "avatar" => Some(SqlValue::Text(self.avatar.clone())),
            _ => None,
        }
    }

    fn set_base_value(&mut self, column: &str, value: &JsonValue) -> Result<()> {
        match column {
            "id" => self.id = base_integer(column, value)?,
            "character_id" => self.character_id = base_integer(column, value)?,
            "avatar" => self.avatar = base_optional_text(column, value)?,
            other => {
                return Err(EntityError::mapping(
                    other,
                    "not a character_profile base field",
                ))
            }
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
        AnyEntity::CharacterProfile(self)
    }
}
