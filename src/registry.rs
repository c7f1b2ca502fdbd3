//! Entity Registry
//!
//! The set of entity types the mapper can bind is closed: each
//! [`EntityKind`] names one domain struct and carries a static descriptor of
//! the struct's base-table fields. Everything not in the descriptor lives in
//! the struct's [`CustomFieldEntity`] bag.

use serde::Serialize;
use serde_json::Value as JsonValue;
use std::fmt;

use crate::entities::{Character, CharacterProfile, CustomFieldEntity, Episode};
use crate::error::{EntityError, Result};
use crate::identifier::validate_entity_type;
use crate::values::SqlValue;

/// Physical kind of a base-table column
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BaseColumnKind {
    Integer,
    OptionalInteger,
    Text,
    OptionalText,
}

impl BaseColumnKind {
    /// Column definition used when creating the base table
    pub fn column_definition(self) -> &'static str {
        match self {
            Self::Integer => "BIGINT NOT NULL",
            Self::OptionalInteger => "BIGINT",
            Self::Text => "VARCHAR(255) NOT NULL",
            Self::OptionalText => "VARCHAR(255)",
        }
    }

    /// Coerce an incoming JSON value into a bindable value for this column
    pub fn to_sql_value(self, field: &str, value: &JsonValue) -> Result<SqlValue> {
        use crate::values::*;
        Ok(match self {
            Self::Integer => SqlValue::BigInt(Some(base_integer(field, value)?)),
            Self::OptionalInteger => SqlValue::BigInt(base_optional_integer(field, value)?),
            Self::Text => SqlValue::Text(Some(base_text(field, value)?)),
            Self::OptionalText => SqlValue::Text(base_optional_text(field, value)?),
        })
    }
}

/// One statically declared struct field stored in `<type>_base`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BaseField {
    /// Rust field name
    pub field: &'static str,
    /// Lower-case column name
    pub column: &'static str,
    pub kind: BaseColumnKind,
}

impl BaseField {
    pub const fn new(field: &'static str, column: &'static str, kind: BaseColumnKind) -> Self {
        Self {
            field,
            column,
            kind,
        }
    }
}

/// Base-table layout of one entity type
#[derive(Debug)]
pub struct EntityDescriptor {
    pub kind: EntityKind,
    /// Fields inserted into the base table; never includes `id` or the bag
    pub base_fields: &'static [BaseField],
}

impl EntityDescriptor {
    /// Case-insensitive lookup by column or struct field name
    pub fn base_field(&self, key: &str) -> Option<&'static BaseField> {
        self.base_fields.iter().find(|f| {
            f.column.eq_ignore_ascii_case(key) || f.field.eq_ignore_ascii_case(key)
        })
    }

    pub fn columns(&self) -> impl Iterator<Item = &'static str> {
        self.base_fields.iter().map(|f| f.column)
    }
}

static CHARACTER_FIELDS: [BaseField; 4] = [
    BaseField::new("user_id", "user_id", BaseColumnKind::Integer),
    BaseField::new("topic_id", "topic_id", BaseColumnKind::Integer),
    BaseField::new("name", "name", BaseColumnKind::Text),
    BaseField::new("avatar", "avatar", BaseColumnKind::OptionalText),
];

static CHARACTER_PROFILE_FIELDS: [BaseField; 2] = [
    BaseField::new("character_id", "character_id", BaseColumnKind::Integer),
    BaseField::new("avatar", "avatar", BaseColumnKind::OptionalText),
];

static EPISODE_FIELDS: [BaseField; 2] = [
    BaseField::new("topic_id", "topic_id", BaseColumnKind::Integer),
    BaseField::new("name", "name", BaseColumnKind::Text),
];

static CHARACTER: EntityDescriptor = EntityDescriptor {
    kind: EntityKind::Character,
    base_fields: &CHARACTER_FIELDS,
};

static CHARACTER_PROFILE: EntityDescriptor = EntityDescriptor {
    kind: EntityKind::CharacterProfile,
    base_fields: &CHARACTER_PROFILE_FIELDS,
};

static EPISODE: EntityDescriptor = EntityDescriptor {
    kind: EntityKind::Episode,
    base_fields: &EPISODE_FIELDS,
};

/// Every entity type the mapper can bind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Character,
    CharacterProfile,
    Episode,
}

impl EntityKind {
    pub const ALL: [EntityKind; 3] = [Self::Character, Self::CharacterProfile, Self::Episode];

    /// Resolve an externally supplied type name
    pub fn from_name(name: &str) -> Result<Self> {
        validate_entity_type(name)?;
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == name)
            .ok_or_else(|| EntityError::UnknownEntityType(name.to_string()))
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Character => "character",
            Self::CharacterProfile => "character_profile",
            Self::Episode => "episode",
        }
    }

    pub fn descriptor(self) -> &'static EntityDescriptor {
        match self {
            Self::Character => &CHARACTER,
            Self::CharacterProfile => &CHARACTER_PROFILE,
            Self::Episode => &EPISODE,
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A domain struct split into base-table fields and a custom field bag
pub trait CustomEntity: Default + Clone + Serialize + Send + Sync + 'static {
    const KIND: EntityKind;

    fn descriptor() -> &'static EntityDescriptor {
        Self::KIND.descriptor()
    }

    fn id(&self) -> i64;
    fn set_id(&mut self, id: i64);

    /// Current value of a base column, `None` for columns not in the descriptor
    fn base_value(&self, column: &str) -> Option<SqlValue>;

    /// Assign a scanned or submitted value to a base column
    fn set_base_value(&mut self, column: &str, value: &JsonValue) -> Result<()>;

    fn custom_fields(&self) -> &CustomFieldEntity;
    fn custom_fields_mut(&mut self) -> &mut CustomFieldEntity;

    fn into_any(self) -> AnyEntity;
}

/// A registered entity of any kind, for callers that dispatch on a type name
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum AnyEntity {
    Character(Character),
    CharacterProfile(CharacterProfile),
    Episode(Episode),
}

impl AnyEntity {
    pub fn kind(&self) -> EntityKind {
        match self {
            Self::Character(_) => EntityKind::Character,
            Self::CharacterProfile(_) => EntityKind::CharacterProfile,
            Self::Episode(_) => EntityKind::Episode,
        }
    }

    pub fn id(&self) -> i64 {
        match self {
            Self::Character(e) => e.id(),
            Self::CharacterProfile(e) => e.id(),
            Self::Episode(e) => e.id(),
        }
    }

    pub fn custom_fields(&self) -> &CustomFieldEntity {
        match self {
            Self::Character(e) => e.custom_fields(),
            Self::CharacterProfile(e) => e.custom_fields(),
            Self::Episode(e) => e.custom_fields(),
        }
    }

    /// Build an unsaved entity of `kind` from a JSON document
    pub fn from_json(kind: EntityKind, value: JsonValue) -> Result<Self> {
        let mapping_err = |e: serde_json::Error| EntityError::mapping(kind.as_str(), e.to_string());
        Ok(match kind {
            EntityKind::Character => {
                Self::Character(serde_json::from_value(value).map_err(mapping_err)?)
            }
            EntityKind::CharacterProfile => {
                Self::CharacterProfile(serde_json::from_value(value).map_err(mapping_err)?)
            }
            EntityKind::Episode => Self::Episode(serde_json::from_value(value).map_err(mapping_err)?),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_registered_names() {
        assert_eq!(
            EntityKind::from_name("character").unwrap(),
            EntityKind::Character
        );
        assert_eq!(
            EntityKind::from_name("character_profile").unwrap(),
            EntityKind::CharacterProfile
        );
        assert_eq!(EntityKind::from_name("episode").unwrap(), EntityKind::Episode);
    }

    #[test]
    fn invalid_name_checked_before_lookup() {
        assert!(matches!(
            EntityKind::from_name("character;--"),
            Err(EntityError::InvalidIdentifier(_))
        ));
        assert!(matches!(
            EntityKind::from_name("faction"),
            Err(EntityError::UnknownEntityType(_))
        ));
        assert!(matches!(
            EntityKind::from_name("Character"),
            Err(EntityError::UnknownEntityType(_))
        ));
    }

    #[test]
    fn descriptors_exclude_id_and_bag() {
        for kind in EntityKind::ALL {
            let descriptor = kind.descriptor();
            assert_eq!(descriptor.kind, kind);
            assert!(descriptor.base_field("id").is_none());
            assert!(descriptor.base_field("custom_fields").is_none());
            assert!(descriptor
                .columns()
                .all(|c| c == c.to_ascii_lowercase()));
        }
    }

    #[test]
    fn base_field_lookup_is_case_insensitive() {
        let descriptor = EntityKind::Character.descriptor();
        assert_eq!(descriptor.base_field("NAME").unwrap().column, "name");
        assert_eq!(descriptor.base_field("User_Id").unwrap().column, "user_id");
        assert!(descriptor.base_field("height").is_none());
    }

    #[test]
    fn column_kinds_coerce() {
        assert_eq!(
            BaseColumnKind::Integer
                .to_sql_value("user_id", &serde_json::json!(3))
                .unwrap(),
            SqlValue::BigInt(Some(3))
        );
        assert_eq!(
            BaseColumnKind::OptionalText
                .to_sql_value("avatar", &JsonValue::Null)
                .unwrap(),
            SqlValue::Text(None)
        );
        assert!(BaseColumnKind::Text
            .to_sql_value("name", &JsonValue::Null)
            .is_err());
    }

    #[test]
    fn any_entity_from_json() {
        let any = AnyEntity::from_json(
            EntityKind::Episode,
            serde_json::json!({"topic_id": 4, "name": "Pilot",
                               "custom_fields": {"custom_fields": {"mood": "grim"}}}),
        )
        .unwrap();
        assert_eq!(any.kind(), EntityKind::Episode);
        assert_eq!(any.id(), 0);
        assert_eq!(
            any.custom_fields().get("mood"),
            Some(&serde_json::json!("grim"))
        );

        assert!(matches!(
            AnyEntity::from_json(EntityKind::Episode, serde_json::json!({"name": 5})),
            Err(EntityError::Mapping { .. })
        ));
    }
}
