//! Domain structs bound by the entity mapper

pub mod character;
pub mod character_profile;
pub mod custom_field;
pub mod episode;

pub use character::Character;
pub use character_profile::CharacterProfile;
pub use custom_field::{
    parse_field_config, validate_field_config, CustomFieldEntity, FieldConfig,
    RESERVED_FIELD_NAMES,
};
pub use episode::Episode;
