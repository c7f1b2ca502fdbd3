//! Custom field entity engine
//!
//! Administrators define typed attributes for entity types at runtime. Each
//! type is stored as a base table of fixed columns, an EAV table with one row
//! per attribute value, and a flattened projection kept in sync by generated
//! triggers. A descriptor-driven mapper reads, creates and patches entities
//! across the three.
//!
//! ```text
//!   ConfigStore ──► SchemaManager ──► <type>_main ──trigger──► <type>_flattened
//!        │                                 ▲
//!        └──────────► EntityService ───────┘ (and <type>_base)
//! ```

pub mod binding;
pub mod entities;
pub mod error;
pub mod field_type;
pub mod identifier;
pub mod registry;
pub mod values;

#[cfg(feature = "database")]
pub mod database;
#[cfg(feature = "database")]
pub mod engine;

pub use entities::{Character, CharacterProfile, CustomFieldEntity, Episode, FieldConfig};
pub use error::{EntityError, Result};
pub use field_type::FieldType;
pub use identifier::{validate_entity_type, validate_identifier, EntityTables};
pub use registry::{AnyEntity, CustomEntity, EntityKind};

#[cfg(feature = "database")]
pub use database::{
    ConfigStore, DatabaseConfig, DatabaseManager, EntityService, MigrationReport, SchemaManager,
};
#[cfg(feature = "database")]
pub use engine::EntityEngine;
