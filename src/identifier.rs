//! SQL identifier allow-listing
//!
//! Entity type names and machine field names end up inside table, column,
//! trigger and function names, which cannot be bound as parameters. Nothing
//! reaches SQL text unless it passed [`validate_identifier`].

use regex::Regex;
use std::sync::LazyLock;

use crate::error::{EntityError, Result};

/// Allowed identifier shape
static IDENTIFIER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_]+$").unwrap());

/// PostgreSQL truncates identifiers beyond this many bytes
pub const MAX_IDENTIFIER_LEN: usize = 63;

/// Longest suffix appended to an entity type (`_main_after_insert`)
const LONGEST_SUFFIX: usize = "_main_after_insert".len();

/// Check a raw identifier against the allow-list
pub fn validate_identifier(name: &str) -> Result<&str> {
    if name.len() > MAX_IDENTIFIER_LEN || !IDENTIFIER_RE.is_match(name) {
        return Err(EntityError::InvalidIdentifier(name.to_string()));
    }
    Ok(name)
}

/// Check an entity type name, leaving room for the derived table and trigger names
pub fn validate_entity_type(name: &str) -> Result<&str> {
    validate_identifier(name)?;
    if name.len() + LONGEST_SUFFIX > MAX_IDENTIFIER_LEN {
        return Err(EntityError::InvalidIdentifier(name.to_string()));
    }
    Ok(name)
}

/// Double-quote an identifier that has already been validated
pub fn quote(name: &str) -> String {
    format!("\"{}\"", name)
}

/// Physical names derived from one entity type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityTables {
    entity_type: String,
}

impl EntityTables {
    pub fn new(entity_type: &str) -> Result<Self> {
        validate_entity_type(entity_type)?;
        Ok(Self {
            entity_type: entity_type.to_string(),
        })
    }

    pub fn entity_type(&self) -> &str {
        &self.entity_type
    }

    pub fn base(&self) -> String {
        format!("{}_base", self.entity_type)
    }

    pub fn main(&self) -> String {
        format!("{}_main", self.entity_type)
    }

    pub fn flattened(&self) -> String {
        format!("{}_flattened", self.entity_type)
    }

    /// Trigger on the main table for `event` (insert, update or delete)
    pub fn trigger(&self, event: &str) -> String {
        format!("{}_main_after_{}", self.entity_type, event)
    }

    pub fn upsert_function(&self) -> String {
        format!("{}_main_sync_upsert", self.entity_type)
    }

    pub fn delete_function(&self) -> String {
        format!("{}_main_sync_delete", self.entity_type)
    }

    /// Advisory lock key text for schema mutations of this type
    pub fn lock_name(&self) -> String {
        format!("entity_schema:{}", self.entity_type)
    }
}
