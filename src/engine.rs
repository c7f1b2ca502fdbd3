//! Engine facade
//!
//! Ties the config store, schema manager and entity service together behind
//! the two interfaces the rest of the application uses: template
//! administration and entity CRUD.

use serde_json::Value as JsonValue;
use sqlx::PgPool;
use tracing::info;

use crate::database::{ConfigStore, EntityService, MigrationReport, SchemaManager};
use crate::entities::{parse_field_config, FieldConfig};
use crate::error::{EntityError, Result};
use crate::identifier::validate_entity_type;
use crate::registry::EntityKind;

/// Entry point for template administration and entity CRUD
#[derive(Clone, Debug)]
pub struct EntityEngine {
    pub config_store: ConfigStore,
    pub schema: SchemaManager,
    pub entities: EntityService,
}

impl EntityEngine {
    pub fn new(pool: PgPool) -> Self {
        Self {
            config_store: ConfigStore::new(pool.clone()),
            schema: SchemaManager::new(pool.clone()),
            entities: EntityService::new(pool),
        }
    }

    /// Create the config table and the tables of every registered type
    pub async fn install(&self) -> Result<Vec<MigrationReport>> {
        self.config_store.ensure_table().await?;

        let mut reports = Vec::with_capacity(EntityKind::ALL.len());
        for kind in EntityKind::ALL {
            self.schema.ensure_base_table(kind).await?;
            let fields = self.config_store.get_config(kind.as_str()).await?;
            reports.push(self.schema.apply_config(&fields, kind.as_str()).await?);
        }

        info!(types = reports.len(), "entity engine installed");
        Ok(reports)
    }

    /// Stored template document of `entity_type`, `[]` when none is stored
    pub async fn get_template(&self, entity_type: &str) -> Result<JsonValue> {
        self.config_store.get_config_document(entity_type).await
    }

    /// Store a new template and migrate the schema to it
    ///
    /// The document is checked before anything is written. For registered
    /// types a machine name may not shadow a base column.
    pub async fn update_template(
        &self,
        entity_type: &str,
        config_json: &str,
    ) -> Result<MigrationReport> {
        validate_entity_type(entity_type)?;
        let fields = parse_field_config(config_json)?;
        check_base_collisions(entity_type, &fields)?;

        let fields = self.config_store.set_config(entity_type, config_json).await?;
        self.schema.apply_config(&fields, entity_type).await
    }
}

fn check_base_collisions(entity_type: &str, fields: &[FieldConfig]) -> Result<()> {
    let Ok(kind) = EntityKind::from_name(entity_type) else {
        return Ok(());
    };
    let descriptor = kind.descriptor();
    match fields
        .iter()
        .find(|f| descriptor.base_field(&f.machine_field_name).is_some())
    {
        Some(field) => Err(EntityError::ConfigParse(format!(
            "machine_field_name '{}' collides with a {} base column",
            field.machine_field_name, entity_type
        ))),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field_type::FieldType;

    #[test]
    fn base_column_names_cannot_be_custom_fields() {
        let fields = vec![
            FieldConfig::new("height", FieldType::Int),
            FieldConfig::new("Name", FieldType::String),
        ];
        assert!(matches!(
            check_base_collisions("character", &fields),
            Err(EntityError::ConfigParse(_))
        ));
        assert!(check_base_collisions("character", &fields[..1]).is_ok());
    }

    #[test]
    fn unregistered_types_have_no_base_columns() {
        let fields = vec![FieldConfig::new("name", FieldType::String)];
        assert!(check_base_collisions("faction", &fields).is_ok());
    }
}
