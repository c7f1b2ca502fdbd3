//! Config Store
//!
//! One JSON document per entity type, listing its custom fields. Documents
//! are validated before they are stored and parsed on every read.

use serde_json::Value as JsonValue;
use sqlx::{PgPool, Row};
use tracing::{debug, info};

use crate::entities::{parse_field_config, FieldConfig};
use crate::error::{EntityError, Result};
use crate::identifier::validate_entity_type;

const CONFIG_TABLE_DDL: &str = r#"
    CREATE TABLE IF NOT EXISTS custom_field_config (
        entity_type VARCHAR(255) PRIMARY KEY,
        config TEXT NOT NULL
    )
"#;

/// Persistent per-type field configuration
#[derive(Clone, Debug)]
pub struct ConfigStore {
    pool: PgPool,
}

impl ConfigStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create the configuration table if it is missing
    pub async fn ensure_table(&self) -> Result<()> {
        sqlx::query(CONFIG_TABLE_DDL)
            .execute(&self.pool)
            .await
            .map_err(|e| EntityError::schema("create custom_field_config", e))?;
        debug!("custom_field_config table ready");
        Ok(())
    }

    async fn fetch_raw(&self, entity_type: &str) -> Result<Option<String>> {
        validate_entity_type(entity_type)?;
        let row = sqlx::query("SELECT config FROM custom_field_config WHERE entity_type = $1")
            .bind(entity_type)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| r.get::<String, _>("config")))
    }

    /// Field configuration of `entity_type`, ordered by `order`
    ///
    /// A type with no stored document has no custom fields.
    pub async fn get_config(&self, entity_type: &str) -> Result<Vec<FieldConfig>> {
        match self.fetch_raw(entity_type).await? {
            Some(raw) => parse_field_config(&raw),
            None => Ok(Vec::new()),
        }
    }

    /// Stored document as JSON, `[]` when none exists
    pub async fn get_config_document(&self, entity_type: &str) -> Result<JsonValue> {
        match self.fetch_raw(entity_type).await? {
            Some(raw) => Ok(serde_json::from_str(&raw)?),
            None => Ok(JsonValue::Array(Vec::new())),
        }
    }

    /// Stored text verbatim, `{}` when none exists
    pub async fn get_config_raw_or_empty_object(&self, entity_type: &str) -> Result<String> {
        Ok(self
            .fetch_raw(entity_type)
            .await?
            .unwrap_or_else(|| "{}".to_string()))
    }

    /// Validate and store the document for `entity_type`, replacing any previous one
    pub async fn set_config(&self, entity_type: &str, config_json: &str) -> Result<Vec<FieldConfig>> {
        validate_entity_type(entity_type)?;
        let fields = parse_field_config(config_json)?;

        sqlx::query(
            r#"
            INSERT INTO custom_field_config (entity_type, config)
            VALUES ($1, $2)
            ON CONFLICT (entity_type) DO UPDATE SET config = EXCLUDED.config
            "#,
        )
        .bind(entity_type)
        .bind(config_json)
        .execute(&self.pool)
        .await?;

        info!(
            entity_type,
            fields = fields.len(),
            "stored custom field configuration"
        );
        Ok(fields)
    }
}
