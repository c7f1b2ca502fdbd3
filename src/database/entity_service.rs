//! Entity Mapper
//!
//! Generic create/read/patch over the base, main and flattened tables of a
//! registered entity type. Base fields go through the type's descriptor;
//! the custom field bag goes through EAV rows, placed by the live column
//! types of the flattened table.

use serde_json::{Map, Value as JsonValue};
use sqlx::{PgConnection, PgPool, Row};
use std::collections::HashMap;
use tracing::{debug, info, warn};

use super::config_store::ConfigStore;
use super::schema::{flattened_column_types, table_exists_in};
use super::sql::{bind_all, row_to_map};
use crate::binding::{fill_entity, plan_patch};
use crate::entities::{Character, CharacterProfile, Episode};
use crate::error::{EntityError, Result};
use crate::field_type::FieldType;
use crate::identifier::{quote, EntityTables};
use crate::registry::{AnyEntity, CustomEntity, EntityDescriptor, EntityKind};
use crate::values::{AttributeValue, SqlValue};

/// Row-level CRUD for registered entity types
#[derive(Clone, Debug)]
pub struct EntityService {
    pool: PgPool,
    config_store: ConfigStore,
}

impl EntityService {
    pub fn new(pool: PgPool) -> Self {
        let config_store = ConfigStore::new(pool.clone());
        Self { pool, config_store }
    }

    /// Load one entity with its custom fields and current field configuration
    pub async fn get_entity<T: CustomEntity>(&self, id: i64) -> Result<T> {
        let tables = EntityTables::new(T::KIND.as_str())?;
        let with_flattened = table_exists_in(&self.pool, &tables.flattened()).await?;
        let sql = select_entity_sql(&tables, with_flattened);
        debug!(sql = %sql, id, "loading entity");

        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| EntityError::NotFound {
                entity_type: T::KIND.as_str().to_string(),
                id,
            })?;

        let data = row_to_map(&row)?;
        let field_config = self.config_store.get_config(T::KIND.as_str()).await?;
        fill_entity(data, field_config)
    }

    /// Insert the base row and one EAV row per custom field
    ///
    /// Returns the entity with its generated id written back. Custom fields
    /// without a flattened column are skipped.
    pub async fn create_entity<T: CustomEntity>(&self, mut entity: T) -> Result<(T, i64)> {
        let tables = EntityTables::new(T::KIND.as_str())?;
        let descriptor = T::descriptor();
        let values = descriptor
            .base_fields
            .iter()
            .map(|f| {
                entity
                    .base_value(f.column)
                    .ok_or_else(|| EntityError::mapping(f.field, "no value for base column"))
            })
            .collect::<Result<Vec<SqlValue>>>()?;

        let mut tx = self.pool.begin().await?;

        let sql = insert_base_sql(&tables, descriptor);
        debug!(sql = %sql, "inserting base row");
        let row = bind_all(sqlx::query(&sql), &values)
            .fetch_one(&mut *tx)
            .await?;
        let id: i64 = row.get("id");
        entity.set_id(id);

        if !entity.custom_fields().is_empty() {
            let types = flattened_column_types(&mut *tx, &tables).await?;
            for (name, value) in &entity.custom_fields().custom_fields {
                write_attribute(&mut tx, &tables, &types, id, name, value).await?;
            }
        }

        tx.commit().await?;
        info!(entity_type = T::KIND.as_str(), id, "entity created");
        Ok((entity, id))
    }

    /// Apply base field and custom field updates, then reload the entity
    pub async fn patch_entity<T: CustomEntity>(
        &self,
        id: i64,
        updates: &Map<String, JsonValue>,
    ) -> Result<T> {
        let tables = EntityTables::new(T::KIND.as_str())?;
        let plan = plan_patch(T::descriptor(), updates);

        let mut tx = self.pool.begin().await?;

        let lock_sql = format!("SELECT id FROM {} WHERE id = $1 FOR UPDATE", quote(&tables.base()));
        sqlx::query(&lock_sql)
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| EntityError::NotFound {
                entity_type: T::KIND.as_str().to_string(),
                id,
            })?;

        if !plan.base.is_empty() {
            let mut values = Vec::with_capacity(plan.base.len() + 1);
            for (field, value) in &plan.base {
                values.push(field.kind.to_sql_value(field.column, value)?);
            }
            values.push(SqlValue::BigInt(Some(id)));

            let columns: Vec<&str> = plan.base.iter().map(|(f, _)| f.column).collect();
            let sql = update_base_sql(&tables, &columns);
            debug!(sql = %sql, id, "updating base row");
            bind_all(sqlx::query(&sql), &values)
                .execute(&mut *tx)
                .await?;
        }

        if !plan.custom_fields.is_empty() {
            let types = flattened_column_types(&mut *tx, &tables).await?;
            for (name, value) in &plan.custom_fields {
                write_attribute(&mut tx, &tables, &types, id, name, value).await?;
            }
        }

        tx.commit().await?;
        info!(
            entity_type = T::KIND.as_str(),
            id,
            base_fields = plan.base.len(),
            custom_fields = plan.custom_fields.len(),
            "entity patched"
        );

        self.get_entity(id).await
    }

    /// [`get_entity`](Self::get_entity) dispatched on a type name
    pub async fn get_entity_by_name(&self, entity_type: &str, id: i64) -> Result<AnyEntity> {
        Ok(match EntityKind::from_name(entity_type)? {
            EntityKind::Character => self.get_entity::<Character>(id).await?.into_any(),
            EntityKind::CharacterProfile => {
                self.get_entity::<CharacterProfile>(id).await?.into_any()
            }
            EntityKind::Episode => self.get_entity::<Episode>(id).await?.into_any(),
        })
    }

    /// Create an entity from its JSON representation
    pub async fn create_entity_json(
        &self,
        entity_type: &str,
        document: JsonValue,
    ) -> Result<(AnyEntity, i64)> {
        let kind = EntityKind::from_name(entity_type)?;
        Ok(match AnyEntity::from_json(kind, document)? {
            AnyEntity::Character(e) => self.create_any(e).await?,
            AnyEntity::CharacterProfile(e) => self.create_any(e).await?,
            AnyEntity::Episode(e) => self.create_any(e).await?,
        })
    }

    /// [`patch_entity`](Self::patch_entity) dispatched on a type name
    pub async fn patch_entity_by_name(
        &self,
        entity_type: &str,
        id: i64,
        updates: &Map<String, JsonValue>,
    ) -> Result<AnyEntity> {
        Ok(match EntityKind::from_name(entity_type)? {
            EntityKind::Character => self.patch_entity::<Character>(id, updates).await?.into_any(),
            EntityKind::CharacterProfile => self
                .patch_entity::<CharacterProfile>(id, updates)
                .await?
                .into_any(),
            EntityKind::Episode => self.patch_entity::<Episode>(id, updates).await?.into_any(),
        })
    }

    async fn create_any<T: CustomEntity>(&self, entity: T) -> Result<(AnyEntity, i64)> {
        let (entity, id) = self.create_entity(entity).await?;
        Ok((entity.into_any(), id))
    }
}

/// Write one attribute as an EAV row, placed by the flattened column's type
async fn write_attribute(
    conn: &mut PgConnection,
    tables: &EntityTables,
    types: &HashMap<String, FieldType>,
    id: i64,
    name: &str,
    value: &JsonValue,
) -> Result<()> {
    let Some(&field_type) = types.get(name) else {
        warn!(
            entity_type = tables.entity_type(),
            field = name,
            "no flattened column for custom field, skipping"
        );
        return Ok(());
    };

    let attribute = match AttributeValue::coerce(field_type, value) {
        Some(attribute) => attribute,
        None => {
            if !value.is_null() {
                warn!(
                    entity_type = tables.entity_type(),
                    field = name,
                    field_type = %field_type,
                    "value does not fit field type, storing null"
                );
            }
            AttributeValue::empty(field_type)
        }
    };

    let mut values = vec![
        SqlValue::BigInt(Some(id)),
        SqlValue::Text(Some(name.to_string())),
        SqlValue::Text(Some(field_type.as_str().to_string())),
    ];
    values.extend(attribute.columns());

    let sql = upsert_attribute_sql(tables);
    bind_all(sqlx::query(&sql), &values)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

fn select_entity_sql(tables: &EntityTables, with_flattened: bool) -> String {
    if with_flattened {
        format!(
            "SELECT b.*, f.* FROM {} b LEFT JOIN {} f ON f.entity_id = b.id WHERE b.id = $1",
            quote(&tables.base()),
            quote(&tables.flattened())
        )
    } else {
        format!("SELECT b.* FROM {} b WHERE b.id = $1", quote(&tables.base()))
    }
}

fn insert_base_sql(tables: &EntityTables, descriptor: &EntityDescriptor) -> String {
    if descriptor.base_fields.is_empty() {
        return format!(
            "INSERT INTO {} DEFAULT VALUES RETURNING id",
            quote(&tables.base())
        );
    }
    let columns: Vec<String> = descriptor.columns().map(quote).collect();
    let params: Vec<String> = (1..=columns.len()).map(|i| format!("${}", i)).collect();
    format!(
        "INSERT INTO {} ({}) VALUES ({}) RETURNING id",
        quote(&tables.base()),
        columns.join(", "),
        params.join(", ")
    )
}

/// `UPDATE … SET` over `columns`, with the id bound last
fn update_base_sql(tables: &EntityTables, columns: &[&str]) -> String {
    let assignments: Vec<String> = columns
        .iter()
        .enumerate()
        .map(|(i, c)| format!("{} = ${}", quote(c), i + 1))
        .collect();
    format!(
        "UPDATE {} SET {} WHERE id = ${}",
        quote(&tables.base()),
        assignments.join(", "),
        columns.len() + 1
    )
}

fn upsert_attribute_sql(tables: &EntityTables) -> String {
    format!(
        "INSERT INTO {} (entity_id, field_machine_name, field_type, \
         value_int, value_decimal, value_string, value_text, value_date) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
         ON CONFLICT (entity_id, field_machine_name) DO UPDATE SET \
         field_type = EXCLUDED.field_type, \
         value_int = EXCLUDED.value_int, \
         value_decimal = EXCLUDED.value_decimal, \
         value_string = EXCLUDED.value_string, \
         value_text = EXCLUDED.value_text, \
         value_date = EXCLUDED.value_date",
        quote(&tables.main())
    )
}
