//! Schema Manager
//!
//! Owns the DDL for `<type>_base`, `<type>_main` and `<type>_flattened` and
//! the trigger functions that keep the flattened projection in sync with
//! the main table.
//!
//! Schema-mutating calls for one entity type are serialised with a session
//! advisory lock. Statements inside a call still autocommit one by one, so an
//! interrupted migration leaves a valid, partially migrated table that the
//! next call finishes.

use sqlx::pool::PoolConnection;
use sqlx::{PgConnection, PgExecutor, PgPool, Postgres, Row};
use std::collections::HashMap;
use tracing::{debug, info, warn};

pub mod ddl;
pub mod diff;

pub use diff::{ColumnDiff, MigrationReport};

use crate::entities::FieldConfig;
use crate::error::{EntityError, Result};
use crate::field_type::FieldType;
use crate::identifier::EntityTables;
use crate::registry::EntityKind;
use ddl::TriggerEvent;

/// Key column of the flattened table
pub const FLATTENED_KEY_COLUMN: &str = "entity_id";

/// Creates and migrates the physical structures of entity types
#[derive(Clone, Debug)]
pub struct SchemaManager {
    pool: PgPool,
}

impl SchemaManager {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create the main and flattened tables for a type installed for the
    /// first time, then generate its triggers
    ///
    /// A type whose flattened table already exists is migrated to `fields`
    /// as [`update_flattened_table`](Self::update_flattened_table) would.
    pub async fn generate_entity_tables(
        &self,
        fields: &[FieldConfig],
        entity_type: &str,
    ) -> Result<MigrationReport> {
        let tables = EntityTables::new(entity_type)?;
        let mut lock = SchemaLock::acquire(&self.pool, &tables).await?;
        let result = generate_locked(lock.conn(), &tables, fields).await;
        lock.release().await?;
        result
    }

    /// Bring the flattened table's columns in line with `fields`, then
    /// regenerate the triggers
    pub async fn update_flattened_table(
        &self,
        fields: &[FieldConfig],
        entity_type: &str,
    ) -> Result<MigrationReport> {
        let tables = EntityTables::new(entity_type)?;
        let mut lock = SchemaLock::acquire(&self.pool, &tables).await?;
        let result = update_locked(lock.conn(), &tables, fields).await;
        lock.release().await?;
        result
    }

    /// Drop and recreate the three sync triggers from `fields`
    pub async fn update_triggers(&self, fields: &[FieldConfig], entity_type: &str) -> Result<()> {
        let tables = EntityTables::new(entity_type)?;
        let mut lock = SchemaLock::acquire(&self.pool, &tables).await?;
        let result = regenerate_triggers(lock.conn(), &tables, fields).await;
        lock.release().await?;
        result
    }

    /// Install path for a stored template: generate when the flattened table
    /// is missing, migrate otherwise
    pub async fn apply_config(
        &self,
        fields: &[FieldConfig],
        entity_type: &str,
    ) -> Result<MigrationReport> {
        let tables = EntityTables::new(entity_type)?;
        let mut lock = SchemaLock::acquire(&self.pool, &tables).await?;
        let result = match table_exists_in(lock.conn(), &tables.flattened()).await {
            Ok(true) => update_locked(lock.conn(), &tables, fields).await,
            Ok(false) => generate_locked(lock.conn(), &tables, fields).await,
            Err(e) => Err(e),
        };
        lock.release().await?;
        result
    }

    /// Create `<type>_base` from the registered descriptor
    pub async fn ensure_base_table(&self, kind: EntityKind) -> Result<()> {
        let tables = EntityTables::new(kind.as_str())?;
        let sql = ddl::create_base_table(&tables, kind.descriptor());
        let mut conn = self.pool.acquire().await?;
        run_ddl(&mut conn, &sql, format!("create table {}", tables.base())).await?;
        info!(entity_type = kind.as_str(), "base table ready");
        Ok(())
    }

    pub async fn flattened_table_exists(&self, entity_type: &str) -> Result<bool> {
        let tables = EntityTables::new(entity_type)?;
        table_exists_in(&self.pool, &tables.flattened()).await
    }

    /// Non-key columns of the flattened table, in table order
    pub async fn existing_columns(&self, entity_type: &str) -> Result<Vec<String>> {
        let tables = EntityTables::new(entity_type)?;
        flattened_columns(&self.pool, &tables).await
    }

    /// Logical type of every non-key flattened column, read from the catalog
    pub async fn column_types(&self, entity_type: &str) -> Result<HashMap<String, FieldType>> {
        let tables = EntityTables::new(entity_type)?;
        flattened_column_types(&self.pool, &tables).await
    }
}

/// A pooled connection holding the schema lock of one entity type
struct SchemaLock {
    conn: PoolConnection<Postgres>,
    key: String,
    released: bool,
}

impl SchemaLock {
    async fn acquire(pool: &PgPool, tables: &EntityTables) -> Result<Self> {
        let key = tables.lock_name();
        let mut conn = pool.acquire().await?;
        sqlx::query("SELECT pg_advisory_lock(hashtext($1))")
            .bind(&key)
            .execute(&mut *conn)
            .await
            .map_err(|e| EntityError::schema(format!("acquire lock {}", key), e))?;
        debug!(lock = %key, "schema lock acquired");
        Ok(Self {
            conn,
            key,
            released: false,
        })
    }

    fn conn(&mut self) -> &mut PgConnection {
        &mut self.conn
    }

    async fn release(mut self) -> Result<()> {
        sqlx::query("SELECT pg_advisory_unlock(hashtext($1))")
            .bind(&self.key)
            .execute(&mut *self.conn)
            .await
            .map_err(|e| EntityError::schema(format!("release lock {}", self.key), e))?;
        self.released = true;
        debug!(lock = %self.key, "schema lock released");
        Ok(())
    }
}

impl Drop for SchemaLock {
    fn drop(&mut self) {
        // A session lock only goes away with the session.
        if !self.released {
            warn!(lock = %self.key, "schema lock not released, closing connection");
            self.conn.close_on_drop();
        }
    }
}

async fn run_ddl(conn: &mut PgConnection, sql: &str, action: impl Into<String>) -> Result<()> {
    debug!(sql = %sql, "executing DDL");
    sqlx::query(sql)
        .persistent(false)
        .execute(&mut *conn)
        .await
        .map_err(|e| EntityError::schema(action, e))?;
    Ok(())
}

async fn generate_locked(
    conn: &mut PgConnection,
    tables: &EntityTables,
    fields: &[FieldConfig],
) -> Result<MigrationReport> {
    run_ddl(
        conn,
        &ddl::create_main_table(tables),
        format!("create table {}", tables.main()),
    )
    .await?;

    // An existing flattened table keeps its columns under IF NOT EXISTS, so
    // it has to be diffed for the triggers to match it.
    if table_exists_in(&mut *conn, &tables.flattened()).await? {
        debug!(
            entity_type = tables.entity_type(),
            "flattened table already exists, migrating it"
        );
        return update_locked(conn, tables, fields).await;
    }

    run_ddl(
        conn,
        &ddl::create_flattened_table(tables, fields),
        format!("create table {}", tables.flattened()),
    )
    .await?;

    regenerate_triggers(conn, tables, fields).await?;

    info!(
        entity_type = tables.entity_type(),
        columns = fields.len(),
        "entity tables generated"
    );
    Ok(MigrationReport {
        entity_type: tables.entity_type().to_string(),
        tables_created: true,
        added: fields.iter().map(|f| f.machine_field_name.clone()).collect(),
        dropped: Vec::new(),
        triggers_regenerated: true,
    })
}

async fn update_locked(
    conn: &mut PgConnection,
    tables: &EntityTables,
    fields: &[FieldConfig],
) -> Result<MigrationReport> {
    let existing = flattened_columns(&mut *conn, tables).await?;
    let diff = ColumnDiff::compute(&existing, fields);

    for (column, field_type) in &diff.to_add {
        run_ddl(
            conn,
            &ddl::add_column(tables, column, *field_type),
            format!("add column {}.{}", tables.flattened(), column),
        )
        .await?;
        info!(entity_type = tables.entity_type(), column = %column, field_type = %field_type, "column added");
    }

    for column in &diff.to_drop {
        run_ddl(
            conn,
            &ddl::drop_column(tables, column),
            format!("drop column {}.{}", tables.flattened(), column),
        )
        .await?;
        info!(entity_type = tables.entity_type(), column = %column, "column dropped");
    }

    regenerate_triggers(conn, tables, fields).await?;

    if diff.is_empty() {
        debug!(entity_type = tables.entity_type(), "flattened table already current");
    }
    Ok(MigrationReport {
        entity_type: tables.entity_type().to_string(),
        tables_created: false,
        added: diff.to_add.into_iter().map(|(name, _)| name).collect(),
        dropped: diff.to_drop,
        triggers_regenerated: true,
    })
}

async fn regenerate_triggers(
    conn: &mut PgConnection,
    tables: &EntityTables,
    fields: &[FieldConfig],
) -> Result<()> {
    for event in TriggerEvent::ALL {
        run_ddl(
            conn,
            &ddl::drop_trigger(tables, event),
            format!("drop trigger {}", tables.trigger(event.as_str())),
        )
        .await?;
    }

    run_ddl(
        conn,
        &ddl::upsert_function(tables, fields),
        format!("create function {}", tables.upsert_function()),
    )
    .await?;
    run_ddl(
        conn,
        &ddl::delete_function(tables, fields),
        format!("create function {}", tables.delete_function()),
    )
    .await?;

    for event in TriggerEvent::ALL {
        run_ddl(
            conn,
            &ddl::create_trigger(tables, event),
            format!("create trigger {}", tables.trigger(event.as_str())),
        )
        .await?;
    }

    info!(
        entity_type = tables.entity_type(),
        fields = fields.len(),
        "triggers regenerated"
    );
    Ok(())
}

pub(crate) async fn table_exists_in<'e, E: PgExecutor<'e>>(executor: E, table: &str) -> Result<bool> {
    let row = sqlx::query(
        r#"
        SELECT EXISTS (
            SELECT 1 FROM information_schema.tables
            WHERE table_schema = current_schema() AND table_name = $1
        ) AS present
        "#,
    )
    .bind(table)
    .fetch_one(executor)
    .await?;
    Ok(row.get::<bool, _>("present"))
}

async fn catalog_columns<'e, E: PgExecutor<'e>>(
    executor: E,
    table: &str,
) -> Result<Vec<(String, String)>> {
    let rows = sqlx::query(
        r#"
        SELECT column_name::text AS column_name, data_type::text AS data_type
        FROM information_schema.columns
        WHERE table_schema = current_schema() AND table_name = $1
        ORDER BY ordinal_position
        "#,
    )
    .bind(table)
    .fetch_all(executor)
    .await?;

    Ok(rows
        .iter()
        .map(|r| (r.get::<String, _>("column_name"), r.get::<String, _>("data_type")))
        .collect())
}

pub(crate) async fn flattened_columns<'e, E: PgExecutor<'e>>(
    executor: E,
    tables: &EntityTables,
) -> Result<Vec<String>> {
    Ok(catalog_columns(executor, &tables.flattened())
        .await?
        .into_iter()
        .map(|(name, _)| name)
        .filter(|name| name != FLATTENED_KEY_COLUMN)
        .collect())
}

pub(crate) async fn flattened_column_types<'e, E: PgExecutor<'e>>(
    executor: E,
    tables: &EntityTables,
) -> Result<HashMap<String, FieldType>> {
    Ok(catalog_columns(executor, &tables.flattened())
        .await?
        .into_iter()
        .filter(|(name, _)| name != FLATTENED_KEY_COLUMN)
        .map(|(name, data_type)| (name, FieldType::from_catalog_type(&data_type)))
        .collect())
}
