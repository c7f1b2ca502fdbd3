//! SQL text for the per-type tables, trigger functions and triggers
//!
//! Every name interpolated here comes from an [`EntityTables`] or a
//! validated [`FieldConfig`]; nothing else reaches these builders.

use crate::entities::FieldConfig;
use crate::field_type::FieldType;
use crate::identifier::{quote, EntityTables};
use crate::registry::EntityDescriptor;

/// Main-table events that keep the flattened projection in sync
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerEvent {
    Insert,
    Update,
    Delete,
}

impl TriggerEvent {
    pub const ALL: [TriggerEvent; 3] = [Self::Insert, Self::Update, Self::Delete];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Insert => "insert",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }

    fn keyword(self) -> &'static str {
        match self {
            Self::Insert => "INSERT",
            Self::Update => "UPDATE",
            Self::Delete => "DELETE",
        }
    }

    fn function(self, tables: &EntityTables) -> String {
        match self {
            Self::Insert | Self::Update => tables.upsert_function(),
            Self::Delete => tables.delete_function(),
        }
    }
}

pub fn create_base_table(tables: &EntityTables, descriptor: &EntityDescriptor) -> String {
    let mut columns = vec!["id BIGSERIAL PRIMARY KEY".to_string()];
    columns.extend(
        descriptor
            .base_fields
            .iter()
            .map(|f| format!("{} {}", quote(f.column), f.kind.column_definition())),
    );
    format!(
        "CREATE TABLE IF NOT EXISTS {} ({})",
        quote(&tables.base()),
        columns.join(", ")
    )
}

pub fn create_main_table(tables: &EntityTables) -> String {
    format!(
        r#"CREATE TABLE IF NOT EXISTS {} (
    entity_id BIGINT NOT NULL,
    field_machine_name VARCHAR(255) NOT NULL,
    field_type VARCHAR(10) NOT NULL,
    value_int INTEGER,
    value_decimal NUMERIC(10,2),
    value_string VARCHAR(255),
    value_text TEXT,
    value_date TIMESTAMP,
    PRIMARY KEY (entity_id, field_machine_name)
)"#,
        quote(&tables.main())
    )
}

/// Flattened table with one column per configured field
pub fn create_flattened_table(tables: &EntityTables, fields: &[FieldConfig]) -> String {
    let mut columns = vec!["entity_id BIGINT PRIMARY KEY".to_string()];
    columns.extend(fields.iter().map(|f| {
        format!(
            "{} {}",
            quote(&f.machine_field_name),
            f.logical_type().sql_type()
        )
    }));
    format!(
        "CREATE TABLE IF NOT EXISTS {} ({})",
        quote(&tables.flattened()),
        columns.join(", ")
    )
}

pub fn add_column(tables: &EntityTables, column: &str, field_type: FieldType) -> String {
    format!(
        "ALTER TABLE {} ADD COLUMN IF NOT EXISTS {} {}",
        quote(&tables.flattened()),
        quote(column),
        field_type.sql_type()
    )
}

pub fn drop_column(tables: &EntityTables, column: &str) -> String {
    format!(
        "ALTER TABLE {} DROP COLUMN IF EXISTS {}",
        quote(&tables.flattened()),
        quote(column)
    )
}

pub fn drop_trigger(tables: &EntityTables, event: TriggerEvent) -> String {
    format!(
        "DROP TRIGGER IF EXISTS {} ON {}",
        quote(&tables.trigger(event.as_str())),
        quote(&tables.main())
    )
}

pub fn create_trigger(tables: &EntityTables, event: TriggerEvent) -> String {
    format!(
        "CREATE TRIGGER {} AFTER {} ON {} FOR EACH ROW EXECUTE FUNCTION {}()",
        quote(&tables.trigger(event.as_str())),
        event.keyword(),
        quote(&tables.main()),
        quote(&event.function(tables))
    )
}

/// Insert/update function: make sure the flattened row exists, then copy
/// the value column of the matching field
pub fn upsert_function(tables: &EntityTables, fields: &[FieldConfig]) -> String {
    let flattened = quote(&tables.flattened());
    let mut body = format!(
        "    INSERT INTO {flattened} (entity_id) VALUES (NEW.entity_id) \
         ON CONFLICT (entity_id) DO NOTHING;\n"
    );
    for field in fields {
        body.push_str(&format!(
            "    IF NEW.field_machine_name = '{name}' THEN\n        \
             UPDATE {flattened} SET {column} = NEW.{value} WHERE entity_id = NEW.entity_id;\n    \
             END IF;\n",
            name = field.machine_field_name,
            column = quote(&field.machine_field_name),
            value = field.logical_type().value_column(),
        ));
    }
    plpgsql_function(&tables.upsert_function(), &body, "NEW")
}

/// Delete function: null the matching column, keep the row
pub fn delete_function(tables: &EntityTables, fields: &[FieldConfig]) -> String {
    let flattened = quote(&tables.flattened());
    let mut body = String::new();
    for field in fields {
        body.push_str(&format!(
            "    IF OLD.field_machine_name = '{name}' THEN\n        \
             UPDATE {flattened} SET {column} = NULL WHERE entity_id = OLD.entity_id;\n    \
             END IF;\n",
            name = field.machine_field_name,
            column = quote(&field.machine_field_name),
        ));
    }
    plpgsql_function(&tables.delete_function(), &body, "OLD")
}

fn plpgsql_function(name: &str, body: &str, returns: &str) -> String {
    format!(
        "CREATE OR REPLACE FUNCTION {}() RETURNS TRIGGER AS $$\nBEGIN\n{}    RETURN {};\nEND;\n$$ LANGUAGE plpgsql",
        quote(name),
        body,
        returns
    )
}
