//! Shared setup for tests that need a live PostgreSQL
//!
//! Every test gets its own schema, selected through `search_path` on each
//! pooled connection, so tests can run in parallel against one database.

#![allow(dead_code)]

use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use cuento_entity::EntityEngine;

pub struct TestDb {
    pub pool: PgPool,
    pub schema: String,
    admin: PgPool,
}

impl TestDb {
    pub async fn new() -> Self {
        let database_url =
            std::env::var("DATABASE_URL").expect("DATABASE_URL must be set for integration tests");

        let admin = PgPool::connect(&database_url)
            .await
            .expect("Failed to connect to database");

        let schema = format!("entity_test_{}", Uuid::new_v4().simple());
        sqlx::query(&format!("CREATE SCHEMA \"{}\"", schema))
            .execute(&admin)
            .await
            .expect("Failed to create test schema");

        let search_path = schema.clone();
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .after_connect(move |conn, _meta| {
                let sql = format!("SET search_path TO \"{}\"", search_path);
                Box::pin(async move {
                    sqlx::query(&sql).execute(conn).await?;
                    Ok(())
                })
            })
            .connect(&database_url)
            .await
            .expect("Failed to connect test pool");

        Self {
            pool,
            schema,
            admin,
        }
    }

    /// Engine with the config table and every base table installed
    pub async fn engine(&self) -> EntityEngine {
        let engine = EntityEngine::new(self.pool.clone());
        engine.install().await.expect("install failed");
        engine
    }

    pub async fn count(&self, table: &str) -> i64 {
        sqlx::query(&format!("SELECT COUNT(*) AS n FROM \"{}\"", table))
            .fetch_one(&self.pool)
            .await
            .expect("count failed")
            .get("n")
    }

    /// Trigger names on a table, one entry per trigger
    pub async fn triggers(&self, table: &str) -> Vec<String> {
        let rows = sqlx::query(
            r#"
            SELECT DISTINCT trigger_name::text AS trigger_name
            FROM information_schema.triggers
            WHERE event_object_schema = $1 AND event_object_table = $2
            ORDER BY 1
            "#,
        )
        .bind(&self.schema)
        .bind(table)
        .fetch_all(&self.pool)
        .await
        .expect("trigger lookup failed");
        rows.iter().map(|r| r.get("trigger_name")).collect()
    }

    /// `information_schema` data type of one column
    pub async fn column_type(&self, table: &str, column: &str) -> Option<String> {
        sqlx::query(
            r#"
            SELECT data_type::text AS data_type
            FROM information_schema.columns
            WHERE table_schema = $1 AND table_name = $2 AND column_name = $3
            "#,
        )
        .bind(&self.schema)
        .bind(table)
        .bind(column)
        .fetch_optional(&self.pool)
        .await
        .expect("column lookup failed")
        .map(|r| r.get("data_type"))
    }

    pub async fn teardown(self) {
        self.pool.close().await;
        let _ = sqlx::query(&format!("DROP SCHEMA \"{}\" CASCADE", self.schema))
            .execute(&self.admin)
            .await;
        self.admin.close().await;
    }
}
