//! PostgreSQL backend
//!
//! One connection pool per shard. Entity rows keep their field map in a
//! JSONB column; index tables hold one JSONB column per indexed field plus
//! the owning entity id. See [`crate::sql::ddl::DdlGenerator`] for the
//! expected table shapes.

use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;

use crate::backend::Backend;
use crate::error::{Result, StoreError};
use crate::id::EntityId;
use crate::index::IndexRow;
use crate::sql::sanitize::quote_identifier;
use crate::types::{Entity, Fields, Value};

/// Column holding the owning entity id in every index table
pub const ENTITY_ID_COLUMN: &str = "entity_id";

/// One Postgres shard
#[derive(Debug, Clone)]
pub struct PostgresBackend {
    pool: PgPool,
}

impl PostgresBackend {
    /// Connect to a shard
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .connect(database_url)
            .await
            .map_err(|e| StoreError::backend(format!("Database connection failed: {}", e)))?;
        Ok(Self { pool })
    }

    /// Wrap an existing pool
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Get a reference to the connection pool
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    fn row_to_entity(row: &PgRow) -> Result<Entity> {
        let id: String = row.try_get("id")?;
        let fields: serde_json::Value = row.try_get("fields")?;

        Ok(Entity {
            id: EntityId::parse(&id)?,
            tag: row.try_get("tag")?,
            fields: Fields::try_from(fields)?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    /// `"c1" = $1 AND "c2" = $2 ...` starting at placeholder `first`
    fn key_predicate(key: &[(String, Value)], first: usize) -> String {
        key.iter()
            .enumerate()
            .map(|(i, (column, _))| format!("{} = ${}", quote_identifier(column), first + i))
            .collect::<Vec<_>>()
            .join(" AND ")
    }
}

impl Backend for PostgresBackend {
    async fn upsert_entity(&self, table: &str, entity: &Entity) -> Result<()> {
        let sql = format!(
            r#"
            INSERT INTO {} (id, tag, fields, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (id) DO UPDATE
            SET tag = EXCLUDED.tag, fields = EXCLUDED.fields, updated_at = EXCLUDED.updated_at
            "#,
            quote_identifier(table)
        );

        sqlx::query(&sql)
            .bind(entity.id.to_string())
            .bind(entity.tag)
            .bind(serde_json::to_value(&entity.fields)?)
            .bind(entity.created_at)
            .bind(entity.updated_at)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn get_entity(&self, table: &str, id: &EntityId) -> Result<Option<Entity>> {
        let sql = format!(
            "SELECT id, tag, fields, created_at, updated_at FROM {} WHERE id = $1",
            quote_identifier(table)
        );

        let row = sqlx::query(&sql)
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(Self::row_to_entity).transpose()
    }

    async fn delete_entity(&self, table: &str, id: &EntityId) -> Result<()> {
        let sql = format!("DELETE FROM {} WHERE id = $1", quote_identifier(table));
        sqlx::query(&sql)
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn upsert_index_row(&self, table: &str, row: &IndexRow) -> Result<()> {
        let mut columns: Vec<String> = row.key.iter().map(|(c, _)| quote_identifier(c)).collect();
        columns.push(ENTITY_ID_COLUMN.to_string());
        let placeholders: Vec<String> = (1..=columns.len()).map(|i| format!("${}", i)).collect();

        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({}) ON CONFLICT DO NOTHING",
            quote_identifier(table),
            columns.join(", "),
            placeholders.join(", ")
        );

        let mut query = sqlx::query(&sql);
        for (_, value) in &row.key {
            query = query.bind(serde_json::to_value(value)?);
        }
        query
            .bind(row.entity_id.to_string())
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn delete_index_row(&self, table: &str, row: &IndexRow) -> Result<()> {
        let sql = format!(
            "DELETE FROM {} WHERE {} AND {} = ${}",
            quote_identifier(table),
            Self::key_predicate(&row.key, 1),
            ENTITY_ID_COLUMN,
            row.key.len() + 1
        );

        let mut query = sqlx::query(&sql);
        for (_, value) in &row.key {
            query = query.bind(serde_json::to_value(value)?);
        }
        query
            .bind(row.entity_id.to_string())
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn lookup_index(&self, table: &str, key: &[(String, Value)]) -> Result<Vec<EntityId>> {
        let sql = format!(
            "SELECT {} FROM {} WHERE {} ORDER BY {}",
            ENTITY_ID_COLUMN,
            quote_identifier(table),
            Self::key_predicate(key, 1),
            ENTITY_ID_COLUMN
        );

        let mut query = sqlx::query(&sql);
        for (_, value) in key {
            query = query.bind(serde_json::to_value(value)?);
        }
        let rows = query.fetch_all(&self.pool).await?;

        rows.iter()
            .map(|row| {
                let id: String = row.try_get(ENTITY_ID_COLUMN)?;
                EntityId::parse(&id)
            })
            .collect()
    }
}
