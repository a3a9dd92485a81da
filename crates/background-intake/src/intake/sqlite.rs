use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use tracing::{debug, info};

use super::gateway::{ColumnValue, SubmissionRecord};
use super::storage::{StoreError, SubmissionStore};

const SCHEMA_SQL: &str = include_str!("sql/schema.sql");
const TABLE_PLACEHOLDER: &str = "__SUBMISSIONS_TABLE__";

/// Submissions table backed by a SQLite database.
#[derive(Debug, Clone)]
pub struct SqliteSubmissionStore {
    pool: SqlitePool,
}

/// Accepts plain SQL identifiers only, since table names are interpolated.
pub fn validate_table_name(table: &str) -> Result<(), StoreError> {
    let mut chars = table.chars();
    let valid = match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {
            chars.all(|ch| ch.is_ascii_alphanumeric() || ch == '_')
        }
        _ => false,
    };
    if valid {
        Ok(())
    } else {
        Err(StoreError::InvalidTable(table.to_string()))
    }
}

impl SqliteSubmissionStore {
    /// Open (creating if needed) the database and ensure `table` exists.
    pub async fn connect(url: &str, table: &str) -> Result<Self, StoreError> {
        validate_table_name(table)?;
        let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);

        let pool = if url.contains(":memory:") {
            // Every pooled connection would get its own empty in-memory database.
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None::<Duration>)
                .max_lifetime(None::<Duration>)
                .connect_with(options)
                .await?
        } else {
            SqlitePoolOptions::new()
                .max_connections(5)
                .connect_with(options)
                .await?
        };

        let store = Self { pool };
        store.migrate(table).await?;
        Ok(store)
    }

    pub async fn migrate(&self, table: &str) -> Result<(), StoreError> {
        validate_table_name(table)?;
        let schema = SCHEMA_SQL.replace(TABLE_PLACEHOLDER, table);
        for statement in schema.split(';') {
            let sql = statement.trim();
            if sql.is_empty() {
                continue;
            }
            sqlx::query(sql).execute(&self.pool).await?;
        }
        info!(table, "submissions schema ready");
        Ok(())
    }

    pub async fn count(&self, table: &str) -> Result<i64, StoreError> {
        validate_table_name(table)?;
        let sql = format!("SELECT COUNT(*) FROM {table}");
        let total = sqlx::query_scalar::<_, i64>(&sql)
            .fetch_one(&self.pool)
            .await?;
        Ok(total)
    }
}

#[async_trait]
impl SubmissionStore for SqliteSubmissionStore {
    async fn insert(&self, table: &str, record: &SubmissionRecord) -> Result<(), StoreError> {
        validate_table_name(table)?;
        let columns = record.columns();
        let names = columns
            .iter()
            .map(|(name, _)| name.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        let placeholders = vec!["?"; columns.len()].join(", ");
        let sql = format!("INSERT INTO {table} ({names}) VALUES ({placeholders})");

        let mut query = sqlx::query(&sql);
        for (_, value) in columns {
            query = match value {
                ColumnValue::Text(value) => query.bind(value),
                ColumnValue::Integer(value) => query.bind(value),
                ColumnValue::Boolean(value) => query.bind(value),
            };
        }
        let result = query.execute(&self.pool).await?;
        debug!(table, rows = result.rows_affected(), "submission row inserted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_names_must_be_plain_identifiers() {
        assert!(validate_table_name("form_submissions").is_ok());
        assert!(validate_table_name("_staging2").is_ok());
        assert!(validate_table_name("").is_err());
        assert!(validate_table_name("2fast").is_err());
        assert!(validate_table_name("subs; DROP TABLE x").is_err());
    }

    #[tokio::test]
    async fn connect_rejects_bad_table_before_opening() {
        let result = SqliteSubmissionStore::connect("sqlite::memory:", "bad-name").await;
        assert!(matches!(result, Err(StoreError::InvalidTable(_))));
    }

    #[tokio::test]
    async fn migrate_is_idempotent() {
        let store = SqliteSubmissionStore::connect("sqlite::memory:", "form_submissions")
            .await
            .expect("in-memory database");
        store
            .migrate("form_submissions")
            .await
            .expect("second migrate is a no-op");
        assert_eq!(store.count("form_submissions").await.expect("count"), 0);
    }
}
