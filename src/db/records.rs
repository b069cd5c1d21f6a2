//! Repository for the placeholder `records` resource.
//!
//! The concrete HTTP surface of this service is intentionally generic; a
//! keyed text record is the smallest shape that exercises both transaction
//! outcomes end to end. Expected schema:
//!
//! ```sql
//! CREATE TABLE records_tb (
//!     record_id    BIGSERIAL PRIMARY KEY,
//!     record_key   TEXT NOT NULL,
//!     record_value TEXT NOT NULL,
//!     created_at   TIMESTAMPTZ NOT NULL DEFAULT now()
//! );
//! ```

use chrono::{DateTime, Utc};
use sqlx::{PgConnection, Row};

/// One stored record.
#[derive(Debug, Clone)]
pub struct Record {
    pub record_id: i64,
    pub key: String,
    pub value: String,
    pub created_at: DateTime<Utc>,
}

fn record_from_row(row: &sqlx::postgres::PgRow) -> Record {
    Record {
        record_id: row.get("record_id"),
        key: row.get("record_key"),
        value: row.get("record_value"),
        created_at: row.get("created_at"),
    }
}

/// Record repository for CRUD operations. All functions run on a borrowed
/// connection inside the caller's transaction boundary.
pub struct RecordRepository;

impl RecordRepository {
    /// Insert a record, returning the stored row.
    pub async fn insert(
        conn: &mut PgConnection,
        key: &str,
        value: &str,
    ) -> Result<Record, sqlx::Error> {
        let row = sqlx::query(
            r#"INSERT INTO records_tb (record_key, record_value) VALUES ($1, $2)
               RETURNING record_id, record_key, record_value, created_at"#,
        )
        .bind(key)
        .bind(value)
        .fetch_one(&mut *conn)
        .await?;

        Ok(record_from_row(&row))
    }

    /// Get a record by ID.
    pub async fn get_by_id(
        conn: &mut PgConnection,
        record_id: i64,
    ) -> Result<Option<Record>, sqlx::Error> {
        let row = sqlx::query(
            r#"SELECT record_id, record_key, record_value, created_at
               FROM records_tb WHERE record_id = $1"#,
        )
        .bind(record_id)
        .fetch_optional(&mut *conn)
        .await?;

        Ok(row.as_ref().map(record_from_row))
    }

    /// Delete a record by ID. Returns whether a row was removed.
    pub async fn delete(conn: &mut PgConnection, record_id: i64) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM records_tb WHERE record_id = $1")
            .bind(record_id)
            .execute(&mut *conn)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
