//! Document store backed by PostgreSQL.
//!
//! The status record lives in a JSONB column so single fields can be set and
//! removed in place with `jsonb_set` and `#-`. Forecast documents are rows
//! keyed by cell id.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::{postgres::PgPoolOptions, types::Json, FromRow, PgPool};
use tracing::{debug, instrument, warn};

use crate::documents::{DocumentStore, ForecastDocument, StatusDocument, StatusField, STATUS_ID};
use crate::error::{StoreError, StoreResult};

/// Database connection pool and document operations.
pub struct PgDocumentStore {
    pool: PgPool,
}

impl PgDocumentStore {
    /// Create a new store from a database URL.
    pub async fn connect(database_url: &str) -> StoreResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await
            .map_err(|e| StoreError::from_sqlx("Connection failed", e))?;

        Ok(Self { pool })
    }

    /// Create tables and seed the status record if it does not exist yet.
    pub async fn migrate(&self) -> StoreResult<()> {
        // Split SQL statements and execute them individually
        for statement in SCHEMA_SQL.split(';') {
            let trimmed = statement.trim();
            if !trimmed.is_empty() {
                sqlx::query(trimmed)
                    .execute(&self.pool)
                    .await
                    .map_err(|e| StoreError::from_sqlx("Migration failed", e))?;
            }
        }

        sqlx::query(
            "INSERT INTO status_documents (id, body) VALUES ($1, $2) ON CONFLICT (id) DO NOTHING",
        )
        .bind(STATUS_ID)
        .bind(Json(StatusDocument::initial_json()))
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::from_sqlx("Status seed failed", e))?;

        Ok(())
    }

    async fn upsert_one(&self, doc: &ForecastDocument) -> Result<(), sqlx::Error> {
        sqlx::query(UPSERT_FORECAST_SQL)
            .bind(&doc.id)
            .bind(doc.forecast_start)
            .bind(&doc.temp_times_encoded)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for PgDocumentStore {
    #[instrument(skip(self))]
    async fn find_status(&self) -> StoreResult<StatusDocument> {
        let body = sqlx::query_scalar::<_, Json<StatusDocument>>(
            "SELECT body FROM status_documents WHERE id = $1",
        )
        .bind(STATUS_ID)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StoreError::from_sqlx("Status query failed", e))?;

        body.map(|Json(doc)| doc)
            .ok_or_else(|| StoreError::NotFound(format!("document '{}'", STATUS_ID)))
    }

    #[instrument(skip(self, value), fields(path = %field.path()))]
    async fn set_status_field(&self, field: &StatusField, value: Value) -> StoreResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE status_documents
            SET body = jsonb_set(
                body || jsonb_build_object('globalCharts', COALESCE(body->'globalCharts', '{}'::jsonb)),
                $2::text[], $3, true)
            WHERE id = $1
            "#,
        )
        .bind(STATUS_ID)
        .bind(field.segments())
        .bind(Json(value))
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::from_sqlx("Status update failed", e))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("document '{}'", STATUS_ID)));
        }
        debug!("Status field set");
        Ok(())
    }

    #[instrument(skip(self), fields(path = %field.path()))]
    async fn unset_status_field(&self, field: &StatusField) -> StoreResult<()> {
        sqlx::query("UPDATE status_documents SET body = body #- $2::text[] WHERE id = $1")
            .bind(STATUS_ID)
            .bind(field.segments())
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::from_sqlx("Status unset failed", e))?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn claim_update(&self) -> StoreResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE status_documents
            SET body = jsonb_set(body, '{isUpdating}', 'true'::jsonb, true)
            WHERE id = $1 AND COALESCE((body->>'isUpdating')::boolean, false) = false
            "#,
        )
        .bind(STATUS_ID)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::from_sqlx("Update claim failed", e))?;

        Ok(result.rows_affected() == 1)
    }

    #[instrument(skip(self, docs), fields(count = docs.len()))]
    async fn bulk_upsert_forecasts(&self, docs: &[ForecastDocument]) -> StoreResult<()> {
        let mut failed = 0;
        let mut first_error: Option<StoreError> = None;

        for doc in docs {
            if let Err(e) = self.upsert_one(doc).await {
                warn!(id = %doc.id, error = %e, "Forecast upsert failed");
                failed += 1;
                first_error.get_or_insert_with(|| StoreError::from_sqlx("Upsert failed", e));
            }
        }

        match first_error {
            None => Ok(()),
            Some(e) => Err(StoreError::BulkWrite {
                failed,
                total: docs.len(),
                first_error: e.to_string(),
            }),
        }
    }

    async fn find_forecast(&self, id: &str) -> StoreResult<Option<ForecastDocument>> {
        let row = sqlx::query_as::<_, ForecastRow>(
            "SELECT id, forecast_start, temp_times_encoded FROM forecasts WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StoreError::from_sqlx("Forecast query failed", e))?;

        Ok(row.map(|r| r.into()))
    }
}

/// Internal row type for forecast queries.
#[derive(FromRow)]
struct ForecastRow {
    id: String,
    forecast_start: DateTime<Utc>,
    temp_times_encoded: Vec<i32>,
}

impl From<ForecastRow> for ForecastDocument {
    fn from(row: ForecastRow) -> Self {
        ForecastDocument {
            id: row.id,
            forecast_start: row.forecast_start,
            temp_times_encoded: row.temp_times_encoded,
        }
    }
}

/// Insert a forecast or replace every column of the existing row.
const UPSERT_FORECAST_SQL: &str = r#"
INSERT INTO forecasts (id, forecast_start, temp_times_encoded)
VALUES ($1, $2, $3)
ON CONFLICT (id) DO UPDATE SET
    forecast_start = EXCLUDED.forecast_start,
    temp_times_encoded = EXCLUDED.temp_times_encoded,
    updated_at = NOW()
"#;

/// Database schema SQL.
const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS status_documents (
    id VARCHAR(50) PRIMARY KEY,
    body JSONB NOT NULL
);

CREATE TABLE IF NOT EXISTS forecasts (
    id VARCHAR(32) PRIMARY KEY,
    forecast_start TIMESTAMPTZ NOT NULL,
    temp_times_encoded INTEGER[] NOT NULL,
    updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
);

CREATE INDEX IF NOT EXISTS idx_forecasts_start ON forecasts(forecast_start DESC);
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upsert_refreshes_every_forecast_column() {
        let table = SCHEMA_SQL
            .split("CREATE TABLE IF NOT EXISTS forecasts (")
            .nth(1)
            .and_then(|rest| rest.split(");").next())
            .unwrap();
        let set_clause = UPSERT_FORECAST_SQL.split("DO UPDATE SET").nth(1).unwrap();

        for column in table.lines().filter_map(|l| l.split_whitespace().next()) {
            if column == "id" {
                continue;
            }
            assert!(
                set_clause.contains(&format!("{} =", column)),
                "{} is not refreshed on conflict",
                column
            );
        }
    }
}
