//! Geocoding provider configuration rows.
//!
//! Owned by the configuration surface; the pipeline reads them at job start.
//! At most one provider is primary; the primary cannot be deleted.

use anyhow::Result;
use serde_json::Value;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use std::fmt;

use super::db::{unix_timestamp, Db};
use super::types::{NewProvider, ProviderRow, ProviderUpdate};

/// Error returned when deletion of the primary provider is refused.
#[derive(Debug)]
pub struct PrimaryDeleteRefused;

impl fmt::Display for PrimaryDeleteRefused {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "the primary geocoding provider cannot be deleted")
    }
}

impl std::error::Error for PrimaryDeleteRefused {}

/// Error returned when inserting a provider id that already exists.
#[derive(Debug)]
pub struct DuplicateProviderId(pub String);

impl fmt::Display for DuplicateProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "geocoding provider {:?} already exists", self.0)
    }
}

impl std::error::Error for DuplicateProviderId {}

fn provider_from_row(row: &SqliteRow) -> ProviderRow {
    let config: String = row.get("config");
    let is_enabled: i64 = row.get("is_enabled");
    let is_primary: i64 = row.get("is_primary");
    ProviderRow {
        id: row.get("id"),
        provider_id: row.get("provider_id"),
        provider_name: row.get("provider_name"),
        is_enabled: is_enabled != 0,
        is_primary: is_primary != 0,
        priority: row.get("priority"),
        config: serde_json::from_str(&config).unwrap_or(Value::Null),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

const PROVIDER_COLUMNS: &str =
    "id, provider_id, provider_name, is_enabled, is_primary, priority, config, created_at, updated_at";

impl Db {
    /// All provider rows, primary first, then by ascending priority.
    pub async fn list_providers(&self) -> Result<Vec<ProviderRow>> {
        let sql = format!(
            "SELECT {PROVIDER_COLUMNS} FROM geocoding_providers \
             ORDER BY is_primary DESC, priority ASC, id ASC"
        );
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        Ok(rows.iter().map(provider_from_row).collect())
    }

    pub async fn get_provider(&self, provider_id: &str) -> Result<Option<ProviderRow>> {
        let sql = format!(
            "SELECT {PROVIDER_COLUMNS} FROM geocoding_providers WHERE provider_id = ?1"
        );
        let row = sqlx::query(&sql)
            .bind(provider_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(provider_from_row))
    }

    /// True if at least one provider row is enabled. Geocoding job creation
    /// is refused when this is false.
    pub async fn any_provider_enabled(&self) -> Result<bool> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS n FROM geocoding_providers WHERE is_enabled = 1",
        )
        .fetch_one(&self.pool)
        .await?;
        let n: i64 = row.get("n");
        Ok(n > 0)
    }

    /// Insert a provider row. When the new row is primary, the previous
    /// primary is cleared in the same transaction.
    pub async fn insert_provider(&self, new: &NewProvider) -> Result<i64> {
        if self.get_provider(&new.provider_id).await?.is_some() {
            return Err(DuplicateProviderId(new.provider_id.clone()).into());
        }
        let now = unix_timestamp();
        let config = serde_json::to_string(&new.config)?;

        let mut tx = self.pool.begin().await?;
        if new.is_primary {
            sqlx::query("UPDATE geocoding_providers SET is_primary = 0, updated_at = ?1")
                .bind(now)
                .execute(&mut *tx)
                .await?;
        }
        let id = sqlx::query(
            r#"
            INSERT INTO geocoding_providers (
                provider_id, provider_name, is_enabled, is_primary, priority,
                config, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)
            "#,
        )
        .bind(&new.provider_id)
        .bind(&new.provider_name)
        .bind(new.is_enabled as i64)
        .bind(new.is_primary as i64)
        .bind(new.priority)
        .bind(config)
        .bind(now)
        .execute(&mut *tx)
        .await?
        .last_insert_rowid();
        tx.commit().await?;

        Ok(id)
    }

    /// Apply a partial update to a provider row. Setting `is_primary = true`
    /// clears the previous primary in the same transaction. Returns the
    /// updated row, or None when the provider does not exist.
    pub async fn update_provider(
        &self,
        provider_id: &str,
        update: &ProviderUpdate,
    ) -> Result<Option<ProviderRow>> {
        let Some(current) = self.get_provider(provider_id).await? else {
            return Ok(None);
        };
        let now = unix_timestamp();
        let name = update
            .provider_name
            .clone()
            .unwrap_or(current.provider_name);
        let is_enabled = update.is_enabled.unwrap_or(current.is_enabled);
        let is_primary = update.is_primary.unwrap_or(current.is_primary);
        let priority = update.priority.unwrap_or(current.priority);
        let config = update.config.clone().unwrap_or(current.config);

        let mut tx = self.pool.begin().await?;
        if is_primary && !current.is_primary {
            sqlx::query("UPDATE geocoding_providers SET is_primary = 0, updated_at = ?1")
                .bind(now)
                .execute(&mut *tx)
                .await?;
        }
        sqlx::query(
            r#"
            UPDATE geocoding_providers
            SET provider_name = ?1,
                is_enabled = ?2,
                is_primary = ?3,
                priority = ?4,
                config = ?5,
                updated_at = ?6
            WHERE provider_id = ?7
            "#,
        )
        .bind(&name)
        .bind(is_enabled as i64)
        .bind(is_primary as i64)
        .bind(priority)
        .bind(serde_json::to_string(&config)?)
        .bind(now)
        .bind(provider_id)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        self.get_provider(provider_id).await
    }

    /// Delete a provider row. Refused for the primary. Returns false when
    /// the provider does not exist.
    pub async fn delete_provider(&self, provider_id: &str) -> Result<bool> {
        let Some(row) = self.get_provider(provider_id).await? else {
            return Ok(false);
        };
        if row.is_primary {
            return Err(PrimaryDeleteRefused.into());
        }
        sqlx::query("DELETE FROM geocoding_providers WHERE provider_id = ?1")
            .bind(provider_id)
            .execute(&self.pool)
            .await?;
        Ok(true)
    }
}
