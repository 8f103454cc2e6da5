//! Household rows: the geocoding pipeline's read/write surface.
//!
//! The pipeline only ever touches the geocode fields of one row at a time;
//! there is no cross-row consistency requirement.

use anyhow::Result;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use super::db::{unix_timestamp, Db};
use super::types::{HouseholdFilter, HouseholdRow};

fn household_from_row(row: &SqliteRow) -> HouseholdRow {
    let geocoded: i64 = row.get("geocoded");
    HouseholdRow {
        id: row.get("id"),
        address: row.get("address"),
        city: row.get("city"),
        state: row.get("state"),
        zip_code: row.get("zip_code"),
        geocoded: geocoded != 0,
        latitude: row.get("latitude"),
        longitude: row.get("longitude"),
        geocoded_at: row.get("geocoded_at"),
        geocoding_provider: row.get("geocoding_provider"),
    }
}

const HOUSEHOLD_COLUMNS: &str =
    "id, address, city, state, zip_code, geocoded, latitude, longitude, geocoded_at, geocoding_provider";

impl Db {
    pub async fn insert_household(
        &self,
        address: &str,
        city: &str,
        state: &str,
        zip_code: &str,
    ) -> Result<i64> {
        let now = unix_timestamp();
        let id = sqlx::query(
            r#"
            INSERT INTO households (address, city, state, zip_code, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?5)
            "#,
        )
        .bind(address)
        .bind(city)
        .bind(state)
        .bind(zip_code)
        .bind(now)
        .execute(&self.pool)
        .await?
        .last_insert_rowid();
        Ok(id)
    }

    /// Look up a household by its full address tuple, inserting it when
    /// absent. Importers use this so repeated rows share one household.
    pub async fn find_or_create_household(
        &self,
        address: &str,
        city: &str,
        state: &str,
        zip_code: &str,
    ) -> Result<i64> {
        let row = sqlx::query(
            r#"
            SELECT id FROM households
            WHERE address = ?1 AND city = ?2 AND state = ?3 AND zip_code = ?4
            LIMIT 1
            "#,
        )
        .bind(address)
        .bind(city)
        .bind(state)
        .bind(zip_code)
        .fetch_optional(&self.pool)
        .await?;
        if let Some(row) = row {
            return Ok(row.get("id"));
        }
        self.insert_household(address, city, state, zip_code).await
    }

    pub async fn get_household(&self, id: i64) -> Result<Option<HouseholdRow>> {
        let sql = format!("SELECT {HOUSEHOLD_COLUMNS} FROM households WHERE id = ?1");
        let row = sqlx::query(&sql).bind(id).fetch_optional(&self.pool).await?;
        Ok(row.as_ref().map(household_from_row))
    }

    /// Materialise the work set for a geocoding job: household ids matching
    /// the filter, ordered by id so resumption is deterministic, limited.
    pub async fn query_household_ids(
        &self,
        filter: &HouseholdFilter,
        skip_geocoded: bool,
        limit: i64,
    ) -> Result<Vec<i64>> {
        let mut conds: Vec<&str> = Vec::new();
        if filter.city.is_some() {
            conds.push("city = ?");
        }
        if filter.state.is_some() {
            conds.push("state = ?");
        }
        if filter.zip_code.is_some() {
            conds.push("zip_code = ?");
        }
        if skip_geocoded {
            conds.push("geocoded = 0");
        }
        let where_clause = if conds.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", conds.join(" AND "))
        };
        let sql = format!("SELECT id FROM households{where_clause} ORDER BY id ASC LIMIT ?");

        let mut q = sqlx::query(&sql);
        if let Some(c) = &filter.city {
            q = q.bind(c);
        }
        if let Some(s) = &filter.state {
            q = q.bind(s);
        }
        if let Some(z) = &filter.zip_code {
            q = q.bind(z);
        }
        let rows = q.bind(limit).fetch_all(&self.pool).await?;
        Ok(rows.iter().map(|r| r.get("id")).collect())
    }

    /// Atomically record a geocoding result on one household row.
    pub async fn mark_geocoded(
        &self,
        id: i64,
        latitude: f64,
        longitude: f64,
        provider_source: &str,
    ) -> Result<()> {
        let now = unix_timestamp();
        sqlx::query(
            r#"
            UPDATE households
            SET geocoded = 1,
                latitude = ?1,
                longitude = ?2,
                geocoded_at = ?3,
                geocoding_provider = ?4,
                updated_at = ?3
            WHERE id = ?5
            "#,
        )
        .bind(latitude)
        .bind(longitude)
        .bind(now)
        .bind(provider_source)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Number of geocoded household rows (test and stats helper).
    pub async fn count_geocoded(&self) -> Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM households WHERE geocoded = 1")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get("n"))
    }
}
