//! Person rows written by the importer framework.

use anyhow::Result;
use sqlx::Row;

use super::db::{unix_timestamp, Db};
use super::types::{NewPerson, PersonUpsert};

impl Db {
    /// Insert a person row unconditionally (full imports of keyless formats).
    pub async fn insert_person(&self, new: &NewPerson) -> Result<i64> {
        let now = unix_timestamp();
        let id = sqlx::query(
            r#"
            INSERT INTO persons (
                voter_id, first_name, last_name, middle_name,
                phone, email, household_id, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)
            "#,
        )
        .bind(&new.voter_id)
        .bind(&new.first_name)
        .bind(&new.last_name)
        .bind(&new.middle_name)
        .bind(&new.phone)
        .bind(&new.email)
        .bind(new.household_id)
        .bind(now)
        .execute(&self.pool)
        .await?
        .last_insert_rowid();
        Ok(id)
    }

    /// Upsert keyed on `voter_id` (formats with a unique registration id).
    /// Existing rows are overwritten field-by-field; `created_at` is kept.
    pub async fn upsert_person_by_voter_id(&self, new: &NewPerson) -> Result<PersonUpsert> {
        let voter_id = new
            .voter_id
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("upsert requires a voter_id"))?;

        let existing = sqlx::query("SELECT id FROM persons WHERE voter_id = ?1")
            .bind(voter_id)
            .fetch_optional(&self.pool)
            .await?;

        match existing {
            Some(row) => {
                let id: i64 = row.get("id");
                let now = unix_timestamp();
                sqlx::query(
                    r#"
                    UPDATE persons
                    SET first_name = ?1,
                        last_name = ?2,
                        middle_name = ?3,
                        phone = ?4,
                        email = ?5,
                        household_id = ?6,
                        updated_at = ?7
                    WHERE id = ?8
                    "#,
                )
                .bind(&new.first_name)
                .bind(&new.last_name)
                .bind(&new.middle_name)
                .bind(&new.phone)
                .bind(&new.email)
                .bind(new.household_id)
                .bind(now)
                .bind(id)
                .execute(&self.pool)
                .await?;
                Ok(PersonUpsert::Updated)
            }
            None => {
                self.insert_person(new).await?;
                Ok(PersonUpsert::Created)
            }
        }
    }

    /// Number of person rows (test helper).
    pub async fn count_persons(&self) -> Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM persons")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get("n"))
    }
}
