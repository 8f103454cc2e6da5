//! Job write operations: create, lifecycle CAS transitions, counters, error log.

use anyhow::Result;
use serde_json::Value;

use super::super::db::{unix_timestamp, unix_timestamp_millis, Db};
use super::super::types::{ErrorEntry, JobId, JobStatus, NewJob};

impl Db {
    /// Insert a new pending job. When `total_items` is unknown the row is
    /// marked dynamic and the counter seeds to zero.
    pub async fn create_job(&self, new: &NewJob) -> Result<JobId> {
        let now = unix_timestamp();
        let payload = serde_json::to_string(&new.payload)?;
        let is_dynamic = new.total_items.is_none();

        let row_id = sqlx::query(
            r#"
            INSERT INTO jobs (
                job_type, status, is_dynamic, total_items, processed_items,
                payload, error_log, output_stats, created_by,
                created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, 0,
                      ?5, '[]', NULL, ?6,
                      ?7, ?7)
            "#,
        )
        .bind(new.job_type.as_str())
        .bind(JobStatus::Pending.as_str())
        .bind(is_dynamic as i64)
        .bind(new.total_items.unwrap_or(0))
        .bind(payload)
        .bind(&new.created_by)
        .bind(now)
        .execute(&self.pool)
        .await?
        .last_insert_rowid();

        Ok(row_id)
    }

    /// Atomic pending -> processing transition; sets `started_at`.
    /// Returns false when the job is absent or not pending, which is how
    /// at-least-once broker redelivery is made harmless.
    pub async fn start_job(&self, id: JobId) -> Result<bool> {
        let now = unix_timestamp();
        let r = sqlx::query(
            r#"
            UPDATE jobs
            SET status = 'processing',
                started_at = ?1,
                updated_at = ?1
            WHERE id = ?2 AND status = 'pending'
            "#,
        )
        .bind(now)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(r.rows_affected() == 1)
    }

    /// Conditional status update: `from` -> `to` for one job id.
    /// Sets `completed_at` when `to` is terminal and clears it when `to`
    /// is pending (resume). Returns false when the precondition failed.
    pub async fn cas_status(&self, id: JobId, from: JobStatus, to: JobStatus) -> Result<bool> {
        let now = unix_timestamp();
        let sql = if to.is_terminal() {
            r#"
            UPDATE jobs
            SET status = ?1, completed_at = ?2, updated_at = ?2
            WHERE id = ?3 AND status = ?4
            "#
        } else if to == JobStatus::Pending {
            r#"
            UPDATE jobs
            SET status = ?1, completed_at = NULL, updated_at = ?2
            WHERE id = ?3 AND status = ?4
            "#
        } else {
            r#"
            UPDATE jobs
            SET status = ?1, updated_at = ?2
            WHERE id = ?3 AND status = ?4
            "#
        };
        let r = sqlx::query(sql)
            .bind(to.as_str())
            .bind(now)
            .bind(id)
            .bind(from.as_str())
            .execute(&self.pool)
            .await?;
        Ok(r.rows_affected() == 1)
    }

    /// Write progress counters; optionally update the known total.
    pub async fn update_progress(
        &self,
        id: JobId,
        processed: i64,
        total: Option<i64>,
    ) -> Result<()> {
        let now = unix_timestamp();
        match total {
            Some(total) => {
                sqlx::query(
                    r#"
                    UPDATE jobs
                    SET processed_items = ?1, total_items = ?2, updated_at = ?3
                    WHERE id = ?4
                    "#,
                )
                .bind(processed)
                .bind(total)
                .bind(now)
                .bind(id)
                .execute(&self.pool)
                .await?;
            }
            None => {
                sqlx::query(
                    r#"
                    UPDATE jobs
                    SET processed_items = ?1, updated_at = ?2
                    WHERE id = ?3
                    "#,
                )
                .bind(processed)
                .bind(now)
                .bind(id)
                .execute(&self.pool)
                .await?;
            }
        }
        Ok(())
    }

    /// Append one bounded error-log entry. Overflow beyond `cap` drops the
    /// oldest entries. Allowed on terminal rows; never fails the job.
    pub async fn append_error(&self, id: JobId, message: &str, cap: usize) -> Result<bool> {
        let row = sqlx::query("SELECT error_log FROM jobs WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        let Some(row) = row else {
            return Ok(false);
        };
        let raw: String = sqlx::Row::get(&row, "error_log");
        let mut entries: Vec<ErrorEntry> = serde_json::from_str(&raw).unwrap_or_default();
        entries.push(ErrorEntry {
            timestamp: unix_timestamp_millis(),
            message: message.to_string(),
        });
        let excess = entries.len().saturating_sub(cap);
        if excess > 0 {
            entries.drain(0..excess);
        }

        let now = unix_timestamp();
        sqlx::query(
            r#"
            UPDATE jobs
            SET error_log = ?1, updated_at = ?2
            WHERE id = ?3
            "#,
        )
        .bind(serde_json::to_string(&entries)?)
        .bind(now)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(true)
    }

    /// processing -> completed with optional output stats.
    pub async fn complete_job(&self, id: JobId, output_stats: Option<&Value>) -> Result<bool> {
        let now = unix_timestamp();
        let stats = output_stats.map(serde_json::to_string).transpose()?;
        let r = sqlx::query(
            r#"
            UPDATE jobs
            SET status = 'completed',
                output_stats = ?1,
                completed_at = ?2,
                updated_at = ?2
            WHERE id = ?3 AND status = 'processing'
            "#,
        )
        .bind(stats)
        .bind(now)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(r.rows_affected() == 1)
    }

    /// Terminal failure from any non-terminal state. Appends the message as
    /// the final error-log entry first. Returns false when the job was
    /// already terminal (the row is left untouched apart from the log).
    pub async fn fail_job(&self, id: JobId, message: &str, cap: usize) -> Result<bool> {
        self.append_error(id, message, cap).await?;
        let now = unix_timestamp();
        let r = sqlx::query(
            r#"
            UPDATE jobs
            SET status = 'failed',
                completed_at = ?1,
                updated_at = ?1
            WHERE id = ?2 AND status NOT IN ('completed', 'failed', 'cancelled')
            "#,
        )
        .bind(now)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(r.rows_affected() == 1)
    }

    /// Rewrite the opaque payload (checkpoints). The single worker holding
    /// the job is the only writer, so a plain write is safe.
    pub async fn update_payload(&self, id: JobId, payload: &Value) -> Result<()> {
        let now = unix_timestamp();
        sqlx::query(
            r#"
            UPDATE jobs
            SET payload = ?1, updated_at = ?2
            WHERE id = ?3
            "#,
        )
        .bind(serde_json::to_string(payload)?)
        .bind(now)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Delete terminal jobs whose `completed_at` is older than the cutoff.
    /// Returns the number of rows removed (scheduled `prune_jobs` task).
    pub async fn prune_terminal_jobs(&self, completed_before: i64) -> Result<u64> {
        let r = sqlx::query(
            r#"
            DELETE FROM jobs
            WHERE status IN ('completed', 'failed', 'cancelled')
              AND completed_at IS NOT NULL
              AND completed_at < ?1
            "#,
        )
        .bind(completed_before)
        .execute(&self.pool)
        .await?;
        Ok(r.rows_affected())
    }
}
