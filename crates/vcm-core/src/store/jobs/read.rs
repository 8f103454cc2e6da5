//! Job read operations: get, list, recovery scan.

use anyhow::Result;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use super::super::db::Db;
use super::super::types::{ErrorEntry, JobFilter, JobId, JobRecord, JobStatus, JobType};

const JOB_COLUMNS: &str = "id, job_type, status, is_dynamic, total_items, processed_items, \
     payload, error_log, output_stats, created_by, created_at, started_at, completed_at, updated_at";

pub(crate) fn job_from_row(row: &SqliteRow) -> Result<JobRecord> {
    let payload: String = row.get("payload");
    let error_log: String = row.get("error_log");
    let output_stats: Option<String> = row.get("output_stats");
    let job_type: String = row.get("job_type");
    let status: String = row.get("status");
    let is_dynamic: i64 = row.get("is_dynamic");

    Ok(JobRecord {
        id: row.get("id"),
        job_type: JobType::from_str(&job_type),
        status: JobStatus::from_str(&status),
        is_dynamic: is_dynamic != 0,
        total_items: row.get("total_items"),
        processed_items: row.get("processed_items"),
        payload: serde_json::from_str(&payload).unwrap_or(serde_json::Value::Null),
        error_log: serde_json::from_str::<Vec<ErrorEntry>>(&error_log).unwrap_or_default(),
        output_stats: output_stats
            .as_deref()
            .filter(|s| !s.is_empty())
            .map(serde_json::from_str)
            .transpose()?,
        created_by: row.get("created_by"),
        created_at: row.get("created_at"),
        started_at: row.get("started_at"),
        completed_at: row.get("completed_at"),
        updated_at: row.get("updated_at"),
    })
}

impl Db {
    /// Fetch a single job row, or None if absent.
    pub async fn get_job(&self, id: JobId) -> Result<Option<JobRecord>> {
        let sql = format!("SELECT {JOB_COLUMNS} FROM jobs WHERE id = ?1");
        let row = sqlx::query(&sql).bind(id).fetch_optional(&self.pool).await?;
        row.as_ref().map(job_from_row).transpose()
    }

    /// Current status of a job, or None if absent. Cheap poll used at
    /// handler suspension points.
    pub async fn get_job_status(&self, id: JobId) -> Result<Option<JobStatus>> {
        let row = sqlx::query("SELECT status FROM jobs WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| {
            let s: String = r.get("status");
            JobStatus::from_str(&s)
        }))
    }

    /// List jobs matching the filter, newest first, plus the total match count.
    pub async fn list_jobs(
        &self,
        filter: &JobFilter,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<JobRecord>, i64)> {
        let mut conds: Vec<&str> = Vec::new();
        if filter.job_type.is_some() {
            conds.push("job_type = ?");
        }
        if filter.status.is_some() {
            conds.push("status = ?");
        }
        if filter.created_by.is_some() {
            conds.push("created_by = ?");
        }
        let where_clause = if conds.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", conds.join(" AND "))
        };

        let count_sql = format!("SELECT COUNT(*) AS n FROM jobs{where_clause}");
        let mut count_q = sqlx::query(&count_sql);
        if let Some(t) = &filter.job_type {
            count_q = count_q.bind(t);
        }
        if let Some(s) = filter.status {
            count_q = count_q.bind(s.as_str());
        }
        if let Some(c) = &filter.created_by {
            count_q = count_q.bind(c);
        }
        let total: i64 = count_q.fetch_one(&self.pool).await?.get("n");

        let list_sql = format!(
            "SELECT {JOB_COLUMNS} FROM jobs{where_clause} \
             ORDER BY created_at DESC, id DESC LIMIT ? OFFSET ?"
        );
        let mut list_q = sqlx::query(&list_sql);
        if let Some(t) = &filter.job_type {
            list_q = list_q.bind(t);
        }
        if let Some(s) = filter.status {
            list_q = list_q.bind(s.as_str());
        }
        if let Some(c) = &filter.created_by {
            list_q = list_q.bind(c);
        }
        let rows = list_q
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await?;

        let mut out = Vec::with_capacity(rows.len());
        for row in &rows {
            out.push(job_from_row(row)?);
        }
        Ok((out, total))
    }

    /// Jobs in a non-terminal, non-paused state (pending or processing).
    /// Used by startup recovery to reconcile the store with the broker.
    pub async fn list_active_jobs(&self) -> Result<Vec<JobRecord>> {
        let sql = format!(
            "SELECT {JOB_COLUMNS} FROM jobs \
             WHERE status IN ('pending', 'processing') ORDER BY id ASC"
        );
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        let mut out = Vec::with_capacity(rows.len());
        for row in &rows {
            out.push(job_from_row(row)?);
        }
        Ok(out)
    }
}
