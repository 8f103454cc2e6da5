//! Types used by the canvass database.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use crate::queue::QueueName;

/// Job identifier. Doubles as the broker job key.
pub type JobId = i64;

/// High-level job status stored as a string in the database.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Pending,
    Processing,
    Paused,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Paused => "paused",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "pending" => JobStatus::Pending,
            "processing" => JobStatus::Processing,
            "paused" => JobStatus::Paused,
            "completed" => JobStatus::Completed,
            "cancelled" => JobStatus::Cancelled,
            _ => JobStatus::Failed,
        }
    }

    /// Terminal statuses freeze every field except the error log.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of background work a job performs. Scheduled tasks are open-ended
/// and carry their task name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobType {
    VoterImport,
    Geocoding,
    Scheduled(String),
}

impl JobType {
    pub fn as_str(&self) -> &str {
        match self {
            JobType::VoterImport => "voter_import",
            JobType::Geocoding => "geocoding",
            JobType::Scheduled(name) => name,
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "voter_import" => JobType::VoterImport,
            "geocoding" => JobType::Geocoding,
            other => JobType::Scheduled(other.to_string()),
        }
    }

    /// The broker queue this kind of job is routed to.
    pub fn queue(&self) -> QueueName {
        match self {
            JobType::VoterImport => QueueName::VoterImport,
            JobType::Geocoding => QueueName::Geocode,
            JobType::Scheduled(_) => QueueName::Scheduled,
        }
    }
}

/// One bounded error-log entry. Timestamps are unix milliseconds so ordering
/// within a second stays visible.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ErrorEntry {
    pub timestamp: i64,
    pub message: String,
}

/// Full durable job row.
#[derive(Debug, Clone)]
pub struct JobRecord {
    pub id: JobId,
    pub job_type: JobType,
    pub status: JobStatus,
    pub is_dynamic: bool,
    pub total_items: i64,
    pub processed_items: i64,
    pub payload: Value,
    pub error_log: Vec<ErrorEntry>,
    pub output_stats: Option<Value>,
    pub created_by: String,
    pub created_at: i64,
    pub started_at: Option<i64>,
    pub completed_at: Option<i64>,
    pub updated_at: i64,
}

impl JobRecord {
    /// Derived progress percentage: terminal jobs report 100, jobs with an
    /// unknown total report 0, everything else is floored and capped at 99
    /// until terminal.
    pub fn progress_percent(&self) -> u8 {
        if self.status.is_terminal() {
            return 100;
        }
        if self.total_items <= 0 {
            return 0;
        }
        let pct = (100 * self.processed_items) / self.total_items;
        pct.clamp(0, 99) as u8
    }
}

/// Fields for creating a job row. When `total_items` is unknown the job is
/// marked dynamic and reports 0% until terminal.
#[derive(Debug, Clone)]
pub struct NewJob {
    pub job_type: JobType,
    pub created_by: String,
    pub payload: Value,
    pub total_items: Option<i64>,
}

/// Optional filters for job listing.
#[derive(Debug, Clone, Default)]
pub struct JobFilter {
    pub job_type: Option<String>,
    pub status: Option<JobStatus>,
    pub created_by: Option<String>,
}

/// Durable geocoding provider configuration row.
#[derive(Debug, Clone)]
pub struct ProviderRow {
    pub id: i64,
    pub provider_id: String,
    pub provider_name: String,
    pub is_enabled: bool,
    pub is_primary: bool,
    pub priority: i64,
    pub config: Value,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Fields for creating a provider row.
#[derive(Debug, Clone)]
pub struct NewProvider {
    pub provider_id: String,
    pub provider_name: String,
    pub is_enabled: bool,
    pub is_primary: bool,
    pub priority: i64,
    pub config: Value,
}

/// Partial update to a provider row; `None` fields are left unchanged.
#[derive(Debug, Clone, Default)]
pub struct ProviderUpdate {
    pub provider_name: Option<String>,
    pub is_enabled: Option<bool>,
    pub is_primary: Option<bool>,
    pub priority: Option<i64>,
    pub config: Option<Value>,
}

/// Household row as seen by the geocoding pipeline.
#[derive(Debug, Clone)]
pub struct HouseholdRow {
    pub id: i64,
    pub address: String,
    pub city: String,
    pub state: String,
    pub zip_code: String,
    pub geocoded: bool,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub geocoded_at: Option<i64>,
    pub geocoding_provider: Option<String>,
}

/// Address-field filters for selecting households to geocode.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct HouseholdFilter {
    pub city: Option<String>,
    pub state: Option<String>,
    pub zip_code: Option<String>,
}

/// Fields for creating a person row from an import.
#[derive(Debug, Clone, Default)]
pub struct NewPerson {
    pub voter_id: Option<String>,
    pub first_name: String,
    pub last_name: String,
    pub middle_name: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub household_id: Option<i64>,
}

/// Outcome of a keyed person upsert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersonUpsert {
    Created,
    Updated,
}
