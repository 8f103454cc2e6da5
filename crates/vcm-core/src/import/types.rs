//! Importer capability set and result shapes.

use anyhow::Result;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::path::Path;
use std::sync::atomic::AtomicBool;

use crate::store::Db;

use super::progress::ProgressReporter;

/// Result errors are capped so `output_stats` stays small; the full stream
/// of line errors lands in the job's bounded error log.
const RESULT_ERROR_CAP: usize = 100;

/// Import mode. Incremental is only permitted for formats with a unique
/// voter identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportType {
    Full,
    Incremental,
}

impl ImportType {
    pub fn as_str(self) -> &'static str {
        match self {
            ImportType::Full => "full",
            ImportType::Incremental => "incremental",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "full" => Some(ImportType::Full),
            "incremental" => Some(ImportType::Incremental),
            _ => None,
        }
    }
}

/// Static description of one import format.
#[derive(Debug, Clone)]
pub struct FormatDescriptor {
    pub format_id: &'static str,
    pub format_name: &'static str,
    pub supported_extensions: &'static [&'static str],
    pub supports_incremental: bool,
}

/// Tally of one import run; becomes the job's `output_stats`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImportResult {
    pub success: bool,
    pub processed: u64,
    pub created: u64,
    pub updated: u64,
    pub skipped: u64,
    pub errors: Vec<String>,
}

impl ImportResult {
    /// Record a line-level error: counted as skipped, kept in the capped
    /// result list.
    pub fn push_error(&mut self, message: String) {
        self.skipped += 1;
        if self.errors.len() < RESULT_ERROR_CAP {
            self.errors.push(message);
        }
    }

    pub fn to_stats(&self) -> Value {
        json!({
            "success": self.success,
            "processed": self.processed,
            "created": self.created,
            "updated": self.updated,
            "skipped": self.skipped,
            "errors": self.errors,
        })
    }
}

/// How an import invocation ended: ran to the end of the file, or yielded
/// early because the job was paused or cancelled.
#[derive(Debug, Clone, PartialEq)]
pub enum ImportRun {
    Finished(ImportResult),
    Yielded,
}

/// Fold a header cell into a comparable key: lowercase with separators
/// stripped, so `first_name`, `FirstName`, and `FIRST NAME` all match.
pub(crate) fn normalize_header(s: &str) -> String {
    s.chars()
        .filter(|c| !matches!(c, '_' | '-' | ' '))
        .collect::<String>()
        .to_lowercase()
}

/// Empty-to-None for optional columns.
pub(crate) fn non_empty(s: String) -> Option<String> {
    if s.is_empty() {
        None
    } else {
        Some(s)
    }
}

/// A registered import format. Implementations stream the file, persist
/// rows, and report progress every N records through the reporter.
#[async_trait]
pub trait Importer: Send + Sync + std::fmt::Debug {
    fn descriptor(&self) -> &FormatDescriptor;

    async fn import(
        &self,
        db: &Db,
        path: &Path,
        import_type: ImportType,
        report: &ProgressReporter<'_>,
        abort: &AtomicBool,
    ) -> Result<ImportRun>;
}
