//! Simple header-driven CSV import: one person per row, optional household
//! linkage by address. No unique key, so incremental is unsupported.

use anyhow::{bail, Result};
use async_trait::async_trait;
use csv::StringRecord;
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::store::{Db, NewPerson};

use super::progress::{ProgressReporter, Tick};
use super::types::{
    non_empty, normalize_header, FormatDescriptor, ImportResult, ImportRun, ImportType, Importer,
};

const DESCRIPTOR: FormatDescriptor = FormatDescriptor {
    format_id: "simple_csv",
    format_name: "Simple CSV",
    supported_extensions: &["csv"],
    supports_incremental: false,
};

/// Maps normalized header names to column indexes.
pub(crate) struct ColumnMap(HashMap<String, usize>);

impl ColumnMap {
    pub(crate) fn from_headers(headers: &StringRecord) -> Self {
        let mut map = HashMap::new();
        for (i, h) in headers.iter().enumerate() {
            map.insert(normalize_header(h), i);
        }
        Self(map)
    }

    pub(crate) fn field(&self, record: &StringRecord, name: &str) -> String {
        self.0
            .get(name)
            .and_then(|i| record.get(*i))
            .unwrap_or("")
            .trim()
            .to_string()
    }

    pub(crate) fn has(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    /// First matching column among aliases (e.g. `zip` vs `zip_code`).
    pub(crate) fn field_any(&self, record: &StringRecord, names: &[&str]) -> String {
        for name in names {
            if self.has(name) {
                return self.field(record, name);
            }
        }
        String::new()
    }
}

/// Count data records for the progress total (cheap second pass).
pub(crate) fn count_records(path: &Path, delimiter: u8) -> Result<u64> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .flexible(true)
        .from_path(path)?;
    Ok(reader.records().count() as u64)
}

#[derive(Debug)]
pub struct SimpleCsvImporter;

impl SimpleCsvImporter {
    pub fn new() -> Self {
        Self
    }
}

impl Default for SimpleCsvImporter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Importer for SimpleCsvImporter {
    fn descriptor(&self) -> &FormatDescriptor {
        &DESCRIPTOR
    }

    async fn import(
        &self,
        db: &Db,
        path: &Path,
        import_type: ImportType,
        report: &ProgressReporter<'_>,
        abort: &AtomicBool,
    ) -> Result<ImportRun> {
        if import_type == ImportType::Incremental {
            bail!("simple_csv does not support incremental imports");
        }

        let total = count_records(path, b',')?;
        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_path(path)?;
        let columns = ColumnMap::from_headers(&reader.headers()?.clone());
        if !columns.has("firstname") || !columns.has("lastname") {
            bail!("csv is missing required first_name/last_name columns");
        }

        let mut result = ImportResult {
            success: true,
            ..Default::default()
        };
        let mut row = 0u64;
        for record in reader.records() {
            row += 1;
            result.processed += 1;
            if abort.load(Ordering::Relaxed) {
                return Ok(ImportRun::Yielded);
            }

            match record {
                Err(e) => {
                    let msg = format!("row {row}: {e}");
                    result.push_error(msg.clone());
                    report.line_error(&msg).await?;
                }
                Ok(record) => {
                    let first_name = columns.field(&record, "firstname");
                    let last_name = columns.field(&record, "lastname");
                    if first_name.is_empty() || last_name.is_empty() {
                        let field = if last_name.is_empty() {
                            "last_name"
                        } else {
                            "first_name"
                        };
                        let msg = format!("row {row}: missing {field}");
                        result.push_error(msg.clone());
                        report.line_error(&msg).await?;
                    } else {
                        let address = columns.field(&record, "address");
                        let household_id = if address.is_empty() {
                            None
                        } else {
                            Some(
                                db.find_or_create_household(
                                    &address,
                                    &columns.field(&record, "city"),
                                    &columns.field(&record, "state"),
                                    &columns.field_any(&record, &["zip", "zipcode"]),
                                )
                                .await?,
                            )
                        };
                        let person = NewPerson {
                            voter_id: None,
                            first_name,
                            last_name,
                            middle_name: non_empty(columns.field(&record, "middlename")),
                            phone: non_empty(columns.field(&record, "phone")),
                            email: non_empty(columns.field(&record, "email")),
                            household_id,
                        };
                        db.insert_person(&person).await?;
                        result.created += 1;
                    }
                }
            }

            if report.tick(row, Some(total)).await? == Tick::Yield {
                return Ok(ImportRun::Yielded);
            }
        }

        Ok(ImportRun::Finished(result))
    }
}
