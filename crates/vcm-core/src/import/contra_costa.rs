//! Contra Costa County voter-roll import: tab-separated registrar export
//! keyed by voter registration id, so incremental upserts are supported.

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::store::{Db, NewPerson, PersonUpsert};

use super::progress::{ProgressReporter, Tick};
use super::simple_csv::{count_records, ColumnMap};
use super::types::{non_empty, FormatDescriptor, ImportResult, ImportRun, ImportType, Importer};

const DESCRIPTOR: FormatDescriptor = FormatDescriptor {
    format_id: "contra_costa",
    format_name: "Contra Costa County Voter Roll",
    supported_extensions: &["txt", "tsv"],
    supports_incremental: true,
};

/// True when an insert failed only because the unique voter_id already exists.
fn is_unique_violation(e: &anyhow::Error) -> bool {
    e.downcast_ref::<sqlx::Error>()
        .and_then(|e| e.as_database_error())
        .is_some_and(|db| db.is_unique_violation())
}

#[derive(Debug)]
pub struct ContraCostaImporter;

impl ContraCostaImporter {
    pub fn new() -> Self {
        Self
    }
}

impl Default for ContraCostaImporter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Importer for ContraCostaImporter {
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
        let total = count_records(path, b'\t')?;
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(b'\t')
            .trim(csv::Trim::All)
            .flexible(true)
            .from_path(path)?;
        let columns = ColumnMap::from_headers(&reader.headers()?.clone());
        if !columns.has("voterid") {
            bail!("voter roll is missing the voter_id column");
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
                    let voter_id = columns.field(&record, "voterid");
                    let last_name = columns.field(&record, "lastname");
                    if voter_id.is_empty() || last_name.is_empty() {
                        let field = if voter_id.is_empty() {
                            "voter_id"
                        } else {
                            "last_name"
                        };
                        let msg = format!("row {row}: missing {field}");
                        result.push_error(msg.clone());
                        report.line_error(&msg).await?;
                    } else {
                        let address =
                            columns.field_any(&record, &["address", "residenceaddress"]);
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
                            voter_id: Some(voter_id.clone()),
                            first_name: columns.field(&record, "firstname"),
                            last_name,
                            middle_name: non_empty(columns.field(&record, "middlename")),
                            phone: non_empty(columns.field(&record, "phone")),
                            email: non_empty(columns.field(&record, "email")),
                            household_id,
                        };
                        match import_type {
                            // Incremental runs upsert on the registration id.
                            ImportType::Incremental => {
                                match db.upsert_person_by_voter_id(&person).await? {
                                    PersonUpsert::Created => result.created += 1,
                                    PersonUpsert::Updated => result.updated += 1,
                                }
                            }
                            // Full runs insert plainly; the only dedup is the
                            // unique key itself, which turns a repeated
                            // registration id into a skipped row.
                            ImportType::Full => match db.insert_person(&person).await {
                                Ok(_) => result.created += 1,
                                Err(e) if is_unique_violation(&e) => {
                                    let msg = format!(
                                        "row {row}: voter_id {voter_id:?} already present"
                                    );
                                    result.push_error(msg.clone());
                                    report.line_error(&msg).await?;
                                }
                                Err(e) => return Err(e),
                            },
                        }
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
