//! Format registry: format id -> importer, plus upload validation.

use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use super::contra_costa::ContraCostaImporter;
use super::simple_csv::SimpleCsvImporter;
use super::types::{FormatDescriptor, ImportType, Importer};

/// Upload validation failures; surfaced as 400s by the control plane and
/// re-checked by the runner before touching the file.
#[derive(Debug)]
pub enum ImportValidationError {
    UnknownFormat(String),
    UnsupportedExtension { format: String, extension: String },
    IncrementalUnsupported(String),
}

impl fmt::Display for ImportValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImportValidationError::UnknownFormat(id) => {
                write!(f, "unknown import format {id:?}")
            }
            ImportValidationError::UnsupportedExtension { format, extension } => {
                write!(f, "format {format:?} does not accept .{extension} files")
            }
            ImportValidationError::IncrementalUnsupported(id) => {
                write!(f, "format {id:?} does not support incremental imports")
            }
        }
    }
}

impl std::error::Error for ImportValidationError {}

/// Constructed once at the composition root and referenced read-only.
pub struct ImporterRegistry {
    importers: HashMap<&'static str, Arc<dyn Importer>>,
}

impl ImporterRegistry {
    /// Registry with the built-in formats.
    pub fn with_defaults() -> Self {
        let mut registry = Self {
            importers: HashMap::new(),
        };
        registry.register(Arc::new(SimpleCsvImporter::new()));
        registry.register(Arc::new(ContraCostaImporter::new()));
        registry
    }

    pub fn register(&mut self, importer: Arc<dyn Importer>) {
        self.importers
            .insert(importer.descriptor().format_id, importer);
    }

    pub fn get(&self, format_id: &str) -> Option<&Arc<dyn Importer>> {
        self.importers.get(format_id)
    }

    /// Descriptors of every registered format (catalog endpoint).
    pub fn descriptors(&self) -> Vec<FormatDescriptor> {
        let mut out: Vec<FormatDescriptor> = self
            .importers
            .values()
            .map(|i| i.descriptor().clone())
            .collect();
        out.sort_by_key(|d| d.format_id);
        out
    }

    /// Check a file name and mode against a format: the extension must be
    /// supported and incremental only allowed when the format can upsert.
    pub fn validate(
        &self,
        format_id: &str,
        file_name: &Path,
        import_type: ImportType,
    ) -> Result<&Arc<dyn Importer>, ImportValidationError> {
        let importer = self
            .get(format_id)
            .ok_or_else(|| ImportValidationError::UnknownFormat(format_id.to_string()))?;
        let descriptor = importer.descriptor();

        let extension = file_name
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase)
            .unwrap_or_default();
        if !descriptor
            .supported_extensions
            .iter()
            .any(|e| *e == extension)
        {
            return Err(ImportValidationError::UnsupportedExtension {
                format: format_id.to_string(),
                extension,
            });
        }

        if import_type == ImportType::Incremental && !descriptor.supports_incremental {
            return Err(ImportValidationError::IncrementalUnsupported(
                format_id.to_string(),
            ));
        }

        Ok(importer)
    }
}
