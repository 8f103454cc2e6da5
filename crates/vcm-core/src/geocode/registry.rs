//! Provider registry: maps provider rows to backend implementations and
//! orders candidates for a job.

use anyhow::Result;
use std::collections::HashMap;
use std::sync::Arc;

use crate::store::ProviderRow;

use super::census::{CensusGeocoder, CENSUS_PROVIDER_ID};
use super::nominatim::{NominatimGeocoder, NOMINATIM_PROVIDER_ID};
use super::provider::GeocodeProvider;

/// Constructed once at the composition root and referenced read-only.
/// Known provider ids are instantiated from their row config on demand;
/// registered overrides (tests, future in-process backends) win over the
/// built-ins.
pub struct ProviderRegistry {
    client: reqwest::Client,
    overrides: HashMap<String, Arc<dyn GeocodeProvider>>,
}

impl ProviderRegistry {
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("vcm-geocoder/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            overrides: HashMap::new(),
        })
    }

    /// Register an implementation that takes precedence over the built-in
    /// with the same provider id.
    pub fn register(&mut self, provider: Arc<dyn GeocodeProvider>) {
        self.overrides
            .insert(provider.provider_id().to_string(), provider);
    }

    /// Instantiate the backend for one provider row, or None for an unknown id.
    pub fn resolve(&self, row: &ProviderRow) -> Option<Arc<dyn GeocodeProvider>> {
        if let Some(p) = self.overrides.get(&row.provider_id) {
            return Some(Arc::clone(p));
        }
        match row.provider_id.as_str() {
            CENSUS_PROVIDER_ID => Some(Arc::new(CensusGeocoder::new(
                self.client.clone(),
                &row.config,
            ))),
            NOMINATIM_PROVIDER_ID => Some(Arc::new(NominatimGeocoder::new(
                self.client.clone(),
                &row.config,
            ))),
            _ => None,
        }
    }

    /// Candidate order for a job: the pinned provider first (when enabled),
    /// then the primary, then remaining enabled providers by ascending
    /// priority. Disabled rows and unknown ids never appear.
    pub fn candidates(
        &self,
        rows: &[ProviderRow],
        pinned: Option<&str>,
    ) -> Vec<Arc<dyn GeocodeProvider>> {
        let mut ordered: Vec<&ProviderRow> = Vec::new();
        if let Some(pinned) = pinned {
            if let Some(row) = rows.iter().find(|r| r.provider_id == pinned && r.is_enabled) {
                ordered.push(row);
            }
        }
        if let Some(primary) = rows.iter().find(|r| r.is_primary && r.is_enabled) {
            if !ordered.iter().any(|r| r.provider_id == primary.provider_id) {
                ordered.push(primary);
            }
        }
        let mut rest: Vec<&ProviderRow> = rows
            .iter()
            .filter(|r| r.is_enabled)
            .filter(|r| !ordered.iter().any(|o| o.provider_id == r.provider_id))
            .collect();
        rest.sort_by_key(|r| (r.priority, r.id));
        ordered.extend(rest);

        ordered
            .into_iter()
            .filter_map(|row| {
                let resolved = self.resolve(row);
                if resolved.is_none() {
                    tracing::warn!(provider_id = %row.provider_id, "no backend for provider row");
                }
                resolved
            })
            .collect()
    }

    /// First candidate that reports itself available.
    pub async fn select_available(
        &self,
        rows: &[ProviderRow],
        pinned: Option<&str>,
    ) -> Option<Arc<dyn GeocodeProvider>> {
        for candidate in self.candidates(rows, pinned) {
            if candidate.is_available().await {
                return Some(candidate);
            }
            tracing::warn!(
                provider_id = candidate.provider_id(),
                "provider unavailable, falling back"
            );
        }
        None
    }
}
