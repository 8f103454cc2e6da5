//! The geocoding provider capability set.

use async_trait::async_trait;
use serde_json::Value;

use crate::retry::CallError;
use crate::store::HouseholdRow;

/// Address components handed to a provider.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GeocodeRequest {
    pub address: String,
    pub city: String,
    pub state: String,
    pub zip_code: String,
}

impl GeocodeRequest {
    pub fn from_household(hh: &HouseholdRow) -> Self {
        Self {
            address: hh.address.clone(),
            city: hh.city.clone(),
            state: hh.state.clone(),
            zip_code: hh.zip_code.clone(),
        }
    }

    /// Single-line form: non-empty components joined by commas.
    pub fn one_line(&self) -> String {
        [&self.address, &self.city, &self.state, &self.zip_code]
            .iter()
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// True when there is nothing to geocode.
    pub fn is_empty(&self) -> bool {
        self.one_line().is_empty()
    }
}

/// One geocoding match.
#[derive(Debug, Clone, PartialEq)]
pub struct GeocodeResult {
    pub latitude: f64,
    pub longitude: f64,
    pub confidence: Option<f64>,
    pub match_type: Option<String>,
    /// Written to `households.geocoding_provider`.
    pub source: String,
}

/// A geocoding backend. Implementations are read-only values constructed by
/// the registry; per-job state lives in the pipeline.
#[async_trait]
pub trait GeocodeProvider: Send + Sync {
    fn provider_id(&self) -> &str;

    fn provider_name(&self) -> &str;

    /// Cheap health probe used during provider selection.
    async fn is_available(&self) -> bool;

    /// Resolve one address. `Ok(None)` means the provider answered but found
    /// no match; errors are classified for retry by the pipeline.
    async fn geocode(&self, req: &GeocodeRequest) -> Result<Option<GeocodeResult>, CallError>;

    /// Resolve a batch. The default loops over `geocode`; providers with a
    /// native batch endpoint can override.
    async fn batch_geocode(
        &self,
        reqs: &[GeocodeRequest],
    ) -> Vec<Result<Option<GeocodeResult>, CallError>> {
        let mut out = Vec::with_capacity(reqs.len());
        for req in reqs {
            out.push(self.geocode(req).await);
        }
        out
    }

    /// Shape of the provider-row `config` JSON this backend understands.
    fn config_hint(&self) -> Value {
        serde_json::json!({})
    }
}
