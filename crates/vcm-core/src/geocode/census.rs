//! US Census Bureau geocoder (free, no API key).

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::retry::CallError;

use super::provider::{GeocodeProvider, GeocodeRequest, GeocodeResult};

pub const CENSUS_PROVIDER_ID: &str = "census";

const DEFAULT_BASE_URL: &str = "https://geocoding.geo.census.gov";
const BENCHMARK: &str = "Public_AR_Current";

pub struct CensusGeocoder {
    client: reqwest::Client,
    base_url: String,
}

impl CensusGeocoder {
    /// Build from a provider-row config; `baseUrl` may override the public
    /// endpoint (tests point it at a local server).
    pub fn new(client: reqwest::Client, config: &Value) -> Self {
        let base_url = config
            .get("baseUrl")
            .and_then(Value::as_str)
            .unwrap_or(DEFAULT_BASE_URL)
            .trim_end_matches('/')
            .to_string();
        Self { client, base_url }
    }
}

#[derive(Debug, Deserialize)]
struct CensusResponse {
    result: CensusResult,
}

#[derive(Debug, Deserialize)]
struct CensusResult {
    #[serde(rename = "addressMatches", default)]
    address_matches: Vec<CensusMatch>,
}

#[derive(Debug, Deserialize)]
struct CensusMatch {
    coordinates: CensusCoordinates,
}

#[derive(Debug, Deserialize)]
struct CensusCoordinates {
    /// Longitude.
    x: f64,
    /// Latitude.
    y: f64,
}

#[async_trait]
impl GeocodeProvider for CensusGeocoder {
    fn provider_id(&self) -> &str {
        CENSUS_PROVIDER_ID
    }

    fn provider_name(&self) -> &str {
        "US Census Geocoder"
    }

    async fn is_available(&self) -> bool {
        // Public service without credentials; nothing to pre-flight.
        true
    }

    async fn geocode(&self, req: &GeocodeRequest) -> Result<Option<GeocodeResult>, CallError> {
        let url = format!("{}/geocoder/locations/onelineaddress", self.base_url);
        let resp = self
            .client
            .get(&url)
            .query(&[
                ("address", req.one_line().as_str()),
                ("benchmark", BENCHMARK),
                ("format", "json"),
            ])
            .send()
            .await
            .map_err(CallError::from)?;

        let status = resp.status();
        if !status.is_success() {
            return Err(CallError::Http(status.as_u16()));
        }

        let body: CensusResponse = resp
            .json()
            .await
            .map_err(|e| CallError::Other(format!("census response: {e}")))?;

        Ok(body.result.address_matches.into_iter().next().map(|m| {
            GeocodeResult {
                latitude: m.coordinates.y,
                longitude: m.coordinates.x,
                confidence: None,
                match_type: None,
                source: CENSUS_PROVIDER_ID.to_string(),
            }
        }))
    }

    fn config_hint(&self) -> Value {
        json!({ "baseUrl": "override for the geocoding service root" })
    }
}
