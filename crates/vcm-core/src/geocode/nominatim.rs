//! OpenStreetMap Nominatim geocoder.
//!
//! Nominatim's usage policy wants an identifying User-Agent (set on the
//! shared client) and a contact email, configured on the provider row.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::retry::CallError;

use super::provider::{GeocodeProvider, GeocodeRequest, GeocodeResult};

pub const NOMINATIM_PROVIDER_ID: &str = "nominatim";

const DEFAULT_BASE_URL: &str = "https://nominatim.openstreetmap.org";

pub struct NominatimGeocoder {
    client: reqwest::Client,
    base_url: String,
    email: Option<String>,
}

impl NominatimGeocoder {
    pub fn new(client: reqwest::Client, config: &Value) -> Self {
        let base_url = config
            .get("baseUrl")
            .and_then(Value::as_str)
            .unwrap_or(DEFAULT_BASE_URL)
            .trim_end_matches('/')
            .to_string();
        let email = config
            .get("email")
            .and_then(Value::as_str)
            .map(str::to_string);
        Self {
            client,
            base_url,
            email,
        }
    }
}

#[derive(Debug, Deserialize)]
struct NominatimPlace {
    lat: String,
    lon: String,
    importance: Option<f64>,
    #[serde(rename = "type")]
    place_type: Option<String>,
}

#[async_trait]
impl GeocodeProvider for NominatimGeocoder {
    fn provider_id(&self) -> &str {
        NOMINATIM_PROVIDER_ID
    }

    fn provider_name(&self) -> &str {
        "OpenStreetMap Nominatim"
    }

    async fn is_available(&self) -> bool {
        true
    }

    async fn geocode(&self, req: &GeocodeRequest) -> Result<Option<GeocodeResult>, CallError> {
        let url = format!("{}/search", self.base_url);
        let one_line = req.one_line();
        let mut query: Vec<(&str, &str)> = vec![
            ("q", one_line.as_str()),
            ("format", "jsonv2"),
            ("limit", "1"),
        ];
        if let Some(email) = &self.email {
            query.push(("email", email.as_str()));
        }

        let resp = self
            .client
            .get(&url)
            .query(&query)
            .send()
            .await
            .map_err(CallError::from)?;

        let status = resp.status();
        if !status.is_success() {
            return Err(CallError::Http(status.as_u16()));
        }

        let places: Vec<NominatimPlace> = resp
            .json()
            .await
            .map_err(|e| CallError::Other(format!("nominatim response: {e}")))?;

        let Some(place) = places.into_iter().next() else {
            return Ok(None);
        };
        let latitude: f64 = place
            .lat
            .parse()
            .map_err(|_| CallError::Other(format!("nominatim latitude {:?}", place.lat)))?;
        let longitude: f64 = place
            .lon
            .parse()
            .map_err(|_| CallError::Other(format!("nominatim longitude {:?}", place.lon)))?;

        Ok(Some(GeocodeResult {
            latitude,
            longitude,
            confidence: place.importance,
            match_type: place.place_type,
            source: NOMINATIM_PROVIDER_ID.to_string(),
        }))
    }

    fn config_hint(&self) -> Value {
        json!({
            "baseUrl": "override for a self-hosted instance",
            "email": "contact email sent per the service usage policy",
        })
    }
}
