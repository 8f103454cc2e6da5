//! Geocoding job payload: filters, work set, and the resume checkpoint.

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::store::{Db, HouseholdFilter};

pub const MAX_GEOCODE_LIMIT: i64 = 50_000;

/// Opaque payload stored on a geocoding job row.
///
/// Static jobs (`dynamic = false`) carry a pre-materialised `household_ids`
/// list; `checkpoint_index` is the resume offset into it. Dynamic jobs
/// re-query under the filters at each handler start and use
/// `checkpoint_index` as the cumulative processed count.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct GeocodingJobPayload {
    pub filters: HouseholdFilter,
    pub limit: i64,
    pub skip_geocoded: bool,
    pub provider_id: Option<String>,
    pub dynamic: bool,
    pub household_ids: Vec<i64>,
    pub checkpoint_index: usize,
    pub failed_household_ids: Vec<i64>,
}

impl Default for GeocodingJobPayload {
    fn default() -> Self {
        Self {
            filters: HouseholdFilter::default(),
            limit: MAX_GEOCODE_LIMIT,
            skip_geocoded: true,
            provider_id: None,
            dynamic: false,
            household_ids: Vec::new(),
            checkpoint_index: 0,
            failed_household_ids: Vec::new(),
        }
    }
}

impl GeocodingJobPayload {
    /// Build a static payload by materialising the work set now.
    pub async fn materialise_static(
        db: &Db,
        filters: HouseholdFilter,
        limit: i64,
        skip_geocoded: bool,
        provider_id: Option<String>,
    ) -> Result<Self> {
        let limit = limit.clamp(1, MAX_GEOCODE_LIMIT);
        let household_ids = db.query_household_ids(&filters, skip_geocoded, limit).await?;
        Ok(Self {
            filters,
            limit,
            skip_geocoded,
            provider_id,
            dynamic: false,
            household_ids,
            checkpoint_index: 0,
            failed_household_ids: Vec::new(),
        })
    }

    /// Build a dynamic payload; the work set is discovered at handler start.
    pub fn dynamic(
        filters: HouseholdFilter,
        limit: i64,
        skip_geocoded: bool,
        provider_id: Option<String>,
    ) -> Self {
        Self {
            filters,
            limit: limit.clamp(1, MAX_GEOCODE_LIMIT),
            skip_geocoded,
            provider_id,
            dynamic: true,
            ..Default::default()
        }
    }
}
