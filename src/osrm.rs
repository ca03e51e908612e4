//! OSRM HTTP adapter for provider-tier distances.
//!
//! Queries a single column of the OSRM table service: every origin as a
//! source, the destination as the only destination.

use std::collections::HashMap;

use reqwest::StatusCode;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::DistanceError;
use crate::model::{Coordinates, Destination, DistanceResult, DistanceSource, Origin, OriginId};
use crate::traits::RoutingProvider;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OsrmConfig {
    pub base_url: String,
    pub profile: String,
    pub timeout_secs: u64,
}

impl Default for OsrmConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:5000".to_string(),
            profile: "car".to_string(),
            timeout_secs: 10,
        }
    }
}

#[derive(Debug, Clone)]
pub struct OsrmRoutingProvider {
    config: OsrmConfig,
    client: reqwest::Client,
}

impl OsrmRoutingProvider {
    pub fn new(config: OsrmConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self { config, client })
    }

    /// Table URL for `sources` against `destination`.
    pub fn table_url(&self, sources: &[Coordinates], destination: Coordinates) -> String {
        let coords = sources
            .iter()
            .chain(std::iter::once(&destination))
            .map(|point| format!("{:.6},{:.6}", point.lon, point.lat))
            .collect::<Vec<_>>()
            .join(";");
        let source_indexes = (0..sources.len())
            .map(|index| index.to_string())
            .collect::<Vec<_>>()
            .join(";");

        format!(
            "{}/table/v1/{}/{}?sources={}&destinations={}&annotations=distance",
            self.config.base_url.trim_end_matches('/'),
            self.config.profile,
            coords,
            source_indexes,
            sources.len()
        )
    }
}

impl RoutingProvider for OsrmRoutingProvider {
    async fn distances(
        &self,
        destination: &Destination,
        origins: &[Origin],
    ) -> Result<HashMap<OriginId, DistanceResult>, DistanceError> {
        let Some(target) = destination.coordinates else {
            return Err(DistanceError::generic(format!(
                "no coordinates for destination '{}'",
                destination.address
            )));
        };

        let located: Vec<(OriginId, Coordinates)> = origins
            .iter()
            .filter_map(|origin| origin.coordinates.map(|coords| (origin.id, coords)))
            .collect();
        if located.is_empty() {
            return Ok(HashMap::new());
        }

        let sources: Vec<Coordinates> = located.iter().map(|(_, coords)| *coords).collect();
        let url = self.table_url(&sources, target);
        debug!(sources = sources.len(), "requesting OSRM table");

        let response = self.client.get(url).send().await?;
        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(DistanceError::RateLimited);
        }
        // OSRM reports request errors with 400 and a JSON body carrying `code`.
        if !status.is_success() && status != StatusCode::BAD_REQUEST {
            return Err(DistanceError::generic(format!("OSRM returned HTTP {}", status)));
        }

        let body = response.json::<OsrmTableResponse>().await?;
        collect_column(&located, body)
    }
}

fn collect_column(
    located: &[(OriginId, Coordinates)],
    body: OsrmTableResponse,
) -> Result<HashMap<OriginId, DistanceResult>, DistanceError> {
    if body.code != "Ok" {
        return Err(DistanceError::generic(format!(
            "OSRM table failed: {} {}",
            body.code,
            body.message.unwrap_or_default()
        )));
    }

    let rows = body.distances.unwrap_or_default();
    if rows.len() < located.len() {
        let missing: Vec<String> = located[rows.len()..].iter().map(|(id, _)| id.to_string()).collect();
        warn!(
            rows = rows.len(),
            sources = located.len(),
            missing = %missing.join(","),
            "OSRM table is short of rows; trailing origins left unrouted"
        );
    }
    let mut results = HashMap::with_capacity(located.len());
    for ((id, _), row) in located.iter().zip(rows) {
        match row.first().copied().flatten() {
            Some(meters) => {
                results.insert(*id, DistanceResult::measured(meters.round(), DistanceSource::Provider));
            }
            None => warn!(origin = %id, "OSRM could not route origin"),
        }
    }

    Ok(results)
}

#[derive(Debug, Deserialize)]
struct OsrmTableResponse {
    code: String,
    #[serde(default)]
    message: Option<String>,
    distances: Option<Vec<Vec<Option<f64>>>>,
}
