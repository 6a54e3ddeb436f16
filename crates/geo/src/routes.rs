//! Driving-time lookups against the Google Routes API v2.

use serde::Deserialize;

use nd_domain::{Error, Result};

const ROUTES_URL: &str = "https://routes.googleapis.com/directions/v2:computeRoutes";
const FIELD_MASK: &str = "routes.distanceMeters,routes.duration";

/// One computed route.
#[derive(Debug, Clone, PartialEq)]
pub struct Route {
    pub distance_meters: u64,
    pub duration_seconds: u64,
}

#[derive(Debug, Deserialize)]
struct ComputeRoutesResponse {
    #[serde(default)]
    routes: Vec<WireRoute>,
}

#[derive(Debug, Deserialize)]
struct WireRoute {
    #[serde(rename = "distanceMeters", default)]
    distance_meters: u64,
    #[serde(default)]
    duration: String,
}

pub struct RoutesClient {
    api_key: String,
    client: reqwest::Client,
}

impl RoutesClient {
    pub fn new(api_key: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .map_err(|e| Error::Http(e.to_string()))?;
        Ok(Self {
            api_key: api_key.to_string(),
            client,
        })
    }

    /// Driving route from the caller's coordinates to a provider address.
    /// `None` when the API finds no route.
    pub async fn drive_duration(
        &self,
        origin_latitude: f64,
        origin_longitude: f64,
        destination_address: &str,
    ) -> Result<Option<Route>> {
        if self.api_key.is_empty() {
            return Err(Error::Config("ROUTES_API_KEY is not set".into()));
        }

        let body = serde_json::json!({
            "origin": {
                "location": {
                    "latLng": { "latitude": origin_latitude, "longitude": origin_longitude }
                }
            },
            "destination": { "address": destination_address },
            "travelMode": "DRIVE",
            "routingPreference": "TRAFFIC_UNAWARE",
            "languageCode": "de",
            "units": "METRIC",
            "regionCode": "DE",
        });

        let response = self
            .client
            .post(ROUTES_URL)
            .header("X-Goog-Api-Key", &self.api_key)
            .header("X-Goog-FieldMask", FIELD_MASK)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::Http(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(Error::Http(format!("routes API returned {status}: {detail}")));
        }

        let payload: ComputeRoutesResponse = response
            .json()
            .await
            .map_err(|e| Error::Http(e.to_string()))?;

        Ok(payload.routes.into_iter().next().and_then(|route| {
            parse_duration_seconds(&route.duration).map(|duration_seconds| Route {
                distance_meters: route.distance_meters,
                duration_seconds,
            })
        }))
    }
}

/// The API encodes durations as `"1200s"`.
fn parse_duration_seconds(raw: &str) -> Option<u64> {
    raw.trim().strip_suffix('s')?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duration_string_parsing() {
        assert_eq!(parse_duration_seconds("1200s"), Some(1200));
        assert_eq!(parse_duration_seconds("0s"), Some(0));
        assert_eq!(parse_duration_seconds(" 5400s "), Some(5400));
        assert_eq!(parse_duration_seconds("1200"), None);
        assert_eq!(parse_duration_seconds(""), None);
        assert_eq!(parse_duration_seconds("abcs"), None);
    }

    #[test]
    fn response_deserializes() {
        let payload: ComputeRoutesResponse = serde_json::from_str(
            r#"{"routes":[{"distanceMeters":10000,"duration":"600s"}]}"#,
        )
        .unwrap();
        assert_eq!(payload.routes.len(), 1);
        assert_eq!(payload.routes[0].distance_meters, 10000);
    }

    #[test]
    fn empty_response_deserializes() {
        let payload: ComputeRoutesResponse = serde_json::from_str("{}").unwrap();
        assert!(payload.routes.is_empty());
    }
}
