//! Geocoding against the Google Geocoding API.
//!
//! Forward geocoding resolves the spoken address; an immediate reverse
//! lookup at the returned coordinates tends to yield cleaner address
//! components, so component extraction prefers the reverse response.

use serde::Deserialize;

use nd_domain::{Error, Location, Result};

const GEOCODE_URL: &str = "https://maps.googleapis.com/maps/api/geocode/json";

/// Eastward shift of roughly 100 m used to re-query a postal code when the
/// first answer is incomplete.
pub const PLZ_REPAIR_LNG_SHIFT: f64 = 0.00134;

// ── Wire format ──────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct GeocodeResponse {
    status: String,
    #[serde(default)]
    error_message: Option<String>,
    #[serde(default)]
    results: Vec<GeocodeEntry>,
}

#[derive(Debug, Deserialize, Clone)]
struct GeocodeEntry {
    #[serde(default)]
    formatted_address: String,
    geometry: Geometry,
    #[serde(default)]
    address_components: Vec<AddressComponent>,
}

#[derive(Debug, Deserialize, Clone)]
struct Geometry {
    location: LatLng,
}

#[derive(Debug, Deserialize, Clone)]
struct LatLng {
    lat: f64,
    lng: f64,
}

#[derive(Debug, Deserialize, Clone)]
struct AddressComponent {
    #[serde(default)]
    long_name: String,
    #[serde(default)]
    types: Vec<String>,
}

// ── Client ───────────────────────────────────────────────────────

pub struct GeocodeClient {
    api_key: String,
    client: reqwest::Client,
}

impl GeocodeClient {
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

    async fn first_result(&self, params: &[(&str, &str)]) -> Result<Option<GeocodeEntry>> {
        let response = self
            .client
            .get(GEOCODE_URL)
            .query(params)
            .query(&[("key", self.api_key.as_str()), ("language", "de")])
            .send()
            .await
            .map_err(|e| Error::Geocode(e.to_string()))?;

        let payload: GeocodeResponse = response
            .json()
            .await
            .map_err(|e| Error::Geocode(e.to_string()))?;

        if payload.status != "OK" {
            tracing::warn!(
                status = %payload.status,
                error = payload.error_message.as_deref().unwrap_or(""),
                "geocode query returned no result"
            );
            return Ok(None);
        }
        Ok(payload.results.into_iter().next())
    }

    /// Resolve a free-form address to coordinates plus postal code and
    /// city. `None` when the address is not resolvable at all.
    pub async fn geocode(&self, address: &str) -> Result<Option<Location>> {
        if self.api_key.is_empty() {
            return Err(Error::Config("MAPS_API_KEY is not set".into()));
        }

        let forward = self
            .first_result(&[("address", address), ("region", "de")])
            .await?;
        let Some(forward) = forward else {
            return Ok(None);
        };

        let lat = forward.geometry.location.lat;
        let lng = forward.geometry.location.lng;

        let latlng = format!("{lat},{lng}");
        let reverse = self.first_result(&[("latlng", latlng.as_str())]).await?;
        let best = reverse.unwrap_or(forward);

        let (plz, ort) = extract_plz_ort(&best.address_components);
        Ok(Some(Location {
            latitude: lat,
            longitude: lng,
            formatted_address: Some(best.formatted_address.clone()),
            plz,
            ort,
            google_maps_link: Some(format!("https://www.google.com/maps?q={lat},{lng}")),
        }))
    }

    /// Postal code at the given coordinates, used to repair incomplete
    /// codes by re-querying slightly east of the original hit.
    pub async fn plz_at(&self, latitude: f64, longitude: f64) -> Result<Option<String>> {
        let latlng = format!("{latitude},{longitude}");
        let entry = self.first_result(&[("latlng", latlng.as_str())]).await?;
        Ok(entry.and_then(|e| extract_plz_ort(&e.address_components).0))
    }
}

/// Pull postal code and city out of the address components.
///
/// City preference: locality, postal_town, administrative_area_level_3;
/// if none match, fall back to level 2 then level 1.
fn extract_plz_ort(components: &[AddressComponent]) -> (Option<String>, Option<String>) {
    let mut postal = None;
    let mut city = None;

    for component in components {
        if postal.is_none()
            && component.types.iter().any(|t| t == "postal_code")
            && !component.long_name.is_empty()
        {
            postal = Some(component.long_name.replace(' ', ""));
        }
        if city.is_none()
            && component.types.iter().any(|t| {
                t == "locality" || t == "postal_town" || t == "administrative_area_level_3"
            })
        {
            city = Some(component.long_name.clone());
        }
    }

    if city.is_none() {
        for component in components {
            if component.types.iter().any(|t| {
                t == "administrative_area_level_2" || t == "administrative_area_level_1"
            }) {
                city = Some(component.long_name.clone());
                break;
            }
        }
    }

    (postal, city)
}

/// Out-of-area check on the formatted address. Coarse by design; the
/// service area is Germany and Austria.
pub fn in_service_area(formatted_address: &str) -> bool {
    let lowered = formatted_address.to_lowercase();
    ["germany", "deutschland", "austria", "österreich"]
        .iter()
        .any(|country| lowered.contains(country))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn component(name: &str, types: &[&str]) -> AddressComponent {
        AddressComponent {
            long_name: name.to_string(),
            types: types.iter().map(|t| t.to_string()).collect(),
        }
    }

    #[test]
    fn extracts_postal_and_locality() {
        let components = vec![
            component("87435", &["postal_code"]),
            component("Kempten", &["locality", "political"]),
            component("Bayern", &["administrative_area_level_1"]),
        ];
        let (plz, ort) = extract_plz_ort(&components);
        assert_eq!(plz.as_deref(), Some("87435"));
        assert_eq!(ort.as_deref(), Some("Kempten"));
    }

    #[test]
    fn postal_code_spaces_are_stripped() {
        let components = vec![component("12 345", &["postal_code"])];
        let (plz, _) = extract_plz_ort(&components);
        assert_eq!(plz.as_deref(), Some("12345"));
    }

    #[test]
    fn city_falls_back_to_admin_levels() {
        let components = vec![
            component("Oberallgäu", &["administrative_area_level_2"]),
            component("Bayern", &["administrative_area_level_1"]),
        ];
        let (_, ort) = extract_plz_ort(&components);
        assert_eq!(ort.as_deref(), Some("Oberallgäu"));
    }

    #[test]
    fn no_components_yields_nothing() {
        let (plz, ort) = extract_plz_ort(&[]);
        assert_eq!(plz, None);
        assert_eq!(ort, None);
    }

    #[test]
    fn service_area_check() {
        assert!(in_service_area("Hauptstraße 5, 87435 Kempten, Germany"));
        assert!(in_service_area("Linz, Österreich"));
        assert!(!in_service_area("Rue de Rivoli, Paris, France"));
    }
}
