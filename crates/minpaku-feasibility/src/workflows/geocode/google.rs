use super::{
    GeoCoordinate, GeocodeError, GeocodeHit, GeocodingProvider, GeocodingProviderKind,
    ReverseGeocodeHit,
};
use reqwest::blocking::Client;
use serde::Deserialize;
use std::time::Duration;

const ENDPOINT: &str = "https://maps.googleapis.com/maps/api/geocode/json";
const KIND: GeocodingProviderKind = GeocodingProviderKind::GoogleMaps;

/// Google Maps Geocoding API (JSON, Japanese results).
#[derive(Debug)]
pub struct GoogleMapsGeocoder {
    client: Client,
    api_key: String,
    endpoint: String,
}

impl GoogleMapsGeocoder {
    pub fn new(api_key: impl Into<String>, timeout: Duration) -> Result<Self, GeocodeError> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(GeocodeError::NotConfigured(KIND));
        }
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| GeocodeError::provider(KIND, format!("リクエストエラー: {err}")))?;
        Ok(Self {
            client,
            api_key,
            endpoint: ENDPOINT.to_string(),
        })
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    fn fetch(&self, params: &[(&str, &str)]) -> Result<GeocodeResponse, GeocodeError> {
        self.client
            .get(&self.endpoint)
            .query(params)
            .query(&[("key", self.api_key.as_str()), ("language", "ja")])
            .send()
            .and_then(|resp| resp.error_for_status())
            .and_then(|resp| resp.json::<GeocodeResponse>())
            .map_err(|err| GeocodeError::transport(KIND, err))
    }
}

impl GeocodingProvider for GoogleMapsGeocoder {
    fn kind(&self) -> GeocodingProviderKind {
        KIND
    }

    fn geocode(&self, address: &str) -> Result<GeocodeHit, GeocodeError> {
        self.fetch(&[("address", address)])?.into_hit()
    }

    fn reverse_geocode(
        &self,
        coordinate: GeoCoordinate,
    ) -> Result<ReverseGeocodeHit, GeocodeError> {
        let latlng = format!("{},{}", coordinate.latitude, coordinate.longitude);
        self.fetch(&[("latlng", latlng.as_str())])?.into_reverse_hit()
    }
}

#[derive(Debug, Deserialize)]
struct GeocodeResponse {
    status: String,
    #[serde(default)]
    results: Vec<GeocodeResult>,
}

#[derive(Debug, Deserialize)]
struct GeocodeResult {
    formatted_address: String,
    geometry: Option<Geometry>,
    #[serde(default)]
    address_components: Vec<AddressComponent>,
}

#[derive(Debug, Deserialize)]
struct Geometry {
    location: Location,
}

#[derive(Debug, Deserialize)]
struct Location {
    lat: f64,
    lng: f64,
}

#[derive(Debug, Deserialize)]
struct AddressComponent {
    long_name: String,
}

impl GeocodeResponse {
    fn first_ok(self, label: &str) -> Result<GeocodeResult, GeocodeError> {
        let status = self.status;
        match self.results.into_iter().next() {
            Some(result) if status == "OK" => Ok(result),
            _ => Err(GeocodeError::provider(KIND, format!("{label}: {status}"))),
        }
    }

    fn into_hit(self) -> Result<GeocodeHit, GeocodeError> {
        let result = self.first_ok("Google Maps API エラー")?;
        let location = result
            .geometry
            .map(|geometry| geometry.location)
            .ok_or_else(|| GeocodeError::provider(KIND, "座標情報が見つかりませんでした"))?;
        Ok(GeocodeHit {
            coordinate: GeoCoordinate::new(location.lat, location.lng)?,
            formatted_address: result.formatted_address,
            provider: KIND,
        })
    }

    fn into_reverse_hit(self) -> Result<ReverseGeocodeHit, GeocodeError> {
        let result = self.first_ok("逆ジオコーディングエラー")?;
        Ok(ReverseGeocodeHit {
            formatted_address: result.formatted_address,
            components: result
                .address_components
                .into_iter()
                .map(|component| component.long_name)
                .collect(),
            provider: KIND,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ok_status_yields_first_location() {
        let payload: GeocodeResponse = serde_json::from_str(
            r#"{
                "status": "OK",
                "results": [{
                    "formatted_address": "日本、〒150-0001 東京都渋谷区神宮前１丁目２−３",
                    "geometry": { "location": { "lat": 35.6702, "lng": 139.7026 } }
                }]
            }"#,
        )
        .expect("payload parses");

        let hit = payload.into_hit().expect("status OK");
        assert_eq!(hit.provider, GeocodingProviderKind::GoogleMaps);
        assert_eq!(hit.coordinate.longitude, 139.7026);
    }

    #[test]
    fn non_ok_status_is_reported() {
        let payload: GeocodeResponse =
            serde_json::from_str(r#"{"status": "ZERO_RESULTS", "results": []}"#)
                .expect("payload parses");
        let err = payload.into_hit().expect_err("no results");
        assert_eq!(
            err.to_string(),
            "google: Google Maps API エラー: ZERO_RESULTS"
        );
    }

    #[test]
    fn reverse_hit_collects_component_names() {
        let payload: GeocodeResponse = serde_json::from_str(
            r#"{
                "status": "OK",
                "results": [{
                    "formatted_address": "東京都渋谷区神宮前",
                    "address_components": [{ "long_name": "神宮前" }, { "long_name": "渋谷区" }]
                }]
            }"#,
        )
        .expect("payload parses");
        let hit = payload.into_reverse_hit().expect("status OK");
        assert_eq!(hit.components, vec!["神宮前", "渋谷区"]);
    }

    #[test]
    fn transport_errors_hide_the_api_key() {
        let geocoder = GoogleMapsGeocoder::new("SECRETKEY123", Duration::from_secs(2))
            .expect("client builds")
            .with_endpoint("http://127.0.0.1:9/maps/api/geocode/json");
        let err = geocoder.geocode("東京都渋谷区").expect_err("nothing listens on port 9");
        assert!(!err.to_string().contains("SECRETKEY123"), "{err}");
    }

    #[test]
    fn blank_key_is_not_configured() {
        assert!(matches!(
            GoogleMapsGeocoder::new("", Duration::from_secs(1)),
            Err(GeocodeError::NotConfigured(GeocodingProviderKind::GoogleMaps))
        ));
    }
}
