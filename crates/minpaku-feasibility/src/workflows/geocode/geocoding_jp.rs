use super::{GeoCoordinate, GeocodeError, GeocodeHit, GeocodingProvider, GeocodingProviderKind};
use regex::Regex;
use reqwest::blocking::Client;
use std::sync::LazyLock;
use std::time::Duration;

const ENDPOINT: &str = "https://www.geocoding.jp/api/";
const KIND: GeocodingProviderKind = GeocodingProviderKind::GeocodingJp;

static ERROR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<error>(.*?)</error>").expect("valid error regex"));
static COORDINATE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)<coordinate>.*?<lat>\s*([^<]+?)\s*</lat>.*?<lng>\s*([^<]+?)\s*</lng>")
        .expect("valid coordinate regex")
});

/// geocoding.jp XML API. Works without a key; one is sent when configured.
#[derive(Debug)]
pub struct GeocodingJpGeocoder {
    client: Client,
    api_key: Option<String>,
    endpoint: String,
}

impl GeocodingJpGeocoder {
    pub fn new(api_key: Option<String>, timeout: Duration) -> Result<Self, GeocodeError> {
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
}

impl GeocodingProvider for GeocodingJpGeocoder {
    fn kind(&self) -> GeocodingProviderKind {
        KIND
    }

    fn geocode(&self, address: &str) -> Result<GeocodeHit, GeocodeError> {
        let mut request = self.client.get(&self.endpoint).query(&[("q", address)]);
        if let Some(key) = &self.api_key {
            request = request.query(&[("key", key.as_str())]);
        }
        let body = request
            .send()
            .and_then(|resp| resp.error_for_status())
            .and_then(|resp| resp.text())
            .map_err(|err| GeocodeError::transport(KIND, err))?;
        parse_document(&body, address)
    }
}

fn parse_document(body: &str, address: &str) -> Result<GeocodeHit, GeocodeError> {
    if let Some(caps) = ERROR_RE.captures(body) {
        return Err(GeocodeError::provider(
            KIND,
            format!("Geocoding.jp API エラー: {}", caps[1].trim()),
        ));
    }

    let caps = COORDINATE_RE
        .captures(body)
        .ok_or_else(|| GeocodeError::provider(KIND, "座標情報が見つかりませんでした"))?;
    let parse = |raw: &str| {
        raw.parse::<f64>()
            .map_err(|_| GeocodeError::provider(KIND, format!("処理エラー: 数値ではありません ({raw})")))
    };
    Ok(GeocodeHit {
        coordinate: GeoCoordinate::new(parse(&caps[1])?, parse(&caps[2])?)?,
        formatted_address: address.to_string(),
        provider: KIND,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_coordinate_block() {
        let body = r#"<?xml version="1.0" encoding="UTF-8" ?>
<result>
<version>1.2</version>
<address>新潟県長岡市大手通</address>
<coordinate>
<lat>37.446920</lat>
<lng>138.851318</lng>
<lat_dms>37,26,48.912</lat_dms>
</coordinate>
</result>"#;
        let hit = parse_document(body, "新潟県長岡市大手通").expect("coordinate present");
        assert_eq!(hit.coordinate.latitude, 37.44692);
        assert_eq!(hit.coordinate.longitude, 138.851318);
        assert_eq!(hit.formatted_address, "新潟県長岡市大手通");
    }

    #[test]
    fn error_element_wins() {
        let body = "<result><error>004</error></result>";
        let err = parse_document(body, "x").expect_err("api error");
        assert!(err.to_string().contains("Geocoding.jp API エラー: 004"));
    }

    #[test]
    fn transport_errors_hide_the_api_key() {
        let geocoder =
            GeocodingJpGeocoder::new(Some("SECRETKEY123".to_string()), Duration::from_secs(2))
                .expect("client builds")
                .with_endpoint("http://127.0.0.1:9/api/");
        let err = geocoder.geocode("東京都渋谷区").expect_err("nothing listens on port 9");
        let text = err.to_string();
        assert!(text.contains("リクエストエラー"), "{text}");
        assert!(!text.contains("SECRETKEY123"), "{text}");
    }

    #[test]
    fn missing_coordinate_is_an_error() {
        assert!(parse_document("<result></result>", "x").is_err());
    }
}
