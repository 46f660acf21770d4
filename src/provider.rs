// Flight-search provider: request parameters, raw response shape, fetcher
// Only the fields the normalizer reads are modelled; everything else in the
// provider document is ignored.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value as JsonValue;
use tracing::{info, warn};

use crate::error::TripError;
use crate::fx::TARGET_CURRENCY;

pub const DEFAULT_FLIGHT_API_BASE: &str = "https://tequila-api.kiwi.com";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Cabin {
    #[serde(rename = "M")]
    Economy,
    #[serde(rename = "W")]
    PremiumEconomy,
    #[serde(rename = "C")]
    Business,
    #[serde(rename = "F")]
    First,
}

impl Cabin {
    pub fn code(&self) -> &'static str {
        match self {
            Cabin::Economy => "M",
            Cabin::PremiumEconomy => "W",
            Cabin::Business => "C",
            Cabin::First => "F",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "M" => Some(Cabin::Economy),
            "W" => Some(Cabin::PremiumEconomy),
            "C" => Some(Cabin::Business),
            "F" => Some(Cabin::First),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchParams {
    pub origin: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination: Option<String>,
    pub date_from: NaiveDate,
    pub date_to: NaiveDate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub passengers: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cabin: Option<Cabin>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_stops: Option<u32>,
}

fn airport_code(field: &str, code: &str) -> Result<String, TripError> {
    let code = code.trim().to_ascii_uppercase();
    if code.len() != 3 || !code.chars().all(|c| c.is_ascii_alphabetic()) {
        return Err(TripError::InvalidArgument(format!(
            "{} must be a 3-letter airport code, got {:?}",
            field, code
        )));
    }
    Ok(code)
}

impl SearchParams {
    pub fn new(origin: &str, date_from: NaiveDate, date_to: NaiveDate) -> Self {
        Self {
            origin: origin.to_string(),
            destination: None,
            date_from,
            date_to,
            passengers: None,
            cabin: None,
            max_stops: None,
        }
    }

    pub fn with_destination(mut self, destination: &str) -> Self {
        self.destination = Some(destination.to_string());
        self
    }

    // Validated copy with airport codes upper-cased, so equivalent requests
    // share one cache fingerprint.
    pub fn normalized(&self) -> Result<Self, TripError> {
        if self.date_from > self.date_to {
            return Err(TripError::InvalidArgument(format!(
                "date_from {} is after date_to {}",
                self.date_from, self.date_to
            )));
        }
        if self.passengers == Some(0) {
            return Err(TripError::InvalidArgument(
                "passengers must be at least 1".to_string(),
            ));
        }

        Ok(Self {
            origin: airport_code("origin", &self.origin)?,
            destination: self
                .destination
                .as_deref()
                .map(|d| airport_code("destination", d))
                .transpose()?,
            ..self.clone()
        })
    }

    // Query string understood by the provider's /v2/search endpoint
    pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
        let date_from = self.date_from.to_string();
        let date_to = self.date_to.to_string();

        let mut pairs = vec![("fly_from", self.origin.clone())];
        if let Some(destination) = &self.destination {
            pairs.push(("fly_to", destination.clone()));
        }
        pairs.extend([
            ("date_from", date_from.clone()),
            ("date_to", date_to.clone()),
            ("return_from", date_from),
            ("return_to", date_to),
            ("curr", TARGET_CURRENCY.to_string()),
            ("sort", "price".to_string()),
        ]);
        if let Some(passengers) = self.passengers {
            pairs.push(("adults", passengers.to_string()));
        }
        if let Some(cabin) = self.cabin {
            pairs.push(("selected_cabins", cabin.code().to_string()));
        }
        if let Some(max_stops) = self.max_stops {
            pairs.push(("max_stopovers", max_stops.to_string()));
        }
        pairs
    }
}

// Providers send `null` for empty collections as often as they omit them
pub(crate) fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

// Data structures for the provider's JSON search response
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct ProviderSearchResponse {
    pub currency: Option<String>,
    pub search_params: Option<ProviderEchoParams>,
    #[serde(deserialize_with = "null_as_default")]
    pub data: Vec<RawProviderResult>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct ProviderEchoParams {
    pub curr: Option<String>,
}

impl ProviderSearchResponse {
    // Currency prices are quoted in: top-level, then echoed params, then SGD
    pub fn quote_currency(&self) -> String {
        [
            self.currency.as_deref(),
            self.search_params.as_ref().and_then(|p| p.curr.as_deref()),
        ]
        .into_iter()
        .flatten()
        .find(|c| !c.is_empty())
        .unwrap_or(TARGET_CURRENCY)
        .to_string()
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct RawProviderResult {
    #[serde(deserialize_with = "null_as_default")]
    pub route: Vec<RouteSegment>,
    pub local_departure: Option<String>,
    pub local_arrival: Option<String>,
    pub utc_departure: Option<String>,
    pub utc_arrival: Option<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub airlines: Vec<String>,
    pub duration: Option<RawDuration>,
    // Kept loose: providers sometimes send strings or null here
    pub price: Option<JsonValue>,
    #[serde(deserialize_with = "null_as_default")]
    pub conversion: HashMap<String, JsonValue>,
    pub deep_link: Option<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub bags_price: HashMap<String, JsonValue>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct RouteSegment {
    pub local_departure: Option<String>,
    pub local_arrival: Option<String>,
    pub airline: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct RawDuration {
    // Seconds
    pub total: Option<f64>,
}

#[async_trait]
pub trait SearchFetcher: Send + Sync {
    async fn search(&self, params: &SearchParams) -> Result<ProviderSearchResponse, TripError>;
}

pub fn parse_search_response(body: &[u8]) -> Result<ProviderSearchResponse, TripError> {
    Ok(serde_json::from_slice(body)?)
}

// Search-fetch collaborator for the Tequila-style /v2/search API.
pub struct HttpSearchFetcher {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl HttpSearchFetcher {
    pub fn new(base_url: &str, api_key: &str, timeout: Duration) -> Result<Self, TripError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TripError::upstream("flight-search", None, e.to_string()))?;
        Ok(Self::with_client(client, base_url, api_key))
    }

    pub fn with_client(client: reqwest::Client, base_url: &str, api_key: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        }
    }
}

#[async_trait]
impl SearchFetcher for HttpSearchFetcher {
    async fn search(&self, params: &SearchParams) -> Result<ProviderSearchResponse, TripError> {
        let url = format!("{}/v2/search", self.base_url);
        let response = self
            .client
            .get(&url)
            .header("apikey", &self.api_key)
            .query(&params.query_pairs())
            .send()
            .await
            .map_err(|e| TripError::upstream("flight-search", None, e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            warn!(status = status.as_u16(), origin = %params.origin, "flight search rejected");
            return Err(TripError::upstream("flight-search", Some(status.as_u16()), ""));
        }

        let body = response.bytes().await.map_err(|e| {
            TripError::upstream("flight-search", Some(status.as_u16()), e.to_string())
        })?;
        let parsed = parse_search_response(&body)?;
        info!(
            origin = %params.origin,
            destination = params.destination.as_deref().unwrap_or("*"),
            results = parsed.data.len(),
            "flight search fetched"
        );
        Ok(parsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{http_response, loopback_client, serve_once};

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_provider_json_parsing() {
        let sample_json = r#"{
            "currency": "USD",
            "search_params": { "curr": "USD" },
            "data": [
                {
                    "route": [
                        { "local_departure": "2025-02-14T08:00:00.000Z", "airline": "SQ", "flyFrom": "SIN" },
                        { "local_arrival": "2025-02-17T20:00:00.000Z", "airline": "SQ" }
                    ],
                    "airlines": ["SQ"],
                    "duration": { "departure": 8400, "return": 8100, "total": 16500 },
                    "price": 100,
                    "conversion": { "USD": 100, "EUR": 92 },
                    "deep_link": "https://www.kiwi.com/deep?token=abc",
                    "bags_price": { "1": 0, "2": 45.5 },
                    "quality": 123.4
                }
            ]
        }"#;

        let response = parse_search_response(sample_json.as_bytes()).unwrap();
        assert_eq!(response.quote_currency(), "USD");
        assert_eq!(response.data.len(), 1);

        let raw = &response.data[0];
        assert_eq!(raw.route.len(), 2);
        assert_eq!(raw.route[0].airline.as_deref(), Some("SQ"));
        assert_eq!(raw.duration.as_ref().and_then(|d| d.total), Some(16500.0));
        assert_eq!(raw.bags_price.get("2").and_then(|v| v.as_f64()), Some(45.5));
    }

    #[test]
    fn test_empty_document_defaults() {
        let response = parse_search_response(b"{}").unwrap();
        assert!(response.data.is_empty());
        assert_eq!(response.quote_currency(), "SGD");
    }

    #[test]
    fn test_null_collections_are_empty() {
        let response = parse_search_response(
            br#"{"data": [{"route": null, "airlines": null, "bags_price": null, "price": null}]}"#,
        )
        .unwrap();
        let raw = &response.data[0];
        assert!(raw.route.is_empty());
        assert!(raw.airlines.is_empty());
        assert!(raw.bags_price.is_empty());
    }

    #[test]
    fn test_quote_currency_falls_back_to_echoed_params() {
        let response = parse_search_response(br#"{"currency": "", "search_params": {"curr": "EUR"}}"#)
            .unwrap();
        assert_eq!(response.quote_currency(), "EUR");
    }

    #[test]
    fn test_malformed_document_is_parse_error() {
        let err = parse_search_response(br#"{"data": "nope"}"#).unwrap_err();
        assert!(matches!(err, TripError::JsonParseError(_)));
    }

    #[test]
    fn test_normalized_params_uppercase_codes() {
        let params = SearchParams::new(" sin", ymd(2025, 2, 14), ymd(2025, 2, 17)).with_destination("bkk");
        let normalized = params.normalized().unwrap();
        assert_eq!(normalized.origin, "SIN");
        assert_eq!(normalized.destination.as_deref(), Some("BKK"));
    }

    #[test]
    fn test_invalid_params_are_rejected() {
        let inverted = SearchParams::new("SIN", ymd(2025, 2, 17), ymd(2025, 2, 14));
        assert!(inverted.normalized().unwrap_err().is_invalid_argument());

        let bad_origin = SearchParams::new("SING", ymd(2025, 2, 14), ymd(2025, 2, 17));
        assert!(bad_origin.normalized().unwrap_err().is_invalid_argument());

        let mut no_one = SearchParams::new("SIN", ymd(2025, 2, 14), ymd(2025, 2, 17));
        no_one.passengers = Some(0);
        assert!(no_one.normalized().unwrap_err().is_invalid_argument());
    }

    #[test]
    fn test_query_pairs() {
        let mut params = SearchParams::new("SIN", ymd(2025, 2, 14), ymd(2025, 2, 17)).with_destination("BKK");
        params.passengers = Some(2);
        params.cabin = Some(Cabin::Business);
        params.max_stops = Some(0);

        let pairs = params.query_pairs();
        let get = |key: &str| {
            pairs
                .iter()
                .find(|(k, _)| *k == key)
                .map(|(_, v)| v.as_str())
        };
        assert_eq!(get("fly_from"), Some("SIN"));
        assert_eq!(get("fly_to"), Some("BKK"));
        assert_eq!(get("date_from"), Some("2025-02-14"));
        assert_eq!(get("return_to"), Some("2025-02-17"));
        assert_eq!(get("curr"), Some("SGD"));
        assert_eq!(get("adults"), Some("2"));
        assert_eq!(get("selected_cabins"), Some("C"));
        assert_eq!(get("max_stopovers"), Some("0"));

        let bare = SearchParams::new("SIN", ymd(2025, 2, 14), ymd(2025, 2, 17)).query_pairs();
        assert!(!bare.iter().any(|(k, _)| *k == "fly_to" || *k == "adults"));
    }

    #[tokio::test]
    async fn test_http_non_success_status_is_upstream_unavailable() {
        let (base_url, server) = serve_once(http_response("403 Forbidden", r#"{"message":"bad key"}"#)).await;
        let fetcher = HttpSearchFetcher::with_client(loopback_client(), &base_url, "wrong");
        let params = SearchParams::new("SIN", ymd(2025, 2, 14), ymd(2025, 2, 17));

        let err = fetcher.search(&params).await.unwrap_err();
        assert!(err.is_upstream());
        assert!(matches!(
            err,
            TripError::UpstreamUnavailable { status: Some(403), .. }
        ));
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_http_search_sends_key_and_query() {
        let body = r#"{"currency":"USD","data":[{"price":100,"route":[{"airline":"TR"}]}]}"#;
        let (base_url, server) = serve_once(http_response("200 OK", body)).await;
        let fetcher = HttpSearchFetcher::with_client(loopback_client(), &base_url, "secret");
        let params = SearchParams::new("SIN", ymd(2025, 2, 14), ymd(2025, 2, 17)).with_destination("BKK");

        let response = fetcher.search(&params).await.unwrap();
        assert_eq!(response.quote_currency(), "USD");
        assert_eq!(response.data.len(), 1);

        let request = server.await.unwrap().to_ascii_lowercase();
        assert!(request.starts_with("get /v2/search?fly_from=sin&fly_to=bkk&date_from=2025-02-14"));
        assert!(request.contains("curr=sgd"));
        assert!(request.contains("\r\napikey: secret\r\n"), "missing key header in {:?}", request);
    }

    #[tokio::test]
    async fn test_http_malformed_body_is_parse_error() {
        let (base_url, server) = serve_once(http_response("200 OK", r#"{"data": 7}"#)).await;
        let fetcher = HttpSearchFetcher::with_client(loopback_client(), &base_url, "secret");
        let params = SearchParams::new("SIN", ymd(2025, 2, 14), ymd(2025, 2, 17));

        let err = fetcher.search(&params).await.unwrap_err();
        assert!(matches!(err, TripError::JsonParseError(_)));
        server.await.unwrap();
    }

    #[test]
    fn test_cabin_codes() {
        for cabin in [Cabin::Economy, Cabin::PremiumEconomy, Cabin::Business, Cabin::First] {
            assert_eq!(Cabin::from_code(cabin.code()), Some(cabin));
        }
        assert_eq!(Cabin::from_code("Z"), None);
    }
}
