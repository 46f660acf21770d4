// Deal normalizer: raw provider results -> canonical SGD deals
// Pure: no I/O happens here. The FX rate is fetched before this runs.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::error::TripError;
use crate::fx::{FxRate, TARGET_CURRENCY};
use crate::provider::{ProviderSearchResponse, RawProviderResult};

// Only the first results, in provider order, are ever processed
pub const MAX_RESULTS: usize = 20;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedDeal {
    // Whole SGD, rounded half away from zero
    pub price_minor_units: i64,
    pub currency: String,
    pub airline: String,
    pub duration_minutes: u32,
    pub depart_at: String,
    pub return_at: String,
    pub stops: u32,
    pub booking_url: String,
    pub baggage_included: bool,
}

// First candidate that is present, in the order given.
pub fn first_present<'a, I>(candidates: I) -> Option<&'a str>
where
    I: IntoIterator<Item = Option<&'a str>>,
{
    candidates.into_iter().flatten().next()
}

// Like first_present, but an empty string counts as absent
fn first_non_empty<'a, I>(candidates: I) -> Option<&'a str>
where
    I: IntoIterator<Item = Option<&'a str>>,
{
    candidates.into_iter().flatten().find(|s| !s.is_empty())
}

pub fn depart_at(raw: &RawProviderResult) -> &str {
    first_present([
        raw.route.first().and_then(|s| s.local_departure.as_deref()),
        raw.local_departure.as_deref(),
        raw.utc_departure.as_deref(),
    ])
    .unwrap_or("")
}

pub fn return_at(raw: &RawProviderResult) -> &str {
    first_present([
        raw.route.last().and_then(|s| s.local_arrival.as_deref()),
        raw.local_arrival.as_deref(),
        raw.utc_arrival.as_deref(),
    ])
    .unwrap_or("")
}

pub fn airline(raw: &RawProviderResult) -> &str {
    first_non_empty([
        raw.airlines.first().map(String::as_str),
        raw.route.first().and_then(|s| s.airline.as_deref()),
    ])
    .unwrap_or("")
}

// Price in the quote currency: numeric `price`, else the conversion table
// entry for `currency`, else 0.
pub fn raw_price(raw: &RawProviderResult, currency: &str) -> f64 {
    [
        raw.price.as_ref().and_then(JsonValue::as_f64),
        raw.conversion.get(currency).and_then(JsonValue::as_f64),
    ]
    .into_iter()
    .flatten()
    .next()
    .unwrap_or(0.0)
}

pub fn stops(raw: &RawProviderResult) -> u32 {
    u32::try_from(raw.route.len().saturating_sub(1)).unwrap_or(u32::MAX)
}

pub fn duration_minutes(raw: &RawProviderResult) -> u32 {
    match raw.duration.as_ref().and_then(|d| d.total) {
        Some(seconds) if seconds.is_finite() && seconds > 0.0 => (seconds / 60.0).round() as u32,
        _ => 0,
    }
}

// Only an explicit numeric 0 for the first checked bag counts as included
pub fn baggage_included(raw: &RawProviderResult) -> bool {
    raw.bags_price
        .get("1")
        .and_then(JsonValue::as_f64)
        .map_or(false, |price| price == 0.0)
}

pub fn to_whole_units(amount: f64) -> i64 {
    amount.round() as i64
}

pub fn normalize_one(raw: &RawProviderResult, fx: &FxRate) -> NormalizedDeal {
    let price = raw_price(raw, &fx.from_currency);
    NormalizedDeal {
        price_minor_units: to_whole_units(fx.convert(price)),
        currency: TARGET_CURRENCY.to_string(),
        airline: airline(raw).to_string(),
        duration_minutes: duration_minutes(raw),
        depart_at: depart_at(raw).to_string(),
        return_at: return_at(raw).to_string(),
        stops: stops(raw),
        booking_url: raw.deep_link.clone().unwrap_or_default(),
        baggage_included: baggage_included(raw),
    }
}

// Normalize the first MAX_RESULTS raw results with one FX rate.
pub fn normalize(raw_results: &[RawProviderResult], fx: &FxRate) -> Vec<NormalizedDeal> {
    DealNormalizer::default().normalize(raw_results, fx)
}

#[derive(Debug, Clone)]
pub struct DealNormalizer {
    max_results: usize,
}

impl Default for DealNormalizer {
    fn default() -> Self {
        Self {
            max_results: MAX_RESULTS,
        }
    }
}

impl DealNormalizer {
    pub fn new(max_results: usize) -> Self {
        Self { max_results }
    }

    pub fn normalize(&self, raw_results: &[RawProviderResult], fx: &FxRate) -> Vec<NormalizedDeal> {
        raw_results
            .iter()
            .take(self.max_results)
            .map(|raw| normalize_one(raw, fx))
            .collect()
    }

    // Whole-response variant; refuses a rate quoted for another currency
    pub fn normalize_response(
        &self,
        response: &ProviderSearchResponse,
        fx: &FxRate,
    ) -> Result<Vec<NormalizedDeal>, TripError> {
        let currency = response.quote_currency();
        if !currency.eq_ignore_ascii_case(&fx.from_currency) {
            return Err(TripError::InvalidArgument(format!(
                "rate is for {} but prices are quoted in {}",
                fx.from_currency, currency
            )));
        }
        Ok(self.normalize(&response.data, fx))
    }
}
