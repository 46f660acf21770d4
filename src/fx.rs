// Currency conversion cache: SGD rates fetched on demand, cached for a day
//
// Two concurrent misses for the same currency may both fetch. Writes are
// plain overwrites of equivalent values, so the duplicate work is harmless.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tracing::{debug, info, warn};

use crate::clock::{Clock, SystemClock};
use crate::error::TripError;
use crate::provider::null_as_default;
use crate::store::{get_json, put_json, CacheStore};

pub const TARGET_CURRENCY: &str = "SGD";
pub const FX_TTL: Duration = Duration::from_secs(24 * 60 * 60);
pub const DEFAULT_FX_BASE: &str = "https://api.frankfurter.app";

// SGD per one unit of `from_currency`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FxRate {
    pub from_currency: String,
    pub to_currency: String,
    pub rate: f64,
    pub fetched_at: DateTime<Utc>,
    pub ttl_seconds: u64,
}

impl FxRate {
    pub fn unit(currency: &str, now: DateTime<Utc>) -> Self {
        Self {
            from_currency: currency.to_string(),
            to_currency: TARGET_CURRENCY.to_string(),
            rate: 1.0,
            fetched_at: now,
            ttl_seconds: 0,
        }
    }

    pub fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        let age = now.signed_duration_since(self.fetched_at);
        age.num_seconds() < self.ttl_seconds as i64
    }

    pub fn convert(&self, amount: f64) -> f64 {
        amount * self.rate
    }
}

// Body of the rate-fetch collaborator's response. Entries stay loose so a
// null or non-numeric rate for some other currency cannot sink the lookup.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RatesResponse {
    #[serde(default, deserialize_with = "null_as_default")]
    pub rates: HashMap<String, JsonValue>,
}

impl RatesResponse {
    // Numeric rate for `currency`; absent, null and non-numeric are all None
    pub fn rate_for(&self, currency: &str) -> Option<f64> {
        self.rates.get(currency).and_then(JsonValue::as_f64)
    }
}

pub fn parse_rates_response(body: &[u8]) -> Result<RatesResponse, TripError> {
    Ok(serde_json::from_slice(body)?)
}

#[async_trait]
pub trait RateFetcher: Send + Sync {
    async fn fetch_rates(&self, from_currency: &str) -> Result<RatesResponse, TripError>;
}

pub fn fx_cache_key(from_currency: &str) -> String {
    format!("fx:{}:{}", TARGET_CURRENCY, from_currency)
}

pub(crate) fn normalize_currency(code: &str) -> Result<String, TripError> {
    let code = code.trim().to_ascii_uppercase();
    if code.len() != 3 || !code.chars().all(|c| c.is_ascii_alphabetic()) {
        return Err(TripError::InvalidArgument(format!(
            "currency code must be 3 letters, got {:?}",
            code
        )));
    }
    Ok(code)
}

pub struct FxCache<S, F, C = SystemClock> {
    store: S,
    fetcher: F,
    clock: C,
    ttl: Duration,
}

impl<S: CacheStore, F: RateFetcher> FxCache<S, F, SystemClock> {
    pub fn new(store: S, fetcher: F) -> Self {
        Self::with_clock(store, fetcher, SystemClock)
    }
}

impl<S: CacheStore, F: RateFetcher, C: Clock> FxCache<S, F, C> {
    pub fn with_clock(store: S, fetcher: F, clock: C) -> Self {
        Self {
            store,
            fetcher,
            clock,
            ttl: FX_TTL,
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn fetcher(&self) -> &F {
        &self.fetcher
    }

    // Rate to SGD for `from_currency`. SGD itself short-circuits to a unit
    // rate without touching the store or the network. Fetch failures are
    // returned as-is; retrying is up to the caller.
    pub async fn rate_to_sgd(&self, from_currency: &str) -> Result<FxRate, TripError> {
        let from = normalize_currency(from_currency)?;
        let now = self.clock.now();

        if from == TARGET_CURRENCY {
            return Ok(FxRate::unit(&from, now));
        }

        let key = fx_cache_key(&from);
        if let Some(cached) = get_json::<FxRate, _>(&self.store, &key).await? {
            if cached.is_fresh(now) {
                debug!(currency = %from, rate = cached.rate, "fx cache hit");
                return Ok(cached);
            }
        }

        debug!(currency = %from, "fx cache miss, fetching");
        let response = self.fetcher.fetch_rates(&from).await.map_err(|e| {
            warn!(currency = %from, error = %e, "fx fetch failed");
            e
        })?;

        let rate = match response.rate_for(TARGET_CURRENCY) {
            Some(rate) if rate.is_finite() && rate > 0.0 => rate,
            Some(rate) => {
                return Err(TripError::DataMissing(format!(
                    "unusable {} rate {} for {}",
                    TARGET_CURRENCY, rate, from
                )))
            }
            None => {
                return Err(TripError::DataMissing(format!(
                    "no {} rate for {}",
                    TARGET_CURRENCY, from
                )))
            }
        };

        let fx = FxRate {
            from_currency: from.clone(),
            to_currency: TARGET_CURRENCY.to_string(),
            rate,
            fetched_at: now,
            ttl_seconds: self.ttl.as_secs(),
        };
        put_json(&self.store, &key, &fx, self.ttl).await?;
        info!(currency = %from, rate, "stored fx rate");
        Ok(fx)
    }
}

// Rate-fetch collaborator backed by a Frankfurter-compatible HTTP API.
pub struct HttpRateFetcher {
    client: reqwest::Client,
    base_url: String,
}

impl HttpRateFetcher {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, TripError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TripError::upstream("fx", None, e.to_string()))?;
        Ok(Self::with_client(client, base_url))
    }

    pub fn with_client(client: reqwest::Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl RateFetcher for HttpRateFetcher {
    async fn fetch_rates(&self, from_currency: &str) -> Result<RatesResponse, TripError> {
        let url = format!("{}/latest", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&[("from", from_currency), ("to", TARGET_CURRENCY)])
            .send()
            .await
            .map_err(|e| TripError::upstream("fx", None, e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(TripError::upstream("fx", Some(status.as_u16()), ""));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| TripError::upstream("fx", Some(status.as_u16()), e.to_string()))?;
        parse_rates_response(&body)
    }
}
