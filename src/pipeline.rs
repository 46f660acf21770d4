// End-to-end flight search and weekend suggestion services
//
// Search flow: validate -> fingerprint -> gate lookup -> (miss) fetch raw
// results -> FX rate for the quote currency -> normalize -> store. Any
// failure before the store step leaves the cache untouched.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::calendar::{add_days, next_n_weekends};
use crate::clock::{Clock, SystemClock};
use crate::config::ServiceConfig;
use crate::error::TripError;
use crate::fx::{FxCache, RateFetcher};
use crate::holidays::{HolidaySet, HolidaySource};
use crate::leave_hacks::{weekend_suggestions, WeekendSuggestion};
use crate::normalize::{DealNormalizer, NormalizedDeal};
use crate::provider::{SearchFetcher, SearchParams};
use crate::search_cache::{cache_control, fingerprint, GateLookup, SearchCacheGate};
use crate::store::CacheStore;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResults {
    pub deals: Vec<NormalizedDeal>,
    pub cache_hit: bool,
    pub etag: String,
    pub cache_control: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SearchOutcome {
    // Caller's copy is current; no body
    NotModified { etag: String, cache_control: String },
    Deals(SearchResults),
}

impl SearchOutcome {
    pub fn etag(&self) -> &str {
        match self {
            SearchOutcome::NotModified { etag, .. } => etag,
            SearchOutcome::Deals(results) => &results.etag,
        }
    }
}

pub struct FlightSearchService<S, R, F, C = SystemClock> {
    fx: FxCache<S, R, C>,
    gate: SearchCacheGate<S, C>,
    fetcher: F,
    normalizer: DealNormalizer,
}

impl<S, R, F> FlightSearchService<S, R, F, SystemClock>
where
    S: CacheStore + Clone,
    R: RateFetcher,
    F: SearchFetcher,
{
    pub fn new(store: S, rates: R, fetcher: F) -> Self {
        Self::with_clock(store, rates, fetcher, SystemClock)
    }
}

impl<S, R, F, C> FlightSearchService<S, R, F, C>
where
    S: CacheStore + Clone,
    R: RateFetcher,
    F: SearchFetcher,
    C: Clock + Clone,
{
    pub fn with_clock(store: S, rates: R, fetcher: F, clock: C) -> Self {
        Self {
            fx: FxCache::with_clock(store.clone(), rates, clock.clone()),
            gate: SearchCacheGate::with_clock(store, clock),
            fetcher,
            normalizer: DealNormalizer::default(),
        }
    }

    // TTLs and result cap from configuration
    pub fn configure(mut self, config: &ServiceConfig) -> Self {
        self.fx = self.fx.with_ttl(config.fx_ttl);
        self.gate = self.gate.with_ttl(config.search_ttl);
        self.normalizer = DealNormalizer::new(config.max_results);
        self
    }

    pub fn search_ttl(&self) -> Duration {
        self.gate.ttl()
    }

    pub fn fetcher(&self) -> &F {
        &self.fetcher
    }

    pub fn rates(&self) -> &R {
        self.fx.fetcher()
    }

    // Runs one search. `if_none_match` is the digest from a previous
    // response, if the caller has one.
    pub async fn search(
        &self,
        params: &SearchParams,
        if_none_match: Option<&str>,
    ) -> Result<SearchOutcome, TripError> {
        let params = params.normalized()?;
        let etag = fingerprint(&params)?;
        let cache_control = cache_control(self.gate.ttl());

        match self.gate.lookup(&etag, if_none_match).await? {
            GateLookup::NotModified { .. } => {
                return Ok(SearchOutcome::NotModified {
                    etag,
                    cache_control,
                })
            }
            GateLookup::Hit(entry) => {
                return Ok(SearchOutcome::Deals(SearchResults {
                    deals: entry.payload,
                    cache_hit: true,
                    etag,
                    cache_control,
                }))
            }
            GateLookup::Miss => {}
        }

        let response = self.fetcher.search(&params).await.map_err(|e| {
            warn!(origin = %params.origin, error = %e, "flight search failed");
            e
        })?;
        let currency = response.quote_currency();
        debug!(
            fingerprint = %etag,
            currency = %currency,
            raw = response.data.len(),
            "normalizing provider results"
        );

        let fx = self.fx.rate_to_sgd(&currency).await?;
        let deals = self.normalizer.normalize_response(&response, &fx)?;
        let entry = self.gate.put(&etag, deals, self.gate.ttl()).await?;

        info!(
            origin = %params.origin,
            destination = params.destination.as_deref().unwrap_or("*"),
            count = entry.payload.len(),
            "search results cached"
        );
        Ok(SearchOutcome::Deals(SearchResults {
            deals: entry.payload,
            cache_hit: false,
            etag,
            cache_control,
        }))
    }
}

// Weekend suggestions backed by a holiday source.
pub struct WeekendPlanner<H> {
    holidays: H,
    window_count: usize,
}

impl<H: HolidaySource> WeekendPlanner<H> {
    pub fn new(holidays: H, window_count: usize) -> Self {
        Self {
            holidays,
            window_count,
        }
    }

    // Holidays that can touch any of the planned windows: from the Thursday
    // before the first one to the Tuesday after the last one
    pub async fn holiday_set(&self, reference_instant: DateTime<Utc>) -> Result<HolidaySet, TripError> {
        let count = i32::try_from(self.window_count).unwrap_or(i32::MAX);
        let windows = next_n_weekends(count, reference_instant);
        let (first, last) = match (windows.first(), windows.last()) {
            (Some(first), Some(last)) => (first, last),
            _ => return Ok(HolidaySet::new()),
        };

        let from = add_days(first.start, -1);
        let to = add_days(last.end, 2);
        let holidays = self.holidays.between(from, to).await?;
        debug!(%from, %to, holidays = holidays.len(), "loaded holidays for planning");
        Ok(HolidaySet::from_holidays(&holidays))
    }

    pub async fn suggestions(
        &self,
        reference_instant: DateTime<Utc>,
    ) -> Result<Vec<WeekendSuggestion>, TripError> {
        let holidays = self.holiday_set(reference_instant).await?;
        Ok(weekend_suggestions(reference_instant, &holidays, self.window_count))
    }
}
