// Search result cache gate
//
// Repeated searches are deduplicated by a digest of the canonical request.
// The same digest is handed to callers as the ETag, so a conditional request
// carrying it can be answered without resending the payload.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::clock::{Clock, SystemClock};
use crate::error::TripError;
use crate::normalize::NormalizedDeal;
use crate::provider::SearchParams;
use crate::store::{get_json, put_json, CacheStore};

pub const SEARCH_TTL: Duration = Duration::from_secs(30 * 60);

// Hex SHA-256 of the request rendered as JSON with sorted keys. Absent
// optional parameters are omitted rather than written as null.
//
// This is a digest of the request, not of the payload. Once an entry expires
// and is refetched with different deals, the ETag stays the same, so a client
// revalidating the old ETag against the fresh entry gets NotModified for
// content it has not seen. Entries live for one TTL, which bounds how stale
// that client copy can be.
pub fn fingerprint(params: &SearchParams) -> Result<String, TripError> {
    // Value maps are ordered by key, which is what makes this canonical
    let canonical = serde_json::to_value(params)?.to_string();
    let digest = Sha256::digest(format!("search:{}", canonical).as_bytes());
    Ok(hex::encode(digest))
}

pub fn search_cache_key(fingerprint: &str) -> String {
    format!("search:{}", fingerprint)
}

pub fn cache_control(ttl: Duration) -> String {
    format!("max-age={}", ttl.as_secs())
}

// Accepts `abc`, `"abc"` and `W/"abc"` alike
fn strip_etag(value: &str) -> &str {
    let value = value.trim();
    let value = value.strip_prefix("W/").unwrap_or(value);
    value.trim_matches('"')
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedSearchEntry {
    pub fingerprint: String,
    pub payload: Vec<NormalizedDeal>,
    pub stored_at: DateTime<Utc>,
    pub ttl_seconds: u64,
}

impl CachedSearchEntry {
    pub fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        now.signed_duration_since(self.stored_at).num_seconds() < self.ttl_seconds as i64
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum GateLookup {
    // Caller already holds the current payload
    NotModified { fingerprint: String },
    Hit(CachedSearchEntry),
    Miss,
}

pub struct SearchCacheGate<S, C = SystemClock> {
    store: S,
    clock: C,
    ttl: Duration,
}

impl<S: CacheStore> SearchCacheGate<S, SystemClock> {
    pub fn new(store: S) -> Self {
        Self::with_clock(store, SystemClock)
    }
}

impl<S: CacheStore, C: Clock> SearchCacheGate<S, C> {
    pub fn with_clock(store: S, clock: C) -> Self {
        Self {
            store,
            clock,
            ttl: SEARCH_TTL,
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub async fn get(&self, fingerprint: &str) -> Result<Option<CachedSearchEntry>, TripError> {
        let key = search_cache_key(fingerprint);
        let entry = get_json::<CachedSearchEntry, _>(&self.store, &key).await?;
        // Stores may hold entries slightly past their TTL; expired means absent
        Ok(entry.filter(|e| e.is_fresh(self.clock.now())))
    }

    pub async fn put(
        &self,
        fingerprint: &str,
        deals: Vec<NormalizedDeal>,
        ttl: Duration,
    ) -> Result<CachedSearchEntry, TripError> {
        let entry = CachedSearchEntry {
            fingerprint: fingerprint.to_string(),
            payload: deals,
            stored_at: self.clock.now(),
            ttl_seconds: ttl.as_secs(),
        };
        put_json(&self.store, &search_cache_key(fingerprint), &entry, ttl).await?;
        debug!(fingerprint, count = entry.payload.len(), "stored search results");
        Ok(entry)
    }

    // Conditional read. A matching `if_none_match` only counts when an
    // entry is actually cached: a digest for an expired entry is a miss.
    pub async fn lookup(
        &self,
        fingerprint: &str,
        if_none_match: Option<&str>,
    ) -> Result<GateLookup, TripError> {
        let entry = match self.get(fingerprint).await? {
            Some(entry) => entry,
            None => {
                debug!(fingerprint, "search cache miss");
                return Ok(GateLookup::Miss);
            }
        };

        if if_none_match.map(strip_etag) == Some(entry.fingerprint.as_str()) {
            debug!(fingerprint, "search not modified");
            return Ok(GateLookup::NotModified {
                fingerprint: entry.fingerprint,
            });
        }

        debug!(fingerprint, count = entry.payload.len(), "search cache hit");
        Ok(GateLookup::Hit(entry))
    }
}
