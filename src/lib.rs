// Weekend trip planner core: leave-hack calendar and flight deal pipeline

// Calendar side
pub mod calendar;
pub mod holidays;
pub mod leave_hacks;

// Flight deal side
pub mod fx;
pub mod normalize;
pub mod provider;
pub mod search_cache;

// Shared plumbing
pub mod clock;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod store;

#[cfg(test)]
mod test_support;

// Re-export key types for convenience
pub use calendar::{next_n_weekends, DateRange};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{ConfigError, ServiceConfig};
pub use error::TripError;
pub use fx::{FxCache, FxRate, HttpRateFetcher, RateFetcher};
pub use holidays::{Holiday, HolidaySet, HolidaySource, StaticHolidaySource};
pub use leave_hacks::{
    classify, is_leave_hack, long_weekend_combos, weekend_suggestions, LeaveHackReason,
    LongWeekendCandidate, WeekendSuggestion,
};
pub use normalize::{normalize, DealNormalizer, NormalizedDeal};
pub use pipeline::{FlightSearchService, SearchOutcome, SearchResults, WeekendPlanner};
pub use provider::{Cabin, HttpSearchFetcher, RawProviderResult, SearchFetcher, SearchParams};
pub use search_cache::{fingerprint, CachedSearchEntry, GateLookup, SearchCacheGate};
pub use store::{CacheStore, InMemoryStore};
