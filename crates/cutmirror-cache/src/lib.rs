//! Tiered, content-addressed cache.
//!
//! Entries are keyed by the SHA-256 of the input bytes, never by path or
//! name, and grouped by purpose:
//!
//! - `normalized-media`: proxies and muted copies of source media
//! - `structured-analysis`: blueprints, clip records, detected signals
//! - `strategic-plan`: advisor hints per (blueprint, library) pair
//!
//! Structured payloads are gzip-compressed JSON wrapped in a versioned
//! envelope. A schema version mismatch or an unreadable entry is a miss and
//! the stale file is deleted so the caller recomputes.
//!
//! The whole cache root can be deleted at any time to force recomputation.

pub mod codec;
pub mod config;
pub mod error;
pub mod hash;
pub mod key;
pub mod lookup;
pub mod store;

pub use config::CacheConfig;
pub use error::{CacheError, CacheResult};
pub use hash::{combine_hashes, hash_bytes, hash_file, hash_json};
pub use key::{CacheKey, CachePurpose};
pub use lookup::{ContentHashLookup, LegacyFilenameLookup, Lookup, LookupChain, LookupRequest, LookupStrategy};
pub use store::{Computed, ContentCache};

/// Metric names emitted by the cache.
pub mod names {
    pub const CACHE_HITS: &str = "cutmirror_cache_hits_total";
    pub const CACHE_MISSES: &str = "cutmirror_cache_misses_total";
    pub const CACHE_EVICTIONS: &str = "cutmirror_cache_evictions_total";
    pub const CACHE_WRITES: &str = "cutmirror_cache_writes_total";
}
