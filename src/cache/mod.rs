//! In-memory feed cache with TTL and append-dedup.

mod store;

pub use crate::api::FeedKey;
pub use store::{CacheEntry, CacheStats, FeedCache, DEFAULT_MAX_AGE};

#[cfg(test)]
pub(crate) use store::test_support;
