use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::Instant;

use crate::api::{Article, FeedKey, LikeOutcome};

/// Default freshness window for a cached feed (5 minutes)
pub const DEFAULT_MAX_AGE: Duration = Duration::from_secs(300);

/// The pages fetched so far for one feed.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub items: Arc<Vec<Article>>,
    pub has_more: bool,
    pub last_fetched_at: Instant,
}

/// Cache statistics for display.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub entries: usize,
    pub items: usize,
    pub expired: usize,
}

/// In-memory store of feed pages, keyed by [`FeedKey`].
///
/// Cloning yields another handle onto the same store. Every operation that
/// reads an entry and writes it back does so under a single lock
/// acquisition, so interleaved tasks cannot lose each other's updates.
#[derive(Debug, Clone)]
pub struct FeedCache {
    entries: Arc<Mutex<HashMap<FeedKey, CacheEntry>>>,
    max_age: Duration,
}

impl Default for FeedCache {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_AGE)
    }
}

impl FeedCache {
    pub fn new(max_age: Duration) -> Self {
        Self {
            entries: Arc::new(Mutex::new(HashMap::new())),
            max_age,
        }
    }

    pub fn max_age(&self) -> Duration {
        self.max_age
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<FeedKey, CacheEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn get(&self, key: impl Into<FeedKey>) -> Option<CacheEntry> {
        self.lock().get(&key.into()).cloned()
    }

    /// Replace the entry for `key` wholesale and stamp it as fetched now.
    ///
    /// Repeated ids keep their first occurrence.
    pub fn set(&self, key: impl Into<FeedKey>, items: Vec<Article>, has_more: bool) {
        let key = key.into();
        let items = unique_by_id(items);
        tracing::trace!(feed = %key, count = items.len(), has_more, "Cache set");
        self.lock().insert(
            key,
            CacheEntry {
                items: Arc::new(items),
                has_more,
                last_fetched_at: Instant::now(),
            },
        );
    }

    /// Append `items` not already present (by id) to the end of the entry.
    ///
    /// Behaves like [`set`](Self::set) when no entry exists. Returns how many
    /// items were actually added.
    pub fn append(&self, key: impl Into<FeedKey>, items: Vec<Article>, has_more: bool) -> usize {
        let key = key.into();
        let mut entries = self.lock();
        match entries.get_mut(&key) {
            Some(entry) => extend_entry(entry, key, items, has_more),
            None => {
                let items = unique_by_id(items);
                let added = items.len();
                entries.insert(
                    key,
                    CacheEntry {
                        items: Arc::new(items),
                        has_more,
                        last_fetched_at: Instant::now(),
                    },
                );
                added
            }
        }
    }

    /// Like [`append`](Self::append), but only onto an existing entry.
    ///
    /// Returns `None` and stores nothing when `key` has no entry, so a later
    /// page is never cached as if it were the whole feed.
    pub fn append_existing(
        &self,
        key: impl Into<FeedKey>,
        items: Vec<Article>,
        has_more: bool,
    ) -> Option<usize> {
        let key = key.into();
        let mut entries = self.lock();
        let entry = entries.get_mut(&key)?;
        Some(extend_entry(entry, key, items, has_more))
    }

    /// Record that `key` has no further pages, leaving its items untouched.
    ///
    /// Returns `false` when there was no entry to mark.
    pub fn mark_exhausted(&self, key: impl Into<FeedKey>) -> bool {
        let key = key.into();
        match self.lock().get_mut(&key) {
            Some(entry) => {
                entry.has_more = false;
                tracing::trace!(feed = %key, "Cache marked exhausted");
                true
            }
            None => false,
        }
    }

    /// True iff an entry exists and is younger than the configured max age.
    pub fn is_valid(&self, key: impl Into<FeedKey>) -> bool {
        self.is_valid_for(key, self.max_age)
    }

    pub fn is_valid_for(&self, key: impl Into<FeedKey>, max_age: Duration) -> bool {
        self.lock()
            .get(&key.into())
            .is_some_and(|entry| entry.last_fetched_at.elapsed() < max_age)
    }

    /// Remove one entry, or all entries when `key` is `None`.
    pub fn clear(&self, key: Option<FeedKey>) {
        let mut entries = self.lock();
        match key {
            Some(key) => {
                entries.remove(&key);
            }
            None => entries.clear(),
        }
    }

    /// Drop entries older than the max age. Returns how many were removed.
    pub fn evict_expired(&self) -> usize {
        let max_age = self.max_age;
        let mut entries = self.lock();
        let before = entries.len();
        entries.retain(|_, entry| entry.last_fetched_at.elapsed() < max_age);
        let removed = before - entries.len();
        if removed > 0 {
            tracing::debug!(removed, "Evicted expired feed cache entries");
        }
        removed
    }

    pub fn stats(&self) -> CacheStats {
        let entries = self.lock();
        CacheStats {
            entries: entries.len(),
            items: entries.values().map(|e| e.items.len()).sum(),
            expired: entries
                .values()
                .filter(|e| e.last_fetched_at.elapsed() >= self.max_age)
                .count(),
        }
    }

    /// Mirror a like toggle into every cached copy of the article.
    ///
    /// Timestamps are left alone; this is not a fetch.
    pub fn apply_like(&self, news_id: i64, outcome: LikeOutcome) -> usize {
        let mut updated = 0;
        for entry in self.lock().values_mut() {
            if !entry.items.iter().any(|a| a.id == news_id) {
                continue;
            }
            for article in Arc::make_mut(&mut entry.items)
                .iter_mut()
                .filter(|a| a.id == news_id)
            {
                article.liked = outcome.liked;
                article.likes = outcome.likes;
                updated += 1;
            }
        }
        updated
    }
}

fn unique_by_id(items: Vec<Article>) -> Vec<Article> {
    let mut seen = HashSet::with_capacity(items.len());
    items.into_iter().filter(|a| seen.insert(a.id)).collect()
}

fn extend_entry(entry: &mut CacheEntry, key: FeedKey, items: Vec<Article>, has_more: bool) -> usize {
    let mut seen: HashSet<i64> = entry.items.iter().map(|a| a.id).collect();
    let fresh: Vec<Article> = items.into_iter().filter(|a| seen.insert(a.id)).collect();
    let added = fresh.len();
    if added > 0 {
        Arc::make_mut(&mut entry.items).extend(fresh);
    }
    entry.has_more = has_more;
    entry.last_fetched_at = Instant::now();

    tracing::trace!(feed = %key, added, has_more, "Cache append");
    added
}


#[cfg(test)]
mod tests {
    use super::test_support::{articles, ids};
    use super::*;
    use crate::api::{FeedType, TimeFilter};
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    #[tokio::test(start_paused = true)]
    async fn test_validity_window() {
        let cache = FeedCache::default();
        cache.set(FeedType::Latest, articles([1]), true);

        tokio::time::advance(Duration::from_millis(299_999)).await;
        assert!(cache.is_valid(FeedType::Latest));

        tokio::time::advance(Duration::from_millis(2)).await;
        assert!(!cache.is_valid(FeedType::Latest));
        // Expired entries are still readable until evicted.
        assert!(cache.get(FeedType::Latest).is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_is_valid_for_custom_age() {
        let cache = FeedCache::default();
        cache.set(FeedType::Hottest, articles([1]), true);
        tokio::time::advance(Duration::from_secs(10)).await;
        assert!(!cache.is_valid_for(FeedType::Hottest, Duration::from_secs(5)));
        assert!(cache.is_valid_for(FeedType::Hottest, Duration::from_secs(60)));
        assert!(!cache.is_valid(FeedType::Liked));
    }

    #[test]
    fn test_append_dedups_in_order() {
        let cache = FeedCache::default();
        cache.set(FeedType::Latest, articles([1, 2]), true);
        let added = cache.append(FeedType::Latest, articles([2, 3]), true);

        let entry = cache.get(FeedType::Latest).unwrap();
        assert_eq!(ids(&entry.items), vec![1, 2, 3]);
        assert_eq!(added, 1);
        assert!(entry.has_more);
    }

    #[test]
    fn test_empty_append_keeps_items() {
        let cache = FeedCache::default();
        cache.set(FeedType::Latest, articles([1, 2]), true);
        cache.append(FeedType::Latest, Vec::new(), false);

        let entry = cache.get(FeedType::Latest).unwrap();
        assert_eq!(ids(&entry.items), vec![1, 2]);
        assert!(!entry.has_more);
    }

    #[test]
    fn test_append_without_entry_acts_as_set() {
        let cache = FeedCache::default();
        cache.append(FeedType::Liked, articles([5, 6]), true);
        assert_eq!(ids(&cache.get(FeedType::Liked).unwrap().items), vec![5, 6]);
    }

    #[test]
    fn test_mark_exhausted_only_touches_flag() {
        let cache = FeedCache::default();
        cache.set(FeedType::Latest, articles([1]), true);
        assert!(cache.mark_exhausted(FeedType::Latest));
        assert!(!cache.mark_exhausted(FeedType::Hottest));

        let entry = cache.get(FeedType::Latest).unwrap();
        assert_eq!(ids(&entry.items), vec![1]);
        assert!(!entry.has_more);
        assert!(cache.get(FeedType::Hottest).is_none());
    }

    #[test]
    fn test_repeated_ids_within_a_page_are_stored_once() {
        let cache = FeedCache::default();
        cache.append(FeedType::Latest, articles([5, 5, 6]), true);
        assert_eq!(ids(&cache.get(FeedType::Latest).unwrap().items), vec![5, 6]);

        cache.set(FeedType::Hottest, articles([7, 8, 7]), true);
        assert_eq!(ids(&cache.get(FeedType::Hottest).unwrap().items), vec![7, 8]);
    }

    #[test]
    fn test_append_existing_never_creates_an_entry() {
        let cache = FeedCache::default();
        assert_eq!(cache.append_existing(FeedType::Liked, articles([11, 12]), true), None);
        assert!(cache.get(FeedType::Liked).is_none());

        cache.set(FeedType::Liked, articles([1, 2]), true);
        assert_eq!(cache.append_existing(FeedType::Liked, articles([2, 3]), false), Some(1));
        let entry = cache.get(FeedType::Liked).unwrap();
        assert_eq!(ids(&entry.items), vec![1, 2, 3]);
        assert!(!entry.has_more);
    }

    #[test]
    fn test_time_filters_are_cached_separately() {
        let cache = FeedCache::default();
        let week = FeedKey::new(FeedType::Hottest, Some(TimeFilter::Week));
        let month = FeedKey::new(FeedType::Hottest, Some(TimeFilter::Month));
        cache.set(week, articles([1]), true);
        cache.set(month, articles([2]), true);

        assert_eq!(ids(&cache.get(week).unwrap().items), vec![1]);
        assert_eq!(ids(&cache.get(month).unwrap().items), vec![2]);
        assert!(cache.get(FeedType::Hottest).is_none());
    }

    #[test]
    fn test_clear_one_or_all() {
        let cache = FeedCache::default();
        cache.set(FeedType::Latest, articles([1]), true);
        cache.set(FeedType::Hottest, articles([2]), true);

        cache.clear(Some(FeedType::Latest.into()));
        assert!(cache.get(FeedType::Latest).is_none());
        assert!(cache.get(FeedType::Hottest).is_some());

        cache.clear(None);
        assert_eq!(cache.stats(), CacheStats::default());
    }

    #[tokio::test(start_paused = true)]
    async fn test_evict_expired_and_stats() {
        let cache = FeedCache::new(Duration::from_secs(60));
        cache.set(FeedType::Latest, articles([1, 2]), true);
        tokio::time::advance(Duration::from_secs(61)).await;
        cache.set(FeedType::Hottest, articles([3]), true);

        assert_eq!(
            cache.stats(),
            CacheStats {
                entries: 2,
                items: 3,
                expired: 1
            }
        );
        assert_eq!(cache.evict_expired(), 1);
        assert!(cache.get(FeedType::Latest).is_none());
    }

    #[test]
    fn test_apply_like_updates_every_copy() {
        let cache = FeedCache::default();
        cache.set(FeedType::Latest, articles([1, 2]), true);
        cache.set(FeedType::Hottest, articles([2, 3]), true);

        let updated = cache.apply_like(2, LikeOutcome { liked: true, likes: 4 });
        assert_eq!(updated, 2);
        for key in [FeedType::Latest, FeedType::Hottest] {
            let entry = cache.get(key).unwrap();
            let article = entry.items.iter().find(|a| a.id == 2).unwrap();
            assert!(article.liked);
            assert_eq!(article.likes, 4);
        }
    }

    #[test]
    fn test_clones_share_storage() {
        let cache = FeedCache::default();
        let other = cache.clone();
        other.set(FeedType::Latest, articles([1]), false);
        assert!(cache.get(FeedType::Latest).is_some());
    }

    proptest! {
        #[test]
        fn append_never_duplicates(
            first in proptest::collection::vec(0i64..20, 0..10),
            pages in proptest::collection::vec(proptest::collection::vec(0i64..20, 0..10), 0..5),
            start_with_set in any::<bool>(),
        ) {
            let cache = FeedCache::default();
            if start_with_set {
                cache.set(FeedType::Latest, articles(first.clone()), true);
            } else {
                cache.append(FeedType::Latest, articles(first.clone()), true);
            }
            for page in pages {
                cache.append(FeedType::Latest, articles(page), true);
            }

            let mut seen = HashSet::new();
            let first_unique: Vec<i64> = first.into_iter().filter(|id| seen.insert(*id)).collect();

            let stored = ids(&cache.get(FeedType::Latest).unwrap().items);
            let unique: HashSet<i64> = stored.iter().copied().collect();
            prop_assert_eq!(unique.len(), stored.len());
            prop_assert_eq!(&stored[..first_unique.len()], &first_unique[..]);
        }
    }
}
