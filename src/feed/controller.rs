use std::collections::HashSet;
use std::future::Future;

use crate::api::{ApiClient, ApiError, Article, FeedKey, FeedType, LikeOutcome, TimeFilter};
use crate::cache::FeedCache;
use crate::config::PageSizes;

/// A backend that can serve feed pages.
pub trait FeedSource: Send + Sync {
    fn fetch_page(
        &self,
        key: FeedKey,
        skip: usize,
        limit: u32,
    ) -> impl Future<Output = Result<Vec<Article>, ApiError>> + Send;
}

impl FeedSource for ApiClient {
    async fn fetch_page(
        &self,
        key: FeedKey,
        skip: usize,
        limit: u32,
    ) -> Result<Vec<Article>, ApiError> {
        self.feed(key, skip, limit).await
    }
}

/// One page fetch the controller wants performed.
///
/// `generation` is captured at issue time; [`FeedController::apply`] drops
/// the response if the controller has moved on since.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub key: FeedKey,
    pub skip: usize,
    pub limit: u32,
    pub generation: u64,
}

impl PageRequest {
    pub fn is_first_page(&self) -> bool {
        self.skip == 0
    }
}

/// What applying a page did to the displayed list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageOutcome {
    /// Served from a fresh cache entry; nothing was fetched.
    Cached { count: usize },
    /// First page replaced the list.
    Replaced { count: usize },
    /// Later page appended; `added` excludes duplicates.
    Appended { added: usize },
    /// Empty page: no further pages exist.
    Exhausted,
    /// Fetch failed; the message is also kept in [`FeedController::error`].
    Failed(String),
    /// Response belonged to a feed no longer displayed and was discarded.
    Stale,
}

/// Drives one feed view: selection, cache hydration and infinite scroll.
///
/// The controller never performs I/O itself. [`select`](Self::select) and
/// [`on_sentinel_visible`](Self::on_sentinel_visible) hand back a
/// [`PageRequest`]; whoever runs it feeds the result to
/// [`apply`](Self::apply). Every selection bumps the generation, so
/// responses for an earlier selection are recognised and dropped.
#[derive(Debug)]
pub struct FeedController {
    cache: FeedCache,
    page_sizes: PageSizes,
    active: FeedKey,
    items: Vec<Article>,
    has_more: bool,
    loading: bool,
    loading_more: bool,
    error: Option<String>,
    generation: u64,
}

impl FeedController {
    pub fn new(cache: FeedCache, page_sizes: PageSizes) -> Self {
        Self {
            cache,
            page_sizes,
            active: FeedType::Latest.into(),
            items: Vec::new(),
            has_more: true,
            loading: false,
            loading_more: false,
            error: None,
            generation: 0,
        }
    }

    pub fn items(&self) -> &[Article] {
        &self.items
    }

    pub fn active(&self) -> FeedKey {
        self.active
    }

    pub fn has_more(&self) -> bool {
        self.has_more
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn is_loading_more(&self) -> bool {
        self.loading_more
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn cache(&self) -> &FeedCache {
        &self.cache
    }

    /// Switch to `key`.
    ///
    /// A fresh cache entry is shown immediately and `None` is returned.
    /// Otherwise the list is reset and the first page is requested.
    pub fn select(&mut self, key: impl Into<FeedKey>) -> Option<PageRequest> {
        let key = key.into();
        self.generation += 1;
        self.active = key;
        self.error = None;
        self.loading_more = false;

        if self.cache.is_valid(key) {
            if let Some(entry) = self.cache.get(key) {
                tracing::debug!(feed = %key, count = entry.items.len(), "Feed served from cache");
                self.items = entry.items.as_ref().clone();
                self.has_more = entry.has_more;
                self.loading = false;
                return None;
            }
        }

        self.items.clear();
        self.has_more = true;
        self.loading = true;
        Some(self.request(0))
    }

    /// Change the time window of the active feed. Behaves like a feed change.
    ///
    /// Only the hottest feed has time windows; for other feeds the filter is
    /// dropped (see [`FeedKey::new`]).
    pub fn set_time_filter(&mut self, filter: Option<TimeFilter>) -> Option<PageRequest> {
        self.select(FeedKey::new(self.active.feed_type, filter))
    }

    /// The end-of-list sentinel scrolled into view.
    ///
    /// Returns the next page request when more pages exist and nothing is
    /// loading.
    pub fn on_sentinel_visible(&mut self) -> Option<PageRequest> {
        if !self.has_more || self.loading || self.loading_more {
            return None;
        }
        self.loading_more = true;
        Some(self.request(self.items.len()))
    }

    /// Same as [`on_sentinel_visible`](Self::on_sentinel_visible).
    pub fn load_more(&mut self) -> Option<PageRequest> {
        self.on_sentinel_visible()
    }

    fn request(&self, skip: usize) -> PageRequest {
        PageRequest {
            key: self.active,
            skip,
            limit: self.page_sizes.limit_for(skip),
            generation: self.generation,
        }
    }

    fn is_current(&self, request: &PageRequest) -> bool {
        request.generation == self.generation && request.key == self.active
    }

    /// Apply the result of `request`.
    pub fn apply(
        &mut self,
        request: PageRequest,
        result: Result<Vec<Article>, ApiError>,
    ) -> PageOutcome {
        self.settle(request, result.map_err(|e| e.user_message()))
    }

    /// Settle `request` with a failure that never reached the backend
    /// boundary, such as a panicked load task.
    pub fn fail(&mut self, request: PageRequest, message: impl Into<String>) -> PageOutcome {
        self.settle(request, Err(message.into()))
    }

    fn settle(&mut self, request: PageRequest, result: Result<Vec<Article>, String>) -> PageOutcome {
        if !self.is_current(&request) {
            tracing::debug!(
                feed = %request.key,
                skip = request.skip,
                generation = request.generation,
                current = self.generation,
                "Discarding stale feed page"
            );
            return PageOutcome::Stale;
        }

        if request.is_first_page() {
            self.loading = false;
        }
        self.loading_more = false;

        let page = match result {
            Ok(page) => page,
            Err(message) => {
                tracing::warn!(feed = %request.key, skip = request.skip, error = %message, "Feed page failed");
                self.error = Some(message.clone());
                return PageOutcome::Failed(message);
            }
        };
        self.error = None;

        if page.is_empty() {
            self.has_more = false;
            if request.is_first_page() {
                self.items.clear();
                self.cache.set(request.key, Vec::new(), false);
            } else if !self.cache.mark_exhausted(request.key) {
                self.reseed_cache(request.key, false);
            }
            tracing::debug!(feed = %request.key, skip = request.skip, "Feed exhausted");
            return PageOutcome::Exhausted;
        }

        self.has_more = true;
        if request.is_first_page() {
            let mut seen = HashSet::new();
            self.items = page.into_iter().filter(|a| seen.insert(a.id)).collect();
            self.cache.set(request.key, self.items.clone(), true);
            PageOutcome::Replaced {
                count: self.items.len(),
            }
        } else {
            let mut seen: HashSet<i64> = self.items.iter().map(|a| a.id).collect();
            let fresh: Vec<Article> = page
                .iter()
                .filter(|a| seen.insert(a.id))
                .cloned()
                .collect();
            let added = fresh.len();
            self.items.extend(fresh);
            if self.cache.append_existing(request.key, page, true).is_none() {
                self.reseed_cache(request.key, true);
            }
            PageOutcome::Appended { added }
        }
    }

    /// Store the whole displayed list for `key` after its cache entry was
    /// dropped mid-scroll (like toggle, eviction).
    fn reseed_cache(&self, key: FeedKey, has_more: bool) {
        tracing::debug!(
            feed = %key,
            count = self.items.len(),
            "Cache entry gone, reseeding from displayed list"
        );
        self.cache.set(key, self.items.clone(), has_more);
    }

    /// Mirror a like toggle into the displayed list.
    pub fn apply_like(&mut self, news_id: i64, outcome: LikeOutcome) {
        for article in self.items.iter_mut().filter(|a| a.id == news_id) {
            article.liked = outcome.liked;
            article.likes = outcome.likes;
        }
    }

    /// Select `key` and, on a cache miss, fetch its first page from `source`.
    pub async fn load<S: FeedSource>(&mut self, source: &S, key: impl Into<FeedKey>) -> PageOutcome {
        match self.select(key) {
            Some(request) => {
                let result = source
                    .fetch_page(request.key, request.skip, request.limit)
                    .await;
                self.apply(request, result)
            }
            None => PageOutcome::Cached {
                count: self.items.len(),
            },
        }
    }

    /// Fetch the next page from `source`, if another page may be requested.
    pub async fn load_more_from<S: FeedSource>(&mut self, source: &S) -> Option<PageOutcome> {
        let request = self.load_more()?;
        let result = source
            .fetch_page(request.key, request.skip, request.limit)
            .await;
        Some(self.apply(request, result))
    }
}
