use crate::api::{ApiClient, ApiError, FeedType, LikeOutcome};
use crate::cache::FeedCache;

/// Toggle a like and bring cached copies of the article in line.
///
/// The liked feed's membership changes with every toggle, so its cache
/// entry is dropped rather than patched.
pub async fn toggle_like(
    client: &ApiClient,
    cache: &FeedCache,
    news_id: i64,
) -> Result<LikeOutcome, ApiError> {
    let outcome = client.handle_like(news_id).await?;
    let updated = cache.apply_like(news_id, outcome);
    cache.clear(Some(FeedType::Liked.into()));
    tracing::debug!(news_id, liked = outcome.liked, updated, "Like applied to cache");
    Ok(outcome)
}
