use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::mpsc;

use super::controller::{FeedController, FeedSource, PageOutcome, PageRequest};
use crate::api::{ApiError, Article};

/// Events from background page loads.
#[derive(Debug)]
pub enum FeedEvent {
    /// A page fetch finished, successfully or not.
    PageLoaded {
        request: PageRequest,
        result: Result<Vec<Article>, ApiError>,
    },
    /// The load task panicked before producing a result.
    TaskPanicked { request: PageRequest, error: String },
}

impl FeedController {
    /// Apply an event produced by [`spawn_page_load`].
    pub fn handle_event(&mut self, event: FeedEvent) -> PageOutcome {
        match event {
            FeedEvent::PageLoaded { request, result } => self.apply(request, result),
            FeedEvent::TaskPanicked { request, error } => self.fail(request, error),
        }
    }
}

/// Run `future`, converting a panic into its message.
pub(crate) async fn catch_task_panic<F, T>(future: F) -> Result<T, String>
where
    F: std::future::Future<Output = T>,
{
    AssertUnwindSafe(future)
        .catch_unwind()
        .await
        .map_err(|panic| {
            if let Some(s) = panic.downcast_ref::<&'static str>() {
                s.to_string()
            } else if let Some(s) = panic.downcast_ref::<String>() {
                s.clone()
            } else {
                "task panicked".to_string()
            }
        })
}

/// Fetch `request` on a background task and report it on `tx`.
///
/// The returned handle may be aborted when the view moves elsewhere; a
/// result that does arrive late is rejected by the controller's generation
/// check anyway.
pub fn spawn_page_load<S>(
    source: Arc<S>,
    request: PageRequest,
    tx: mpsc::Sender<FeedEvent>,
) -> tokio::task::JoinHandle<()>
where
    S: FeedSource + 'static,
{
    tokio::spawn(async move {
        let fetch = source.fetch_page(request.key, request.skip, request.limit);
        let event = match catch_task_panic(fetch).await {
            Ok(result) => FeedEvent::PageLoaded { request, result },
            Err(panic_msg) => {
                tracing::error!(
                    task = "page_load",
                    feed = %request.key,
                    skip = request.skip,
                    error = %panic_msg,
                    "Background task panicked"
                );
                FeedEvent::TaskPanicked {
                    request,
                    error: panic_msg,
                }
            }
        };

        if let Err(e) = tx.send(event).await {
            tracing::warn!(error = %e, event = "PageLoaded", "Channel send failed (receiver dropped)");
        }
    })
}
