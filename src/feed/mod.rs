//! Feed pagination: the view controller, background page loads and likes.
//!
//! - [`controller`] - selection, cache hydration, infinite scroll and the
//!   generation-based race guard
//! - [`loader`] - spawns page fetches and reports them as [`FeedEvent`]s
//! - [`likes`] - like toggling with cache write-through
//!
//! # Example
//!
//! ```ignore
//! let mut feed = FeedController::new(cache, config.page_sizes());
//! if let Some(request) = feed.select(FeedType::Hottest) {
//!     spawn_page_load(Arc::clone(&client), request, tx.clone());
//! }
//! // later, in the event loop
//! feed.handle_event(event);
//! ```

mod controller;
mod likes;
mod loader;

pub use controller::{FeedController, FeedSource, PageOutcome, PageRequest};
pub use likes::toggle_like;
pub use loader::{spawn_page_load, FeedEvent};
