//! Session tracking: token storage, refresh deduplication and the
//! UI-facing authentication state.
//!
//! - [`TokenJar`] - holds the access/refresh tokens (the cookie analog)
//! - [`SingleFlight`] - in-flight register that collapses concurrent callers
//! - [`RefreshGuard`] - at most one token refresh in flight per process
//! - [`Session`] - derives [`SessionState`] from the jar, refreshing silently

mod guard;
mod single_flight;
mod state;
mod tokens;

pub use guard::{RefreshGuard, REFRESH_OPERATION};
pub use single_flight::SingleFlight;
pub use state::{AuthBackend, AuthPhase, Session, SessionState};
pub use tokens::{SessionFileError, TokenJar, ACCESS_TOKEN_TTL_SECS, REFRESH_TOKEN_TTL_SECS};
