//! Backend boundary: wire types, errors and the HTTP client.

mod client;
mod error;
mod types;

pub use client::{ApiClient, API_KEY_HEADER};
pub use error::{ApiError, GENERIC_FAILURE};
pub use types::{
    Acknowledgement, Article, AuthStatus, Credentials, FeedKey, FeedType, ImageUpload,
    LikeOutcome, ProfileUpdate, Registration, Source, TimeFilter, UserProfile,
};
