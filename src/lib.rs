//! Client core for the news aggregation backend.
//!
//! - [`api`] - HTTP client, wire types and errors
//! - [`session`] - token storage, single-flight refresh and session state
//! - [`cache`] - in-memory feed cache with TTL
//! - [`feed`] - pagination controller and background page loads
//! - [`config`] - TOML configuration with environment overrides

pub mod api;
pub mod cache;
pub mod config;
pub mod display;
pub mod feed;
pub mod session;
