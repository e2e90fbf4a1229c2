//! Client for the remote service
//!
//! # Architecture
//!
//! - Uses the single-shot [`HttpClient`](crate::http::HttpClient) (no direct
//!   reqwest at call sites)
//! - Token fetched per attempt through [`AccessTokenProvider`]
//! - Admission queue, recovery manager and outer retry for resilience
//! - Timeout on every attempt

pub mod auth;
pub mod client;

pub use auth::{AccessTokenProvider, StaticTokenProvider};
pub use client::{CallOptions, ResilientClient, ResilientClientBuilder};
