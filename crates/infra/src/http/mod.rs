//! HTTP transport
//!
//! A thin reqwest wrapper. It sends each request exactly once; retrying,
//! admission and recovery live in [`crate::api`].

pub mod client;

pub use client::{classify_error_response, HttpClient, HttpClientBuilder};
