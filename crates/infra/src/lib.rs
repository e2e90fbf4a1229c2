//! # apiguard Infrastructure
//!
//! Impure side of apiguard: everything that touches the network, the
//! filesystem or process-global state.
//!
//! This crate contains:
//! - The reqwest transport and the resilient client built on it
//! - Configuration loading from environment variables and files
//! - The operator admin surface (axum)
//! - Tracing subscriber bootstrap
//!
//! ## Architecture
//! - Builds on the admission queue and recovery manager in `apiguard-common`
//! - Depends on `apiguard-domain` for the data model
//! - Raw transport errors never leave this crate unclassified

pub mod admin;
pub mod api;
pub mod config;
pub mod errors;
pub mod http;
pub mod observability;

// Re-export commonly used items
pub use admin::{setup_admin_router, AdminAction, AdminResponse, AdminService};
pub use api::{
    AccessTokenProvider, CallOptions, ResilientClient, ResilientClientBuilder, StaticTokenProvider,
};
pub use errors::InfraError;
pub use http::HttpClient;
pub use observability::{init_tracing, LogFormat};
