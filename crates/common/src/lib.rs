//! Resilience primitives shared across apiguard crates.
//!
//! # Feature Tiers
//!
//! Enable cargo features to opt into the tiers you need:
//! - `foundation`: error classification (pure, no runtime, no logging)
//! - `runtime`: admission queue and recovery manager (tokio, tracing)
//! - `observability`: tracing for the foundation tier

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms)]
#![warn(clippy::all, clippy::perf, clippy::complexity, clippy::suspicious)]

// Foundation tier
// -----------------------------------------------------------------
#[cfg(feature = "foundation")]
pub mod error;

// Runtime tier
// --------------------------------------------------------------------
#[cfg(feature = "runtime")]
pub mod resilience;

// Re-export commonly used types and traits for convenience
// ------------------------
#[cfg(feature = "foundation")]
pub use error::classifier::{classify_exception, classify_response, ExceptionHint, HeaderLookup};
#[cfg(feature = "foundation")]
pub use error::ErrorClassification;
#[cfg(feature = "runtime")]
pub use resilience::{
    AdmissionError, AdmissionQueue, AdmissionTicket, CredentialRefresher, RecoveryContext,
    RecoveryManager, RecoveryManagerBuilder, RecoveryOutcome, RecoveryStrategy, StrategyKind,
};
