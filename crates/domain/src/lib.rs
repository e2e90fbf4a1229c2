//! # apiguard Domain
//!
//! Data model shared by every apiguard crate.
//!
//! This crate contains:
//! - The classified error value and its taxonomy (category, severity, code)
//! - Rate limiter configuration and statistics snapshots
//! - Application configuration structures
//! - Domain error types and Result definitions
//!
//! ## Architecture
//! - No dependencies on other apiguard crates
//! - No async runtime, no I/O
//! - Pure data structures and derivations

pub mod config;
pub mod constants;
pub mod errors;
pub mod macros;
pub mod types;

// Re-export commonly used items
pub use config::*;
pub use errors::*;
pub use types::*;
