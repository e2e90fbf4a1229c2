//! Infrastructure error plumbing

mod conversions;

pub use conversions::{classify_transport_error, InfraError};
