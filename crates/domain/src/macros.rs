//! Macro for implementing Display and FromStr for status enums
//!
//! Used by the health buckets derived from rate limiter statistics so that
//! their string form is identical in logs, admin responses and config.
//!
//! # Example
//!
//! ```rust
//! use apiguard_domain::impl_domain_status_conversions;
//!
//! #[derive(Debug, Clone, Copy, PartialEq, Eq)]
//! pub enum Lane {
//!     Fast,
//!     Slow,
//! }
//!
//! impl_domain_status_conversions!(Lane {
//!     Fast => "fast",
//!     Slow => "slow",
//! });
//!
//! assert_eq!(Lane::Fast.to_string(), "fast");
//! assert_eq!("SLOW".parse::<Lane>(), Ok(Lane::Slow));
//! ```

/// Implements Display and FromStr traits for status enums
///
/// - Display writes the given lowercase string
/// - FromStr parses case-insensitively and names the enum on failure
#[macro_export]
macro_rules! impl_domain_status_conversions {
    ($enum_name:ident { $($variant:ident => $str:literal),+ $(,)? }) => {
        impl std::fmt::Display for $enum_name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                match self {
                    $(Self::$variant => f.write_str($str),)+
                }
            }
        }

        impl std::str::FromStr for $enum_name {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.to_lowercase().as_str() {
                    $($str => Ok(Self::$variant),)+
                    _ => Err(format!("Invalid {}: {}", stringify!($enum_name), s)),
                }
            }
        }
    };
}
