//! Utils Module - Helper Functions & Shared Utilities
//!
//! Constants, rate limiting, token blacklist, telemetry, client
//! fingerprinting and media storage shared across the service.

pub mod cache;
pub mod constants;
pub mod fingerprint;
pub mod media;
pub mod rate_limit;
pub mod telemetry;

pub use cache::*;
pub use constants::*;
pub use fingerprint::*;
pub use media::*;
pub use rate_limit::*;
pub use telemetry::*;
