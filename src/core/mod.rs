//! Core Module - Business Logic
//!
//! Account validation, image hashing, GPS clustering, classification,
//! the screening pipeline, reward rules and the admin review workflows.

pub mod classifier;
pub mod geo;
pub mod payouts;
pub mod phash;
pub mod review;
pub mod rewards;
pub mod screening;
pub mod validators;

pub use classifier::*;
pub use geo::*;
pub use payouts::*;
pub use phash::*;
pub use review::*;
pub use rewards::*;
pub use screening::*;
pub use validators::*;
