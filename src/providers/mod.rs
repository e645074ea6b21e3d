//! Providers Module - External Service Clients
//!
//! Airtime payouts through Africa's Talking.

pub mod airtime;

pub use airtime::{AfricasTalkingClient, AirtimeProvider};
