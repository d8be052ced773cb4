//! Shared types for Latch.
//!
//! Everything here is free of storage and transport concerns: the
//! activation-code view types, request parameters, card-type presets, and the
//! [`expiry`] calculator that every other crate uses to decide whether a code
//! is still usable.

pub mod card_type;
pub mod expiry;
pub mod params;
pub mod policy;
pub mod views;
