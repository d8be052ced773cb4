//! Latch API service.
//!
//! Serves the activation-code engine over HTTP: code generation, listing,
//! deletion, maintenance and stats for operators, and redemption for client
//! software. See [`config::LatchApiConfig`] for configuration options.

pub mod config;
pub mod server;

pub(crate) mod context;
pub(crate) mod error;
pub(crate) mod handlers;
