//! Persistence for Latch.
//!
//! [`models`] holds the documents as they are stored; [`storage`] defines the
//! store traits the engine is written against, along with the MongoDB backend
//! used in production and an in-memory backend for tests and local runs.

pub mod models;
pub mod storage;
