// Rust guideline compliant 2026-10-12

//! Adapters (secondary ports) for the fraud pipeline binaries.
//!
//! Each sub-module implements one or more port traits from the `domain` crate
//! against a real backend: `lapin` for the broker, `reqwest` for the status
//! callback, `sqlx` for the transaction store.

pub mod amqp_broker;
pub mod http_status_callback;
pub mod sqlite_repository;
