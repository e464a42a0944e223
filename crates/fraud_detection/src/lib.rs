// Rust guideline compliant 2026-10-12

//! Wiring for the fraud pipeline binaries: real adapters, environment
//! configuration, tracing setup and the transactions-service HTTP API.

pub mod adapters;
pub mod config;
pub mod http;
pub mod telemetry;
