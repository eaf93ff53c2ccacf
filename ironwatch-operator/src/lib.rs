//! Ironwatch operator library.
//!
//! Exposes the operator's internals for integration testing.
//! In production, `ironwatch-operator` runs as a binary (main.rs).

pub mod cli;
pub mod health;
pub mod logging;
pub mod metrics_server;
pub mod modules;
pub mod orchestrator;
