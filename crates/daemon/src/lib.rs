//! gridexec daemon library.
//!
//! Exposes the building blocks (config, engine, error mapping, routes,
//! WebSocket infrastructure) so integration tests and the binary
//! entrypoint can both access them.

pub mod config;
pub mod engine;
pub mod error;
pub mod routes;
pub mod state;
pub mod ws;
