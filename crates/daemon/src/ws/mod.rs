//! WebSocket control endpoint infrastructure.
//!
//! Provides connection management, keepalive pings, and the HTTP
//! upgrade handler used by Axum routes.

mod handler;
mod keepalive;
pub mod registry;

pub use handler::control_handler;
pub use keepalive::start_keepalive;
pub use registry::ConnectionRegistry;
