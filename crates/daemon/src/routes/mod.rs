//! HTTP routes mounted by the daemon.

pub mod health;
