//! `gridexec-wrapper` building blocks.
//!
//! The wrapper is the process the external scheduler actually runs in
//! each job slot. It supervises the real workload command and reports
//! lifecycle callbacks to the daemon over the control WebSocket.

pub mod reporter;
pub mod workload;
