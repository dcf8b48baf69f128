//! Control-protocol message envelopes.
//!
//! Clients, wrappers, and the daemon exchange JSON text frames shaped
//! `{"kind": ..., "job_id": ..., "sequence": ..., "payload": ...}`.
//! Wrapper callbacks carry a per-job monotonically increasing sequence
//! number so the daemon can drop duplicate or stale deliveries
//! (at-least-once transport).

pub mod envelope;

pub use envelope::{parse_envelope, Envelope, ErrorCode, ProtoError, Reply, Request};
