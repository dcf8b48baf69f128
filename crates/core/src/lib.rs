pub mod error;
pub mod policy;
pub mod spec;
pub mod types;
