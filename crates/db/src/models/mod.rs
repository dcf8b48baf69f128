pub mod job;
pub mod status;

pub use job::Job;
pub use status::JobStatus;
