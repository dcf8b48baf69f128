//! Job spec: the resource/command descriptor submitted with every job.
//!
//! The engine treats the spec as opaque beyond the schema checks here;
//! interpretation is the scheduler bridge's business.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Maximum length of a job name.
const MAX_NAME_LEN: usize = 128;

/// Maximum number of workload arguments.
const MAX_ARGS: usize = 256;

/// Upper bound on requested CPUs.
const MAX_CPUS: u32 = 1024;

/// Upper bound on requested memory (1 TiB).
const MAX_MEMORY_MB: u64 = 1024 * 1024;

/// Upper bound on requested scratch disk (16 TiB).
const MAX_DISK_MB: u64 = 16 * 1024 * 1024;

/// Resource and command descriptor for a single job.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobSpec {
    /// Batch name, shown in scheduler listings.
    pub name: String,
    /// Container image the job slot runs in.
    pub image: String,
    /// Command executed inside the container.
    pub entrypoint: String,
    /// Arguments passed to the entrypoint.
    #[serde(default)]
    pub args: Vec<String>,
    pub cpus: u32,
    pub memory_mb: u64,
    pub disk_mb: u64,
    /// Optional scheduler placement expression, passed through verbatim.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requirements: Option<String>,
}

impl JobSpec {
    /// Validate the spec before any job state is created.
    ///
    /// Rules:
    /// - `name` non-empty, at most `MAX_NAME_LEN` chars, filesystem-safe
    ///   characters only (it ends up in log paths).
    /// - `image` and `entrypoint` non-empty.
    /// - Resource requests positive and within the configured bounds.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.name.is_empty() {
            return Err(CoreError::Validation("Job name must not be empty".into()));
        }
        if self.name.len() > MAX_NAME_LEN {
            return Err(CoreError::Validation(format!(
                "Job name must not exceed {MAX_NAME_LEN} characters"
            )));
        }
        if !self
            .name
            .chars()
            .all(|c| c.is_alphanumeric() || c == '-' || c == '_' || c == '.')
        {
            return Err(CoreError::Validation(
                "Job name may only contain alphanumeric, hyphen, underscore, or dot characters"
                    .into(),
            ));
        }
        if self.image.is_empty() {
            return Err(CoreError::Validation(
                "Container image must not be empty".into(),
            ));
        }
        if self.entrypoint.is_empty() {
            return Err(CoreError::Validation("Entrypoint must not be empty".into()));
        }
        if self.args.len() > MAX_ARGS {
            return Err(CoreError::Validation(format!(
                "At most {MAX_ARGS} arguments allowed"
            )));
        }
        if self.cpus == 0 || self.cpus > MAX_CPUS {
            return Err(CoreError::Validation(format!(
                "cpus must be between 1 and {MAX_CPUS}"
            )));
        }
        if self.memory_mb == 0 || self.memory_mb > MAX_MEMORY_MB {
            return Err(CoreError::Validation(format!(
                "memory_mb must be between 1 and {MAX_MEMORY_MB}"
            )));
        }
        if self.disk_mb == 0 || self.disk_mb > MAX_DISK_MB {
            return Err(CoreError::Validation(format!(
                "disk_mb must be between 1 and {MAX_DISK_MB}"
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_spec() -> JobSpec {
        JobSpec {
            name: "fit-model.v2".into(),
            image: "ghcr.io/lab/fit:latest".into(),
            entrypoint: "python run.py".into(),
            args: vec!["--shard".into(), "0".into()],
            cpus: 4,
            memory_mb: 8192,
            disk_mb: 20480,
            requirements: None,
        }
    }

    #[test]
    fn valid_spec_passes() {
        assert!(valid_spec().validate().is_ok());
    }

    #[test]
    fn empty_name_rejected() {
        let mut spec = valid_spec();
        spec.name = String::new();
        assert!(spec.validate().is_err());
    }

    #[test]
    fn name_with_spaces_rejected() {
        let mut spec = valid_spec();
        spec.name = "fit model".into();
        assert!(spec.validate().is_err());
    }

    #[test]
    fn empty_image_rejected() {
        let mut spec = valid_spec();
        spec.image = String::new();
        assert!(spec.validate().is_err());
    }

    #[test]
    fn zero_cpus_rejected() {
        let mut spec = valid_spec();
        spec.cpus = 0;
        assert!(spec.validate().is_err());
    }

    #[test]
    fn oversized_memory_rejected() {
        let mut spec = valid_spec();
        spec.memory_mb = MAX_MEMORY_MB + 1;
        assert!(spec.validate().is_err());
    }

    #[test]
    fn spec_roundtrips_through_json() {
        let spec = valid_spec();
        let json = serde_json::to_string(&spec).unwrap();
        let back: JobSpec = serde_json::from_str(&json).unwrap();
        assert_eq!(back, spec);
    }
}
