//! Redispatch policy.
//!
//! Failures detected before a job ever reached `Running` are cheap to
//! retry; failures after `Running` may have left partial side effects,
//! so their bound is a separate, explicit configuration point.

/// How many times a job may be redispatched after a failure.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Attempt bound for failures that occurred before the wrapper
    /// reported `JobStarted`.
    pub max_attempts: u32,
    /// Attempt bound for failures after the job was observed `Running`.
    pub running_max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 2,
            running_max_attempts: 1,
        }
    }
}

impl RetryPolicy {
    /// Whether a job at `attempt` retries should be redispatched after a
    /// failure, given whether it had reached `Running`.
    pub fn should_retry(&self, attempt: u32, was_running: bool) -> bool {
        let limit = if was_running {
            self.running_max_attempts
        } else {
            self.max_attempts
        };
        attempt < limit
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pre_running_failures_retry_up_to_max_attempts() {
        let policy = RetryPolicy::default();
        assert!(policy.should_retry(0, false));
        assert!(policy.should_retry(1, false));
        assert!(!policy.should_retry(2, false));
    }

    #[test]
    fn running_failures_retry_once_by_default() {
        let policy = RetryPolicy::default();
        assert!(policy.should_retry(0, true));
        assert!(!policy.should_retry(1, true));
    }

    #[test]
    fn running_retries_can_be_disabled() {
        let policy = RetryPolicy {
            max_attempts: 2,
            running_max_attempts: 0,
        };
        assert!(!policy.should_retry(0, true));
    }
}
