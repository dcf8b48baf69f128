//! Mapping from [`CoreError`] to wire-level error replies.

use gridexec_core::error::CoreError;
use gridexec_proto::{ErrorCode, Reply};

/// Convert an engine-side error into the reply sent to the peer.
///
/// Internal faults (including status conflicts, which cannot happen
/// under the single-writer engine) are logged here so no failure
/// leaves the daemon silently.
pub fn error_reply(err: CoreError) -> Reply {
    let code = match &err {
        CoreError::NotFound(_) => ErrorCode::NotFound,
        CoreError::Validation(_) | CoreError::RejectedSpec(_) => ErrorCode::ValidationError,
        CoreError::AlreadyTerminal(_) => ErrorCode::AlreadyTerminal,
        CoreError::BackendUnavailable(_) => ErrorCode::BackendUnavailable,
        CoreError::Conflict { .. } | CoreError::Internal(_) => {
            tracing::error!(error = %err, "Internal engine error");
            ErrorCode::Internal
        }
    };
    Reply::Error {
        code,
        message: err.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_maps_to_not_found_code() {
        let reply = error_reply(CoreError::NotFound(9));
        assert!(matches!(
            reply,
            Reply::Error {
                code: ErrorCode::NotFound,
                ..
            }
        ));
    }

    #[test]
    fn conflict_is_surfaced_as_internal() {
        let reply = error_reply(CoreError::Conflict {
            id: 3,
            detail: "expected status Queued, found Cancelled".into(),
        });
        assert!(matches!(
            reply,
            Reply::Error {
                code: ErrorCode::Internal,
                ..
            }
        ));
    }
}
