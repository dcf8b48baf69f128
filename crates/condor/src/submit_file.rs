//! Rendering of HTCondor submit descriptions from a [`JobSpec`].
//!
//! The job slot runs the wrapper, which supervises the real workload
//! and reports lifecycle callbacks to the daemon; the workload command
//! and the callback coordinates travel via the job environment.

use gridexec_core::spec::JobSpec;
use gridexec_core::types::JobId;

/// Render the submit description piped to `condor_submit -`.
///
/// Docker universe, resource requests straight from the spec, and the
/// user-supplied placement expression (if any) passed through as
/// `requirements`.
pub fn render_submit_description(
    spec: &JobSpec,
    job_id: JobId,
    attempt: u32,
    daemon_url: &str,
) -> String {
    let mut lines = vec![
        "universe = docker".to_string(),
        format!("docker_image = {}", spec.image),
        format!("JobBatchName = {}", spec.name),
        format!("request_cpus = {}", spec.cpus),
        format!("request_memory = {}MB", spec.memory_mb),
        format!("request_disk = {}MB", spec.disk_mb),
        "executable = gridexec-wrapper".to_string(),
        format!("arguments = {}", condor_arguments(&spec.entrypoint, &spec.args)),
        // $(Cluster) is expanded by condor_submit, so the wrapper knows
        // the handle the daemon tracks it under.
        format!(
            "environment = \"GRIDEXEC_JOB_ID={job_id} GRIDEXEC_ATTEMPT={attempt} GRIDEXEC_DAEMON_URL={daemon_url} GRIDEXEC_HANDLE=$(Cluster)\""
        ),
        format!("output = gridexec-{job_id}-{attempt}.out"),
        format!("error = gridexec-{job_id}-{attempt}.err"),
        format!("log = gridexec-{job_id}.log"),
        "should_transfer_files = YES".to_string(),
        "when_to_transfer_output = ON_EXIT".to_string(),
        // Tags the unit so reconciliation never enumerates (or removes)
        // condor jobs this daemon did not dispatch.
        "MY.GridexecManaged = True".to_string(),
    ];

    if let Some(requirements) = &spec.requirements {
        lines.push(format!("requirements = ({requirements})"));
    }

    lines.push("queue".to_string());
    lines.join("\n")
}

/// Render the new-syntax `arguments` value: the whole list is wrapped
/// in double quotes, whitespace separates arguments, and an argument
/// containing whitespace or a single quote is single-quoted with
/// embedded single quotes doubled. Literal double quotes are doubled
/// everywhere. The entrypoint passes through unquoted so a multi-word
/// entrypoint still splits into words.
fn condor_arguments(entrypoint: &str, args: &[String]) -> String {
    let mut joined = entrypoint.to_string();
    for arg in args {
        joined.push(' ');
        joined.push_str(&quote_argument(arg));
    }
    format!("\"{}\"", joined.replace('"', "\"\""))
}

fn quote_argument(arg: &str) -> String {
    if arg.chars().any(|c| c.is_whitespace() || c == '\'') {
        format!("'{}'", arg.replace('\'', "''"))
    } else {
        arg.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec() -> JobSpec {
        JobSpec {
            name: "fit-model".into(),
            image: "ghcr.io/lab/fit:2".into(),
            entrypoint: "python run.py".into(),
            args: vec!["--shard".into(), "3".into()],
            cpus: 4,
            memory_mb: 8192,
            disk_mb: 20480,
            requirements: None,
        }
    }

    #[test]
    fn renders_resource_requests() {
        let text = render_submit_description(&spec(), 12, 0, "ws://daemon:5555/control");
        assert!(text.contains("universe = docker"));
        assert!(text.contains("docker_image = ghcr.io/lab/fit:2"));
        assert!(text.contains("request_cpus = 4"));
        assert!(text.contains("request_memory = 8192MB"));
        assert!(text.contains("request_disk = 20480MB"));
        assert!(text.ends_with("queue"));
    }

    #[test]
    fn carries_callback_coordinates_in_environment() {
        let text = render_submit_description(&spec(), 12, 1, "ws://daemon:5555/control");
        assert!(text.contains("GRIDEXEC_JOB_ID=12"));
        assert!(text.contains("GRIDEXEC_ATTEMPT=1"));
        assert!(text.contains("GRIDEXEC_DAEMON_URL=ws://daemon:5555/control"));
        assert!(text.contains("GRIDEXEC_HANDLE=$(Cluster)"));
    }

    #[test]
    fn tags_submissions_as_gridexec_managed() {
        let text = render_submit_description(&spec(), 12, 0, "ws://d/control");
        assert!(text.contains("MY.GridexecManaged = True"));
    }

    #[test]
    fn requirements_passed_through_parenthesized() {
        let mut s = spec();
        s.requirements = Some("HasGpu == true".into());
        let text = render_submit_description(&s, 1, 0, "ws://d/control");
        assert!(text.contains("requirements = (HasGpu == true)"));
    }

    #[test]
    fn no_requirements_line_when_absent() {
        let text = render_submit_description(&spec(), 1, 0, "ws://d/control");
        assert!(!text.contains("requirements ="));
    }

    #[test]
    fn arguments_line_uses_new_syntax_quoting() {
        let text = render_submit_description(&spec(), 1, 0, "ws://d/control");
        assert!(text.contains("arguments = \"python run.py --shard 3\""));
    }

    #[test]
    fn whitespace_arguments_are_quoted() {
        assert_eq!(
            condor_arguments("run.sh", &["a b".into(), "c".into()]),
            "\"run.sh 'a b' c\""
        );
    }

    #[test]
    fn embedded_single_quotes_are_doubled() {
        assert_eq!(
            condor_arguments("run.sh", &["it's".into()]),
            "\"run.sh 'it''s'\""
        );
    }

    #[test]
    fn embedded_double_quotes_are_doubled() {
        assert_eq!(
            condor_arguments("run.sh", &["say \"hi\"".into()]),
            "\"run.sh 'say \"\"hi\"\"'\""
        );
    }
}
