// Job Execution Context
// Private state of one running job: its environment, working directory, and progress

use crate::execution::matrix::MatrixInstance;
use crate::parser::models::{
    CommandResult, CommandStatus, FailureKind, JobResult, JobSpec, Phase,
};

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Variables every job receives on top of its own environment
pub const INJECTED_VARIABLES: &[&str] = &[
    "CI",
    "TRAVIS",
    "TRAVIS_PYTHON_VERSION",
    "TRAVIS_JOB_NUMBER",
    "TRAVIS_BUILD_DIR",
];

/// Runtime context of one job.
///
/// Owned by the task running the job; nothing in it is shared with other jobs.
#[derive(Debug, Clone)]
pub struct JobContext {
    /// 1-based job number
    pub number: usize,

    pub job: JobSpec,

    pub allow_failure: bool,

    /// Directory commands run in
    pub working_dir: PathBuf,

    /// Job environment plus injected variables, over the host environment
    env: HashMap<String, String>,

    /// Latest phase in which a command actually executed
    pub phase_reached: Phase,

    /// Results recorded so far, in execution order
    pub command_results: Vec<CommandResult>,
}

impl JobContext {
    pub fn new(instance: &MatrixInstance, working_dir: PathBuf) -> Self {
        let mut env = instance.job.environment.to_hash_map();
        env.insert("CI".to_string(), "true".to_string());
        env.insert("TRAVIS".to_string(), "true".to_string());
        env.insert(
            "TRAVIS_PYTHON_VERSION".to_string(),
            instance.job.interpreter_version.clone(),
        );
        env.insert("TRAVIS_JOB_NUMBER".to_string(), instance.number.to_string());
        env.insert(
            "TRAVIS_BUILD_DIR".to_string(),
            working_dir.to_string_lossy().into_owned(),
        );

        Self {
            number: instance.number,
            job: instance.job.clone(),
            allow_failure: instance.allow_failure,
            working_dir,
            env,
            phase_reached: Phase::BeforeInstall,
            command_results: Vec::new(),
        }
    }

    /// Fill in host variables the job and the injected set leave undefined
    pub fn with_host_env(mut self, host_env: &HashMap<String, String>) -> Self {
        for (name, value) in host_env {
            self.env
                .entry(name.clone())
                .or_insert_with(|| value.clone());
        }
        self
    }

    /// Variables commands and conditions see
    pub fn env(&self) -> &HashMap<String, String> {
        &self.env
    }

    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    /// Record a command result; skipped commands do not advance the phase
    pub fn record_command(&mut self, result: CommandResult) {
        if result.status != CommandStatus::Skipped && result.phase > self.phase_reached {
            self.phase_reached = result.phase;
        }
        self.command_results.push(result);
    }

    /// Turn the context into the job's terminal result
    pub fn finish(self, exit_code: i32, failure: Option<FailureKind>, duration: Duration) -> JobResult {
        JobResult {
            number: self.number,
            job: self.job,
            exit_code,
            phase_reached: self.phase_reached,
            failure,
            allow_failure: self.allow_failure,
            commands: self.command_results,
            duration,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::env::Environment;

    fn instance() -> MatrixInstance {
        MatrixInstance {
            number: 3,
            job: JobSpec::new("2.7", Environment::parse("SETUP_CMD=test CI=false").unwrap()),
            allow_failure: false,
        }
    }

    fn result(phase: Phase, status: CommandStatus) -> CommandResult {
        CommandResult {
            phase,
            index: 0,
            command: "true".to_string(),
            status,
            exit_code: None,
            stdout: String::new(),
            stderr: String::new(),
            duration: Duration::ZERO,
        }
    }

    #[test]
    fn test_injected_variables() {
        let ctx = JobContext::new(&instance(), PathBuf::from("/work/job-3"));
        let env = ctx.env();
        assert_eq!(env.get("SETUP_CMD").map(String::as_str), Some("test"));
        assert_eq!(env.get("CI").map(String::as_str), Some("true"));
        assert_eq!(env.get("TRAVIS").map(String::as_str), Some("true"));
        assert_eq!(
            env.get("TRAVIS_PYTHON_VERSION").map(String::as_str),
            Some("2.7")
        );
        assert_eq!(env.get("TRAVIS_JOB_NUMBER").map(String::as_str), Some("3"));
        assert_eq!(
            env.get("TRAVIS_BUILD_DIR").map(String::as_str),
            Some("/work/job-3")
        );
        for name in INJECTED_VARIABLES {
            assert!(env.contains_key(*name));
        }
    }

    #[test]
    fn test_injected_variables_stay_out_of_job_spec() {
        let ctx = JobContext::new(&instance(), PathBuf::from("."));
        assert!(!ctx.job.environment.contains("TRAVIS"));
    }

    #[test]
    fn test_host_env_fills_undefined_names_only() {
        let host: HashMap<String, String> = [
            ("HOME", "/home/ci"),
            ("SETUP_CMD", "egg_info"),
            ("TRAVIS_JOB_NUMBER", "99"),
            ("CI", "1"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        let ctx = JobContext::new(&instance(), PathBuf::from(".")).with_host_env(&host);
        let env = ctx.env();
        assert_eq!(env.get("HOME").map(String::as_str), Some("/home/ci"));
        assert_eq!(env.get("SETUP_CMD").map(String::as_str), Some("test"));
        assert_eq!(env.get("TRAVIS_JOB_NUMBER").map(String::as_str), Some("3"));
        assert_eq!(env.get("CI").map(String::as_str), Some("true"));
        assert!(!ctx.job.environment.contains("HOME"));
    }

    #[test]
    fn test_skipped_commands_do_not_advance_phase() {
        let mut ctx = JobContext::new(&instance(), PathBuf::from("."));
        assert_eq!(ctx.phase_reached, Phase::BeforeInstall);

        ctx.record_command(result(Phase::Install, CommandStatus::Skipped));
        assert_eq!(ctx.phase_reached, Phase::BeforeInstall);

        ctx.record_command(result(Phase::Install, CommandStatus::Succeeded));
        assert_eq!(ctx.phase_reached, Phase::Install);

        let job = ctx.finish(0, None, Duration::from_secs(1));
        assert_eq!(job.number, 3);
        assert_eq!(job.phase_reached, Phase::Install);
        assert_eq!(job.commands.len(), 2);
        assert!(job.passed());
    }
}
