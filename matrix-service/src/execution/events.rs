// Execution Events
// Progress reporting and event types for matrix execution

use crate::parser::models::{CommandStatus, FailureKind, JobSpec, Phase};

use std::time::Duration;
use tokio::sync::mpsc;

/// Sender for execution progress events
pub type ProgressSender = mpsc::UnboundedSender<ExecutionEvent>;

/// Receiver for execution progress events
pub type ProgressReceiver = mpsc::UnboundedReceiver<ExecutionEvent>;

/// Create a new progress channel
pub fn progress_channel() -> (ProgressSender, ProgressReceiver) {
    mpsc::unbounded_channel()
}

/// Events emitted while a matrix runs.
///
/// Events of concurrently running jobs interleave; every job-scoped event
/// carries the job number.
#[derive(Debug, Clone)]
pub enum ExecutionEvent {
    /// Matrix execution started
    RunStarted { total_jobs: usize, max_parallel: usize },

    /// Matrix execution completed
    RunCompleted {
        success: bool,
        passed: usize,
        failed: usize,
        duration: Duration,
    },

    /// Job execution started
    JobStarted {
        job_number: usize,
        job: JobSpec,
        allow_failure: bool,
        total_commands: usize,
    },

    /// Job execution completed
    JobCompleted {
        job_number: usize,
        exit_code: i32,
        phase_reached: Phase,
        failure: Option<FailureKind>,
        allow_failure: bool,
        duration: Duration,
    },

    /// First command of a phase is about to be considered
    PhaseStarted { job_number: usize, phase: Phase },

    /// Command execution started
    CommandStarted {
        job_number: usize,
        phase: Phase,
        index: usize,
        command: String,
    },

    /// One line of command output (stdout/stderr)
    CommandOutput {
        job_number: usize,
        phase: Phase,
        index: usize,
        output: String,
        is_error: bool,
    },

    /// Command execution completed
    CommandCompleted {
        job_number: usize,
        phase: Phase,
        index: usize,
        status: CommandStatus,
        exit_code: i32,
        duration: Duration,
    },

    /// Command was skipped (condition evaluated to false)
    CommandSkipped {
        job_number: usize,
        phase: Phase,
        index: usize,
        reason: String,
    },

    /// Log message (info, warning, error)
    Log {
        level: LogLevel,
        message: String,
        job_number: Option<usize>,
    },
}

/// Log level for log events
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
}

impl ExecutionEvent {
    pub fn run_started(total_jobs: usize, max_parallel: usize) -> Self {
        Self::RunStarted {
            total_jobs,
            max_parallel,
        }
    }

    pub fn run_completed(success: bool, passed: usize, failed: usize, duration: Duration) -> Self {
        Self::RunCompleted {
            success,
            passed,
            failed,
            duration,
        }
    }

    pub fn job_started(
        job_number: usize,
        job: JobSpec,
        allow_failure: bool,
        total_commands: usize,
    ) -> Self {
        Self::JobStarted {
            job_number,
            job,
            allow_failure,
            total_commands,
        }
    }

    pub fn phase_started(job_number: usize, phase: Phase) -> Self {
        Self::PhaseStarted { job_number, phase }
    }

    pub fn command_started(
        job_number: usize,
        phase: Phase,
        index: usize,
        command: impl Into<String>,
    ) -> Self {
        Self::CommandStarted {
            job_number,
            phase,
            index,
            command: command.into(),
        }
    }

    /// Create a command output event
    pub fn command_output(
        job_number: usize,
        phase: Phase,
        index: usize,
        output: impl Into<String>,
        is_error: bool,
    ) -> Self {
        Self::CommandOutput {
            job_number,
            phase,
            index,
            output: output.into(),
            is_error,
        }
    }

    pub fn command_skipped(
        job_number: usize,
        phase: Phase,
        index: usize,
        reason: impl Into<String>,
    ) -> Self {
        Self::CommandSkipped {
            job_number,
            phase,
            index,
            reason: reason.into(),
        }
    }

    /// Create an info log event
    pub fn info(message: impl Into<String>, job_number: Option<usize>) -> Self {
        Self::Log {
            level: LogLevel::Info,
            message: message.into(),
            job_number,
        }
    }

    /// Create a warning log event
    pub fn warning(message: impl Into<String>, job_number: Option<usize>) -> Self {
        Self::Log {
            level: LogLevel::Warning,
            message: message.into(),
            job_number,
        }
    }

    /// Create an error log event
    pub fn error(message: impl Into<String>, job_number: Option<usize>) -> Self {
        Self::Log {
            level: LogLevel::Error,
            message: message.into(),
            job_number,
        }
    }

    /// Job the event belongs to, if any
    pub fn job_number(&self) -> Option<usize> {
        match self {
            Self::RunStarted { .. } | Self::RunCompleted { .. } => None,
            Self::JobStarted { job_number, .. }
            | Self::JobCompleted { job_number, .. }
            | Self::PhaseStarted { job_number, .. }
            | Self::CommandStarted { job_number, .. }
            | Self::CommandOutput { job_number, .. }
            | Self::CommandCompleted { job_number, .. }
            | Self::CommandSkipped { job_number, .. } => Some(*job_number),
            Self::Log { job_number, .. } => *job_number,
        }
    }
}

/// Helper trait for sending events, ignoring errors (fire-and-forget)
pub trait EventSender {
    fn send_event(&self, event: ExecutionEvent);
}

impl EventSender for ProgressSender {
    fn send_event(&self, event: ExecutionEvent) {
        let _ = self.send(event);
    }
}

impl EventSender for Option<ProgressSender> {
    fn send_event(&self, event: ExecutionEvent) {
        if let Some(sender) = self {
            let _ = sender.send(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::env::Environment;

    #[tokio::test]
    async fn test_progress_channel() {
        let (tx, mut rx) = progress_channel();

        tx.send_event(ExecutionEvent::run_started(7, 1));
        tx.send_event(ExecutionEvent::phase_started(1, Phase::Install));

        let event1 = rx.recv().await.unwrap();
        assert!(matches!(event1, ExecutionEvent::RunStarted { total_jobs: 7, .. }));

        let event2 = rx.recv().await.unwrap();
        assert!(matches!(
            event2,
            ExecutionEvent::PhaseStarted {
                phase: Phase::Install,
                ..
            }
        ));
    }

    #[test]
    fn test_event_job_number() {
        let started =
            ExecutionEvent::job_started(4, JobSpec::new("3.3", Environment::new()), false, 5);
        assert_eq!(started.job_number(), Some(4));

        let skipped = ExecutionEvent::command_skipped(2, Phase::BeforeInstall, 1, "false");
        assert_eq!(skipped.job_number(), Some(2));

        assert_eq!(ExecutionEvent::info("hello", None).job_number(), None);
        assert_eq!(
            ExecutionEvent::run_completed(true, 1, 0, Duration::ZERO).job_number(),
            None
        );
    }

    #[test]
    fn test_optional_sender() {
        let sender: Option<ProgressSender> = None;
        // Should not panic
        sender.send_event(ExecutionEvent::info("test", None));
    }
}
