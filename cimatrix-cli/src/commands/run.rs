use crate::commands;
use crate::output;

use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::Args;
use color_eyre::Result;

use matrix_service::execution::events::{progress_channel, LogLevel};
use matrix_service::execution::format_duration;
use matrix_service::parser::CommandStatus;
use matrix_service::runners::Shell;
use matrix_service::utils::{default_log_dir, resolve_working_dir};
use matrix_service::{ExecutionEvent, ExecutorConfig, JobSelection, ReportFormat, RunReporter};

/// Expand the build matrix and run its jobs locally
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Path to the configuration (default: .travis.yml at the repository root)
    pub config: Option<PathBuf>,

    /// Number of jobs to run at once (0 = all)
    #[arg(long = "jobs", short = 'j', value_name = "N", default_value_t = 1)]
    pub parallel: usize,

    /// Run only this job number (can be repeated)
    #[arg(long = "job", value_name = "N")]
    pub job: Vec<usize>,

    /// Run only jobs for this python version (can be repeated)
    #[arg(long, value_name = "VERSION")]
    pub python: Vec<String>,

    /// Working directory for execution (default: the configuration's directory)
    #[arg(long, short = 'w', value_name = "DIR")]
    pub working_dir: Option<PathBuf>,

    /// Give every job a private copy of the working directory under DIR
    #[arg(long, value_name = "DIR")]
    pub job_dirs: Option<PathBuf>,

    /// Kill commands running longer than SECS seconds
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Shell used to run commands (default: bash when available, else sh)
    #[arg(long, value_name = "SHELL")]
    pub shell: Option<Shell>,

    /// Write a log file per job into DIR
    #[arg(long, value_name = "DIR")]
    pub log_dir: Option<PathBuf>,

    /// Write job logs into the default log directory
    #[arg(long, conflicts_with = "log_dir")]
    pub save_logs: bool,

    /// Format of the final report
    #[arg(long, value_name = "FORMAT", default_value = "terminal")]
    pub report: ReportFormat,

    /// Write the report to a file instead of standard output
    #[arg(long, value_name = "PATH")]
    pub report_file: Option<PathBuf>,
}

pub async fn execute(args: RunArgs) -> Result<()> {
    let config_path = commands::config_path(args.config.clone())?;
    let service = commands::load(&config_path)?;

    let selection = JobSelection {
        numbers: args.job.clone(),
        interpreter_versions: args.python.clone(),
    };
    let instances = service.select(&selection)?;
    let total = service.instances().len();
    tracing::debug!(selected = instances.len(), total, "jobs selected");
    if instances.len() == total {
        output::info(&format!("{} jobs in the matrix", total));
    } else {
        output::info(&format!("{} of {} jobs selected", instances.len(), total));
    }

    let executor_config = executor_config(&args, &config_path)?;
    if let Some(dir) = &executor_config.log_dir {
        output::info(&format!("Job logs: {}", dir.display()));
    }
    let interleaved = executor_config.max_parallel != 1 && instances.len() > 1;

    let (tx, mut rx) = progress_channel();
    let executor = service.executor(executor_config).with_progress(tx);

    // Spawn execution in background
    let exec_handle = tokio::spawn(async move { executor.execute(instances).await });

    // Process events in the foreground
    while let Some(event) = rx.recv().await {
        render_event(&event, interleaved);
    }

    let summary = exec_handle.await?;

    match &args.report_file {
        Some(path) => {
            RunReporter::write(&summary, args.report, path)?;
            output::info(&format!("{} report written to {}", args.report, path.display()));
        }
        None => print!("{}", RunReporter::report(&summary, args.report)?),
    }

    if !summary.success {
        std::process::exit(1);
    }

    Ok(())
}

fn executor_config(args: &RunArgs, config_path: &Path) -> Result<ExecutorConfig> {
    let working_dir = match &args.working_dir {
        Some(dir) => dir.clone(),
        None => config_path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(resolve_working_dir),
    };
    if !working_dir.is_dir() {
        color_eyre::eyre::bail!("Working directory not found: {}", working_dir.display());
    }
    let working_dir = working_dir.canonicalize()?;

    // Job directories are skipped when copying, so compare canonical paths
    let job_dirs = match &args.job_dirs {
        Some(dir) => {
            std::fs::create_dir_all(dir)?;
            Some(dir.canonicalize()?)
        }
        None => None,
    };

    let log_dir = match (&args.log_dir, args.save_logs) {
        (Some(dir), _) => Some(dir.clone()),
        (None, true) => Some(default_log_dir()),
        (None, false) => None,
    };

    Ok(ExecutorConfig {
        max_parallel: args.parallel,
        command_timeout: args.timeout.map(Duration::from_secs),
        shell: args.shell.unwrap_or_else(Shell::detect),
        working_dir,
        job_dirs,
        log_dir,
        host_env: std::env::vars().collect(),
    })
}

fn render_event(event: &ExecutionEvent, interleaved: bool) {
    let prefix = match event.job_number() {
        Some(number) if interleaved => format!("[#{}] ", number),
        _ => String::new(),
    };

    match event {
        ExecutionEvent::RunStarted {
            total_jobs,
            max_parallel,
        } => {
            println!();
            output::header(&format!(
                "Running {} jobs ({} at a time)",
                total_jobs, max_parallel
            ));
        }

        ExecutionEvent::RunCompleted {
            success,
            passed,
            failed,
            duration,
        } => {
            println!();
            if *success {
                output::success(&format!(
                    "Build passed: {} jobs passed in {}",
                    passed,
                    format_duration(*duration)
                ));
            } else {
                output::failure(&format!(
                    "Build failed: {} jobs failed, {} passed in {}",
                    failed,
                    passed,
                    format_duration(*duration)
                ));
            }
        }

        ExecutionEvent::JobStarted {
            job_number,
            job,
            allow_failure,
            total_commands,
        } => {
            output::job_header(*job_number, &job.label(), *total_commands);
            if *allow_failure {
                output::dim(&format!("{}    allowed to fail", prefix));
            }
        }

        ExecutionEvent::JobCompleted {
            job_number,
            exit_code,
            phase_reached,
            failure,
            allow_failure,
            duration,
        } => {
            let line = match failure {
                None if *exit_code == 0 => format!(
                    "  Job #{} OK ({})",
                    job_number,
                    format_duration(*duration)
                ),
                _ => format!(
                    "  Job #{} FAIL in {} (exit code: {}){} ({})",
                    job_number,
                    phase_reached,
                    exit_code,
                    if *allow_failure { " [allowed]" } else { "" },
                    format_duration(*duration)
                ),
            };
            if failure.is_none() && *exit_code == 0 {
                output::dim_success(&line);
            } else {
                output::dim_failure(&line);
            }
        }

        ExecutionEvent::PhaseStarted { phase, .. } => {
            output::dim(&format!("{}    {}", prefix, phase));
        }

        ExecutionEvent::CommandStarted { command, .. } => {
            println!("{}      $ {}", prefix, command);
        }

        ExecutionEvent::CommandOutput {
            output, is_error, ..
        } => {
            for line in output.lines() {
                if *is_error {
                    output::command_error(&prefix, line);
                } else {
                    output::command_output(&prefix, line);
                }
            }
        }

        ExecutionEvent::CommandCompleted {
            status,
            exit_code,
            duration,
            ..
        } => {
            let line = format!("{}        ({})", prefix, format_duration(*duration));
            match status {
                CommandStatus::Failed => output::dim_failure(&format!(
                    "{} FAIL (exit code: {})",
                    line, exit_code
                )),
                _ => output::dim_success(&format!("{} OK", line)),
            }
        }

        ExecutionEvent::CommandSkipped { reason, .. } => {
            output::warning(&format!("{}      skipped: {}", prefix, reason));
        }

        ExecutionEvent::Log { level, message, .. } => match level {
            LogLevel::Error => output::error(&format!("{}{}", prefix, message)),
            LogLevel::Warning => output::warning(&format!("{}{}", prefix, message)),
            LogLevel::Info | LogLevel::Debug => output::dim(&format!("{}{}", prefix, message)),
        },
    }
}
