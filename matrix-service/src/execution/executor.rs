// Matrix Executor
// Runs every expanded job's phases, isolated per job, with bounded concurrency

use crate::execution::context::JobContext;
use crate::execution::events::{EventSender, ExecutionEvent, ProgressSender};
use crate::execution::matrix::MatrixInstance;
use crate::parser::command::{CommandPlan, PhasePlan};
use crate::parser::models::{
    CommandResult, CommandStatus, FailureKind, JobResult, Phase, RunSummary, TravisConfig,
};
use crate::runners::shell::{Shell, ShellConfig, ShellRunner};
use crate::runners::{OutputCallback, Runner};
use crate::utils;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::Instrument;

/// Exit code recorded for jobs that never ran a command
const EXIT_JOB_ABORTED: i32 = 1;

/// Configuration for matrix execution
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Maximum jobs running at once (0 = unlimited)
    pub max_parallel: usize,
    /// Timeout applied to each command (None = no timeout)
    pub command_timeout: Option<Duration>,
    /// Shell commands are handed to
    pub shell: Shell,
    /// Directory jobs run in, or the source copied into job directories
    pub working_dir: PathBuf,
    /// Root for private per-job copies of the working directory
    pub job_dirs: Option<PathBuf>,
    /// Directory receiving `job-<n>.log` files
    pub log_dir: Option<PathBuf>,
    /// Host variables visible to commands and conditions unless a job defines them
    pub host_env: HashMap<String, String>,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            max_parallel: 0,
            command_timeout: None,
            shell: Shell::detect(),
            working_dir: utils::resolve_working_dir(),
            job_dirs: None,
            log_dir: None,
            host_env: std::env::vars().collect(),
        }
    }
}

/// Matrix executor
pub struct MatrixExecutor {
    /// Phase commands shared by every job
    plan: Arc<PhasePlan>,
    /// Configuration
    config: ExecutorConfig,
    /// Progress event sender
    event_tx: Option<ProgressSender>,
    /// Runner override; a shell runner built from the config otherwise
    runner: Option<Arc<dyn Runner>>,
}

impl MatrixExecutor {
    pub fn new(plan: PhasePlan) -> Self {
        Self {
            plan: Arc::new(plan),
            config: ExecutorConfig::default(),
            event_tx: None,
            runner: None,
        }
    }

    /// Create an executor for a parsed configuration
    pub fn from_config(config: &TravisConfig) -> Self {
        Self::new(PhasePlan::from_config(config))
    }

    /// Set executor configuration
    pub fn with_config(mut self, config: ExecutorConfig) -> Self {
        self.config = config;
        self
    }

    /// Set progress event sender
    pub fn with_progress(mut self, tx: ProgressSender) -> Self {
        self.event_tx = Some(tx);
        self
    }

    /// Run commands through a custom runner
    pub fn with_runner(mut self, runner: Arc<dyn Runner>) -> Self {
        self.runner = Some(runner);
        self
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Execute the given jobs and collect their results in job-number order
    pub async fn execute(&self, instances: Vec<MatrixInstance>) -> RunSummary {
        let start = Instant::now();
        let runner = self.runner.clone().unwrap_or_else(|| {
            Arc::new(
                ShellRunner::with_shell(self.config.shell).with_config(ShellConfig {
                    timeout: self.config.command_timeout,
                }),
            )
        });

        let limit = match self.config.max_parallel {
            0 => instances.len().max(1),
            n => n,
        };
        let semaphore = Arc::new(Semaphore::new(limit));

        tracing::info!(jobs = instances.len(), max_parallel = limit, "starting matrix run");
        self.event_tx
            .send_event(ExecutionEvent::run_started(instances.len(), limit));

        let host_env = Arc::new(self.config.host_env.clone());
        let mut tasks = JoinSet::new();
        for instance in instances.iter().cloned() {
            let worker = JobWorker {
                plan: self.plan.clone(),
                runner: runner.clone(),
                event_tx: self.event_tx.clone(),
                working_dir: self.config.working_dir.clone(),
                job_dirs: self.config.job_dirs.clone(),
                log_dir: self.config.log_dir.clone(),
                host_env: host_env.clone(),
            };
            let semaphore = semaphore.clone();
            let span = tracing::info_span!("job", number = instance.number);
            tasks.spawn(
                async move {
                    // The semaphore is never closed
                    let _permit = semaphore.acquire_owned().await.ok();
                    worker.run(instance).await
                }
                .instrument(span),
            );
        }

        let mut results: Vec<JobResult> = Vec::with_capacity(instances.len());
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(result) => results.push(result),
                Err(e) => tracing::error!(error = %e, "job task failed"),
            }
        }

        // A panicked task leaves its job without a result
        for instance in &instances {
            if !results.iter().any(|r| r.number == instance.number) {
                self.event_tx.send_event(ExecutionEvent::error(
                    "job aborted before producing a result",
                    Some(instance.number),
                ));
                let ctx = JobContext::new(instance, self.config.working_dir.clone());
                results.push(ctx.finish(EXIT_JOB_ABORTED, None, Duration::ZERO));
            }
        }

        let summary = RunSummary::new(results, start.elapsed());
        tracing::info!(
            passed = summary.passed(),
            failed = summary.failed(),
            success = summary.success,
            "matrix run finished"
        );
        self.event_tx.send_event(ExecutionEvent::run_completed(
            summary.success,
            summary.passed(),
            summary.failed(),
            summary.duration,
        ));
        summary
    }
}

/// Everything one job task owns
struct JobWorker {
    plan: Arc<PhasePlan>,
    runner: Arc<dyn Runner>,
    event_tx: Option<ProgressSender>,
    working_dir: PathBuf,
    job_dirs: Option<PathBuf>,
    log_dir: Option<PathBuf>,
    host_env: Arc<HashMap<String, String>>,
}

impl JobWorker {
    async fn run(self, instance: MatrixInstance) -> JobResult {
        let start = Instant::now();
        let number = instance.number;

        self.event_tx.send_event(ExecutionEvent::job_started(
            number,
            instance.job.clone(),
            instance.allow_failure,
            self.plan.total(),
        ));

        let mut log = JobLog::new(&instance);

        let result = match self.prepare_workspace(number).await {
            Ok(working_dir) => {
                let ctx = JobContext::new(&instance, working_dir).with_host_env(&self.host_env);
                self.run_phases(ctx, &mut log, start).await
            }
            Err(e) => {
                let message = format!("failed to prepare job directory: {}", e);
                tracing::error!(%message);
                self.event_tx
                    .send_event(ExecutionEvent::error(message.clone(), Some(number)));
                log.line(&message);
                JobContext::new(&instance, self.working_dir.clone()).finish(
                    EXIT_JOB_ABORTED,
                    Some(FailureKind::WorkspaceSetup),
                    start.elapsed(),
                )
            }
        };

        log.line(&format!(
            "finished with exit code {} in {} (reached {})",
            result.exit_code,
            format_duration(result.duration),
            result.phase_reached
        ));
        if let Some(log_dir) = &self.log_dir {
            if let Err(e) = log.write(log_dir, number).await {
                self.event_tx.send_event(ExecutionEvent::warning(
                    format!("failed to write job log: {}", e),
                    Some(number),
                ));
            }
        }

        self.event_tx.send_event(ExecutionEvent::JobCompleted {
            job_number: number,
            exit_code: result.exit_code,
            phase_reached: result.phase_reached,
            failure: result.failure,
            allow_failure: result.allow_failure,
            duration: result.duration,
        });

        result
    }

    /// Run phases in order; the first failing command ends the job
    async fn run_phases(&self, mut ctx: JobContext, log: &mut JobLog, start: Instant) -> JobResult {
        let number = ctx.number;

        for phase in Phase::ALL {
            let commands = self.plan.commands(phase);
            if commands.is_empty() {
                continue;
            }
            self.event_tx
                .send_event(ExecutionEvent::phase_started(number, phase));

            for (index, command) in commands.iter().enumerate() {
                match command.plan(ctx.env()) {
                    CommandPlan::Skip { reason } => {
                        tracing::debug!(%phase, index, %reason, "skipping command");
                        log.line(&format!("[{}] skipped: {} ({})", phase, command.raw, reason));
                        self.event_tx.send_event(ExecutionEvent::command_skipped(
                            number,
                            phase,
                            index,
                            reason,
                        ));
                        ctx.record_command(CommandResult {
                            phase,
                            index,
                            command: command.raw.clone(),
                            status: CommandStatus::Skipped,
                            exit_code: None,
                            stdout: String::new(),
                            stderr: String::new(),
                            duration: Duration::ZERO,
                        });
                    }
                    CommandPlan::Run(script) => {
                        let result = self.run_command(&ctx, phase, index, script, log).await;
                        let exit_code = result.exit_code.unwrap_or(EXIT_JOB_ABORTED);
                        let failed = result.status == CommandStatus::Failed;
                        ctx.record_command(result);

                        if failed {
                            tracing::info!(%phase, index, exit_code, "command failed, stopping job");
                            return ctx.finish(
                                exit_code,
                                Some(FailureKind::from_phase(phase)),
                                start.elapsed(),
                            );
                        }
                    }
                }
            }
        }

        ctx.finish(0, None, start.elapsed())
    }

    async fn run_command(
        &self,
        ctx: &JobContext,
        phase: Phase,
        index: usize,
        script: &str,
        log: &mut JobLog,
    ) -> CommandResult {
        let number = ctx.number;
        let start = Instant::now();

        self.event_tx.send_event(ExecutionEvent::command_started(
            number, phase, index, script,
        ));
        log.line(&format!("[{}] $ {}", phase, script));

        let tx = self.event_tx.clone();
        let on_output: OutputCallback = Box::new(move |line, is_error| {
            tx.send_event(ExecutionEvent::command_output(
                number, phase, index, line, is_error,
            ));
        });

        let output = self
            .runner
            .run(script, ctx.env(), ctx.working_dir(), on_output)
            .await;
        let duration = start.elapsed();

        log.block(&output.stdout);
        log.block(&output.stderr);

        let status = if output.success() {
            CommandStatus::Succeeded
        } else {
            CommandStatus::Failed
        };

        self.event_tx.send_event(ExecutionEvent::CommandCompleted {
            job_number: number,
            phase,
            index,
            status,
            exit_code: output.exit_code,
            duration,
        });

        CommandResult {
            phase,
            index,
            command: script.to_string(),
            status,
            exit_code: Some(output.exit_code),
            stdout: output.stdout,
            stderr: output.stderr,
            duration,
        }
    }

    /// The directory the job runs in, copying the source tree for private job directories
    async fn prepare_workspace(&self, number: usize) -> std::io::Result<PathBuf> {
        let Some(root) = &self.job_dirs else {
            return Ok(self.working_dir.clone());
        };

        let target = utils::job_dir(root, number);
        let source = self.working_dir.clone();
        let skip = vec![root.clone()];
        let dest = target.clone();

        tokio::task::spawn_blocking(move || {
            if dest.exists() {
                std::fs::remove_dir_all(&dest)?;
            }
            utils::copy_tree(&source, &dest, &skip)
        })
        .await
        .map_err(std::io::Error::other)??;

        Ok(target)
    }
}

/// Text collected for a job's log file
struct JobLog {
    text: String,
}

impl JobLog {
    fn new(instance: &MatrixInstance) -> Self {
        let mut log = Self {
            text: String::new(),
        };
        log.line(&format!("job {}: {}", instance.number, instance.job.label()));
        log
    }

    fn line(&mut self, line: &str) {
        self.text.push_str(line);
        self.text.push('\n');
    }

    fn block(&mut self, block: &str) {
        if !block.is_empty() {
            self.line(block);
        }
    }

    async fn write(&self, dir: &Path, number: usize) -> std::io::Result<()> {
        tokio::fs::create_dir_all(dir).await?;
        tokio::fs::write(dir.join(format!("job-{}.log", number)), &self.text).await
    }
}

/// Format a duration for log output
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs_f64();
    if secs < 1.0 {
        format!("{}ms", duration.as_millis())
    } else if secs < 60.0 {
        format!("{:.1}s", secs)
    } else {
        let mins = duration.as_secs() / 60;
        let rem = duration.as_secs() % 60;
        format!("{}m {}s", mins, rem)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::events::progress_channel;
    use crate::execution::matrix::{Matrix, MatrixExpander};
    use crate::parser::env::Environment;
    use crate::parser::models::JobSpec;
    use crate::parser::travis::ConfigParser;
    use crate::runners::ShellOutput;

    use std::sync::Mutex;

    type Rule = Box<dyn Fn(&str, &HashMap<String, String>) -> i32 + Send + Sync>;

    /// Records every command and answers with scripted exit codes
    struct ScriptedRunner {
        rule: Rule,
        calls: Mutex<Vec<(String, String)>>,
    }

    impl ScriptedRunner {
        fn new(rule: impl Fn(&str, &HashMap<String, String>) -> i32 + Send + Sync + 'static) -> Arc<Self> {
            Arc::new(Self {
                rule: Box::new(rule),
                calls: Mutex::new(Vec::new()),
            })
        }

        fn passing() -> Arc<Self> {
            Self::new(|_, _| 0)
        }

        /// `(job number, command)` pairs in call order
        fn calls(&self) -> Vec<(String, String)> {
            self.calls.lock().unwrap().clone()
        }

        fn calls_for(&self, job: usize) -> Vec<String> {
            self.calls()
                .into_iter()
                .filter(|(n, _)| *n == job.to_string())
                .map(|(_, c)| c)
                .collect()
        }
    }

    #[async_trait::async_trait]
    impl Runner for ScriptedRunner {
        async fn run(
            &self,
            script: &str,
            env: &HashMap<String, String>,
            _working_dir: &Path,
            on_output: OutputCallback,
        ) -> ShellOutput {
            let number = env.get("TRAVIS_JOB_NUMBER").cloned().unwrap_or_default();
            self.calls
                .lock()
                .unwrap()
                .push((number, script.to_string()));

            if let Some(ms) = env.get("DELAY_MS").and_then(|v| v.parse().ok()) {
                tokio::time::sleep(Duration::from_millis(ms)).await;
            }

            on_output(script, false);
            ShellOutput {
                stdout: script.to_string(),
                exit_code: (self.rule)(script, env),
                ..ShellOutput::default()
            }
        }
    }

    fn setup(yaml: &str) -> (MatrixExecutor, Vec<MatrixInstance>) {
        let config = ConfigParser::parse(yaml).unwrap();
        let matrix = Matrix::from_config(&config, &HashMap::new()).unwrap();
        let executor = MatrixExecutor::from_config(&config).with_config(ExecutorConfig {
            max_parallel: 1,
            working_dir: std::env::temp_dir(),
            ..ExecutorConfig::default()
        });
        (executor, MatrixExpander::expand_instances(&matrix))
    }

    const PHASES: &str = r#"
python: [2.7, 3.3]
env:
  - SETUP_CMD='test'
before_install:
  - echo before
  - if [[ $SETUP_CMD == build_sphinx* ]]; then sudo apt-get install graphviz; fi
install:
  - pip install numpy
  - pip install astropy
script:
  - python setup.py $SETUP_CMD
"#;

    #[tokio::test]
    async fn test_all_jobs_pass() {
        let (executor, instances) = setup(PHASES);
        let runner = ScriptedRunner::passing();
        let summary = executor.with_runner(runner.clone()).execute(instances).await;

        assert!(summary.success);
        assert_eq!(summary.results.len(), 2);
        for result in &summary.results {
            assert_eq!(result.exit_code, 0);
            assert_eq!(result.phase_reached, Phase::Script);
            assert!(result.failure.is_none());
            assert_eq!(result.commands.len(), 5);
        }
        assert_eq!(
            runner.calls_for(1),
            vec![
                "echo before",
                "pip install numpy",
                "pip install astropy",
                "python setup.py $SETUP_CMD"
            ]
        );
    }

    #[tokio::test]
    async fn test_false_condition_is_skipped() {
        let (executor, instances) = setup(PHASES);
        let runner = ScriptedRunner::passing();
        let summary = executor.with_runner(runner.clone()).execute(instances).await;

        let skipped = &summary.results[0].commands[1];
        assert_eq!(skipped.phase, Phase::BeforeInstall);
        assert_eq!(skipped.status, CommandStatus::Skipped);
        assert!(!runner
            .calls()
            .iter()
            .any(|(_, c)| c.contains("graphviz")));
    }

    #[tokio::test]
    async fn test_true_condition_runs_body_only() {
        let (executor, instances) = setup(&PHASES.replace("SETUP_CMD='test'", "SETUP_CMD='build_sphinx -w'"));
        let runner = ScriptedRunner::passing();
        executor.with_runner(runner.clone()).execute(instances).await;

        assert!(runner
            .calls_for(1)
            .contains(&"sudo apt-get install graphviz".to_string()));
    }

    #[tokio::test]
    async fn test_conditions_see_host_env() {
        let config = ConfigParser::parse(
            "python: [2.7, 3.3]\nenv:\n  - EXTRA_FLAG=''\n  - OTHER=1\nscript:\n  - if [[ -n $EXTRA_FLAG ]]; then echo yes; fi\n",
        )
        .unwrap();
        let matrix = Matrix::from_config(&config, &HashMap::new()).unwrap();
        let host_env: HashMap<String, String> =
            [("EXTRA_FLAG".to_string(), "1".to_string())].into_iter().collect();
        let runner = ScriptedRunner::passing();
        let summary = MatrixExecutor::from_config(&config)
            .with_config(ExecutorConfig {
                max_parallel: 1,
                working_dir: std::env::temp_dir(),
                host_env,
                ..ExecutorConfig::default()
            })
            .with_runner(runner.clone())
            .execute(MatrixExpander::expand_instances(&matrix))
            .await;

        assert!(summary.success);
        // Jobs 1 and 3 define EXTRA_FLAG as empty; jobs 2 and 4 fall back to the host
        assert!(runner.calls_for(1).is_empty());
        assert_eq!(runner.calls_for(2), vec!["echo yes".to_string()]);
        assert!(runner.calls_for(3).is_empty());
        assert_eq!(runner.calls_for(4), vec!["echo yes".to_string()]);
    }

    #[tokio::test]
    async fn test_failing_install_stops_job() {
        let (executor, instances) = setup(PHASES);
        let runner = ScriptedRunner::new(|script, _| if script == "pip install astropy" { 3 } else { 0 });
        let summary = executor.with_runner(runner.clone()).execute(instances).await;

        assert!(!summary.success);
        let result = &summary.results[0];
        assert_eq!(result.exit_code, 3);
        assert_eq!(result.phase_reached, Phase::Install);
        assert_eq!(result.failure, Some(FailureKind::DependencyInstall));
        assert_eq!(result.failing_command().unwrap().command, "pip install astropy");
        assert!(!runner
            .calls_for(1)
            .iter()
            .any(|c| c.starts_with("python setup.py")));
    }

    #[tokio::test]
    async fn test_skipped_commands_do_not_advance_phase() {
        let (executor, instances) = setup(
            "python: 2.7\nenv: MODE=a\nbefore_install: echo one\ninstall:\n  - if [[ $MODE == b ]]; then echo two; fi\n",
        );
        let summary = executor
            .with_runner(ScriptedRunner::passing())
            .execute(instances)
            .await;

        assert_eq!(summary.results[0].exit_code, 0);
        assert_eq!(summary.results[0].phase_reached, Phase::BeforeInstall);
    }

    #[tokio::test]
    async fn test_jobs_are_independent() {
        let (executor, instances) = setup(
            "python: 2.7\nenv:\n  - NUMPY=1.6\n  - NUMPY=1.7\nscript: python -c 'import numpy'\n",
        );
        let runner = ScriptedRunner::new(|_, env| {
            if env.get("NUMPY").map(String::as_str) == Some("1.6") {
                1
            } else {
                0
            }
        });
        let summary = executor.with_runner(runner.clone()).execute(instances).await;

        assert!(!summary.success);
        assert!(!summary.results[0].passed());
        assert_eq!(summary.results[0].failure, Some(FailureKind::TestScript));
        assert!(summary.results[1].passed());
        assert_eq!(runner.calls_for(2).len(), 1);
    }

    #[tokio::test]
    async fn test_allowed_failure_keeps_run_green() {
        let (executor, instances) = setup(
            "python: [2.7, 3.3]\nscript: make\nmatrix:\n  allow_failures:\n    - python: 3.3\n",
        );
        let runner = ScriptedRunner::new(|_, env| {
            if env.get("TRAVIS_PYTHON_VERSION").map(String::as_str) == Some("3.3") {
                2
            } else {
                0
            }
        });
        let summary = executor.with_runner(runner).execute(instances).await;

        assert!(summary.success);
        assert_eq!(summary.allowed_failures(), 1);
        assert_eq!(summary.failed(), 0);
    }

    #[tokio::test]
    async fn test_results_ordered_by_job_number() {
        let (executor, instances) = setup(
            "python: 2.7\nenv:\n  - DELAY_MS=300\n  - DELAY_MS=0\nscript: make\n",
        );
        let (tx, mut rx) = progress_channel();
        let executor = executor
            .with_config(ExecutorConfig {
                max_parallel: 0,
                working_dir: std::env::temp_dir(),
                ..ExecutorConfig::default()
            })
            .with_runner(ScriptedRunner::passing())
            .with_progress(tx);

        let summary = executor.execute(instances).await;
        drop(executor);

        let numbers: Vec<usize> = summary.results.iter().map(|r| r.number).collect();
        assert_eq!(numbers, vec![1, 2]);

        let mut completed = Vec::new();
        while let Some(event) = rx.recv().await {
            if let ExecutionEvent::JobCompleted { job_number, .. } = event {
                completed.push(job_number);
            }
        }
        assert_eq!(completed, vec![2, 1]);
    }

    #[tokio::test]
    async fn test_events_stream_output() {
        let (executor, instances) = setup("python: 2.7\nscript: echo hi\n");
        let (tx, mut rx) = progress_channel();
        let executor = executor
            .with_runner(ScriptedRunner::passing())
            .with_progress(tx);
        executor.execute(instances).await;
        drop(executor);

        let mut saw_output = false;
        let mut saw_run_completed = false;
        while let Some(event) = rx.recv().await {
            match event {
                ExecutionEvent::CommandOutput { output, .. } => {
                    saw_output = output == "echo hi";
                }
                ExecutionEvent::RunCompleted { success, .. } => {
                    saw_run_completed = success;
                }
                _ => {}
            }
        }
        assert!(saw_output);
        assert!(saw_run_completed);
    }

    #[tokio::test]
    async fn test_shell_runner_with_job_dirs_and_logs() {
        let temp = tempfile::tempdir().unwrap();
        let source = temp.path().join("repo");
        std::fs::create_dir_all(&source).unwrap();
        std::fs::write(source.join("setup.py"), "").unwrap();
        let jobs = temp.path().join("jobs");
        let logs = temp.path().join("logs");

        let config = ConfigParser::parse(
            "python: [2.7, 3.3]\nscript:\n  - test -f setup.py\n  - echo \"$TRAVIS_PYTHON_VERSION\" > version.txt\n",
        )
        .unwrap();
        let matrix = Matrix::from_config(&config, &HashMap::new()).unwrap();
        let executor = MatrixExecutor::from_config(&config).with_config(ExecutorConfig {
            max_parallel: 2,
            command_timeout: Some(Duration::from_secs(10)),
            shell: Shell::Sh,
            working_dir: source.clone(),
            job_dirs: Some(jobs.clone()),
            log_dir: Some(logs.clone()),
            host_env: HashMap::new(),
        });

        let summary = executor
            .execute(MatrixExpander::expand_instances(&matrix))
            .await;

        assert!(summary.success, "{:?}", summary.results);
        let version =
            std::fs::read_to_string(jobs.join("job-2").join("version.txt")).unwrap();
        assert_eq!(version.trim(), "3.3");
        assert!(!source.join("version.txt").exists());

        let log = std::fs::read_to_string(logs.join("job-1.log")).unwrap();
        assert!(log.contains("job 1: python 2.7"));
        assert!(log.contains("$ test -f setup.py"));
        assert!(log.contains("exit code 0"));
    }

    #[tokio::test]
    async fn test_workspace_failure_is_reported() {
        let temp = tempfile::tempdir().unwrap();
        let config = ConfigParser::parse("python: 2.7\nscript: make\n").unwrap();
        let executor = MatrixExecutor::from_config(&config)
            .with_config(ExecutorConfig {
                working_dir: temp.path().join("missing"),
                job_dirs: Some(temp.path().join("jobs")),
                ..ExecutorConfig::default()
            })
            .with_runner(ScriptedRunner::passing());

        let instance = MatrixInstance {
            number: 1,
            job: JobSpec::new("2.7", Environment::new()),
            allow_failure: false,
        };
        let summary = executor.execute(vec![instance]).await;

        assert!(!summary.success);
        assert_eq!(
            summary.results[0].failure,
            Some(FailureKind::WorkspaceSetup)
        );
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_millis(500)), "500ms");
        assert_eq!(format_duration(Duration::from_secs(5)), "5.0s");
        assert_eq!(format_duration(Duration::from_secs(125)), "2m 5s");
    }
}
