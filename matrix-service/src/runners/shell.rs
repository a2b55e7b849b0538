// Shell Runner
// Executes phase commands through bash or sh, streaming output as it arrives

use crate::runners::{OutputCallback, Runner};

use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::task::JoinHandle;

/// Exit code reported when the shell cannot be started
pub const EXIT_SPAWN_FAILURE: i32 = 127;

/// Exit code reported when a command exceeds its timeout
pub const EXIT_TIMEOUT: i32 = 124;

/// How long to keep draining output after a timed out process is killed
const DRAIN_GRACE: Duration = Duration::from_millis(200);

/// Shell types supported by the runner
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shell {
    /// Bash, required for `[[ ... ]]` tests the shell evaluates itself
    Bash,
    /// POSIX sh
    Sh,
}

impl Shell {
    /// Bash when it is on PATH, sh otherwise
    pub fn detect() -> Self {
        match which::which("bash") {
            Ok(path) => {
                tracing::debug!(path = %path.display(), "using bash");
                Shell::Bash
            }
            Err(_) => {
                tracing::debug!("bash not found, falling back to sh");
                Shell::Sh
            }
        }
    }

    /// Get the shell executable and arguments
    fn get_command(&self) -> (&'static str, &'static [&'static str]) {
        match self {
            Shell::Bash => ("bash", &["-c"]),
            Shell::Sh => ("sh", &["-c"]),
        }
    }
}

impl fmt::Display for Shell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Shell::Bash => write!(f, "bash"),
            Shell::Sh => write!(f, "sh"),
        }
    }
}

impl FromStr for Shell {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "bash" => Ok(Shell::Bash),
            "sh" => Ok(Shell::Sh),
            other => Err(format!("unknown shell '{}', expected bash or sh", other)),
        }
    }
}

/// Configuration for shell execution
#[derive(Debug, Clone, Default)]
pub struct ShellConfig {
    /// Per-command timeout (None = no timeout)
    pub timeout: Option<Duration>,
}

/// Output collected during command execution
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShellOutput {
    /// Standard output
    pub stdout: String,
    /// Standard error
    pub stderr: String,
    /// Exit code, with spawn failures, timeouts and signals mapped to shell conventions
    pub exit_code: i32,
    /// The command was killed after exceeding its timeout
    pub timed_out: bool,
}

impl ShellOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    fn spawn_failure(message: String) -> Self {
        Self {
            stderr: message,
            exit_code: EXIT_SPAWN_FAILURE,
            ..Self::default()
        }
    }
}

/// Shell runner for executing commands
pub struct ShellRunner {
    shell: Shell,
    config: ShellConfig,
}

impl ShellRunner {
    /// Create a shell runner using the detected shell
    pub fn new() -> Self {
        Self::with_shell(Shell::detect())
    }

    pub fn with_shell(shell: Shell) -> Self {
        Self {
            shell,
            config: ShellConfig::default(),
        }
    }

    pub fn with_config(mut self, config: ShellConfig) -> Self {
        self.config = config;
        self
    }

    pub fn shell(&self) -> Shell {
        self.shell
    }

    /// Execute a command with real-time output streaming
    pub async fn run_streaming(
        &self,
        script: &str,
        env: &HashMap<String, String>,
        working_dir: &Path,
        on_output: OutputCallback,
    ) -> ShellOutput {
        let (shell_cmd, shell_args) = self.shell.get_command();

        let mut cmd = Command::new(shell_cmd);
        cmd.args(shell_args);
        cmd.arg(script);
        cmd.current_dir(working_dir);
        cmd.envs(env);
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        cmd.kill_on_drop(true);

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                tracing::warn!(shell = shell_cmd, error = %e, "failed to spawn shell");
                return ShellOutput::spawn_failure(format!(
                    "Failed to spawn shell process '{}' in {}: {}",
                    shell_cmd,
                    working_dir.display(),
                    e
                ));
            }
        };

        let on_output = Arc::new(on_output);
        let stdout_handle = child
            .stdout
            .take()
            .map(|stdout| stream_lines(stdout, on_output.clone(), false));
        let stderr_handle = child
            .stderr
            .take()
            .map(|stderr| stream_lines(stderr, on_output, true));

        let wait_result = match self.config.timeout {
            Some(timeout) => match tokio::time::timeout(timeout, child.wait()).await {
                Ok(result) => Some(result),
                Err(_) => {
                    let _ = child.kill().await;
                    None
                }
            },
            None => Some(child.wait().await),
        };

        match wait_result {
            Some(result) => {
                let stdout = collect(stdout_handle, None).await;
                let mut stderr = collect(stderr_handle, None).await;
                let exit_code = match result {
                    Ok(status) => exit_code_of(status),
                    Err(e) => {
                        push_line(&mut stderr, &format!("Failed to wait for process: {}", e));
                        EXIT_SPAWN_FAILURE
                    }
                };
                ShellOutput {
                    stdout,
                    stderr,
                    exit_code,
                    timed_out: false,
                }
            }
            None => {
                // Grandchildren may still hold the pipes open
                let stdout = collect(stdout_handle, Some(DRAIN_GRACE)).await;
                let mut stderr = collect(stderr_handle, Some(DRAIN_GRACE)).await;
                let timeout = self.config.timeout.unwrap_or_default();
                push_line(
                    &mut stderr,
                    &format!("Process timed out after {:?}", timeout),
                );
                ShellOutput {
                    stdout,
                    stderr,
                    exit_code: EXIT_TIMEOUT,
                    timed_out: true,
                }
            }
        }
    }
}

impl Default for ShellRunner {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl Runner for ShellRunner {
    async fn run(
        &self,
        script: &str,
        env: &HashMap<String, String>,
        working_dir: &Path,
        on_output: OutputCallback,
    ) -> ShellOutput {
        self.run_streaming(script, env, working_dir, on_output).await
    }
}

fn stream_lines<R>(
    reader: R,
    on_output: Arc<OutputCallback>,
    is_error: bool,
) -> JoinHandle<String>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(reader).lines();
        let mut output = String::new();
        while let Ok(Some(line)) = lines.next_line().await {
            on_output(&line, is_error);
            push_line(&mut output, &line);
        }
        output
    })
}

async fn collect(handle: Option<JoinHandle<String>>, grace: Option<Duration>) -> String {
    let Some(mut handle) = handle else {
        return String::new();
    };
    match grace {
        None => handle.await.unwrap_or_default(),
        Some(grace) => match tokio::time::timeout(grace, &mut handle).await {
            Ok(output) => output.unwrap_or_default(),
            Err(_) => {
                handle.abort();
                String::new()
            }
        },
    }
}

fn push_line(output: &mut String, line: &str) {
    if !output.is_empty() {
        output.push('\n');
    }
    output.push_str(line);
}

/// Exit code, or 128 + signal number for processes killed by a signal
fn exit_code_of(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }
    1
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn runner() -> ShellRunner {
        ShellRunner::with_shell(Shell::Sh)
    }

    fn ignore_output() -> OutputCallback {
        Box::new(|_, _| {})
    }

    #[tokio::test]
    async fn test_shell_runner_echo() {
        let working_dir = std::env::current_dir().unwrap();

        let output = runner()
            .run_streaming("echo hello", &HashMap::new(), &working_dir, ignore_output())
            .await;

        assert_eq!(output.exit_code, 0);
        assert!(output.success());
        assert_eq!(output.stdout, "hello");
        assert!(output.stderr.is_empty());
    }

    #[tokio::test]
    async fn test_shell_runner_with_env() {
        let mut env = HashMap::new();
        env.insert("MY_VAR".to_string(), "test_value".to_string());
        let working_dir = std::env::current_dir().unwrap();

        let output = runner()
            .run_streaming("echo $MY_VAR", &env, &working_dir, ignore_output())
            .await;

        assert_eq!(output.exit_code, 0);
        assert!(output.stdout.contains("test_value"));
    }

    #[tokio::test]
    async fn test_shell_runner_exit_code() {
        let working_dir = std::env::current_dir().unwrap();

        let output = runner()
            .run_streaming("exit 42", &HashMap::new(), &working_dir, ignore_output())
            .await;

        assert_eq!(output.exit_code, 42);
        assert!(!output.timed_out);
    }

    #[tokio::test]
    async fn test_shell_runner_streams_lines() {
        let working_dir = std::env::current_dir().unwrap();
        let lines = Arc::new(Mutex::new(Vec::new()));
        let sink = lines.clone();

        let output = runner()
            .run_streaming(
                "echo one; echo two >&2",
                &HashMap::new(),
                &working_dir,
                Box::new(move |line, is_error| {
                    sink.lock().unwrap().push((line.to_string(), is_error));
                }),
            )
            .await;

        assert_eq!(output.stderr, "two");
        let mut seen = lines.lock().unwrap().clone();
        seen.sort();
        assert_eq!(
            seen,
            vec![("one".to_string(), false), ("two".to_string(), true)]
        );
    }

    #[tokio::test]
    async fn test_shell_runner_timeout() {
        let working_dir = std::env::current_dir().unwrap();
        let runner = runner().with_config(ShellConfig {
            timeout: Some(Duration::from_millis(200)),
        });

        let output = runner
            .run_streaming("sleep 5", &HashMap::new(), &working_dir, ignore_output())
            .await;

        assert!(output.timed_out);
        assert_eq!(output.exit_code, EXIT_TIMEOUT);
        assert!(output.stderr.contains("timed out"));
    }

    #[tokio::test]
    async fn test_shell_runner_spawn_failure() {
        let output = runner()
            .run_streaming(
                "true",
                &HashMap::new(),
                Path::new("/nonexistent/working/dir"),
                ignore_output(),
            )
            .await;

        assert_eq!(output.exit_code, EXIT_SPAWN_FAILURE);
        assert!(output.stderr.contains("Failed to spawn"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_shell_runner_signal_exit_code() {
        let working_dir = std::env::current_dir().unwrap();

        let output = runner()
            .run_streaming("kill -9 $$", &HashMap::new(), &working_dir, ignore_output())
            .await;

        assert_eq!(output.exit_code, 128 + 9);
    }

    #[test]
    fn test_shell_from_str() {
        assert_eq!("bash".parse::<Shell>().unwrap(), Shell::Bash);
        assert_eq!("SH".parse::<Shell>().unwrap(), Shell::Sh);
        assert!("zsh".parse::<Shell>().is_err());
        assert_eq!(Shell::Bash.to_string(), "bash");
    }
}
