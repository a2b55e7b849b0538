// Runners Module
// Provides the command runner abstraction and its shell implementation

pub mod shell;

// Re-export key types
pub use shell::{Shell, ShellConfig, ShellOutput, ShellRunner};

use std::collections::HashMap;
use std::path::Path;

/// Callback for handling output lines in real-time: `(line, is_stderr)`
pub type OutputCallback = Box<dyn Fn(&str, bool) + Send + Sync>;

/// Trait for command runners
#[async_trait::async_trait]
pub trait Runner: Send + Sync {
    /// Execute one command and return its collected output.
    ///
    /// Never fails: spawn errors and timeouts are reported through the
    /// exit code of the returned output.
    async fn run(
        &self,
        script: &str,
        env: &HashMap<String, String>,
        working_dir: &Path,
        on_output: OutputCallback,
    ) -> ShellOutput;
}
