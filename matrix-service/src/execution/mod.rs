// Execution Engine Module
// Handles matrix expansion, per-job contexts, and concurrent job execution

pub mod context;
pub mod events;
pub mod executor;
pub mod matrix;

// Re-export key types
pub use context::{JobContext, INJECTED_VARIABLES};
pub use events::{progress_channel, EventSender, ExecutionEvent, LogLevel, ProgressReceiver, ProgressSender};
pub use executor::{format_duration, ExecutorConfig, MatrixExecutor};
pub use matrix::{
    JobMatcher, Matrix, MatrixDeclaration, MatrixError, MatrixExpander, MatrixInstance,
};
