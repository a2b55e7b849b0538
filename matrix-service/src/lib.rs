// Matrix Service Library
// Core service for Travis-style build matrix parsing, expansion, and execution

pub mod condition;
pub mod error;
pub mod execution;
pub mod parser;
pub mod report;
pub mod runners;
pub mod services;
pub mod utils;

// Re-export commonly used types
pub use error::{ServiceError, ServiceResult};

// Re-export parser types
pub use parser::{
    ConfigError, ConfigParser, ConfigValidator, Environment, ParseError, ParseErrorKind,
    ParseResult, Phase, RunSummary, TravisConfig, ValidationError,
};

// Re-export condition types
pub use condition::{Condition, ConditionError};

// Re-export execution types
pub use execution::{
    ExecutionEvent, ExecutorConfig, Matrix, MatrixDeclaration, MatrixError, MatrixExecutor,
    MatrixExpander, MatrixInstance, ProgressSender,
};

// Re-export runner types
pub use runners::{Runner, Shell, ShellRunner};

// Re-export service and report types
pub use report::{ReportFormat, RunReporter};
pub use services::{JobSelection, MatrixService};
