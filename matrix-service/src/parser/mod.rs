// Parser module for Travis CI configurations
// Provides YAML parsing, validation, env assignment parsing, and command classification

pub mod command;
pub mod env;
pub mod error;
pub mod models;
pub mod travis;

pub use command::{Command, CommandKind, CommandPlan, PhasePlan};
pub use env::{EnvError, Environment};
pub use error::{ParseError, ParseErrorKind, ParseResult, Severity, ValidationError};
pub use models::*;
pub use travis::{ConfigError, ConfigParser, ConfigValidator};
