// Service Errors
// Top-level error type for loading, expanding, and running a matrix

use crate::execution::matrix::MatrixError;
use crate::parser::travis::ConfigError;

use std::path::PathBuf;
use thiserror::Error;

pub type ServiceResult<T> = Result<T, ServiceError>;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Matrix(#[from] MatrixError),

    #[error("configuration file not found: {}", .0.display())]
    ConfigNotFound(PathBuf),

    #[error("no job matches the selection: {0}")]
    EmptySelection(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to write report: {0}")]
    Report(String),
}
