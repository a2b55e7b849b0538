// CLI subcommands

pub mod expand;
pub mod run;
pub mod validate;

use crate::output;

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use color_eyre::Result;
use matrix_service::utils::default_config_path;
use matrix_service::{ConfigError, MatrixService, ServiceError};

/// Configuration path given on the command line, or `.travis.yml` at the repository root
pub fn config_path(config: Option<PathBuf>) -> Result<PathBuf> {
    match config {
        Some(path) => Ok(path),
        None => Ok(default_config_path(&std::env::current_dir()?)),
    }
}

/// Load, validate and expand a configuration, printing findings as they are found
pub fn load(path: &Path) -> Result<MatrixService> {
    output::status("Loading", &path.display().to_string());

    let host_env: HashMap<String, String> = std::env::vars().collect();
    match MatrixService::load(path, &host_env) {
        Ok(service) => {
            for warning in service.warnings() {
                output::warning(&format!("[{}] {}", warning.path, warning.message));
                print_suggestion(warning.suggestion.as_deref());
            }
            Ok(service)
        }
        Err(ServiceError::Config(ConfigError::Invalid(errors))) => {
            for error in &errors {
                output::error(&format!("[{}] {}", error.path, error.message));
                print_suggestion(error.suggestion.as_deref());
            }
            color_eyre::eyre::bail!("{} validation error(s) in {}", errors.len(), path.display())
        }
        Err(e) => Err(e.into()),
    }
}

fn print_suggestion(suggestion: Option<&str>) {
    if let Some(suggestion) = suggestion {
        output::info(&format!("  Suggestion: {}", suggestion));
    }
}
