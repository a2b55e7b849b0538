use crate::error::{ServiceError, ServiceResult};
use crate::execution::executor::{ExecutorConfig, MatrixExecutor};
use crate::execution::matrix::{Matrix, MatrixDeclaration, MatrixExpander, MatrixInstance};
use crate::parser::command::PhasePlan;
use crate::parser::error::ValidationError;
use crate::parser::models::TravisConfig;
use crate::parser::travis::{ConfigParser, ConfigValidator};

use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Which expanded jobs to keep
#[derive(Debug, Clone, Default)]
pub struct JobSelection {
    /// Job numbers to keep (empty = all)
    pub numbers: Vec<usize>,
    /// Interpreter versions to keep (empty = all)
    pub interpreter_versions: Vec<String>,
}

impl JobSelection {
    pub fn is_empty(&self) -> bool {
        self.numbers.is_empty() && self.interpreter_versions.is_empty()
    }

    fn matches(&self, instance: &MatrixInstance) -> bool {
        (self.numbers.is_empty() || self.numbers.contains(&instance.number))
            && (self.interpreter_versions.is_empty()
                || self
                    .interpreter_versions
                    .contains(&instance.job.interpreter_version))
    }

    fn describe(&self) -> String {
        let mut parts = Vec::new();
        if !self.numbers.is_empty() {
            let numbers: Vec<String> = self.numbers.iter().map(|n| n.to_string()).collect();
            parts.push(format!("job {}", numbers.join(", ")));
        }
        if !self.interpreter_versions.is_empty() {
            parts.push(format!("python {}", self.interpreter_versions.join(", ")));
        }
        parts.join("; ")
    }
}

/// A loaded, validated and expanded configuration
#[derive(Debug)]
pub struct MatrixService {
    path: Option<PathBuf>,
    config: TravisConfig,
    warnings: Vec<ValidationError>,
    matrix: Matrix,
}

impl MatrixService {
    /// Load a configuration file, resolving `$NAME` references against `host_env`
    pub fn load(path: &Path, host_env: &HashMap<String, String>) -> ServiceResult<Self> {
        if !path.is_file() {
            return Err(ServiceError::ConfigNotFound(path.to_path_buf()));
        }

        let (config, warnings) = ConfigParser::load(path)?;
        let mut service = Self::from_parts(config, warnings, host_env)?;
        service.path = Some(path.to_path_buf());
        Ok(service)
    }

    /// Build from YAML text
    pub fn from_yaml(content: &str, host_env: &HashMap<String, String>) -> ServiceResult<Self> {
        let config = ConfigParser::parse(content).map_err(crate::parser::ConfigError::from)?;
        let warnings = ConfigValidator::check(&config)?;
        Self::from_parts(config, warnings, host_env)
    }

    fn from_parts(
        config: TravisConfig,
        warnings: Vec<ValidationError>,
        host_env: &HashMap<String, String>,
    ) -> ServiceResult<Self> {
        let matrix = Matrix::from_config(&config, host_env)?;
        tracing::debug!(
            base = matrix.base_len(),
            includes = matrix.includes.len(),
            "matrix loaded"
        );
        Ok(Self {
            path: None,
            config,
            warnings,
            matrix,
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn config(&self) -> &TravisConfig {
        &self.config
    }

    pub fn warnings(&self) -> &[ValidationError] {
        &self.warnings
    }

    pub fn matrix(&self) -> &Matrix {
        &self.matrix
    }

    /// Every expanded job, numbered from 1
    pub fn instances(&self) -> Vec<MatrixInstance> {
        MatrixExpander::expand_instances(&self.matrix)
    }

    /// Expanded jobs kept by `selection`; job numbers stay those of the full matrix
    pub fn select(&self, selection: &JobSelection) -> ServiceResult<Vec<MatrixInstance>> {
        let selected: Vec<MatrixInstance> = self
            .instances()
            .into_iter()
            .filter(|instance| selection.matches(instance))
            .collect();

        if selected.is_empty() && !selection.is_empty() {
            return Err(ServiceError::EmptySelection(selection.describe()));
        }
        Ok(selected)
    }

    /// The base product and includes rendered back to a declaration
    pub fn collapse(&self) -> ServiceResult<MatrixDeclaration> {
        let base = MatrixExpander::base_product(&self.matrix);
        Ok(MatrixExpander::collapse(&base, &self.matrix.includes)?)
    }

    /// Executor over this configuration's phase commands
    pub fn executor(&self, config: ExecutorConfig) -> MatrixExecutor {
        MatrixExecutor::new(PhasePlan::from_config(&self.config)).with_config(config)
    }
}
