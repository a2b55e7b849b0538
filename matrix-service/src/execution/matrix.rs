// Matrix Expansion
// Expands the python × env declaration into an ordered list of concrete jobs, and back

use crate::parser::env::{parse_assignments, resolve_into, Assignment, EnvError, Environment};
use crate::parser::models::{EnvDeclaration, JobEntry, JobSpec, MatrixSection, TravisConfig};

use serde::Serialize;
use std::collections::HashMap;
use thiserror::Error;

/// Errors raised while building or collapsing a matrix
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MatrixError {
    #[error("invalid environment at {path}: {source}")]
    Env {
        path: String,
        #[source]
        source: EnvError,
    },

    #[error("matrix.include[{index}] has no python version and no default is declared")]
    MissingInterpreter { index: usize },

    #[error("job list is not a cross product: {reason}")]
    NotAProduct { reason: String },
}

/// Selects jobs by interpreter version and/or environment
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct JobMatcher {
    pub interpreter_version: Option<String>,
    pub environment: Option<Environment>,
}

impl JobMatcher {
    /// Every given field must equal the job's; environments compare as mappings
    pub fn matches(&self, job: &JobSpec) -> bool {
        let version_matches = self
            .interpreter_version
            .as_ref()
            .map_or(true, |v| *v == job.interpreter_version);
        let env_matches = self
            .environment
            .as_ref()
            .map_or(true, |env| *env == job.environment);
        version_matches && env_matches
    }
}

/// The declarative matrix with every environment fully resolved
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Matrix {
    pub interpreter_versions: Vec<String>,
    pub base_environment_sets: Vec<Environment>,
    pub includes: Vec<JobSpec>,
    pub excludes: Vec<JobMatcher>,
    pub allow_failures: Vec<JobMatcher>,
}

impl Matrix {
    pub fn new(
        interpreter_versions: Vec<String>,
        base_environment_sets: Vec<Environment>,
        includes: Vec<JobSpec>,
    ) -> Self {
        Self {
            interpreter_versions,
            base_environment_sets,
            includes,
            excludes: Vec::new(),
            allow_failures: Vec::new(),
        }
    }

    /// Build from a parsed configuration.
    ///
    /// `host_env` is the snapshot that `$NAME` references fall back to once
    /// the job's own assignments have been searched.
    pub fn from_config(
        config: &TravisConfig,
        host_env: &HashMap<String, String>,
    ) -> Result<Self, MatrixError> {
        let resolver = EnvResolver::new(&config.env, host_env)?;

        let base_environment_sets = if config.env.matrix.is_empty() {
            vec![resolver.resolve(&[], "env.global")?]
        } else {
            config
                .env
                .matrix
                .iter()
                .enumerate()
                .map(|(i, row)| {
                    let path = format!("env.matrix[{}]", i);
                    resolver.resolve(&parse_row(row, &path)?, &path)
                })
                .collect::<Result<Vec<_>, _>>()?
        };

        let default_version = config.python.first();
        let includes = config
            .matrix
            .include
            .iter()
            .enumerate()
            .map(|(index, entry)| {
                let version = entry
                    .python
                    .as_ref()
                    .or(default_version)
                    .ok_or(MatrixError::MissingInterpreter { index })?;
                let env = resolver.resolve_entry(entry, &format!("matrix.include[{}]", index))?;
                Ok(JobSpec::new(version.clone(), env))
            })
            .collect::<Result<Vec<_>, MatrixError>>()?;

        let excludes = resolver.matchers(&config.matrix.exclude, "matrix.exclude")?;
        let allow_failures =
            resolver.matchers(&config.matrix.allow_failures, "matrix.allow_failures")?;

        Ok(Self {
            interpreter_versions: config.python.clone(),
            base_environment_sets,
            includes,
            excludes,
            allow_failures,
        })
    }

    /// Number of jobs in the cross product before excludes
    pub fn base_len(&self) -> usize {
        self.interpreter_versions.len() * self.base_environment_sets.len()
    }

    pub fn is_allowed_failure(&self, job: &JobSpec) -> bool {
        self.allow_failures.iter().any(|m| m.matches(job))
    }

    fn is_excluded(&self, job: &JobSpec) -> bool {
        self.excludes.iter().any(|m| m.matches(job))
    }
}

/// Resolves assignment strings on top of the `global` assignments
struct EnvResolver<'a> {
    globals: Vec<Assignment>,
    host_env: &'a HashMap<String, String>,
}

impl<'a> EnvResolver<'a> {
    fn new(
        declaration: &EnvDeclaration,
        host_env: &'a HashMap<String, String>,
    ) -> Result<Self, MatrixError> {
        let mut globals = Vec::new();
        for (i, entry) in declaration.global.iter().enumerate() {
            globals.extend(parse_row(entry, &format!("env.global[{}]", i))?);
        }
        Ok(Self { globals, host_env })
    }

    fn resolve(&self, row: &[Assignment], path: &str) -> Result<Environment, MatrixError> {
        let lookup = |name: &str| self.host_env.get(name).cloned();
        let mut env = Environment::new();
        resolve_into(&mut env, &self.globals, &lookup).map_err(|source| MatrixError::Env {
            path: "env.global".to_string(),
            source,
        })?;
        resolve_into(&mut env, row, &lookup).map_err(|source| MatrixError::Env {
            path: path.to_string(),
            source,
        })?;
        Ok(env)
    }

    fn resolve_entry(&self, entry: &JobEntry, path: &str) -> Result<Environment, MatrixError> {
        let mut row = Vec::new();
        for item in entry.env.iter().flatten() {
            row.extend(parse_row(item, path)?);
        }
        self.resolve(&row, path)
    }

    fn matchers(&self, entries: &[JobEntry], section: &str) -> Result<Vec<JobMatcher>, MatrixError> {
        entries
            .iter()
            .enumerate()
            .map(|(i, entry)| {
                let environment = match entry.env {
                    Some(_) => Some(self.resolve_entry(entry, &format!("{}[{}]", section, i))?),
                    None => None,
                };
                Ok(JobMatcher {
                    interpreter_version: entry.python.clone(),
                    environment,
                })
            })
            .collect()
    }
}

fn parse_row(row: &str, path: &str) -> Result<Vec<Assignment>, MatrixError> {
    parse_assignments(row).map_err(|source| MatrixError::Env {
        path: path.to_string(),
        source,
    })
}

/// A numbered job ready to schedule
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MatrixInstance {
    /// 1-based position in the expanded list
    pub number: usize,
    pub job: JobSpec,
    pub allow_failure: bool,
}

/// Matrix expander
pub struct MatrixExpander;

impl MatrixExpander {
    /// Interpreter versions × environment sets, both in declaration order
    pub fn base_product(matrix: &Matrix) -> Vec<JobSpec> {
        let mut jobs = Vec::with_capacity(matrix.base_len());
        for version in &matrix.interpreter_versions {
            for env in &matrix.base_environment_sets {
                jobs.push(JobSpec::new(version.clone(), env.clone()));
            }
        }
        jobs
    }

    /// Base product minus excludes, followed by the includes verbatim
    pub fn expand(matrix: &Matrix) -> Vec<JobSpec> {
        let mut jobs: Vec<JobSpec> = Self::base_product(matrix)
            .into_iter()
            .filter(|job| !matrix.is_excluded(job))
            .collect();
        jobs.extend(matrix.includes.iter().cloned());
        jobs
    }

    /// Expanded jobs numbered from 1 with their allow-failure flag
    pub fn expand_instances(matrix: &Matrix) -> Vec<MatrixInstance> {
        Self::expand(matrix)
            .into_iter()
            .enumerate()
            .map(|(i, job)| MatrixInstance {
                number: i + 1,
                allow_failure: matrix.is_allowed_failure(&job),
                job,
            })
            .collect()
    }

    /// Recover the declaration that expands to `base` followed by `includes`
    pub fn collapse(base: &[JobSpec], includes: &[JobSpec]) -> Result<MatrixDeclaration, MatrixError> {
        MatrixDeclaration::from_jobs(base, includes)
    }
}

/// Declaration form of a job list: the two axes plus appended includes
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MatrixDeclaration {
    pub interpreter_versions: Vec<String>,
    pub environment_sets: Vec<Environment>,
    pub includes: Vec<JobSpec>,
}

impl MatrixDeclaration {
    /// Recover the axes from a base job list.
    ///
    /// Environment sets are taken from the leading run of jobs sharing the
    /// first interpreter version; every following run must repeat them.
    pub fn from_jobs(base: &[JobSpec], includes: &[JobSpec]) -> Result<Self, MatrixError> {
        let Some(first) = base.first() else {
            return Ok(Self {
                includes: includes.to_vec(),
                ..Self::default()
            });
        };

        let run = base
            .iter()
            .take_while(|job| job.interpreter_version == first.interpreter_version)
            .count();
        if base.len() % run != 0 {
            return Err(MatrixError::NotAProduct {
                reason: format!(
                    "{} jobs cannot be split into runs of {} environments",
                    base.len(),
                    run
                ),
            });
        }

        let environment_sets: Vec<Environment> =
            base[..run].iter().map(|job| job.environment.clone()).collect();

        let mut interpreter_versions = Vec::new();
        for (chunk_index, chunk) in base.chunks(run).enumerate() {
            let version = &chunk[0].interpreter_version;
            for (job, env) in chunk.iter().zip(&environment_sets) {
                if job.interpreter_version != *version || job.environment != *env {
                    return Err(MatrixError::NotAProduct {
                        reason: format!(
                            "job {} ({}) breaks the pattern of the first version",
                            chunk_index * run + 1,
                            job.label()
                        ),
                    });
                }
            }
            interpreter_versions.push(version.clone());
        }

        Ok(Self {
            interpreter_versions,
            environment_sets,
            includes: includes.to_vec(),
        })
    }

    /// The matrix this declaration describes
    pub fn to_matrix(&self) -> Matrix {
        Matrix::new(
            self.interpreter_versions.clone(),
            self.environment_sets.clone(),
            self.includes.clone(),
        )
    }

    /// Render as a configuration holding only the matrix keys
    pub fn to_config(&self) -> TravisConfig {
        let single_empty_set = self.environment_sets.len() == 1 && self.environment_sets[0].is_empty();
        let env_rows = if single_empty_set {
            Vec::new()
        } else {
            self.environment_sets
                .iter()
                .map(Environment::to_assignments)
                .collect()
        };

        let include = self
            .includes
            .iter()
            .map(|job| JobEntry {
                python: Some(job.interpreter_version.clone()),
                env: (!job.environment.is_empty()).then(|| vec![job.environment.to_assignments()]),
            })
            .collect();

        TravisConfig {
            python: self.interpreter_versions.clone(),
            env: EnvDeclaration {
                global: Vec::new(),
                matrix: env_rows,
            },
            matrix: MatrixSection {
                include,
                ..MatrixSection::default()
            },
            ..TravisConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::travis::ConfigParser;

    fn matrix_from(yaml: &str) -> Matrix {
        let config = ConfigParser::parse(yaml).unwrap();
        Matrix::from_config(&config, &HashMap::new()).unwrap()
    }

    fn env(input: &str) -> Environment {
        Environment::parse(input).unwrap()
    }

    #[test]
    fn test_base_product_order() {
        let matrix = matrix_from("python: [2.7, 3.3]\nenv:\n  - A=1\n  - A=2\n");
        let jobs = MatrixExpander::expand(&matrix);
        let labels: Vec<String> = jobs.iter().map(JobSpec::label).collect();
        assert_eq!(
            labels,
            vec![
                "python 2.7 A=1",
                "python 2.7 A=2",
                "python 3.3 A=1",
                "python 3.3 A=2"
            ]
        );
    }

    #[test]
    fn test_four_versions_one_env_three_includes() {
        let matrix = matrix_from(
            r#"
python: [2.6, 2.7, 3.2, 3.3]
env:
  - NUMPY_VERSION=1.7.1 SETUP_CMD='test'
matrix:
  include:
    - python: 2.7
      env: NUMPY_VERSION=1.7.1 SETUP_CMD='build_sphinx -w'
    - python: 2.7
      env: NUMPY_VERSION=1.6.2 SETUP_CMD='test'
    - python: 3.3
      env: NUMPY_VERSION=1.7.1 SETUP_CMD='egg_info'
"#,
        );
        assert_eq!(MatrixExpander::base_product(&matrix).len(), 4);

        let jobs = MatrixExpander::expand(&matrix);
        assert_eq!(jobs.len(), 7);
        assert_eq!(jobs[4].interpreter_version, "2.7");
        assert_eq!(jobs[4].environment.get("SETUP_CMD"), Some("build_sphinx -w"));
        assert_eq!(jobs[6].environment.get("SETUP_CMD"), Some("egg_info"));
    }

    #[test]
    fn test_missing_env_axis_is_one_empty_set() {
        let matrix = matrix_from("python: [2.7, 3.3]\n");
        let jobs = MatrixExpander::expand(&matrix);
        assert_eq!(jobs.len(), 2);
        assert!(jobs.iter().all(|job| job.environment.is_empty()));
    }

    #[test]
    fn test_missing_python_axis_has_no_base_jobs() {
        let matrix = matrix_from("env: [A=1, A=2]\nmatrix:\n  include:\n    - python: 3.3\n");
        let jobs = MatrixExpander::expand(&matrix);
        assert_eq!(jobs, vec![JobSpec::new("3.3", Environment::new())]);
    }

    #[test]
    fn test_duplicates_are_kept() {
        let matrix = matrix_from(
            "python: 2.7\nenv: A=1\nmatrix:\n  include:\n    - python: 2.7\n      env: A=1\n",
        );
        let jobs = MatrixExpander::expand(&matrix);
        assert_eq!(jobs.len(), 2);
        assert_eq!(jobs[0], jobs[1]);
    }

    #[test]
    fn test_globals_apply_to_every_job_and_can_be_overridden() {
        let matrix = matrix_from(
            r#"
python: 2.7
env:
  global:
    - CONDA=yes MODE=fast
  matrix:
    - A=1
    - MODE=slow
matrix:
  include:
    - python: 3.3
      env: B=2
"#,
        );
        let jobs = MatrixExpander::expand(&matrix);
        assert_eq!(jobs[0].environment, env("CONDA=yes MODE=fast A=1"));
        assert_eq!(jobs[1].environment, env("CONDA=yes MODE=slow"));
        assert_eq!(jobs[2].environment, env("CONDA=yes MODE=fast B=2"));
    }

    #[test]
    fn test_references_resolve_against_globals_and_host() {
        let config = ConfigParser::parse(
            "python: 2.7\nenv:\n  global: BASE=/opt\n  matrix:\n    - PREFIX=$BASE/$USER\n",
        )
        .unwrap();
        let mut host = HashMap::new();
        host.insert("USER".to_string(), "travis".to_string());

        let matrix = Matrix::from_config(&config, &host).unwrap();
        assert_eq!(
            matrix.base_environment_sets[0].get("PREFIX"),
            Some("/opt/travis")
        );
    }

    #[test]
    fn test_unresolved_reference_rejects_matrix() {
        let config = ConfigParser::parse("python: 2.7\nenv: A=$MISSING\n").unwrap();
        let err = Matrix::from_config(&config, &HashMap::new()).unwrap_err();
        assert!(matches!(
            err,
            MatrixError::Env {
                source: EnvError::UnresolvedVariable { .. },
                ..
            }
        ));
    }

    #[test]
    fn test_include_without_python_uses_first_version() {
        let matrix = matrix_from("python: [2.6, 2.7]\nmatrix:\n  include:\n    - env: A=1\n");
        assert_eq!(matrix.includes[0].interpreter_version, "2.6");
    }

    #[test]
    fn test_include_without_any_python_is_error() {
        let config = ConfigParser::parse("matrix:\n  include:\n    - env: A=1\n").unwrap();
        assert_eq!(
            Matrix::from_config(&config, &HashMap::new()).unwrap_err(),
            MatrixError::MissingInterpreter { index: 0 }
        );
    }

    #[test]
    fn test_exclude_drops_only_base_jobs() {
        let matrix = matrix_from(
            r#"
python: [2.7, 3.3]
env: [A=1, A=2]
matrix:
  exclude:
    - python: 3.3
      env: A=2
  include:
    - python: 3.3
      env: A=2
"#,
        );
        let jobs = MatrixExpander::expand(&matrix);
        assert_eq!(jobs.len(), 4);
        assert_eq!(jobs[2], JobSpec::new("3.3", env("A=1")));
        assert_eq!(jobs[3], JobSpec::new("3.3", env("A=2")));
    }

    #[test]
    fn test_exclude_by_python_only() {
        let matrix = matrix_from("python: [2.6, 2.7]\nenv: [A=1, A=2]\nmatrix:\n  exclude:\n    - python: 2.6\n");
        let jobs = MatrixExpander::expand(&matrix);
        assert_eq!(jobs.len(), 2);
        assert!(jobs.iter().all(|job| job.interpreter_version == "2.7"));
    }

    #[test]
    fn test_allow_failures_flags_instances() {
        let matrix = matrix_from(
            r#"
python: [2.7, 3.3]
env:
  global: G=1
  matrix: [A=1]
matrix:
  allow_failures:
    - python: 3.3
"#,
        );
        let instances = MatrixExpander::expand_instances(&matrix);
        assert_eq!(instances.len(), 2);
        assert_eq!(instances[0].number, 1);
        assert!(!instances[0].allow_failure);
        assert_eq!(instances[1].number, 2);
        assert!(instances[1].allow_failure);
    }

    #[test]
    fn test_matcher_env_compares_as_mapping() {
        let matcher = JobMatcher {
            interpreter_version: None,
            environment: Some(env("B=2 A=1")),
        };
        assert!(matcher.matches(&JobSpec::new("2.7", env("A=1 B=2"))));
        assert!(!matcher.matches(&JobSpec::new("2.7", env("A=1"))));
    }

    #[test]
    fn test_collapse_recovers_axes() {
        let matrix = matrix_from("python: [2.7, 3.3, 2.6]\nenv: [A=1, A=2 B=x]\n");
        let base = MatrixExpander::base_product(&matrix);
        let declaration = MatrixExpander::collapse(&base, &[]).unwrap();
        assert_eq!(declaration.interpreter_versions, vec!["2.7", "3.3", "2.6"]);
        assert_eq!(declaration.environment_sets, vec![env("A=1"), env("A=2 B=x")]);
    }

    #[test]
    fn test_collapse_rejects_non_product() {
        let base = vec![
            JobSpec::new("2.7", env("A=1")),
            JobSpec::new("2.7", env("A=2")),
            JobSpec::new("3.3", env("A=1")),
            JobSpec::new("3.3", env("A=3")),
        ];
        assert!(matches!(
            MatrixExpander::collapse(&base, &[]),
            Err(MatrixError::NotAProduct { .. })
        ));
    }

    #[test]
    fn test_round_trip_through_yaml() {
        let source = r#"
python: [2.6, 2.7]
env:
  global:
    - PREFIX="/opt/$NAME" NAME=x
  matrix:
    - NUMPY_VERSION=1.7.1 SETUP_CMD='test -V'
    - NUMPY_VERSION=1.6.2 SETUP_CMD='it'"'"'s'
matrix:
  include:
    - python: 3.3
      env: SETUP_CMD='egg_info'
    - python: 3.3
"#;
        let mut host = HashMap::new();
        host.insert("NAME".to_string(), "host".to_string());
        let config = ConfigParser::parse(source).unwrap();
        let matrix = Matrix::from_config(&config, &host).unwrap();
        let jobs = MatrixExpander::expand(&matrix);

        let declaration =
            MatrixExpander::collapse(&MatrixExpander::base_product(&matrix), &matrix.includes)
                .unwrap();
        let yaml = ConfigParser::to_yaml(&declaration.to_config()).unwrap();

        let reparsed = ConfigParser::parse(&yaml).unwrap();
        let round_tripped =
            MatrixExpander::expand(&Matrix::from_config(&reparsed, &HashMap::new()).unwrap());
        assert_eq!(round_tripped, jobs);
    }
}
