// Travis CI Configuration Parser
// Parses .travis.yml files and checks them before any job is expanded

use crate::execution::context::INJECTED_VARIABLES;
use crate::parser::command::{Command, CommandKind};
use crate::parser::env::parse_assignments;
use crate::parser::error::{ParseError, ParseResult, ValidationError};
use crate::parser::models::*;

use std::collections::HashSet;
use std::fs;
use std::path::Path;
use thiserror::Error;

/// Errors raised while loading a configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0}")]
    Parse(#[from] ParseError),

    #[error("configuration is invalid ({} error(s))", .0.len())]
    Invalid(Vec<ValidationError>),
}

/// Travis configuration parser
pub struct ConfigParser;

impl ConfigParser {
    /// Parse configuration from a YAML string; an empty document is the
    /// empty configuration
    pub fn parse(content: &str) -> ParseResult<TravisConfig> {
        let value: serde_yaml::Value =
            serde_yaml::from_str(content).map_err(|e| ParseError::from_yaml_error(&e, content))?;
        if value.is_null() {
            return Ok(TravisConfig::default());
        }

        let config: TravisConfig =
            serde_yaml::from_str(content).map_err(|e| ParseError::from_yaml_error(&e, content))?;

        Ok(config)
    }

    /// Parse configuration from file
    pub fn parse_file<P: AsRef<Path>>(path: P) -> ParseResult<TravisConfig> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            ParseError::io_error(format!("failed to read {}: {}", path.display(), e))
        })?;

        Self::parse(&content)
    }

    /// Parse and validate a file, returning the remaining warnings
    pub fn load<P: AsRef<Path>>(
        path: P,
    ) -> Result<(TravisConfig, Vec<ValidationError>), ConfigError> {
        let config = Self::parse_file(path)?;
        let warnings = ConfigValidator::check(&config)?;
        Ok((config, warnings))
    }

    /// Render a configuration back to YAML
    pub fn to_yaml(config: &TravisConfig) -> ParseResult<String> {
        serde_yaml::to_string(config)
            .map_err(|e| ParseError::new(format!("failed to serialize configuration: {}", e), 0, 0))
    }
}

/// Travis keys this runner recognizes but does not act on
const IGNORED_KEYS: &[&str] = &[
    "after_success",
    "after_failure",
    "after_script",
    "before_script",
    "before_deploy",
    "deploy",
    "cache",
    "notifications",
    "sudo",
    "dist",
    "os",
    "addons",
    "branches",
    "services",
    "git",
    "compiler",
    "virtualenv",
];

/// Common misspellings of supported keys
const KEY_TYPOS: &[(&str, &str)] = &[
    ("before-install", "before_install"),
    ("beforeinstall", "before_install"),
    ("before_installs", "before_install"),
    ("installs", "install"),
    ("scripts", "script"),
    ("enviroment", "env"),
    ("environment", "env"),
    ("envs", "env"),
    ("pythons", "python"),
    ("python_version", "python"),
    ("includes", "include"),
    ("excludes", "exclude"),
    ("allow_failure", "allow_failures"),
    ("allowed_failures", "allow_failures"),
];

const SUPPORTED_KEYS: &[&str] = &[
    "language",
    "python",
    "env",
    "matrix",
    "jobs",
    "before_install",
    "install",
    "script",
];

/// Validator for parsed configurations
pub struct ConfigValidator;

impl ConfigValidator {
    /// Collect every finding, errors and warnings alike
    pub fn validate(config: &TravisConfig) -> Vec<ValidationError> {
        let mut findings = Vec::new();

        Self::validate_language(config, &mut findings);
        Self::validate_unknown_keys(config, &mut findings);
        Self::validate_jobs(config, &mut findings);
        Self::validate_env(config, &mut findings);
        Self::validate_commands(config, &mut findings);

        findings
    }

    /// Fail on errors, return warnings otherwise
    pub fn check(config: &TravisConfig) -> Result<Vec<ValidationError>, ConfigError> {
        let (errors, warnings): (Vec<_>, Vec<_>) = Self::validate(config)
            .into_iter()
            .partition(ValidationError::is_error);

        if errors.is_empty() {
            Ok(warnings)
        } else {
            Err(ConfigError::Invalid(errors))
        }
    }

    fn validate_language(config: &TravisConfig, findings: &mut Vec<ValidationError>) {
        if let Some(language) = &config.language {
            if language != "python" {
                findings.push(
                    ValidationError::warning(
                        format!("language '{}' is treated as python", language),
                        "language",
                    )
                    .with_suggestion("only the `python` axis is expanded"),
                );
            }
        }
    }

    fn validate_unknown_keys(config: &TravisConfig, findings: &mut Vec<ValidationError>) {
        for key in config.extra.keys() {
            if IGNORED_KEYS.contains(&key.as_str()) {
                findings.push(ValidationError::warning(
                    format!("'{}' is not supported and will be ignored", key),
                    key.as_str(),
                ));
                continue;
            }
            let mut finding = ValidationError::warning(format!("unknown key '{}'", key), key.as_str());
            if let Some(suggestion) = suggest_key(key, SUPPORTED_KEYS) {
                finding = finding.with_suggestion(format!("did you mean '{}'?", suggestion));
            }
            findings.push(finding);
        }

        for key in config.matrix.extra.keys() {
            let path = format!("matrix.{}", key);
            let finding = if key == "fast_finish" {
                ValidationError::warning("'fast_finish' is not supported; every job runs", path)
            } else {
                let finding = ValidationError::warning(format!("unknown key '{}'", key), path);
                match suggest_key(key, &["include", "exclude", "allow_failures"]) {
                    Some(suggestion) => {
                        finding.with_suggestion(format!("did you mean '{}'?", suggestion))
                    }
                    None => finding,
                }
            };
            findings.push(finding);
        }
    }

    fn validate_jobs(config: &TravisConfig, findings: &mut Vec<ValidationError>) {
        if config.script.is_empty() {
            findings.push(
                ValidationError::new("configuration has no 'script' commands", "script")
                    .with_suggestion("add 'script:' with the command that runs the tests"),
            );
        }

        if config.python.is_empty() {
            if config.matrix.include.is_empty() {
                findings.push(
                    ValidationError::new("matrix expands to no jobs", "python")
                        .with_suggestion("list interpreter versions under 'python:'"),
                );
            }
            for (i, entry) in config.matrix.include.iter().enumerate() {
                if entry.python.is_none() {
                    findings.push(
                        ValidationError::new(
                            "include entry has no 'python' and no default version is declared",
                            format!("matrix.include[{}]", i),
                        )
                        .with_suggestion("add 'python:' to the entry"),
                    );
                }
            }
        }

        if !config.matrix.exclude.is_empty() && config.python.is_empty() {
            findings.push(ValidationError::warning(
                "'exclude' has no effect without a 'python' axis",
                "matrix.exclude",
            ));
        }
    }

    fn validate_env(config: &TravisConfig, findings: &mut Vec<ValidationError>) {
        let mut check = |entries: &[String], path: &str| {
            for (i, entry) in entries.iter().enumerate() {
                if let Err(e) = parse_assignments(entry) {
                    findings.push(ValidationError::new(e.to_string(), format!("{}[{}]", path, i)));
                }
            }
        };

        check(&config.env.global, "env.global");
        check(&config.env.matrix, "env.matrix");

        let sections = [
            ("matrix.include", &config.matrix.include),
            ("matrix.exclude", &config.matrix.exclude),
            ("matrix.allow_failures", &config.matrix.allow_failures),
        ];
        for (section, entries) in sections {
            for (i, entry) in entries.iter().enumerate() {
                if let Some(env) = &entry.env {
                    check(env, &format!("{}[{}].env", section, i));
                }
            }
        }
    }

    fn validate_commands(config: &TravisConfig, findings: &mut Vec<ValidationError>) {
        let defined = defined_names(config);

        for phase in Phase::ALL {
            for (i, raw) in config.commands(phase).iter().enumerate() {
                let path = format!("{}[{}]", phase.key(), i);
                let command = Command::parse(raw);
                match &command.kind {
                    CommandKind::Plain => {}
                    CommandKind::Opaque { reason } => {
                        findings.push(ValidationError::warning(reason.clone(), path));
                    }
                    CommandKind::Conditional { condition, .. } => {
                        for name in condition.variables() {
                            if !defined.contains(name) {
                                findings.push(
                                    ValidationError::warning(
                                        format!("condition uses '{}', which no job defines", name),
                                        path.clone(),
                                    )
                                    .with_suggestion(
                                        "the value comes from the host environment, or is empty",
                                    ),
                                );
                            }
                        }
                    }
                }
            }
        }
    }
}

/// Variable names set by the configuration or injected into every job
fn defined_names(config: &TravisConfig) -> HashSet<String> {
    let mut names: HashSet<String> = INJECTED_VARIABLES.iter().map(|s| s.to_string()).collect();

    let include_envs = config
        .matrix
        .include
        .iter()
        .filter_map(|entry| entry.env.as_ref())
        .flatten();
    for entry in config.env.global.iter().chain(&config.env.matrix).chain(include_envs) {
        if let Ok(assignments) = parse_assignments(entry) {
            names.extend(assignments.into_iter().map(|a| a.name));
        }
    }
    names
}

/// Suggest a supported key for a mistyped one
fn suggest_key(key: &str, candidates: &[&str]) -> Option<String> {
    let lowered = key.to_lowercase();
    if let Some((_, fix)) = KEY_TYPOS.iter().find(|(typo, _)| *typo == lowered) {
        return Some(fix.to_string());
    }

    candidates
        .iter()
        .map(|candidate| (candidate, edit_distance(&lowered, candidate)))
        .filter(|(_, distance)| *distance <= 2)
        .min_by_key(|(_, distance)| *distance)
        .map(|(candidate, _)| candidate.to_string())
}

fn edit_distance(a: &str, b: &str) -> usize {
    let b: Vec<char> = b.chars().collect();
    let mut prev: Vec<usize> = (0..=b.len()).collect();
    for (i, ca) in a.chars().enumerate() {
        let mut current = vec![i + 1];
        for (j, cb) in b.iter().enumerate() {
            let cost = if ca == *cb { 0 } else { 1 };
            current.push((prev[j] + cost).min(prev[j + 1] + 1).min(current[j] + 1));
        }
        prev = current;
    }
    prev[b.len()]
}
