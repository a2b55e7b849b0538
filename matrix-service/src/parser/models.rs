// Travis CI Configuration Models
// Serde types for the build-matrix subset of .travis.yml plus runtime result types

use crate::parser::env::Environment;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

/// Root of a `.travis.yml` configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct TravisConfig {
    /// Interpreter ecosystem (informational only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,

    /// Interpreter versions forming one axis of the matrix
    #[serde(
        default,
        deserialize_with = "deserialize_scalar_list",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub python: Vec<String>,

    /// Environment assignment strings forming the other axis
    #[serde(default, skip_serializing_if = "EnvDeclaration::is_empty")]
    pub env: EnvDeclaration,

    /// Explicit matrix adjustments (`jobs:` is accepted as an alias)
    #[serde(default, alias = "jobs", skip_serializing_if = "MatrixSection::is_empty")]
    pub matrix: MatrixSection,

    #[serde(
        default,
        deserialize_with = "deserialize_scalar_list",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub before_install: Vec<String>,

    #[serde(
        default,
        deserialize_with = "deserialize_scalar_list",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub install: Vec<String>,

    #[serde(
        default,
        deserialize_with = "deserialize_scalar_list",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub script: Vec<String>,

    /// Keys outside the matrix/phase model, kept so validation can report them
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_yaml::Value>,
}

impl TravisConfig {
    /// Raw command strings declared for a phase
    pub fn commands(&self, phase: Phase) -> &[String] {
        match phase {
            Phase::BeforeInstall => &self.before_install,
            Phase::Install => &self.install,
            Phase::Script => &self.script,
        }
    }
}

// =============================================================================
// Environment axis
// =============================================================================

/// The `env:` key: a plain list of rows, or `global` assignments shared by
/// every job plus `matrix` rows forming the axis
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvDeclaration {
    pub global: Vec<String>,
    pub matrix: Vec<String>,
}

impl EnvDeclaration {
    pub fn is_empty(&self) -> bool {
        self.global.is_empty() && self.matrix.is_empty()
    }
}

impl<'de> Deserialize<'de> for EnvDeclaration {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        use serde::de::Error;

        let value = serde_yaml::Value::deserialize(deserializer)?;
        match value {
            serde_yaml::Value::Mapping(map) => {
                let mut decl = EnvDeclaration::default();
                for (key, value) in map {
                    let items = scalar_list_from_value(value).map_err(D::Error::custom)?;
                    match key.as_str() {
                        Some("global") => decl.global = items,
                        Some("matrix") | Some("jobs") => decl.matrix = items,
                        Some(other) => {
                            return Err(D::Error::custom(format!(
                                "unknown field `{}`, expected one of `global`, `matrix`",
                                other
                            )))
                        }
                        None => return Err(D::Error::custom("env keys must be strings")),
                    }
                }
                Ok(decl)
            }
            other => Ok(EnvDeclaration {
                global: Vec::new(),
                matrix: scalar_list_from_value(other).map_err(D::Error::custom)?,
            }),
        }
    }
}

impl Serialize for EnvDeclaration {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        use serde::ser::SerializeMap;

        if self.global.is_empty() {
            return self.matrix.serialize(serializer);
        }
        let mut map = serializer.serialize_map(Some(2))?;
        map.serialize_entry("global", &self.global)?;
        if !self.matrix.is_empty() {
            map.serialize_entry("matrix", &self.matrix)?;
        }
        map.end()
    }
}

// =============================================================================
// Matrix section
// =============================================================================

/// The `matrix:` (or `jobs:`) key
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct MatrixSection {
    /// Jobs appended after the cross product
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub include: Vec<JobEntry>,

    /// Matchers removing jobs from the cross product
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub exclude: Vec<JobEntry>,

    /// Matchers for jobs whose failure does not fail the run
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub allow_failures: Vec<JobEntry>,

    /// Unsupported keys such as `fast_finish`
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_yaml::Value>,
}

impl MatrixSection {
    pub fn is_empty(&self) -> bool {
        self.include.is_empty()
            && self.exclude.is_empty()
            && self.allow_failures.is_empty()
            && self.extra.is_empty()
    }
}

/// A `{python, env}` entry of `include`, `exclude` or `allow_failures`
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct JobEntry {
    #[serde(
        default,
        deserialize_with = "deserialize_optional_scalar",
        skip_serializing_if = "Option::is_none"
    )]
    pub python: Option<String>,

    #[serde(
        default,
        deserialize_with = "deserialize_optional_scalar_list",
        serialize_with = "serialize_compact_list",
        skip_serializing_if = "Option::is_none"
    )]
    pub env: Option<Vec<String>>,
}

// =============================================================================
// Phases
// =============================================================================

/// Lifecycle phase of a job, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    BeforeInstall,
    Install,
    Script,
}

impl Phase {
    /// All phases in execution order
    pub const ALL: [Phase; 3] = [Phase::BeforeInstall, Phase::Install, Phase::Script];

    /// The configuration key naming this phase
    pub fn key(&self) -> &'static str {
        match self {
            Phase::BeforeInstall => "before_install",
            Phase::Install => "install",
            Phase::Script => "script",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

// =============================================================================
// Jobs
// =============================================================================

/// One fully resolved job: an interpreter version and its environment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobSpec {
    pub interpreter_version: String,
    pub environment: Environment,
}

impl JobSpec {
    pub fn new(interpreter_version: impl Into<String>, environment: Environment) -> Self {
        Self {
            interpreter_version: interpreter_version.into(),
            environment,
        }
    }

    /// Human readable label used in reports: `python 2.7 NUMPY=1.7`
    pub fn label(&self) -> String {
        if self.environment.is_empty() {
            format!("python {}", self.interpreter_version)
        } else {
            format!(
                "python {} {}",
                self.interpreter_version,
                self.environment.to_assignments()
            )
        }
    }
}

// =============================================================================
// Execution Results (for runtime)
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandStatus {
    Succeeded,
    Failed,
    Skipped,
}

/// Outcome of one command of one job
#[derive(Debug, Clone, Serialize)]
pub struct CommandResult {
    pub phase: Phase,
    pub index: usize,
    pub command: String,
    pub status: CommandStatus,
    pub exit_code: Option<i32>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub stdout: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub stderr: String,
    #[serde(serialize_with = "serialize_duration_secs")]
    pub duration: Duration,
}

/// Why a job failed, classified by the phase of the failing command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Non-zero exit in `before_install`
    CommandFailure,
    /// Non-zero exit in `install`
    DependencyInstall,
    /// Non-zero exit in `script`
    TestScript,
    /// The job's working directory could not be prepared
    WorkspaceSetup,
}

impl FailureKind {
    pub fn from_phase(phase: Phase) -> Self {
        match phase {
            Phase::BeforeInstall => FailureKind::CommandFailure,
            Phase::Install => FailureKind::DependencyInstall,
            Phase::Script => FailureKind::TestScript,
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::CommandFailure => write!(f, "command failure"),
            FailureKind::DependencyInstall => write!(f, "dependency install failure"),
            FailureKind::TestScript => write!(f, "test script failure"),
            FailureKind::WorkspaceSetup => write!(f, "workspace setup failure"),
        }
    }
}

/// Terminal result of one job
#[derive(Debug, Clone, Serialize)]
pub struct JobResult {
    /// 1-based position of the job in the expanded matrix
    pub number: usize,
    pub job: JobSpec,
    pub exit_code: i32,
    pub phase_reached: Phase,
    pub failure: Option<FailureKind>,
    pub allow_failure: bool,
    pub commands: Vec<CommandResult>,
    #[serde(serialize_with = "serialize_duration_secs")]
    pub duration: Duration,
}

impl JobResult {
    pub fn passed(&self) -> bool {
        self.exit_code == 0 && self.failure.is_none()
    }

    /// Whether this job makes the overall run fail
    pub fn is_fatal(&self) -> bool {
        !self.passed() && !self.allow_failure
    }

    /// The command that terminated the job, if any
    pub fn failing_command(&self) -> Option<&CommandResult> {
        self.commands
            .iter()
            .rev()
            .find(|c| c.status == CommandStatus::Failed)
    }
}

/// Aggregate result of running a matrix
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    /// Results ordered by job number
    pub results: Vec<JobResult>,
    #[serde(serialize_with = "serialize_duration_secs")]
    pub duration: Duration,
    pub success: bool,
}

impl RunSummary {
    pub fn new(mut results: Vec<JobResult>, duration: Duration) -> Self {
        results.sort_by_key(|r| r.number);
        let success = !results.iter().any(JobResult::is_fatal);
        Self {
            results,
            duration,
            success,
        }
    }

    pub fn passed(&self) -> usize {
        self.results.iter().filter(|r| r.passed()).count()
    }

    pub fn failed(&self) -> usize {
        self.results.iter().filter(|r| r.is_fatal()).count()
    }

    pub fn allowed_failures(&self) -> usize {
        self.results
            .iter()
            .filter(|r| !r.passed() && r.allow_failure)
            .count()
    }
}

// =============================================================================
// Serde helpers
// =============================================================================

/// Accept a scalar or a sequence of scalars; numbers and booleans become strings
fn deserialize_scalar_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_yaml::Value::deserialize(deserializer)?;
    scalar_list_from_value(value).map_err(serde::de::Error::custom)
}

fn deserialize_optional_scalar_list<'de, D>(
    deserializer: D,
) -> Result<Option<Vec<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_yaml::Value::deserialize(deserializer)?;
    if value.is_null() {
        return Ok(None);
    }
    scalar_list_from_value(value)
        .map(Some)
        .map_err(serde::de::Error::custom)
}

fn deserialize_optional_scalar<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_yaml::Value::deserialize(deserializer)?;
    if value.is_null() {
        return Ok(None);
    }
    scalar_to_string(&value)
        .map(Some)
        .ok_or_else(|| serde::de::Error::custom("expected a string or number"))
}

/// Single-element lists are written as a bare string
fn serialize_compact_list<S>(value: &Option<Vec<String>>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    match value.as_deref() {
        Some([single]) => serializer.serialize_str(single),
        Some(items) => items.serialize(serializer),
        None => serializer.serialize_none(),
    }
}

fn serialize_duration_secs<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_f64(duration.as_secs_f64())
}

fn scalar_list_from_value(value: serde_yaml::Value) -> Result<Vec<String>, String> {
    match value {
        serde_yaml::Value::Null => Ok(Vec::new()),
        serde_yaml::Value::Sequence(items) => items
            .iter()
            .map(|item| {
                scalar_to_string(item)
                    .ok_or_else(|| format!("expected a string or number, found {}", kind(item)))
            })
            .collect(),
        other => scalar_to_string(&other)
            .map(|s| vec![s])
            .ok_or_else(|| format!("expected a string or a list, found {}", kind(&other))),
    }
}

fn scalar_to_string(value: &serde_yaml::Value) -> Option<String> {
    match value {
        serde_yaml::Value::String(s) => Some(s.clone()),
        serde_yaml::Value::Number(n) => Some(n.to_string()),
        serde_yaml::Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn kind(value: &serde_yaml::Value) -> &'static str {
    match value {
        serde_yaml::Value::Null => "null",
        serde_yaml::Value::Bool(_) => "a boolean",
        serde_yaml::Value::Number(_) => "a number",
        serde_yaml::Value::String(_) => "a string",
        serde_yaml::Value::Sequence(_) => "a sequence",
        serde_yaml::Value::Mapping(_) => "a mapping",
        serde_yaml::Value::Tagged(_) => "a tagged value",
    }
}
