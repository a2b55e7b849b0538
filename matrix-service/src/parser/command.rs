// Phase Commands
// Recognizes `if [[ cond ]]; then cmd; fi` wrappers around phase commands

use crate::condition::{Condition, ConditionError};
use crate::parser::models::{Phase, TravisConfig};

use std::collections::HashMap;

/// How a command should be treated at run time
#[derive(Debug, Clone, PartialEq)]
pub enum CommandKind {
    /// Always runs, handed to the shell verbatim
    Plain,
    /// Guarded by a condition the runner evaluates itself
    Conditional {
        condition: Condition,
        then_body: String,
        else_body: Option<String>,
    },
    /// Looks conditional but uses shell features the condition language does
    /// not cover; the shell evaluates the whole command
    Opaque { reason: String },
}

/// A single phase command
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    pub raw: String,
    pub kind: CommandKind,
}

/// What to do with a command for a particular job
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandPlan<'a> {
    Run(&'a str),
    Skip { reason: String },
}

impl Command {
    /// Classify a raw command string. Never fails: anything that cannot be
    /// understood is run by the shell as written.
    pub fn parse(raw: &str) -> Self {
        let kind = match split_conditional(raw) {
            None => CommandKind::Plain,
            Some(Err(reason)) => CommandKind::Opaque { reason },
            Some(Ok(parts)) => match Condition::parse(parts.condition) {
                Ok(condition) => CommandKind::Conditional {
                    condition,
                    then_body: parts.then_body.to_string(),
                    else_body: parts.else_body.map(str::to_string),
                },
                Err(err) => CommandKind::Opaque {
                    reason: describe_condition_error(&err),
                },
            },
        };

        Self {
            raw: raw.to_string(),
            kind,
        }
    }

    pub fn is_conditional(&self) -> bool {
        matches!(self.kind, CommandKind::Conditional { .. })
    }

    /// Decide whether and what to run given the variables the shell would see
    ///
    /// `env` is the job's full runtime environment: its own variables, the
    /// injected `TRAVIS_*` set and host variables the job leaves undefined.
    pub fn plan(&self, env: &HashMap<String, String>) -> CommandPlan<'_> {
        match &self.kind {
            CommandKind::Plain | CommandKind::Opaque { .. } => CommandPlan::Run(&self.raw),
            CommandKind::Conditional {
                condition,
                then_body,
                else_body,
            } => {
                if condition.evaluate(env) {
                    CommandPlan::Run(then_body)
                } else if let Some(else_body) = else_body {
                    CommandPlan::Run(else_body)
                } else {
                    CommandPlan::Skip {
                        reason: format!("condition `{}` is false", condition.source()),
                    }
                }
            }
        }
    }
}

fn describe_condition_error(err: &ConditionError) -> String {
    format!("condition not understood ({}); the shell will evaluate it", err)
}

/// Commands of all three phases, parsed once and shared by every job
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PhasePlan {
    pub before_install: Vec<Command>,
    pub install: Vec<Command>,
    pub script: Vec<Command>,
}

impl PhasePlan {
    pub fn from_config(config: &TravisConfig) -> Self {
        let parse_all = |phase: Phase| -> Vec<Command> {
            config
                .commands(phase)
                .iter()
                .map(|raw| Command::parse(raw))
                .collect()
        };

        Self {
            before_install: parse_all(Phase::BeforeInstall),
            install: parse_all(Phase::Install),
            script: parse_all(Phase::Script),
        }
    }

    pub fn commands(&self, phase: Phase) -> &[Command] {
        match phase {
            Phase::BeforeInstall => &self.before_install,
            Phase::Install => &self.install,
            Phase::Script => &self.script,
        }
    }

    pub fn total(&self) -> usize {
        self.before_install.len() + self.install.len() + self.script.len()
    }

    /// Iterate `(phase, index, command)` in execution order
    pub fn iter(&self) -> impl Iterator<Item = (Phase, usize, &Command)> {
        Phase::ALL.into_iter().flat_map(move |phase| {
            self.commands(phase)
                .iter()
                .enumerate()
                .map(move |(index, command)| (phase, index, command))
        })
    }
}

struct ConditionalParts<'a> {
    condition: &'a str,
    then_body: &'a str,
    else_body: Option<&'a str>,
}

/// Split `if [[ c ]]; then a; [else b;] fi`.
///
/// Returns `None` when the command is not an `if` at all, `Some(Err(reason))`
/// when it is an `if` this runner does not evaluate itself.
fn split_conditional(raw: &str) -> Option<Result<ConditionalParts<'_>, String>> {
    let text = raw.trim();
    let rest = text.strip_prefix("if")?;
    if !rest.starts_with(char::is_whitespace) {
        return None;
    }
    let rest = rest.trim_start();

    let Some(inner_start) = rest.strip_prefix("[[") else {
        return Some(Err("only `[[ ... ]]` tests are evaluated".to_string()));
    };
    let Some(close) = find_test_close(inner_start) else {
        return Some(Err("missing closing `]]`".to_string()));
    };
    let condition = inner_start[..close].trim();
    let after = inner_start[close + 2..].trim_start_matches([' ', '\t']);

    let Some(after) = after.strip_prefix(';').or_else(|| after.strip_prefix('\n')) else {
        return Some(Err("expected `;` after `]]`".to_string()));
    };
    let Some(after) = after.trim_start().strip_prefix("then") else {
        return Some(Err("expected `then`".to_string()));
    };
    if !after.starts_with(char::is_whitespace) {
        return Some(Err("expected `then`".to_string()));
    }

    let Some(body) = strip_fi(after) else {
        return Some(Err("command does not end with `fi`".to_string()));
    };

    if contains_word(body, "if") || contains_word(body, "elif") {
        return Some(Err("nested conditionals are left to the shell".to_string()));
    }

    let (then_body, else_body) = match split_else(body) {
        Some((then_body, else_body)) => (then_body, Some(else_body)),
        None => (body, None),
    };

    let then_body = trim_body(then_body);
    if then_body.is_empty() {
        return Some(Err("empty `then` branch".to_string()));
    }

    Some(Ok(ConditionalParts {
        condition,
        then_body,
        else_body: else_body.map(trim_body).filter(|b| !b.is_empty()),
    }))
}

/// Position of the `]]` closing a test, skipping quoted text
fn find_test_close(text: &str) -> Option<usize> {
    let bytes = text.as_bytes();
    let mut quote: Option<u8> = None;
    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        match quote {
            Some(q) if b == q => quote = None,
            Some(b'"') if b == b'\\' => i += 1,
            Some(_) => {}
            None if b == b'\'' || b == b'"' => quote = Some(b),
            None if b == b'\\' => i += 1,
            None if b == b']' && bytes.get(i + 1) == Some(&b']') => return Some(i),
            None => {}
        }
        i += 1;
    }
    None
}

/// Strip the trailing `fi`, which must follow `;` or a newline
fn strip_fi(text: &str) -> Option<&str> {
    let trimmed = text.trim_end();
    let body = trimmed.strip_suffix("fi")?;
    let before = body.trim_end();
    if before.ends_with(';') || body.ends_with('\n') {
        Some(before)
    } else {
        None
    }
}

/// Split at an `else` keyword that starts a command
fn split_else(body: &str) -> Option<(&str, &str)> {
    let mut search = 0;
    while let Some(found) = body[search..].find("else") {
        let start = search + found;
        let end = start + "else".len();
        let preceded = body[..start]
            .trim_end_matches([' ', '\t'])
            .ends_with([';', '\n']);
        let followed = body[end..].starts_with(char::is_whitespace);
        if preceded && followed {
            return Some((&body[..start], &body[end..]));
        }
        search = end;
    }
    None
}

fn trim_body(body: &str) -> &str {
    body.trim().trim_end_matches(';').trim_end()
}

fn contains_word(text: &str, word: &str) -> bool {
    text.split(|c: char| c.is_whitespace() || c == ';')
        .any(|token| token == word)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_plain_command() {
        let cmd = Command::parse("pip install -q numpy");
        assert_eq!(cmd.kind, CommandKind::Plain);
        assert_eq!(
            cmd.plan(&HashMap::new()),
            CommandPlan::Run("pip install -q numpy")
        );
    }

    #[test]
    fn test_conditional_command() {
        let cmd = Command::parse(
            "if [[ $SETUP_CMD == build_sphinx* ]]; then sudo apt-get install graphviz; fi",
        );
        assert!(cmd.is_conditional());

        let skipped = cmd.plan(&env(&[("SETUP_CMD", "test")]));
        assert!(matches!(skipped, CommandPlan::Skip { .. }));

        let run = cmd.plan(&env(&[("SETUP_CMD", "build_sphinx -w")]));
        assert_eq!(run, CommandPlan::Run("sudo apt-get install graphviz"));
    }

    #[test]
    fn test_conditional_with_else() {
        let cmd = Command::parse(
            "if [[ $TRAVIS_PYTHON_VERSION == 2.6 ]]; then pip install unittest2; else echo skip; fi",
        );
        assert_eq!(
            cmd.plan(&env(&[("TRAVIS_PYTHON_VERSION", "2.6")])),
            CommandPlan::Run("pip install unittest2")
        );
        assert_eq!(
            cmd.plan(&env(&[("TRAVIS_PYTHON_VERSION", "3.3")])),
            CommandPlan::Run("echo skip")
        );
    }

    #[test]
    fn test_conditional_with_bracket_expression() {
        let cmd = Command::parse(
            "if [[ $TRAVIS_PYTHON_VERSION == 2.[67] ]]; then pip install unittest2; fi",
        );
        assert!(cmd.is_conditional());
        assert_eq!(
            cmd.plan(&env(&[("TRAVIS_PYTHON_VERSION", "2.7")])),
            CommandPlan::Run("pip install unittest2")
        );
        assert_eq!(
            cmd.plan(&env(&[("TRAVIS_PYTHON_VERSION", "2.6")])),
            CommandPlan::Run("pip install unittest2")
        );
        assert!(matches!(
            cmd.plan(&env(&[("TRAVIS_PYTHON_VERSION", "3.3")])),
            CommandPlan::Skip { .. }
        ));

        let negated = Command::parse("if [[ $TRAVIS_PYTHON_VERSION == [!2]* ]]; then echo py3; fi");
        assert_eq!(
            negated.plan(&env(&[("TRAVIS_PYTHON_VERSION", "3.3")])),
            CommandPlan::Run("echo py3")
        );
    }

    #[test]
    fn test_multiline_conditional() {
        let cmd = Command::parse("if [[ $A == 1 ]]\nthen\n  echo one\n  echo two\nfi\n");
        assert_eq!(
            cmd.plan(&env(&[("A", "1")])),
            CommandPlan::Run("echo one\n  echo two")
        );
    }

    #[test]
    fn test_single_bracket_test_is_opaque() {
        let cmd = Command::parse("if [ \"$A\" = 1 ]; then echo one; fi");
        assert!(matches!(cmd.kind, CommandKind::Opaque { .. }));
        assert_eq!(cmd.plan(&HashMap::new()), CommandPlan::Run(cmd.raw.as_str()));
    }

    #[test]
    fn test_nested_conditional_is_opaque() {
        let cmd = Command::parse("if [[ $A == 1 ]]; then if true; then echo x; fi; fi");
        assert!(matches!(cmd.kind, CommandKind::Opaque { .. }));
    }

    #[test]
    fn test_unsupported_operator_is_opaque() {
        let cmd = Command::parse("if [[ $A =~ ^1 ]]; then echo one; fi");
        assert!(matches!(cmd.kind, CommandKind::Opaque { .. }));
    }

    #[test]
    fn test_word_starting_with_if_is_plain() {
        let cmd = Command::parse("ifconfig -a");
        assert_eq!(cmd.kind, CommandKind::Plain);
    }

    #[test]
    fn test_bracket_inside_quotes() {
        let cmd = Command::parse("if [[ $A == \"x]]y\" ]]; then echo ok; fi");
        assert_eq!(cmd.plan(&env(&[("A", "x]]y")])), CommandPlan::Run("echo ok"));
    }

    #[test]
    fn test_phase_plan_iterates_in_order() {
        let config: TravisConfig = serde_yaml::from_str(
            "before_install: a\ninstall:\n  - b\n  - c\nscript: d\n",
        )
        .unwrap();
        let plan = PhasePlan::from_config(&config);
        let order: Vec<_> = plan
            .iter()
            .map(|(phase, index, cmd)| (phase, index, cmd.raw.clone()))
            .collect();
        assert_eq!(
            order,
            vec![
                (Phase::BeforeInstall, 0, "a".to_string()),
                (Phase::Install, 0, "b".to_string()),
                (Phase::Install, 1, "c".to_string()),
                (Phase::Script, 0, "d".to_string()),
            ]
        );
        assert_eq!(plan.total(), 4);
    }
}
