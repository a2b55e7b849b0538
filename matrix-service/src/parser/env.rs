// Environment Assignment Parsing
// Turns `env:` entries like `NUMPY_VERSION=1.7 SETUP_CMD='test -V'` into ordered mappings

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

/// Errors raised while parsing or resolving environment assignments
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EnvError {
    #[error("expected NAME=VALUE, found '{word}'")]
    MissingEquals { word: String },

    #[error("'{name}' is not a valid variable name")]
    InvalidName { name: String },

    #[error("unterminated {quote} quote in '{input}'")]
    UnterminatedQuote { quote: char, input: String },

    #[error("unterminated ${{...}} reference in '{input}'")]
    UnterminatedBrace { input: String },

    #[error("variable '{name}' referenced by {assignment} is not set")]
    UnresolvedVariable { name: String, assignment: String },
}

/// Ordered mapping of environment variable names to resolved values.
///
/// Equality ignores insertion order, so two environments declaring the same
/// variables in a different order compare equal. Iteration keeps declaration
/// order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Environment(IndexMap<String, String>);

impl Environment {
    pub fn new() -> Self {
        Self(IndexMap::new())
    }

    /// Set a variable; redefinitions keep the original position
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// Copy into an unordered map suitable for process spawning
    pub fn to_hash_map(&self) -> HashMap<String, String> {
        self.0
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Render back to a single assignment string that parses to the same mapping
    pub fn to_assignments(&self) -> String {
        self.0
            .iter()
            .map(|(name, value)| format!("{}={}", name, shell_quote(value)))
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Parse and resolve one assignment string with no outer context
    pub fn parse(input: &str) -> Result<Self, EnvError> {
        let assignments = parse_assignments(input)?;
        let mut env = Environment::new();
        resolve_into(&mut env, &assignments, &|_| None)?;
        Ok(env)
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_assignments())
    }
}

impl FromIterator<(String, String)> for Environment {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// One piece of an assignment value before resolution
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Literal(String),
    Reference(String),
}

/// A single `NAME=value` assignment with its value still unresolved
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assignment {
    pub name: String,
    pub segments: Vec<Segment>,
}

impl Assignment {
    /// Names of the variables this assignment's value refers to
    pub fn references(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().filter_map(|s| match s {
            Segment::Reference(name) => Some(name.as_str()),
            Segment::Literal(_) => None,
        })
    }
}

/// Split an assignment string into individual assignments.
///
/// Follows shell word rules: single quotes are literal, double quotes allow
/// `$NAME`/`${NAME}` references and backslash escapes, unquoted text allows both.
pub fn parse_assignments(input: &str) -> Result<Vec<Assignment>, EnvError> {
    let mut assignments = Vec::new();
    let mut chars = input.chars().peekable();

    loop {
        while chars.peek().is_some_and(|c| c.is_whitespace()) {
            chars.next();
        }
        if chars.peek().is_none() {
            break;
        }

        let mut name = String::new();
        while let Some(&c) = chars.peek() {
            if c == '=' || c.is_whitespace() {
                break;
            }
            name.push(c);
            chars.next();
        }

        if chars.next_if_eq(&'=').is_none() {
            return Err(EnvError::MissingEquals { word: name });
        }
        if !is_valid_name(&name) {
            return Err(EnvError::InvalidName { name });
        }

        let segments = read_value(&mut chars, input)?;
        assignments.push(Assignment { name, segments });
    }

    Ok(assignments)
}

/// Resolve assignments in order on top of `env`.
///
/// References are looked up in `env` first (earlier assignments of the same
/// job), then through `fallback`.
pub fn resolve_into(
    env: &mut Environment,
    assignments: &[Assignment],
    fallback: &dyn Fn(&str) -> Option<String>,
) -> Result<(), EnvError> {
    for assignment in assignments {
        let mut value = String::new();
        for segment in &assignment.segments {
            match segment {
                Segment::Literal(text) => value.push_str(text),
                Segment::Reference(name) => {
                    let resolved = env
                        .get(name)
                        .map(str::to_string)
                        .or_else(|| fallback(name))
                        .ok_or_else(|| EnvError::UnresolvedVariable {
                            name: name.clone(),
                            assignment: assignment.name.clone(),
                        })?;
                    value.push_str(&resolved);
                }
            }
        }
        env.insert(assignment.name.clone(), value);
    }
    Ok(())
}

fn read_value(
    chars: &mut std::iter::Peekable<std::str::Chars<'_>>,
    input: &str,
) -> Result<Vec<Segment>, EnvError> {
    let mut segments = Vec::new();
    let mut literal = String::new();

    while let Some(&c) = chars.peek() {
        if c.is_whitespace() {
            break;
        }
        chars.next();
        match c {
            '\'' => loop {
                match chars.next() {
                    Some('\'') => break,
                    Some(ch) => literal.push(ch),
                    None => {
                        return Err(EnvError::UnterminatedQuote {
                            quote: '\'',
                            input: input.to_string(),
                        })
                    }
                }
            },
            '"' => loop {
                match chars.next() {
                    Some('"') => break,
                    Some('\\') => match chars.next() {
                        Some(ch @ ('"' | '\\' | '$' | '`')) => literal.push(ch),
                        Some(ch) => {
                            literal.push('\\');
                            literal.push(ch);
                        }
                        None => {
                            return Err(EnvError::UnterminatedQuote {
                                quote: '"',
                                input: input.to_string(),
                            })
                        }
                    },
                    Some('$') => read_reference(chars, &mut segments, &mut literal, input)?,
                    Some(ch) => literal.push(ch),
                    None => {
                        return Err(EnvError::UnterminatedQuote {
                            quote: '"',
                            input: input.to_string(),
                        })
                    }
                }
            },
            '\\' => {
                if let Some(ch) = chars.next() {
                    literal.push(ch);
                }
            }
            '$' => read_reference(chars, &mut segments, &mut literal, input)?,
            _ => literal.push(c),
        }
    }

    if !literal.is_empty() || segments.is_empty() {
        segments.push(Segment::Literal(literal));
    }
    Ok(segments)
}

/// Read the name after a `$`; a `$` not followed by a name stays literal
fn read_reference(
    chars: &mut std::iter::Peekable<std::str::Chars<'_>>,
    segments: &mut Vec<Segment>,
    literal: &mut String,
    input: &str,
) -> Result<(), EnvError> {
    let mut name = String::new();

    if chars.next_if_eq(&'{').is_some() {
        loop {
            match chars.next() {
                Some('}') => break,
                Some(ch) => name.push(ch),
                None => {
                    return Err(EnvError::UnterminatedBrace {
                        input: input.to_string(),
                    })
                }
            }
        }
        if !is_valid_name(&name) {
            return Err(EnvError::InvalidName { name });
        }
    } else {
        while let Some(&ch) = chars.peek() {
            let valid = if name.is_empty() {
                ch.is_ascii_alphabetic() || ch == '_'
            } else {
                ch.is_ascii_alphanumeric() || ch == '_'
            };
            if !valid {
                break;
            }
            name.push(ch);
            chars.next();
        }
        if name.is_empty() {
            literal.push('$');
            return Ok(());
        }
    }

    if !literal.is_empty() {
        segments.push(Segment::Literal(std::mem::take(literal)));
    }
    segments.push(Segment::Reference(name));
    Ok(())
}

/// Check a shell variable name: `[A-Za-z_][A-Za-z0-9_]*`
pub fn is_valid_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    }
}

/// Quote a value for a POSIX shell word, leaving safe values bare
pub fn shell_quote(value: &str) -> String {
    let safe = !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "_.,:/=+@%-".contains(c));
    if safe {
        value.to_string()
    } else {
        format!("'{}'", value.replace('\'', r"'\''"))
    }
}
