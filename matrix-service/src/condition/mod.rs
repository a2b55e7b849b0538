// Condition Module
// Parses and evaluates the `[[ ... ]]` tests guarding phase commands

pub mod evaluator;
pub mod lexer;
pub mod parser;

pub use lexer::{Lexer, Token, Word, WordPart};
pub use parser::{CompareOp, Expr, Parser};

use std::collections::HashMap;
use thiserror::Error;

/// Errors produced while parsing a condition
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConditionError {
    #[error("lex error at position {position}: {message}")]
    Lex { message: String, position: usize },

    #[error("unexpected {found}, expected {expected}")]
    UnexpectedToken { found: String, expected: String },

    #[error("unexpected end of condition, expected {expected}")]
    UnexpectedEnd { expected: String },

    #[error("unsupported shell feature: {feature}")]
    Unsupported { feature: String },

    #[error("empty condition")]
    Empty,
}

/// A parsed condition together with its source text
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    source: String,
    expr: Expr,
}

impl Condition {
    /// Parse the text between `[[` and `]]`
    pub fn parse(source: &str) -> Result<Self, ConditionError> {
        let expr = Parser::new(source)?.parse()?;
        Ok(Self {
            source: source.trim().to_string(),
            expr,
        })
    }

    /// Evaluate against a job's environment
    pub fn evaluate(&self, env: &HashMap<String, String>) -> bool {
        evaluator::evaluate(&self.expr, env)
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn expr(&self) -> &Expr {
        &self.expr
    }

    /// Distinct variable names referenced, in order of appearance
    pub fn variables(&self) -> Vec<&str> {
        let mut all = Vec::new();
        self.expr.collect_variables(&mut all);
        let mut seen = Vec::new();
        for name in all {
            if !seen.contains(&name) {
                seen.push(name);
            }
        }
        seen
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_condition_round_trip_source() {
        let condition = Condition::parse("  $SETUP_CMD == build_sphinx*  ").unwrap();
        assert_eq!(condition.source(), "$SETUP_CMD == build_sphinx*");
        assert_eq!(condition.variables(), vec!["SETUP_CMD"]);
    }

    #[test]
    fn test_condition_evaluate() {
        let condition = Condition::parse("$SETUP_CMD == build_sphinx*").unwrap();
        let mut env = HashMap::new();
        env.insert("SETUP_CMD".to_string(), "test".to_string());
        assert!(!condition.evaluate(&env));
        env.insert("SETUP_CMD".to_string(), "build_sphinx".to_string());
        assert!(condition.evaluate(&env));
    }

    #[test]
    fn test_condition_variables_are_deduplicated() {
        let condition = Condition::parse("$A == 1 || $A == 2 && $B == 3").unwrap();
        assert_eq!(condition.variables(), vec!["A", "B"]);
    }

    #[test]
    fn test_condition_error_display() {
        let err = Condition::parse("$A =~ x").unwrap_err();
        assert!(err.to_string().contains("unsupported"));
    }
}
