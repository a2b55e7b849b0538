// Condition Parser
// Builds an AST from `[[ ... ]]` tokens with shell precedence (! > && > ||)

use crate::condition::lexer::{Lexer, Token, Word};
use crate::condition::ConditionError;

/// Comparison operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    /// `==` / `=`: right side is a glob pattern
    Match,
    /// `!=`
    NotMatch,
    /// `<`: lexicographic
    Less,
    /// `>`: lexicographic
    Greater,
    NumEq,
    NumNe,
    NumLt,
    NumLe,
    NumGt,
    NumGe,
}

/// Abstract syntax tree for a test expression
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// `left op right`
    Compare {
        left: Word,
        op: CompareOp,
        right: Word,
    },
    /// `-n word` or a lone `word`
    NonEmpty(Word),
    /// `-z word`
    Empty(Word),
    /// `! expr`
    Not(Box<Expr>),
    /// `a && b`
    And(Box<Expr>, Box<Expr>),
    /// `a || b`
    Or(Box<Expr>, Box<Expr>),
}

impl Expr {
    /// Collect referenced variable names
    pub fn collect_variables<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Expr::Compare { left, right, .. } => {
                out.extend(left.variables());
                out.extend(right.variables());
            }
            Expr::NonEmpty(word) | Expr::Empty(word) => out.extend(word.variables()),
            Expr::Not(inner) => inner.collect_variables(out),
            Expr::And(a, b) | Expr::Or(a, b) => {
                a.collect_variables(out);
                b.collect_variables(out);
            }
        }
    }
}

/// Recursive-descent parser over lexed tokens
pub struct Parser {
    tokens: Vec<Token>,
    position: usize,
}

impl Parser {
    pub fn new(input: &str) -> Result<Self, ConditionError> {
        Ok(Self {
            tokens: Lexer::new(input).tokenize()?,
            position: 0,
        })
    }

    /// Parse a complete expression, rejecting trailing tokens
    pub fn parse(mut self) -> Result<Expr, ConditionError> {
        if self.peek() == &Token::Eof {
            return Err(ConditionError::Empty);
        }
        let expr = self.parse_or()?;
        match self.peek() {
            Token::Eof => Ok(expr),
            other => Err(ConditionError::UnexpectedToken {
                found: other.to_string(),
                expected: "end of condition".to_string(),
            }),
        }
    }

    fn peek(&self) -> &Token {
        self.tokens.get(self.position).unwrap_or(&Token::Eof)
    }

    fn peek_at(&self, offset: usize) -> &Token {
        self.tokens
            .get(self.position + offset)
            .unwrap_or(&Token::Eof)
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if self.position < self.tokens.len() {
            self.position += 1;
        }
        token
    }

    fn parse_or(&mut self) -> Result<Expr, ConditionError> {
        let mut left = self.parse_and()?;
        while self.peek() == &Token::Or {
            self.advance();
            let right = self.parse_and()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr, ConditionError> {
        let mut left = self.parse_unary()?;
        while self.peek() == &Token::And {
            self.advance();
            let right = self.parse_unary()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expr, ConditionError> {
        match self.peek() {
            Token::Not => {
                self.advance();
                let inner = self.parse_unary()?;
                Ok(Expr::Not(Box::new(inner)))
            }
            Token::LParen => {
                self.advance();
                let inner = self.parse_or()?;
                match self.advance() {
                    Token::RParen => Ok(inner),
                    Token::Eof => Err(ConditionError::UnexpectedEnd {
                        expected: "')'".to_string(),
                    }),
                    other => Err(ConditionError::UnexpectedToken {
                        found: other.to_string(),
                        expected: "')'".to_string(),
                    }),
                }
            }
            _ => self.parse_primary(),
        }
    }

    fn parse_primary(&mut self) -> Result<Expr, ConditionError> {
        let word = match self.advance() {
            Token::Word(word) => word,
            Token::Eof => {
                return Err(ConditionError::UnexpectedEnd {
                    expected: "a word".to_string(),
                })
            }
            other => {
                return Err(ConditionError::UnexpectedToken {
                    found: other.to_string(),
                    expected: "a word".to_string(),
                })
            }
        };

        if let Some(flag) = word.as_bare() {
            if flag == "=~" {
                return Err(ConditionError::Unsupported {
                    feature: "regex match '=~'".to_string(),
                });
            }
            // `-n x` / `-z x`, unless the flag itself is an operand of a comparison
            if matches!(flag, "-n" | "-z") && matches!(self.peek(), Token::Word(_)) {
                let is_operand = compare_op(self.peek_at(1)).is_some();
                if !is_operand {
                    let flag = flag.to_string();
                    let Token::Word(operand) = self.advance() else {
                        unreachable!("peeked a word");
                    };
                    return Ok(if flag == "-n" {
                        Expr::NonEmpty(operand)
                    } else {
                        Expr::Empty(operand)
                    });
                }
            }
            if flag.len() == 2
                && flag.starts_with('-')
                && !matches!(flag, "-n" | "-z")
                && matches!(self.peek(), Token::Word(_))
            {
                return Err(ConditionError::Unsupported {
                    feature: format!("file test '{}'", flag),
                });
            }
        }

        match compare_op(self.peek()) {
            Some(op) => {
                self.advance();
                match self.advance() {
                    Token::Word(right) => Ok(Expr::Compare {
                        left: word,
                        op,
                        right,
                    }),
                    Token::Eof => Err(ConditionError::UnexpectedEnd {
                        expected: "right-hand operand".to_string(),
                    }),
                    other => Err(ConditionError::UnexpectedToken {
                        found: other.to_string(),
                        expected: "right-hand operand".to_string(),
                    }),
                }
            }
            None => match self.peek() {
                Token::Word(next) if next.as_bare() == Some("=~") => {
                    Err(ConditionError::Unsupported {
                        feature: "regex match '=~'".to_string(),
                    })
                }
                Token::Word(next) => Err(ConditionError::UnexpectedToken {
                    found: next.to_string(),
                    expected: "an operator".to_string(),
                }),
                _ => Ok(Expr::NonEmpty(word)),
            },
        }
    }
}

fn compare_op(token: &Token) -> Option<CompareOp> {
    match token {
        Token::Eq => Some(CompareOp::Match),
        Token::Ne => Some(CompareOp::NotMatch),
        Token::Lt => Some(CompareOp::Less),
        Token::Gt => Some(CompareOp::Greater),
        Token::NumEq => Some(CompareOp::NumEq),
        Token::NumNe => Some(CompareOp::NumNe),
        Token::NumLt => Some(CompareOp::NumLt),
        Token::NumLe => Some(CompareOp::NumLe),
        Token::NumGt => Some(CompareOp::NumGt),
        Token::NumGe => Some(CompareOp::NumGe),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(input: &str) -> Expr {
        Parser::new(input).unwrap().parse().unwrap()
    }

    #[test]
    fn test_parse_comparison() {
        let expr = parse("$A == b");
        assert!(matches!(
            expr,
            Expr::Compare {
                op: CompareOp::Match,
                ..
            }
        ));
    }

    #[test]
    fn test_parse_precedence() {
        // a || b && c  ==  a || (b && c)
        let expr = parse("$A == 1 || $B == 2 && $C == 3");
        let Expr::Or(_, right) = expr else {
            panic!("expected Or at the root");
        };
        assert!(matches!(*right, Expr::And(_, _)));
    }

    #[test]
    fn test_parse_grouping_and_not() {
        let expr = parse("! ( $A == 1 || $B == 2 )");
        let Expr::Not(inner) = expr else {
            panic!("expected Not");
        };
        assert!(matches!(*inner, Expr::Or(_, _)));
    }

    #[test]
    fn test_parse_unary_tests() {
        assert!(matches!(parse("-n $A"), Expr::NonEmpty(_)));
        assert!(matches!(parse("-z $A"), Expr::Empty(_)));
        assert!(matches!(parse("$A"), Expr::NonEmpty(_)));
        assert!(matches!(parse("-n == -n"), Expr::Compare { .. }));
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(
            Parser::new("").unwrap().parse(),
            Err(ConditionError::Empty)
        ));
        assert!(matches!(
            Parser::new("$A ==").unwrap().parse(),
            Err(ConditionError::UnexpectedEnd { .. })
        ));
        assert!(matches!(
            Parser::new("$A =~ ^x").unwrap().parse(),
            Err(ConditionError::Unsupported { .. })
        ));
        assert!(matches!(
            Parser::new("-f setup.py").unwrap().parse(),
            Err(ConditionError::Unsupported { .. })
        ));
        assert!(matches!(
            Parser::new("( $A == 1").unwrap().parse(),
            Err(ConditionError::UnexpectedEnd { .. })
        ));
    }

    #[test]
    fn test_collect_variables() {
        let expr = parse("$A == x && ( -n ${B} || \"$C\" != y )");
        let mut vars = Vec::new();
        expr.collect_variables(&mut vars);
        assert_eq!(vars, vec!["A", "B", "C"]);
    }
}
