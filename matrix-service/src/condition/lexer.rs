// Condition Lexer
// Tokenizes the inside of a `[[ ... ]]` shell test into words and operators

use crate::condition::ConditionError;

use std::fmt;

/// One piece of a shell word
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WordPart {
    /// Literal text; quoted text never acts as a glob
    Literal { text: String, quoted: bool },
    /// `$NAME` or `${NAME}`
    Variable(String),
}

/// A shell word made of literal and variable parts
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Word {
    pub parts: Vec<WordPart>,
}

impl Word {
    /// The word's text if it is a single unquoted literal
    pub fn as_bare(&self) -> Option<&str> {
        match self.parts.as_slice() {
            [WordPart::Literal {
                text,
                quoted: false,
            }] => Some(text),
            _ => None,
        }
    }

    /// Variables referenced by this word
    pub fn variables(&self) -> impl Iterator<Item = &str> {
        self.parts.iter().filter_map(|part| match part {
            WordPart::Variable(name) => Some(name.as_str()),
            WordPart::Literal { .. } => None,
        })
    }

    fn push_literal(&mut self, c: char, quoted: bool) {
        if let Some(WordPart::Literal { text, quoted: q }) = self.parts.last_mut() {
            if *q == quoted {
                text.push(c);
                return;
            }
        }
        self.parts.push(WordPart::Literal {
            text: c.to_string(),
            quoted,
        });
    }

    /// Quoted empty strings (`""`) still produce a word
    fn push_empty_quoted(&mut self) {
        self.parts.push(WordPart::Literal {
            text: String::new(),
            quoted: true,
        });
    }
}

impl fmt::Display for Word {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for part in &self.parts {
            match part {
                WordPart::Literal { text, quoted: true } => write!(f, "\"{}\"", text)?,
                WordPart::Literal {
                    text,
                    quoted: false,
                } => write!(f, "{}", text)?,
                WordPart::Variable(name) => write!(f, "${{{}}}", name)?,
            }
        }
        Ok(())
    }
}

/// Token types inside `[[ ... ]]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    Word(Word),

    // Operators
    Eq,    // == or =
    Ne,    // !=
    Lt,    // <
    Gt,    // >
    NumEq, // -eq
    NumNe, // -ne
    NumLt, // -lt
    NumLe, // -le
    NumGt, // -gt
    NumGe, // -ge
    And,   // &&
    Or,    // ||
    Not,   // !

    // Delimiters
    LParen, // (
    RParen, // )

    // End of input
    Eof,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Word(word) => write!(f, "{}", word),
            Token::Eq => write!(f, "=="),
            Token::Ne => write!(f, "!="),
            Token::Lt => write!(f, "<"),
            Token::Gt => write!(f, ">"),
            Token::NumEq => write!(f, "-eq"),
            Token::NumNe => write!(f, "-ne"),
            Token::NumLt => write!(f, "-lt"),
            Token::NumLe => write!(f, "-le"),
            Token::NumGt => write!(f, "-gt"),
            Token::NumGe => write!(f, "-ge"),
            Token::And => write!(f, "&&"),
            Token::Or => write!(f, "||"),
            Token::Not => write!(f, "!"),
            Token::LParen => write!(f, "("),
            Token::RParen => write!(f, ")"),
            Token::Eof => write!(f, "end of condition"),
        }
    }
}

/// Lexer for shell test expressions
pub struct Lexer<'a> {
    chars: std::iter::Peekable<std::str::CharIndices<'a>>,
    position: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str) -> Self {
        Self {
            chars: input.char_indices().peekable(),
            position: 0,
        }
    }

    /// Tokenize the whole input
    pub fn tokenize(mut self) -> Result<Vec<Token>, ConditionError> {
        let mut tokens = Vec::new();
        loop {
            let token = self.next_token()?;
            let done = token == Token::Eof;
            tokens.push(token);
            if done {
                return Ok(tokens);
            }
        }
    }

    fn peek(&mut self) -> Option<char> {
        self.chars.peek().map(|&(_, c)| c)
    }

    fn advance(&mut self) -> Option<char> {
        self.chars.next().map(|(pos, c)| {
            self.position = pos + c.len_utf8();
            c
        })
    }

    fn error(&self, message: impl Into<String>) -> ConditionError {
        ConditionError::Lex {
            message: message.into(),
            position: self.position,
        }
    }

    fn next_token(&mut self) -> Result<Token, ConditionError> {
        while self.peek().is_some_and(char::is_whitespace) {
            self.advance();
        }

        let Some(c) = self.peek() else {
            return Ok(Token::Eof);
        };

        match c {
            '(' => {
                self.advance();
                Ok(Token::LParen)
            }
            ')' => {
                self.advance();
                Ok(Token::RParen)
            }
            '&' => {
                self.advance();
                if self.advance() == Some('&') {
                    Ok(Token::And)
                } else {
                    Err(self.error("expected '&&'"))
                }
            }
            '|' => {
                self.advance();
                if self.advance() == Some('|') {
                    Ok(Token::Or)
                } else {
                    Err(self.error("expected '||'"))
                }
            }
            _ => {
                let word = self.read_word()?;
                Ok(classify(word))
            }
        }
    }

    fn read_word(&mut self) -> Result<Word, ConditionError> {
        let mut word = Word::default();

        while let Some(c) = self.peek() {
            if c.is_whitespace() || matches!(c, '(' | ')' | '&' | '|') {
                break;
            }
            self.advance();
            match c {
                '\'' => {
                    let mut empty = true;
                    loop {
                        match self.advance() {
                            Some('\'') => break,
                            Some(ch) => {
                                empty = false;
                                word.push_literal(ch, true);
                            }
                            None => return Err(self.error("unterminated single quote")),
                        }
                    }
                    if empty {
                        word.push_empty_quoted();
                    }
                }
                '"' => {
                    let mut empty = true;
                    loop {
                        match self.advance() {
                            Some('"') => break,
                            Some('\\') => match self.advance() {
                                Some(ch @ ('"' | '\\' | '$' | '`')) => {
                                    empty = false;
                                    word.push_literal(ch, true);
                                }
                                Some(ch) => {
                                    empty = false;
                                    word.push_literal('\\', true);
                                    word.push_literal(ch, true);
                                }
                                None => return Err(self.error("unterminated double quote")),
                            },
                            Some('$') => {
                                empty = false;
                                self.read_variable(&mut word, true)?;
                            }
                            Some('`') => {
                                return Err(ConditionError::Unsupported {
                                    feature: "command substitution".to_string(),
                                })
                            }
                            Some(ch) => {
                                empty = false;
                                word.push_literal(ch, true);
                            }
                            None => return Err(self.error("unterminated double quote")),
                        }
                    }
                    if empty {
                        word.push_empty_quoted();
                    }
                }
                '\\' => match self.advance() {
                    Some(ch) => word.push_literal(ch, true),
                    None => return Err(self.error("trailing backslash")),
                },
                '$' => self.read_variable(&mut word, false)?,
                '`' => {
                    return Err(ConditionError::Unsupported {
                        feature: "command substitution".to_string(),
                    })
                }
                _ => word.push_literal(c, false),
            }
        }

        Ok(word)
    }

    fn read_variable(&mut self, word: &mut Word, quoted: bool) -> Result<(), ConditionError> {
        let mut name = String::new();

        match self.peek() {
            Some('{') => {
                self.advance();
                loop {
                    match self.advance() {
                        Some('}') => break,
                        Some(ch) if ch.is_ascii_alphanumeric() || ch == '_' => name.push(ch),
                        Some(_) => {
                            return Err(ConditionError::Unsupported {
                                feature: "parameter expansion operators".to_string(),
                            })
                        }
                        None => return Err(self.error("unterminated '${'")),
                    }
                }
                if name.is_empty() {
                    return Err(self.error("empty variable name"));
                }
            }
            Some('(') => {
                return Err(ConditionError::Unsupported {
                    feature: "command substitution".to_string(),
                })
            }
            _ => {
                while let Some(ch) = self.peek() {
                    let valid = if name.is_empty() {
                        ch.is_ascii_alphabetic() || ch == '_'
                    } else {
                        ch.is_ascii_alphanumeric() || ch == '_'
                    };
                    if !valid {
                        break;
                    }
                    name.push(ch);
                    self.advance();
                }
                if name.is_empty() {
                    word.push_literal('$', quoted);
                    return Ok(());
                }
            }
        }

        word.parts.push(WordPart::Variable(name));
        Ok(())
    }
}

/// Turn bare operator words into operator tokens
fn classify(word: Word) -> Token {
    match word.as_bare() {
        Some("==") | Some("=") => Token::Eq,
        Some("!=") => Token::Ne,
        Some("<") => Token::Lt,
        Some(">") => Token::Gt,
        Some("!") => Token::Not,
        Some("-eq") => Token::NumEq,
        Some("-ne") => Token::NumNe,
        Some("-lt") => Token::NumLt,
        Some("-le") => Token::NumLe,
        Some("-gt") => Token::NumGt,
        Some("-ge") => Token::NumGe,
        _ => Token::Word(word),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lex(input: &str) -> Vec<Token> {
        Lexer::new(input).tokenize().unwrap()
    }

    fn bare(text: &str) -> Token {
        Token::Word(Word {
            parts: vec![WordPart::Literal {
                text: text.to_string(),
                quoted: false,
            }],
        })
    }

    #[test]
    fn test_lex_comparison() {
        let tokens = lex("$SETUP_CMD == build_sphinx*");
        assert_eq!(
            tokens,
            vec![
                Token::Word(Word {
                    parts: vec![WordPart::Variable("SETUP_CMD".to_string())]
                }),
                Token::Eq,
                bare("build_sphinx*"),
                Token::Eof,
            ]
        );
    }

    #[test]
    fn test_lex_logical_operators_without_spaces() {
        let tokens = lex("(a==b)&&!c||d");
        assert_eq!(tokens[0], Token::LParen);
        assert_eq!(tokens[2], Token::RParen);
        assert_eq!(tokens[3], Token::And);
        assert_eq!(tokens[5], Token::Or);
    }

    #[test]
    fn test_lex_quoted_parts() {
        let tokens = lex(r#""${A}-x"'*'"#);
        let Token::Word(word) = &tokens[0] else {
            panic!("expected a word");
        };
        assert_eq!(
            word.parts,
            vec![
                WordPart::Variable("A".to_string()),
                WordPart::Literal {
                    text: "-x*".to_string(),
                    quoted: true
                },
            ]
        );
    }

    #[test]
    fn test_lex_empty_quotes_make_a_word() {
        let tokens = lex(r#"$A == """#);
        assert_eq!(tokens.len(), 4);
        assert!(matches!(&tokens[2], Token::Word(w) if w.parts.len() == 1));
    }

    #[test]
    fn test_lex_quoted_operator_is_a_word() {
        let tokens = lex(r#"a "==" b"#);
        assert!(matches!(tokens[1], Token::Word(_)));
    }

    #[test]
    fn test_lex_numeric_operators() {
        let tokens = lex("$N -ge 3");
        assert_eq!(tokens[1], Token::NumGe);
    }

    #[test]
    fn test_lex_rejects_command_substitution() {
        assert!(matches!(
            Lexer::new("$(uname) == Linux").tokenize(),
            Err(ConditionError::Unsupported { .. })
        ));
    }

    #[test]
    fn test_lex_unterminated_quote() {
        assert!(matches!(
            Lexer::new("$A == 'x").tokenize(),
            Err(ConditionError::Lex { .. })
        ));
    }
}
