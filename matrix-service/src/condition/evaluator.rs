// Condition Evaluator
// Evaluates parsed tests against one job's environment

use crate::condition::lexer::{Word, WordPart};
use crate::condition::parser::{CompareOp, Expr};

use std::collections::HashMap;

/// Evaluate an expression; unset variables expand to the empty string
pub fn evaluate(expr: &Expr, env: &HashMap<String, String>) -> bool {
    match expr {
        Expr::Compare { left, op, right } => compare(left, *op, right, env),
        Expr::NonEmpty(word) => !expand(word, env).is_empty(),
        Expr::Empty(word) => expand(word, env).is_empty(),
        Expr::Not(inner) => !evaluate(inner, env),
        Expr::And(a, b) => evaluate(a, env) && evaluate(b, env),
        Expr::Or(a, b) => evaluate(a, env) || evaluate(b, env),
    }
}

fn compare(left: &Word, op: CompareOp, right: &Word, env: &HashMap<String, String>) -> bool {
    let lhs = expand(left, env);
    match op {
        CompareOp::Match => glob_match(&pattern(right, env), &lhs),
        CompareOp::NotMatch => !glob_match(&pattern(right, env), &lhs),
        CompareOp::Less => lhs < expand(right, env),
        CompareOp::Greater => lhs > expand(right, env),
        _ => {
            // Non-integer operands make the test false
            let (Some(a), Some(b)) = (as_integer(&lhs), as_integer(&expand(right, env))) else {
                tracing::debug!(left = %lhs, "non-integer operand in numeric test");
                return false;
            };
            match op {
                CompareOp::NumEq => a == b,
                CompareOp::NumNe => a != b,
                CompareOp::NumLt => a < b,
                CompareOp::NumLe => a <= b,
                CompareOp::NumGt => a > b,
                CompareOp::NumGe => a >= b,
                _ => unreachable!("string operators handled above"),
            }
        }
    }
}

fn as_integer(text: &str) -> Option<i64> {
    let text = text.trim();
    if text.is_empty() {
        return Some(0);
    }
    text.parse().ok()
}

/// Expand a word to its string value
pub fn expand(word: &Word, env: &HashMap<String, String>) -> String {
    let mut out = String::new();
    for part in &word.parts {
        match part {
            WordPart::Literal { text, .. } => out.push_str(text),
            WordPart::Variable(name) => {
                if let Some(value) = env.get(name) {
                    out.push_str(value);
                }
            }
        }
    }
    out
}

/// Element of a glob pattern
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatternToken {
    Char(char),
    AnyChar,
    AnyString,
    /// `[...]` bracket expression
    Class(CharClass),
}

/// A bracket expression such as `[67]`, `[!x]`, `[a-z]` or `[[:digit:]]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CharClass {
    negated: bool,
    items: Vec<ClassItem>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ClassItem {
    /// Inclusive range; a single character is `Range(c, c)`
    Range(char, char),
    Named(NamedClass),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NamedClass {
    Alnum,
    Alpha,
    Digit,
    Lower,
    Upper,
    Space,
    Punct,
    Xdigit,
}

impl NamedClass {
    fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "alnum" => NamedClass::Alnum,
            "alpha" => NamedClass::Alpha,
            "digit" => NamedClass::Digit,
            "lower" => NamedClass::Lower,
            "upper" => NamedClass::Upper,
            "space" => NamedClass::Space,
            "punct" => NamedClass::Punct,
            "xdigit" => NamedClass::Xdigit,
            _ => return None,
        })
    }

    fn matches(self, c: char) -> bool {
        match self {
            NamedClass::Alnum => c.is_alphanumeric(),
            NamedClass::Alpha => c.is_alphabetic(),
            NamedClass::Digit => c.is_ascii_digit(),
            NamedClass::Lower => c.is_lowercase(),
            NamedClass::Upper => c.is_uppercase(),
            NamedClass::Space => c.is_whitespace(),
            NamedClass::Punct => c.is_ascii_punctuation(),
            NamedClass::Xdigit => c.is_ascii_hexdigit(),
        }
    }
}

impl CharClass {
    pub fn matches(&self, c: char) -> bool {
        let hit = self.items.iter().any(|item| match item {
            ClassItem::Range(lo, hi) => (*lo..=*hi).contains(&c),
            ClassItem::Named(named) => named.matches(c),
        });
        hit != self.negated
    }

    /// Parse the text following an opening `[`, returning the class and the
    /// number of characters consumed including the closing `]`.
    /// An unterminated bracket is not a class; the `[` is then literal.
    fn parse(chars: &[char]) -> Option<(Self, usize)> {
        let mut i = 0;
        let negated = matches!(chars.first(), Some('!' | '^'));
        if negated {
            i += 1;
        }
        let body_start = i;
        let mut items = Vec::new();

        while i < chars.len() {
            let c = chars[i];
            // A `]` right after the opening bracket is a member
            if c == ']' && i > body_start {
                return Some((Self { negated, items }, i + 1));
            }
            if c == '[' && chars.get(i + 1) == Some(&':') {
                let rest = &chars[i + 2..];
                let end = rest.windows(2).position(|w| *w == [':', ']'])?;
                let name: String = rest[..end].iter().collect();
                items.push(ClassItem::Named(NamedClass::from_name(&name)?));
                i += 2 + end + 2;
                continue;
            }
            match (chars.get(i + 1), chars.get(i + 2)) {
                (Some('-'), Some(&hi)) if hi != ']' => {
                    items.push(ClassItem::Range(c, hi));
                    i += 3;
                }
                _ => {
                    items.push(ClassItem::Range(c, c));
                    i += 1;
                }
            }
        }
        None
    }
}

/// Build a glob pattern from a word: unquoted `*`, `?` and `[...]` are
/// wildcards, quoted text and variable values match literally
pub fn pattern(word: &Word, env: &HashMap<String, String>) -> Vec<PatternToken> {
    let mut tokens = Vec::new();
    for part in &word.parts {
        match part {
            WordPart::Literal {
                text,
                quoted: false,
            } => push_glob(&mut tokens, text),
            WordPart::Literal { text, quoted: true } => {
                tokens.extend(text.chars().map(PatternToken::Char))
            }
            WordPart::Variable(name) => {
                if let Some(value) = env.get(name) {
                    tokens.extend(value.chars().map(PatternToken::Char));
                }
            }
        }
    }
    tokens
}

fn push_glob(tokens: &mut Vec<PatternToken>, text: &str) {
    let chars: Vec<char> = text.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        match chars[i] {
            '*' => tokens.push(PatternToken::AnyString),
            '?' => tokens.push(PatternToken::AnyChar),
            '[' => {
                if let Some((class, consumed)) = CharClass::parse(&chars[i + 1..]) {
                    tokens.push(PatternToken::Class(class));
                    i += 1 + consumed;
                    continue;
                }
                tokens.push(PatternToken::Char('['));
            }
            other => tokens.push(PatternToken::Char(other)),
        }
        i += 1;
    }
}

/// Match `text` against a glob pattern (whole-string match)
pub fn glob_match(pattern: &[PatternToken], text: &str) -> bool {
    let text: Vec<char> = text.chars().collect();
    let (mut p, mut t) = (0, 0);
    // Last `*` position and the text index it is currently absorbing up to
    let mut backtrack: Option<(usize, usize)> = None;

    while t < text.len() {
        match pattern.get(p) {
            Some(PatternToken::Char(c)) if *c == text[t] => {
                p += 1;
                t += 1;
            }
            Some(PatternToken::AnyChar) => {
                p += 1;
                t += 1;
            }
            Some(PatternToken::Class(class)) if class.matches(text[t]) => {
                p += 1;
                t += 1;
            }
            Some(PatternToken::AnyString) => {
                backtrack = Some((p, t));
                p += 1;
            }
            _ => match backtrack {
                Some((star, absorbed)) => {
                    p = star + 1;
                    t = absorbed + 1;
                    backtrack = Some((star, absorbed + 1));
                }
                None => return false,
            },
        }
    }

    pattern[p..]
        .iter()
        .all(|token| matches!(token, PatternToken::AnyString))
}
