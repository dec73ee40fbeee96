//! Label selector parsing and matching
//!
//! Supports the full `kubectl -l` grammar: equality (`=`, `==`, `!=`),
//! set membership (`in`, `notin`), existence (`key`, `!key`) and the integer
//! comparisons `>` and `<`.

use std::collections::BTreeMap;
use std::fmt;
use std::iter::Peekable;
use std::str::{CharIndices, FromStr};

use super::{SelectorKind, SelectorParseError};

const MAX_NAME_LEN: usize = 63;
const MAX_PREFIX_LEN: usize = 253;

/// Operator of a single label requirement
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LabelOperator {
    Exists,
    DoesNotExist,
    Equals,
    NotEquals,
    In,
    NotIn,
    GreaterThan,
    LessThan,
}

/// One comma-separated term of a label selector
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelRequirement {
    pub key: String,
    pub operator: LabelOperator,
    pub values: Vec<String>,
}

impl LabelRequirement {
    /// Evaluate the requirement against an object's labels
    pub fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        let value = labels.get(&self.key);
        match self.operator {
            LabelOperator::Exists => value.is_some(),
            LabelOperator::DoesNotExist => value.is_none(),
            LabelOperator::Equals | LabelOperator::In => {
                value.map_or(false, |v| self.values.iter().any(|candidate| candidate == v))
            }
            LabelOperator::NotEquals | LabelOperator::NotIn => {
                value.map_or(true, |v| self.values.iter().all(|candidate| candidate != v))
            }
            LabelOperator::GreaterThan | LabelOperator::LessThan => {
                let (Some(actual), Some(bound)) = (
                    value.and_then(|v| v.parse::<i64>().ok()),
                    self.values.first().and_then(|v| v.parse::<i64>().ok()),
                ) else {
                    return false;
                };
                if self.operator == LabelOperator::GreaterThan {
                    actual > bound
                } else {
                    actual < bound
                }
            }
        }
    }
}

impl fmt::Display for LabelRequirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let first = self.values.first().map(String::as_str).unwrap_or("");
        match self.operator {
            LabelOperator::Exists => write!(f, "{}", self.key),
            LabelOperator::DoesNotExist => write!(f, "!{}", self.key),
            LabelOperator::Equals => write!(f, "{}={}", self.key, first),
            LabelOperator::NotEquals => write!(f, "{}!={}", self.key, first),
            LabelOperator::In => write!(f, "{} in ({})", self.key, self.values.join(",")),
            LabelOperator::NotIn => write!(f, "{} notin ({})", self.key, self.values.join(",")),
            LabelOperator::GreaterThan => write!(f, "{}>{}", self.key, first),
            LabelOperator::LessThan => write!(f, "{}<{}", self.key, first),
        }
    }
}

/// A parsed label selector; empty selects everything
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelSelector {
    requirements: Vec<LabelRequirement>,
}

impl LabelSelector {
    pub fn everything() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.requirements.is_empty()
    }

    pub fn requirements(&self) -> &[LabelRequirement] {
        &self.requirements
    }

    /// True when every requirement matches
    pub fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        self.requirements.iter().all(|r| r.matches(labels))
    }
}

impl fmt::Display for LabelSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, requirement) in self.requirements.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{}", requirement)?;
        }
        Ok(())
    }
}

impl FromStr for LabelSelector {
    type Err = SelectorParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Parser::new(s)
            .parse()
            .map(|requirements| LabelSelector { requirements })
            .map_err(|reason| SelectorParseError {
                kind: SelectorKind::Label,
                input: s.to_string(),
                reason,
            })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Identifier(String),
    Comma,
    OpenParen,
    CloseParen,
    Bang,
    Equals,
    DoubleEquals,
    NotEquals,
    GreaterThan,
    LessThan,
}

impl Token {
    fn describe(token: Option<&Token>) -> String {
        match token {
            None => "end of string".to_string(),
            Some(Token::Identifier(id)) => format!("identifier {:?}", id),
            Some(Token::Comma) => "','".to_string(),
            Some(Token::OpenParen) => "'('".to_string(),
            Some(Token::CloseParen) => "')'".to_string(),
            Some(Token::Bang) => "'!'".to_string(),
            Some(Token::Equals) => "'='".to_string(),
            Some(Token::DoubleEquals) => "'=='".to_string(),
            Some(Token::NotEquals) => "'!='".to_string(),
            Some(Token::GreaterThan) => "'>'".to_string(),
            Some(Token::LessThan) => "'<'".to_string(),
        }
    }
}

fn is_special(c: char) -> bool {
    matches!(c, ',' | '(' | ')' | '!' | '=' | '<' | '>') || c.is_whitespace()
}

fn tokenize(input: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut chars: Peekable<CharIndices<'_>> = input.char_indices().peekable();

    while let Some((start, c)) = chars.next() {
        let token = match c {
            c if c.is_whitespace() => continue,
            ',' => Token::Comma,
            '(' => Token::OpenParen,
            ')' => Token::CloseParen,
            '<' => Token::LessThan,
            '>' => Token::GreaterThan,
            '!' if chars.next_if(|&(_, n)| n == '=').is_some() => Token::NotEquals,
            '!' => Token::Bang,
            '=' if chars.next_if(|&(_, n)| n == '=').is_some() => Token::DoubleEquals,
            '=' => Token::Equals,
            _ => {
                let mut end = start + c.len_utf8();
                while let Some(&(i, n)) = chars.peek() {
                    if is_special(n) {
                        break;
                    }
                    end = i + n.len_utf8();
                    chars.next();
                }
                Token::Identifier(input[start..end].to_string())
            }
        };
        tokens.push(token);
    }
    tokens
}

struct Parser {
    tokens: Vec<Token>,
    position: usize,
}

impl Parser {
    fn new(input: &str) -> Self {
        Self {
            tokens: tokenize(input),
            position: 0,
        }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.position)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.position).cloned();
        self.position += 1;
        token
    }

    fn parse(mut self) -> Result<Vec<LabelRequirement>, String> {
        let mut requirements = Vec::new();
        if self.tokens.is_empty() {
            return Ok(requirements);
        }

        loop {
            requirements.push(self.requirement()?);
            match self.next() {
                None => return Ok(requirements),
                Some(Token::Comma) => continue,
                other => {
                    return Err(format!(
                        "found {}, expected ',' or end of string",
                        Token::describe(other.as_ref())
                    ))
                }
            }
        }
    }

    fn requirement(&mut self) -> Result<LabelRequirement, String> {
        let negated = self.peek() == Some(&Token::Bang);
        if negated {
            self.next();
        }

        let key = match self.next() {
            Some(Token::Identifier(key)) => key,
            other => {
                return Err(format!(
                    "found {}, expected '!' or identifier",
                    Token::describe(other.as_ref())
                ))
            }
        };
        validate_key(&key)?;

        if negated {
            return Ok(LabelRequirement {
                key,
                operator: LabelOperator::DoesNotExist,
                values: Vec::new(),
            });
        }

        let operator = match self.peek() {
            None | Some(Token::Comma) => {
                return Ok(LabelRequirement {
                    key,
                    operator: LabelOperator::Exists,
                    values: Vec::new(),
                })
            }
            Some(Token::Equals) | Some(Token::DoubleEquals) => LabelOperator::Equals,
            Some(Token::NotEquals) => LabelOperator::NotEquals,
            Some(Token::GreaterThan) => LabelOperator::GreaterThan,
            Some(Token::LessThan) => LabelOperator::LessThan,
            Some(Token::Identifier(word)) if word == "in" => LabelOperator::In,
            Some(Token::Identifier(word)) if word == "notin" => LabelOperator::NotIn,
            other => {
                return Err(format!(
                    "found {}, expected one of '=', '==', '!=', 'in', 'notin', '>', '<'",
                    Token::describe(other)
                ))
            }
        };
        self.next();

        let values = match operator {
            LabelOperator::In | LabelOperator::NotIn => self.value_set()?,
            LabelOperator::GreaterThan | LabelOperator::LessThan => {
                let value = self.single_value()?;
                if value.parse::<i64>().is_err() {
                    return Err(format!(
                        "for '>' and '<' operators the value must be an integer, found {:?}",
                        value
                    ));
                }
                vec![value]
            }
            _ => vec![self.single_value()?],
        };
        for value in &values {
            validate_value(value)?;
        }

        Ok(LabelRequirement {
            key,
            operator,
            values,
        })
    }

    fn single_value(&mut self) -> Result<String, String> {
        match self.peek().cloned() {
            None | Some(Token::Comma) => Ok(String::new()),
            Some(Token::Identifier(value)) => {
                self.position += 1;
                Ok(value)
            }
            other => Err(format!(
                "found {}, expected identifier",
                Token::describe(other.as_ref())
            )),
        }
    }

    fn value_set(&mut self) -> Result<Vec<String>, String> {
        match self.next() {
            Some(Token::OpenParen) => {}
            other => {
                return Err(format!(
                    "found {}, expected '('",
                    Token::describe(other.as_ref())
                ))
            }
        }

        let mut values = Vec::new();
        loop {
            let value = match self.peek().cloned() {
                Some(Token::Identifier(value)) => {
                    self.position += 1;
                    value
                }
                Some(Token::Comma) | Some(Token::CloseParen) => String::new(),
                other => {
                    return Err(format!(
                        "found {}, expected identifier or ')'",
                        Token::describe(other.as_ref())
                    ))
                }
            };
            values.push(value);

            match self.next() {
                Some(Token::Comma) => continue,
                Some(Token::CloseParen) => return Ok(values),
                other => {
                    return Err(format!(
                        "found {}, expected ',' or ')'",
                        Token::describe(other.as_ref())
                    ))
                }
            }
        }
    }
}

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')
}

fn is_qualified_name(name: &str) -> bool {
    let starts_and_ends_alnum = name
        .chars()
        .next()
        .zip(name.chars().last())
        .map_or(false, |(first, last)| {
            first.is_ascii_alphanumeric() && last.is_ascii_alphanumeric()
        });
    name.len() <= MAX_NAME_LEN && starts_and_ends_alnum && name.chars().all(is_name_char)
}

fn is_dns_subdomain(prefix: &str) -> bool {
    prefix.len() <= MAX_PREFIX_LEN
        && prefix.split('.').all(|part| {
            !part.is_empty()
                && part
                    .chars()
                    .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
                && !part.starts_with('-')
                && !part.ends_with('-')
        })
}

fn validate_key(key: &str) -> Result<(), String> {
    let (prefix, name) = match key.split_once('/') {
        Some((prefix, name)) => (Some(prefix), name),
        None => (None, key),
    };
    if let Some(prefix) = prefix {
        if !is_dns_subdomain(prefix) {
            return Err(format!("invalid label key {:?}: prefix must be a DNS subdomain", key));
        }
    }
    if !is_qualified_name(name) {
        return Err(format!(
            "invalid label key {:?}: name must be at most 63 alphanumeric characters, '-', '_' or '.', starting and ending with an alphanumeric character",
            key
        ));
    }
    Ok(())
}

fn validate_value(value: &str) -> Result<(), String> {
    if value.is_empty() || is_qualified_name(value) {
        Ok(())
    } else {
        Err(format!(
            "invalid label value {:?}: must be empty or at most 63 alphanumeric characters, '-', '_' or '.', starting and ending with an alphanumeric character",
            value
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn parse(s: &str) -> LabelSelector {
        s.parse().unwrap()
    }

    #[test]
    fn test_empty_selector_matches_everything() {
        let selector = parse("");
        assert!(selector.is_empty());
        assert!(selector.matches(&labels(&[])));
        assert!(selector.matches(&labels(&[("a", "b")])));
        assert!(parse("   ").is_empty());
    }

    #[test]
    fn test_equality_operators() {
        let node = labels(&[("role", "worker"), ("zone", "a")]);
        assert!(parse("role=worker").matches(&node));
        assert!(parse("role==worker").matches(&node));
        assert!(!parse("role=master").matches(&node));
        assert!(parse("role!=master").matches(&node));
        // a missing key satisfies '!='
        assert!(parse("gpu!=true").matches(&node));
        assert!(parse("role=worker,zone=a").matches(&node));
        assert!(!parse("role=worker,zone=b").matches(&node));
    }

    #[test]
    fn test_set_operators() {
        let node = labels(&[("zone", "eu-1")]);
        assert!(parse("zone in (eu-1, eu-2)").matches(&node));
        assert!(!parse("zone notin (eu-1,eu-2)").matches(&node));
        assert!(parse("tier notin (frontend)").matches(&node));
        assert!(!parse("tier in (frontend)").matches(&node));
    }

    #[test]
    fn test_existence_operators() {
        let node = labels(&[("node-role.kubernetes.io/control-plane", "")]);
        assert!(parse("node-role.kubernetes.io/control-plane").matches(&node));
        assert!(!parse("!node-role.kubernetes.io/control-plane").matches(&node));
        assert!(parse("!gpu").matches(&node));
    }

    #[test]
    fn test_integer_comparisons() {
        let node = labels(&[("cores", "16")]);
        assert!(parse("cores>8").matches(&node));
        assert!(!parse("cores<8").matches(&node));
        assert!(!parse("missing>1").matches(&node));
        assert!("cores>eight".parse::<LabelSelector>().is_err());
    }

    #[test]
    fn test_empty_value() {
        let node = labels(&[("flag", "")]);
        assert!(parse("flag=").matches(&node));
        assert!(parse("flag=,other!=x").matches(&node));
    }

    #[test]
    fn test_canonical_rendering() {
        assert_eq!(parse("a==b").to_string(), "a=b");
        assert_eq!(parse("a in ( x , y )").to_string(), "a in (x,y)");
        assert_eq!(parse(" !a , b ").to_string(), "!a,b");
        assert_eq!(parse("a notin (x)").to_string(), "a notin (x)");
        assert_eq!(parse("a>3").to_string(), "a>3");
    }

    #[test]
    fn test_malformed_selectors() {
        for input in [
            "a in b",
            "a in (b",
            "=b",
            "a=b,",
            "a=b c",
            "a b",
            "-bad=x",
            "Upper.Case/key=x",
            "a=(b)",
            "a=-x-",
        ] {
            assert!(
                input.parse::<LabelSelector>().is_err(),
                "{:?} should not parse",
                input
            );
        }
    }

    #[test]
    fn test_key_validation_limits() {
        let long = "a".repeat(64);
        assert!(format!("{}=x", long).parse::<LabelSelector>().is_err());
        let ok = "a".repeat(63);
        assert!(format!("{}=x", ok).parse::<LabelSelector>().is_ok());
        assert!("example.com/app=web".parse::<LabelSelector>().is_ok());
    }
}
