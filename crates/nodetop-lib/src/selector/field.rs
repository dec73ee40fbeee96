//! Field selector parsing and matching
//!
//! Field selectors only know equality: `path=value`, `path==value` and
//! `path!=value`, comma separated. A backslash escapes `\`, `,` and `=` inside
//! values.

use std::fmt;
use std::str::FromStr;

use super::{SelectorKind, SelectorParseError};

/// Operator of a field requirement
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldOperator {
    Equals,
    NotEquals,
}

/// One comma-separated term of a field selector
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldRequirement {
    pub path: String,
    pub operator: FieldOperator,
    pub value: String,
}

impl FieldRequirement {
    fn matches(&self, actual: &str) -> bool {
        match self.operator {
            FieldOperator::Equals => actual == self.value,
            FieldOperator::NotEquals => actual != self.value,
        }
    }
}

impl fmt::Display for FieldRequirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let op = match self.operator {
            FieldOperator::Equals => "=",
            FieldOperator::NotEquals => "!=",
        };
        write!(f, "{}{}{}", self.path, op, escape_value(&self.value))
    }
}

/// A parsed field selector; empty selects everything
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldSelector {
    requirements: Vec<FieldRequirement>,
}

impl FieldSelector {
    pub fn everything() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.requirements.is_empty()
    }

    pub fn requirements(&self) -> &[FieldRequirement] {
        &self.requirements
    }

    /// Evaluate against the fields an object exposes
    ///
    /// `lookup` returns the value of a field path, or `None` when the caller
    /// cannot evaluate that path. Requirements on such paths are skipped.
    pub fn matches<'a, F>(&self, lookup: F) -> bool
    where
        F: Fn(&str) -> Option<&'a str>,
    {
        self.requirements.iter().all(|requirement| {
            lookup(&requirement.path).map_or(true, |actual| requirement.matches(actual))
        })
    }

    /// True when every requirement is on one of the given paths
    pub fn only_uses(&self, paths: &[&str]) -> bool {
        self.requirements
            .iter()
            .all(|requirement| paths.contains(&requirement.path.as_str()))
    }
}

impl fmt::Display for FieldSelector {
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

impl FromStr for FieldSelector {
    type Err = SelectorParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let error = |reason: String| SelectorParseError {
            kind: SelectorKind::Field,
            input: s.to_string(),
            reason,
        };

        if s.trim().is_empty() {
            return Ok(Self::everything());
        }

        let requirements = split_terms(s)
            .into_iter()
            .map(|term| parse_term(term).map_err(&error))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { requirements })
    }
}

/// Split on commas that are not escaped
fn split_terms(input: &str) -> Vec<&str> {
    let mut terms = Vec::new();
    let mut start = 0;
    let mut escaped = false;
    for (i, c) in input.char_indices() {
        match c {
            _ if escaped => escaped = false,
            '\\' => escaped = true,
            ',' => {
                terms.push(&input[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    terms.push(&input[start..]);
    terms
}

fn parse_term(term: &str) -> Result<FieldRequirement, String> {
    // the operator is the first unescaped '!=', '==' or '='
    let mut escaped = false;
    for (i, c) in term.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        let (operator, op_len) = match c {
            '\\' => {
                escaped = true;
                continue;
            }
            '!' if term[i..].starts_with("!=") => (FieldOperator::NotEquals, 2),
            '=' if term[i..].starts_with("==") => (FieldOperator::Equals, 2),
            '=' => (FieldOperator::Equals, 1),
            _ => continue,
        };

        let path = term[..i].trim();
        if path.is_empty() {
            return Err(format!("field path missing in {:?}", term));
        }
        let value = unescape_value(term[i + op_len..].trim())?;
        return Ok(FieldRequirement {
            path: path.to_string(),
            operator,
            value,
        });
    }
    Err(format!("invalid selector term {:?}: no operator", term))
}

fn unescape_value(raw: &str) -> Result<String, String> {
    let mut value = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            value.push(c);
            continue;
        }
        match chars.next() {
            Some(escaped @ ('\\' | ',' | '=')) => value.push(escaped),
            Some(other) => return Err(format!("invalid escape sequence \\{} in {:?}", other, raw)),
            None => return Err(format!("dangling escape at end of {:?}", raw)),
        }
    }
    Ok(value)
}

fn escape_value(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '\\' | ',' | '=') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(s: &str) -> FieldSelector {
        s.parse().unwrap()
    }

    fn node_fields(name: &'static str) -> impl Fn(&str) -> Option<&'static str> {
        move |path: &str| match path {
            "metadata.name" => Some(name),
            _ => None,
        }
    }

    #[test]
    fn test_empty_selector_matches_everything() {
        assert!(parse("").is_empty());
        assert!(parse("").matches(node_fields("n1")));
    }

    #[test]
    fn test_operators() {
        assert!(parse("metadata.name=n1").matches(node_fields("n1")));
        assert!(parse("metadata.name==n1").matches(node_fields("n1")));
        assert!(!parse("metadata.name=n1").matches(node_fields("n2")));
        assert!(parse("metadata.name!=n1").matches(node_fields("n2")));
        assert!(!parse("metadata.name!=n1,metadata.name!=n2").matches(node_fields("n2")));
    }

    #[test]
    fn test_unknown_paths_are_skipped() {
        let selector = parse("spec.unschedulable=true,metadata.name=n1");
        assert!(selector.matches(node_fields("n1")));
        assert!(!selector.matches(node_fields("n2")));
        assert!(!selector.only_uses(&["metadata.name"]));
        assert!(parse("metadata.name=n1").only_uses(&["metadata.name"]));
    }

    #[test]
    fn test_escaped_values() {
        let selector = parse(r"metadata.annotation=a\,b\=c\\d,metadata.name=n1");
        assert_eq!(selector.requirements().len(), 2);
        assert_eq!(selector.requirements()[0].value, r"a,b=c\d");
        assert_eq!(
            selector.to_string(),
            r"metadata.annotation=a\,b\=c\\d,metadata.name=n1"
        );
    }

    #[test]
    fn test_empty_value_allowed() {
        let selector = parse("spec.nodeName=");
        assert_eq!(selector.requirements()[0].value, "");
    }

    #[test]
    fn test_malformed_selectors() {
        for input in ["metadata.name", "=n1", "a=b,", r"a=b\x", r"a=b\"] {
            assert!(
                input.parse::<FieldSelector>().is_err(),
                "{:?} should not parse",
                input
            );
        }
    }
}
