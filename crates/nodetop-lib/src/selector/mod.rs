//! Label and field selectors
//!
//! Parses the selector strings accepted by `kubectl` into matcher objects.
//! The matchers render back to the canonical query string for list calls and
//! can also be evaluated locally, which the metrics fetchers use for filter
//! dimensions the metrics API does not apply server-side.

mod field;
mod label;

pub use field::{FieldOperator, FieldRequirement, FieldSelector};
pub use label::{LabelOperator, LabelRequirement, LabelSelector};

use thiserror::Error;

/// A selector string that could not be parsed
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unable to parse {kind} selector {input:?}: {reason}")]
pub struct SelectorParseError {
    pub kind: SelectorKind,
    pub input: String,
    pub reason: String,
}

/// Which selector grammar failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectorKind {
    Label,
    Field,
}

impl std::fmt::Display for SelectorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SelectorKind::Label => f.write_str("label"),
            SelectorKind::Field => f.write_str("field"),
        }
    }
}

/// Parsed label and field selectors of one invocation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selectors {
    pub labels: LabelSelector,
    pub fields: FieldSelector,
}

impl Selectors {
    /// Parse both selectors; empty strings select everything
    pub fn parse(label_selector: &str, field_selector: &str) -> Result<Self, SelectorParseError> {
        Ok(Self {
            labels: label_selector.parse()?,
            fields: field_selector.parse()?,
        })
    }

    /// Selectors that match every object
    pub fn everything() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty() && self.fields.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_selectors_match_everything() {
        let selectors = Selectors::parse("", "").unwrap();
        assert!(selectors.is_empty());
        assert_eq!(selectors, Selectors::everything());
    }

    #[test]
    fn test_parse_both() {
        let selectors = Selectors::parse("role=worker", "metadata.name!=n1").unwrap();
        assert!(!selectors.is_empty());
        assert_eq!(selectors.labels.to_string(), "role=worker");
        assert_eq!(selectors.fields.to_string(), "metadata.name!=n1");
    }

    #[test]
    fn test_parse_error_names_the_selector() {
        let err = Selectors::parse("role in worker", "").unwrap_err();
        assert_eq!(err.kind, SelectorKind::Label);
        assert_eq!(err.input, "role in worker");
        assert!(err.to_string().starts_with("unable to parse label selector"));

        let err = Selectors::parse("", "metadata.name").unwrap_err();
        assert_eq!(err.kind, SelectorKind::Field);
    }
}
