//! Error types for report generation
//!
//! Every run ends either with a complete report or with exactly one of these
//! errors; there is no partial result.

use std::fmt;
use std::time::Duration;
use thiserror::Error;

use crate::quantity::QuantityError;
use crate::selector::SelectorParseError;

/// Usage errors detected before any request is sent
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("--sort-by accepts only cpu or memory, got {0:?}")]
    UnsupportedSortKey(String),

    #[error("only one of NAME or selector can be provided")]
    NameWithSelector,

    #[error(transparent)]
    Selector(#[from] SelectorParseError),
}

/// Cluster preconditions checked before fetching data
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PreconditionError {
    #[error("metrics API not available")]
    MetricsApiUnavailable,
}

/// Which data source a fetch error came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchSource {
    /// API group discovery for the metrics API
    Discovery,
    PodMetrics,
    NodeMetrics,
    NodeCapacity,
    PodRoster,
}

impl fmt::Display for FetchSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FetchSource::Discovery => "API groups",
            FetchSource::PodMetrics => "pod metrics",
            FetchSource::NodeMetrics => "node metrics",
            FetchSource::NodeCapacity => "node resources",
            FetchSource::PodRoster => "pod list",
        };
        f.write_str(name)
    }
}

/// Underlying reason of a failed fetch, kept unmodified
#[derive(Debug, Error)]
pub enum FetchCause {
    #[error(transparent)]
    Api(#[from] kube::Error),

    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("invalid quantity in {object}")]
    Quantity {
        object: String,
        #[source]
        source: QuantityError,
    },
}

/// A failed read from one of the data sources
#[derive(Debug, Error)]
#[error("failed to fetch {source_kind}")]
pub struct FetchError {
    pub source_kind: FetchSource,
    #[source]
    pub cause: FetchCause,
}

impl FetchError {
    pub fn new(source_kind: FetchSource, cause: impl Into<FetchCause>) -> Self {
        Self {
            source_kind,
            cause: cause.into(),
        }
    }

    pub fn timeout(source_kind: FetchSource, after: Duration) -> Self {
        Self::new(source_kind, FetchCause::Timeout(after))
    }

    pub fn quantity(source_kind: FetchSource, object: impl fmt::Display, source: QuantityError) -> Self {
        Self::new(
            source_kind,
            FetchCause::Quantity {
                object: object.to_string(),
                source,
            },
        )
    }
}

/// Terminal error of a report run
#[derive(Debug, Error)]
pub enum TopError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Precondition(#[from] PreconditionError),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("failed to sum resource usage")]
    Quantity(#[from] QuantityError),
}

impl From<SelectorParseError> for TopError {
    fn from(err: SelectorParseError) -> Self {
        TopError::Validation(ValidationError::Selector(err))
    }
}
