//! Per-node resource usage reporting for Kubernetes clusters
//!
//! This crate provides the core functionality for:
//! - Kubernetes quantity arithmetic
//! - Label and field selector evaluation
//! - Fetching pod metrics, node metrics, node capacity and the pod roster
//! - Grouping pod usage by node and comparing it with node resources
//! - Sorting the per-node report for display

pub mod aggregate;
pub mod error;
pub mod fetch;
pub mod models;
pub mod observability;
pub mod pipeline;
pub mod quantity;
pub mod resolver;
pub mod selector;

pub use aggregate::{
    aggregate, assemble, container_rows, AggregateOptions, AggregateOutcome, ContainerRow,
};
pub use error::{FetchCause, FetchError, FetchSource, PreconditionError, TopError, ValidationError};
pub use fetch::{KubeMetricsSource, MetricsSource, NamespaceScope, ResourceQuery};
pub use models::*;
pub use observability::ReportLogger;
pub use pipeline::{
    run, DisplayOptions, SortBy, TopOptions, TopReport, ValidatedOptions, DEFAULT_NAMESPACE,
    DEFAULT_REQUEST_TIMEOUT,
};
pub use quantity::{Quantity, QuantityError, QuantityFormat};
pub use resolver::PodNodeBinding;
pub use selector::{FieldSelector, LabelSelector, SelectorKind, SelectorParseError, Selectors};
