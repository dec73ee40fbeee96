//! Data sources for the report
//!
//! The pipeline reads four independent datasets through [`MetricsSource`]:
//! pod metrics, node metrics, node capacity and the pod roster. The
//! [`KubeMetricsSource`] implementation talks to the API server; tests use
//! in-memory sources.
//!
//! Filter support differs per fetcher:
//!
//! | fetcher        | label selector | field selector |
//! |----------------|----------------|----------------|
//! | node capacity  | server-side    | server-side    |
//! | node metrics   | server-side    | `metadata.name` evaluated locally, other paths ignored |
//! | pod metrics    | server-side    | `metadata.name` / `metadata.namespace` evaluated locally, other paths ignored |
//!
//! Node metrics may therefore list nodes a field selector excludes. When a
//! node filter is active the join keeps only the nodes of the capacity
//! listing.

mod kube_source;
mod metrics_api;

pub use kube_source::KubeMetricsSource;
pub use metrics_api::{
    supported_metrics_api_available, ContainerMetrics, NodeMetrics, PodMetrics,
    METRICS_API_GROUP, SUPPORTED_METRICS_API_VERSIONS,
};

use crate::error::FetchError;
use crate::models::{CapacityKind, NodeCapacity, NodeMetricSample, PodMetricSample, PodPlacement};
use crate::selector::{FieldSelector, LabelSelector, Selectors};

pub use async_trait::async_trait;

/// Namespaces a pod metrics fetch covers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NamespaceScope {
    All,
    Namespace(String),
}

/// What a single fetch asks for
///
/// A target name requests exactly one object and the selectors are ignored.
/// Without a target the fetch lists every object matching the selectors.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourceQuery {
    pub target: Option<String>,
    pub selectors: Selectors,
}

impl ResourceQuery {
    /// Query for every object
    pub fn all() -> Self {
        Self::default()
    }

    pub fn named(name: impl Into<String>) -> Self {
        Self {
            target: Some(name.into()),
            selectors: Selectors::everything(),
        }
    }

    pub fn selected(selectors: Selectors) -> Self {
        Self {
            target: None,
            selectors,
        }
    }

    pub fn labels(&self) -> &LabelSelector {
        &self.selectors.labels
    }

    pub fn fields(&self) -> &FieldSelector {
        &self.selectors.fields
    }

    /// True when the query narrows the result set in any way
    pub fn is_filtered(&self) -> bool {
        self.target.is_some() || !self.selectors.is_empty()
    }
}

/// Source of the datasets joined into a report
#[async_trait]
pub trait MetricsSource: Send + Sync {
    /// Whether the server exposes a supported version of the metrics API
    async fn metrics_api_available(&self) -> Result<bool, FetchError>;

    /// Live usage of pods in the given namespaces
    async fn fetch_pod_metrics(
        &self,
        query: &ResourceQuery,
        scope: &NamespaceScope,
    ) -> Result<Vec<PodMetricSample>, FetchError>;

    /// Live whole-node usage
    async fn fetch_node_metrics(&self, query: &ResourceQuery)
        -> Result<Vec<NodeMetricSample>, FetchError>;

    /// Every pod in the cluster with the node it is scheduled on
    async fn fetch_pod_roster(&self) -> Result<Vec<PodPlacement>, FetchError>;

    /// Allocatable or capacity figures of nodes
    async fn fetch_node_capacity(
        &self,
        query: &ResourceQuery,
        kind: CapacityKind,
    ) -> Result<Vec<NodeCapacity>, FetchError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_filtering() {
        assert!(!ResourceQuery::all().is_filtered());
        assert!(ResourceQuery::named("n1").is_filtered());

        let selectors = Selectors::parse("role=worker", "").unwrap();
        let query = ResourceQuery::selected(selectors);
        assert!(query.is_filtered());
        assert_eq!(query.labels().to_string(), "role=worker");
        assert!(query.fields().is_empty());
    }
}
