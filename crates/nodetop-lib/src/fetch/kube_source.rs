//! `MetricsSource` backed by the Kubernetes API server

use k8s_openapi::api::core::v1::{Node, Pod};
use kube::api::{Api, ListParams};
use kube::Client;
use tracing::debug;

use super::metrics_api::{supported_metrics_api_available, NodeMetrics, PodMetrics};
use super::{async_trait, MetricsSource, NamespaceScope, ResourceQuery};
use crate::error::{FetchError, FetchSource};
use crate::models::{
    CapacityKind, NodeCapacity, NodeMetricSample, NodeName, PodId, PodMetricSample, PodPlacement,
    ResourceSet,
};

/// Reads metrics and node resources through a `kube::Client`
#[derive(Clone)]
pub struct KubeMetricsSource {
    client: Client,
}

impl KubeMetricsSource {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

/// List parameters for a query, optionally forwarding the field selector
fn list_params(query: &ResourceQuery, with_fields: bool) -> ListParams {
    let mut params = ListParams::default();
    if !query.labels().is_empty() {
        params = params.labels(&query.labels().to_string());
    }
    if with_fields && !query.fields().is_empty() {
        params = params.fields(&query.fields().to_string());
    }
    params
}

fn pod_metrics_match(query: &ResourceQuery, metrics: &PodMetrics) -> bool {
    let name = metrics.metadata.name.as_deref().unwrap_or_default();
    let namespace = metrics.metadata.namespace.as_deref().unwrap_or_default();
    let labels = metrics.metadata.labels.clone().unwrap_or_default();

    query.labels().matches(&labels)
        && query.fields().matches(|path| match path {
            "metadata.name" => Some(name),
            "metadata.namespace" => Some(namespace),
            _ => None,
        })
}

fn node_metrics_match(query: &ResourceQuery, metrics: &NodeMetrics) -> bool {
    let name = metrics.metadata.name.as_deref().unwrap_or_default();
    let labels = metrics.metadata.labels.clone().unwrap_or_default();

    query.labels().matches(&labels)
        && query.fields().matches(|path| match path {
            "metadata.name" => Some(name),
            _ => None,
        })
}

fn node_capacity(node: &Node, kind: CapacityKind) -> Result<NodeCapacity, FetchError> {
    let name = NodeName::new(node.metadata.name.clone().unwrap_or_default());
    let status = node.status.as_ref();
    let list = match kind {
        CapacityKind::Allocatable => status.and_then(|s| s.allocatable.as_ref()),
        CapacityKind::Capacity => status.and_then(|s| s.capacity.as_ref()),
    };
    let resources = match list {
        Some(list) => ResourceSet::from_resource_list(list)
            .map_err(|e| FetchError::quantity(FetchSource::NodeCapacity, &name, e))?,
        None => ResourceSet::new(),
    };

    Ok(NodeCapacity {
        node: name,
        kind,
        resources,
    })
}

#[async_trait]
impl MetricsSource for KubeMetricsSource {
    async fn metrics_api_available(&self) -> Result<bool, FetchError> {
        let groups = self
            .client
            .list_api_groups()
            .await
            .map_err(|e| FetchError::new(FetchSource::Discovery, e))?;
        Ok(supported_metrics_api_available(&groups))
    }

    async fn fetch_pod_metrics(
        &self,
        query: &ResourceQuery,
        scope: &NamespaceScope,
    ) -> Result<Vec<PodMetricSample>, FetchError> {
        let fail = |e: kube::Error| FetchError::new(FetchSource::PodMetrics, e);
        let api: Api<PodMetrics> = match scope {
            NamespaceScope::All => Api::all(self.client.clone()),
            NamespaceScope::Namespace(ns) => Api::namespaced(self.client.clone(), ns),
        };

        let items = match (&query.target, scope) {
            (Some(name), NamespaceScope::Namespace(_)) => vec![api.get(name).await.map_err(fail)?],
            // a GET needs a namespace, so look the name up in the full listing
            (Some(name), NamespaceScope::All) => api
                .list(&ListParams::default())
                .await
                .map_err(fail)?
                .items
                .into_iter()
                .filter(|m| m.metadata.name.as_deref() == Some(name.as_str()))
                .collect(),
            (None, _) => {
                if !query.fields().only_uses(&["metadata.name", "metadata.namespace"]) {
                    debug!(
                        field_selector = %query.fields(),
                        "Pod metrics ignore field selector paths other than metadata.name and metadata.namespace"
                    );
                }
                api.list(&list_params(query, false))
                    .await
                    .map_err(fail)?
                    .items
                    .into_iter()
                    .filter(|m| pod_metrics_match(query, m))
                    .collect()
            }
        };

        let samples = items
            .iter()
            .map(|m| {
                m.to_sample()
                    .map_err(|e| FetchError::quantity(FetchSource::PodMetrics, m.pod_id(), e))
            })
            .collect::<Result<Vec<_>, _>>()?;
        debug!(count = samples.len(), scope = ?scope, "Fetched pod metrics");
        Ok(samples)
    }

    async fn fetch_node_metrics(
        &self,
        query: &ResourceQuery,
    ) -> Result<Vec<NodeMetricSample>, FetchError> {
        let fail = |e: kube::Error| FetchError::new(FetchSource::NodeMetrics, e);
        let api: Api<NodeMetrics> = Api::all(self.client.clone());

        let items = match &query.target {
            Some(name) => vec![api.get(name).await.map_err(fail)?],
            None => {
                if !query.fields().only_uses(&["metadata.name"]) {
                    debug!(
                        field_selector = %query.fields(),
                        "Node metrics ignore field selector paths other than metadata.name"
                    );
                }
                api.list(&list_params(query, false))
                    .await
                    .map_err(fail)?
                    .items
                    .into_iter()
                    .filter(|m| node_metrics_match(query, m))
                    .collect()
            }
        };

        let samples = items
            .iter()
            .map(|m| {
                m.to_sample()
                    .map_err(|e| FetchError::quantity(FetchSource::NodeMetrics, m.node_name(), e))
            })
            .collect::<Result<Vec<_>, _>>()?;
        debug!(count = samples.len(), "Fetched node metrics");
        Ok(samples)
    }

    async fn fetch_pod_roster(&self) -> Result<Vec<PodPlacement>, FetchError> {
        let api: Api<Pod> = Api::all(self.client.clone());
        let pods = api
            .list(&ListParams::default())
            .await
            .map_err(|e| FetchError::new(FetchSource::PodRoster, e))?;

        let roster: Vec<PodPlacement> = pods
            .items
            .into_iter()
            .map(|pod| PodPlacement {
                pod: PodId::new(
                    pod.metadata.namespace.unwrap_or_default(),
                    pod.metadata.name.unwrap_or_default(),
                ),
                node: pod
                    .spec
                    .and_then(|spec| spec.node_name)
                    .filter(|name| !name.is_empty())
                    .map(NodeName::new),
            })
            .collect();
        debug!(count = roster.len(), "Fetched pod roster");
        Ok(roster)
    }

    async fn fetch_node_capacity(
        &self,
        query: &ResourceQuery,
        kind: CapacityKind,
    ) -> Result<Vec<NodeCapacity>, FetchError> {
        let fail = |e: kube::Error| FetchError::new(FetchSource::NodeCapacity, e);
        let api: Api<Node> = Api::all(self.client.clone());

        let nodes = match &query.target {
            Some(name) => vec![api.get(name).await.map_err(fail)?],
            None => api.list(&list_params(query, true)).await.map_err(fail)?.items,
        };

        let capacities = nodes
            .iter()
            .map(|node| node_capacity(node, kind))
            .collect::<Result<Vec<_>, _>>()?;
        debug!(count = capacities.len(), kind = %kind, "Fetched node resources");
        Ok(capacities)
    }
}
