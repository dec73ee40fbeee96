//! Typed resources of the `metrics.k8s.io` API
//!
//! `k8s-openapi` does not ship the metrics API, so the two resources are
//! declared here and plugged into `kube::Api` through the `k8s_openapi`
//! resource traits.

use k8s_openapi::apimachinery::pkg::api::resource::Quantity as RawQuantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{APIGroupList, ObjectMeta, Time};
use k8s_openapi::{ClusterResourceScope, NamespaceResourceScope};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::models::{ContainerUsage, NodeMetricSample, NodeName, PodId, PodMetricSample, ResourceSet};
use crate::quantity::QuantityError;

pub const METRICS_API_GROUP: &str = "metrics.k8s.io";

/// Metrics API versions this client can read
pub const SUPPORTED_METRICS_API_VERSIONS: &[&str] = &["v1beta1"];

/// Usage of one container as reported by the metrics API
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContainerMetrics {
    pub name: String,
    #[serde(default)]
    pub usage: BTreeMap<String, RawQuantity>,
}

/// `metrics.k8s.io/v1beta1` PodMetrics
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PodMetrics {
    pub metadata: ObjectMeta,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<Time>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub window: Option<String>,
    #[serde(default)]
    pub containers: Vec<ContainerMetrics>,
}

impl k8s_openapi::Resource for PodMetrics {
    const API_VERSION: &'static str = "metrics.k8s.io/v1beta1";
    const GROUP: &'static str = METRICS_API_GROUP;
    const KIND: &'static str = "PodMetrics";
    const VERSION: &'static str = "v1beta1";
    const URL_PATH_SEGMENT: &'static str = "pods";
    type Scope = NamespaceResourceScope;
}

impl k8s_openapi::Metadata for PodMetrics {
    type Ty = ObjectMeta;

    fn metadata(&self) -> &Self::Ty {
        &self.metadata
    }

    fn metadata_mut(&mut self) -> &mut Self::Ty {
        &mut self.metadata
    }
}

impl PodMetrics {
    pub fn pod_id(&self) -> PodId {
        PodId::new(
            self.metadata.namespace.clone().unwrap_or_default(),
            self.metadata.name.clone().unwrap_or_default(),
        )
    }

    /// Convert into a sample, parsing every usage quantity
    pub fn to_sample(&self) -> Result<PodMetricSample, QuantityError> {
        let containers = self
            .containers
            .iter()
            .map(|container| {
                Ok(ContainerUsage {
                    name: container.name.clone(),
                    usage: ResourceSet::from_resource_list(&container.usage)?,
                })
            })
            .collect::<Result<Vec<_>, QuantityError>>()?;

        Ok(PodMetricSample {
            pod: self.pod_id(),
            timestamp: self.timestamp.as_ref().map(|t| t.0),
            window: self.window.clone(),
            containers,
        })
    }
}

/// `metrics.k8s.io/v1beta1` NodeMetrics
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeMetrics {
    pub metadata: ObjectMeta,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<Time>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub window: Option<String>,
    #[serde(default)]
    pub usage: BTreeMap<String, RawQuantity>,
}

impl k8s_openapi::Resource for NodeMetrics {
    const API_VERSION: &'static str = "metrics.k8s.io/v1beta1";
    const GROUP: &'static str = METRICS_API_GROUP;
    const KIND: &'static str = "NodeMetrics";
    const VERSION: &'static str = "v1beta1";
    const URL_PATH_SEGMENT: &'static str = "nodes";
    type Scope = ClusterResourceScope;
}

impl k8s_openapi::Metadata for NodeMetrics {
    type Ty = ObjectMeta;

    fn metadata(&self) -> &Self::Ty {
        &self.metadata
    }

    fn metadata_mut(&mut self) -> &mut Self::Ty {
        &mut self.metadata
    }
}

impl NodeMetrics {
    pub fn node_name(&self) -> NodeName {
        NodeName::new(self.metadata.name.clone().unwrap_or_default())
    }

    pub fn to_sample(&self) -> Result<NodeMetricSample, QuantityError> {
        Ok(NodeMetricSample {
            node: self.node_name(),
            timestamp: self.timestamp.as_ref().map(|t| t.0),
            window: self.window.clone(),
            usage: ResourceSet::from_resource_list(&self.usage)?,
        })
    }
}

/// Check the discovered API groups for a readable metrics API version
pub fn supported_metrics_api_available(groups: &APIGroupList) -> bool {
    groups
        .groups
        .iter()
        .filter(|group| group.name == METRICS_API_GROUP)
        .flat_map(|group| group.versions.iter())
        .any(|version| SUPPORTED_METRICS_API_VERSIONS.contains(&version.version.as_str()))
}
