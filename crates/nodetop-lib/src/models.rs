//! Core data models for the per-node report

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::quantity::{Quantity, QuantityError};

/// Name of a cluster node
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeName(String);

impl NodeName {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identity of a pod: namespace plus name
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PodId {
    pub namespace: String,
    pub name: String,
}

impl PodId {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for PodId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Kind of resource a quantity measures
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ResourceKind {
    Cpu,
    Memory,
    /// Any other resource name (`ephemeral-storage`, `nvidia.com/gpu`, ...)
    Other(String),
}

impl ResourceKind {
    pub fn as_str(&self) -> &str {
        match self {
            ResourceKind::Cpu => "cpu",
            ResourceKind::Memory => "memory",
            ResourceKind::Other(name) => name,
        }
    }
}

impl From<&str> for ResourceKind {
    fn from(value: &str) -> Self {
        match value {
            "cpu" => ResourceKind::Cpu,
            "memory" => ResourceKind::Memory,
            other => ResourceKind::Other(other.to_string()),
        }
    }
}

impl From<String> for ResourceKind {
    fn from(value: String) -> Self {
        ResourceKind::from(value.as_str())
    }
}

impl From<ResourceKind> for String {
    fn from(value: ResourceKind) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Resource amounts by kind
///
/// A missing kind means "not reported", which is different from zero.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceSet(BTreeMap<ResourceKind, Quantity>);

impl ResourceSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, kind: &ResourceKind) -> Option<&Quantity> {
        self.0.get(kind)
    }

    pub fn cpu(&self) -> Option<&Quantity> {
        self.get(&ResourceKind::Cpu)
    }

    pub fn memory(&self) -> Option<&Quantity> {
        self.get(&ResourceKind::Memory)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ResourceKind, &Quantity)> {
        self.0.iter()
    }

    /// Union of both sets, adding quantities of kinds present in both
    pub fn checked_add(&self, other: &ResourceSet) -> Result<ResourceSet, QuantityError> {
        let mut sum = self.0.clone();
        for (kind, quantity) in &other.0 {
            let total = match sum.get(kind) {
                Some(existing) => existing.checked_add(quantity)?,
                None => *quantity,
            };
            sum.insert(kind.clone(), total);
        }
        Ok(ResourceSet(sum))
    }

    /// Sum a sequence of sets
    pub fn checked_sum<'a>(
        sets: impl IntoIterator<Item = &'a ResourceSet>,
    ) -> Result<ResourceSet, QuantityError> {
        sets.into_iter()
            .try_fold(ResourceSet::new(), |acc, set| acc.checked_add(set))
    }

    /// Parse a Kubernetes `ResourceList` (resource name to quantity string)
    pub fn from_resource_list<'a>(
        list: impl IntoIterator<
            Item = (
                &'a String,
                &'a k8s_openapi::apimachinery::pkg::api::resource::Quantity,
            ),
        >,
    ) -> Result<ResourceSet, QuantityError> {
        list.into_iter()
            .map(|(name, raw)| Ok((ResourceKind::from(name.as_str()), Quantity::try_from(raw)?)))
            .collect()
    }
}

impl FromIterator<(ResourceKind, Quantity)> for ResourceSet {
    fn from_iter<T: IntoIterator<Item = (ResourceKind, Quantity)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Usage of a single container
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerUsage {
    pub name: String,
    pub usage: ResourceSet,
}

/// Live usage sample of one pod from the metrics API
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PodMetricSample {
    pub pod: PodId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub window: Option<String>,
    /// Containers in the order the metrics API reported them
    pub containers: Vec<ContainerUsage>,
}

impl PodMetricSample {
    /// Total usage across the pod's containers
    pub fn total(&self) -> Result<ResourceSet, QuantityError> {
        ResourceSet::checked_sum(self.containers.iter().map(|c| &c.usage))
    }
}

/// Live whole-node usage sample from the metrics API
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeMetricSample {
    pub node: NodeName,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub window: Option<String>,
    pub usage: ResourceSet,
}

/// Which node resource figure a report compares usage against
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CapacityKind {
    /// Capacity minus system and kubelet reservations
    #[default]
    Allocatable,
    /// Total hardware capacity
    Capacity,
}

impl fmt::Display for CapacityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CapacityKind::Allocatable => f.write_str("allocatable"),
            CapacityKind::Capacity => f.write_str("capacity"),
        }
    }
}

/// Declared resources of a node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeCapacity {
    pub node: NodeName,
    pub kind: CapacityKind,
    pub resources: ResourceSet,
}

/// Placement of a pod from the pod roster
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PodPlacement {
    pub pod: PodId,
    /// `None` while the pod is not scheduled
    pub node: Option<NodeName>,
}

/// Aggregated view of a single node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeReport {
    pub node: NodeName,
    /// Absent when the node metrics listing did not include the node
    pub metrics: Option<NodeMetricSample>,
    /// Absent when the node was not part of the capacity listing
    pub capacity: Option<NodeCapacity>,
    pub pods: Vec<PodMetricSample>,
    /// Usage summed over every container of every pod, when requested
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sum: Option<ResourceSet>,
}

impl NodeReport {
    pub fn empty(node: NodeName) -> Self {
        Self {
            node,
            metrics: None,
            capacity: None,
            pods: Vec::new(),
            sum: None,
        }
    }
}
