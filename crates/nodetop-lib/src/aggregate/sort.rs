//! Ordering of the per-node report

use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::ValidationError;
use crate::models::{NodeName, NodeReport, PodId, ResourceKind, ResourceSet};
use crate::quantity::{Quantity, QuantityError, QuantityFormat};

/// Resource the pod listing is ordered by
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortBy {
    Cpu,
    #[default]
    Memory,
}

impl SortBy {
    pub fn kind(&self) -> ResourceKind {
        match self {
            SortBy::Cpu => ResourceKind::Cpu,
            SortBy::Memory => ResourceKind::Memory,
        }
    }

    /// Amount of the sort resource, missing counting as zero
    fn key(&self, usage: &ResourceSet) -> Quantity {
        usage
            .get(&self.kind())
            .copied()
            .unwrap_or_else(|| Quantity::zero(QuantityFormat::DecimalSI))
    }
}

impl fmt::Display for SortBy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SortBy::Cpu => f.write_str("cpu"),
            SortBy::Memory => f.write_str("memory"),
        }
    }
}

impl FromStr for SortBy {
    type Err = ValidationError;

    /// An empty key selects the default ordering
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "" => Ok(SortBy::default()),
            "cpu" => Ok(SortBy::Cpu),
            "memory" => Ok(SortBy::Memory),
            other => Err(ValidationError::UnsupportedSortKey(other.to_string())),
        }
    }
}

/// Flatten the joined nodes into display order
///
/// Nodes come out ordered by name. Pods are ordered by their total usage of
/// the sort resource, largest first, ties by pod name and then namespace.
pub fn assemble(
    nodes: BTreeMap<NodeName, NodeReport>,
    sort_by: SortBy,
) -> Result<Vec<NodeReport>, QuantityError> {
    nodes
        .into_values()
        .map(|mut report| {
            let mut keyed = report
                .pods
                .drain(..)
                .map(|pod| Ok((sort_by.key(&pod.total()?), pod)))
                .collect::<Result<Vec<_>, QuantityError>>()?;
            keyed.sort_by(|(a_key, a), (b_key, b)| {
                b_key
                    .cmp(a_key)
                    .then_with(|| a.pod.name.cmp(&b.pod.name))
                    .then_with(|| a.pod.namespace.cmp(&b.pod.namespace))
            });
            report.pods = keyed.into_iter().map(|(_, pod)| pod).collect();
            Ok(report)
        })
        .collect()
}

/// One line of the per-container listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerRow {
    pub pod: PodId,
    pub container: String,
    pub usage: ResourceSet,
}

/// Every container of a node, grouped by pod
///
/// Pods keep the order `assemble` gave them. Within a pod, containers are
/// ordered by usage of the sort resource, largest first, ties by name.
pub fn container_rows(report: &NodeReport, sort_by: SortBy) -> Vec<ContainerRow> {
    report
        .pods
        .iter()
        .flat_map(|pod| {
            let mut containers: Vec<_> = pod.containers.iter().collect();
            containers.sort_by(|a, b| {
                Reverse(sort_by.key(&a.usage))
                    .cmp(&Reverse(sort_by.key(&b.usage)))
                    .then_with(|| a.name.cmp(&b.name))
            });
            containers.into_iter().map(move |container| ContainerRow {
                pod: pod.pod.clone(),
                container: container.name.clone(),
                usage: container.usage.clone(),
            })
        })
        .collect()
}
