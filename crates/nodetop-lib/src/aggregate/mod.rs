//! Joins pod metrics, node metrics and node resources into per-node reports
//!
//! The three datasets are fetched independently and may disagree: a node can
//! have metrics but no resources listing, or the other way round, and pods
//! can be bound to nodes neither listing knows about. The join keeps every
//! node any of them mentions, unless a node filter was requested. Under a
//! filter the node resources listing decides the node set, since it is the
//! only fetch whose selectors are applied in full by the API server.

mod sort;

pub use sort::{assemble, container_rows, ContainerRow, SortBy};

use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

use crate::models::{NodeCapacity, NodeMetricSample, NodeName, NodeReport, PodMetricSample, ResourceSet};
use crate::quantity::QuantityError;
use crate::resolver::PodNodeBinding;

/// Options that change how reports are joined
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AggregateOptions {
    /// Compute the per-node usage sum
    pub sum: bool,
    /// Node listings were narrowed by a name or selector
    pub node_filter_active: bool,
}

/// Result of a join
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AggregateOutcome {
    pub nodes: BTreeMap<NodeName, NodeReport>,
    /// Pod samples without a known node
    pub unattributed: usize,
}

/// Group pod metrics by node and attach node metrics and resources
pub fn aggregate(
    pod_metrics: Vec<PodMetricSample>,
    node_metrics: Vec<NodeMetricSample>,
    capacities: Vec<NodeCapacity>,
    binding: &PodNodeBinding,
    options: AggregateOptions,
) -> Result<AggregateOutcome, QuantityError> {
    let mut nodes: BTreeMap<NodeName, NodeReport> = BTreeMap::new();

    for capacity in capacities {
        let node = capacity.node.clone();
        nodes
            .entry(node.clone())
            .or_insert_with(|| NodeReport::empty(node))
            .capacity = Some(capacity);
    }
    let selected: BTreeSet<NodeName> = nodes.keys().cloned().collect();

    let mut unselected_metrics = 0;
    for sample in node_metrics {
        if options.node_filter_active && !selected.contains(&sample.node) {
            unselected_metrics += 1;
            continue;
        }
        let node = sample.node.clone();
        nodes
            .entry(node.clone())
            .or_insert_with(|| NodeReport::empty(node))
            .metrics = Some(sample);
    }
    if unselected_metrics > 0 {
        debug!(
            nodes = unselected_metrics,
            "Skipped node metrics outside the node filter"
        );
    }

    let mut unattributed = 0;
    let mut filtered_out = 0;

    for sample in pod_metrics {
        let Some(node) = binding.node_for(&sample.pod) else {
            debug!(pod = %sample.pod, "Pod has no node binding");
            unattributed += 1;
            continue;
        };
        if options.node_filter_active && !selected.contains(node) {
            filtered_out += 1;
            continue;
        }
        nodes
            .entry(node.clone())
            .or_insert_with(|| NodeReport::empty(node.clone()))
            .pods
            .push(sample);
    }

    if filtered_out > 0 {
        debug!(pods = filtered_out, "Skipped pods on nodes outside the node filter");
    }

    if options.sum {
        for report in nodes.values_mut() {
            report.sum = Some(node_sum(&report.pods)?);
        }
    }

    Ok(AggregateOutcome {
        nodes,
        unattributed,
    })
}

/// Sum every pod, each pod being the sum of its containers
fn node_sum(pods: &[PodMetricSample]) -> Result<ResourceSet, QuantityError> {
    let totals = pods
        .iter()
        .map(PodMetricSample::total)
        .collect::<Result<Vec<_>, _>>()?;
    ResourceSet::checked_sum(&totals)
}
