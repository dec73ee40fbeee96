//! Pod to node resolution from the pod roster

use std::collections::HashMap;

use crate::models::{NodeName, PodId, PodPlacement};

/// Which node each scheduled pod runs on
///
/// Built once per run from the full, unfiltered roster. Pods that are not
/// scheduled, or that are missing from the roster, resolve to no node.
#[derive(Debug, Clone, Default)]
pub struct PodNodeBinding {
    bindings: HashMap<PodId, NodeName>,
}

impl PodNodeBinding {
    pub fn from_roster(roster: &[PodPlacement]) -> Self {
        let bindings = roster
            .iter()
            .filter_map(|placement| {
                placement
                    .node
                    .as_ref()
                    .map(|node| (placement.pod.clone(), node.clone()))
            })
            .collect();
        Self { bindings }
    }

    pub fn node_for(&self, pod: &PodId) -> Option<&NodeName> {
        self.bindings.get(pod)
    }

    /// Number of scheduled pods
    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}

impl FromIterator<(PodId, NodeName)> for PodNodeBinding {
    fn from_iter<T: IntoIterator<Item = (PodId, NodeName)>>(iter: T) -> Self {
        Self {
            bindings: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn placement(namespace: &str, name: &str, node: Option<&str>) -> PodPlacement {
        PodPlacement {
            pod: PodId::new(namespace, name),
            node: node.map(NodeName::new),
        }
    }

    #[test]
    fn test_binding_from_roster() {
        let roster = vec![
            placement("default", "web-0", Some("n1")),
            placement("default", "web-1", Some("n2")),
            placement("default", "pending", None),
        ];
        let binding = PodNodeBinding::from_roster(&roster);

        assert_eq!(binding.len(), 2);
        assert_eq!(
            binding.node_for(&PodId::new("default", "web-0")),
            Some(&NodeName::new("n1"))
        );
        assert_eq!(binding.node_for(&PodId::new("default", "pending")), None);
        assert_eq!(binding.node_for(&PodId::new("default", "missing")), None);
    }

    #[test]
    fn test_same_name_in_different_namespaces() {
        let roster = vec![
            placement("team-a", "api", Some("n1")),
            placement("team-b", "api", Some("n2")),
        ];
        let binding = PodNodeBinding::from_roster(&roster);

        assert_eq!(
            binding.node_for(&PodId::new("team-a", "api")),
            Some(&NodeName::new("n1"))
        );
        assert_eq!(
            binding.node_for(&PodId::new("team-b", "api")),
            Some(&NodeName::new("n2"))
        );
    }

    #[test]
    fn test_empty_roster() {
        let binding = PodNodeBinding::from_roster(&[]);
        assert!(binding.is_empty());
    }
}
