//! End-to-end report generation
//!
//! A run validates its options, checks that the metrics API is served,
//! fetches the four datasets concurrently and joins them. Validation and
//! precondition failures happen before any data is requested; the first
//! failing fetch cancels the others and no partial report is produced.

use serde::Serialize;
use std::future::Future;
use std::time::{Duration, Instant};
use tracing::{debug, info};

use crate::aggregate::{aggregate, assemble, AggregateOptions};
use crate::error::{FetchError, FetchSource, PreconditionError, TopError, ValidationError};
use crate::fetch::{MetricsSource, NamespaceScope, ResourceQuery};
use crate::models::{CapacityKind, NodeReport};
use crate::observability::ReportLogger;
use crate::resolver::PodNodeBinding;
use crate::selector::Selectors;

pub use crate::aggregate::SortBy;

/// Default per-request timeout
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Namespace used when pods are scoped but no namespace was given
pub const DEFAULT_NAMESPACE: &str = "default";

/// Options of one report run, as given by the user
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopOptions {
    /// Single node to report on
    pub target: Option<String>,
    pub label_selector: String,
    pub field_selector: String,
    pub sort_by: String,
    pub show_containers: bool,
    pub all_namespaces: bool,
    /// Pod metrics namespace when `all_namespaces` is off
    pub namespace: String,
    pub no_headers: bool,
    pub use_protocol_buffers: bool,
    pub sum: bool,
    pub capacity_kind: CapacityKind,
    pub request_timeout: Duration,
}

impl Default for TopOptions {
    fn default() -> Self {
        Self {
            target: None,
            label_selector: String::new(),
            field_selector: String::new(),
            sort_by: SortBy::default().to_string(),
            show_containers: false,
            all_namespaces: true,
            namespace: DEFAULT_NAMESPACE.to_string(),
            no_headers: false,
            use_protocol_buffers: false,
            sum: true,
            capacity_kind: CapacityKind::default(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

/// How the renderer should present a report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DisplayOptions {
    pub show_containers: bool,
    pub all_namespaces: bool,
    pub no_headers: bool,
    pub sort_by: SortBy,
    pub sum: bool,
    pub capacity_kind: CapacityKind,
}

/// Options after validation, ready to drive the fetchers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedOptions {
    /// Node query shared by node metrics and node resources
    pub node_query: ResourceQuery,
    pub pod_scope: NamespaceScope,
    pub display: DisplayOptions,
    pub request_timeout: Duration,
}

impl ValidatedOptions {
    /// Short description of what the run covers, for logs
    fn scope_label(&self) -> String {
        if let Some(name) = &self.node_query.target {
            return format!("node/{}", name);
        }
        let selectors: Vec<String> = [
            self.node_query.labels().to_string(),
            self.node_query.fields().to_string(),
        ]
        .into_iter()
        .filter(|s| !s.is_empty())
        .collect();
        if selectors.is_empty() {
            "cluster".to_string()
        } else {
            format!("nodes[{}]", selectors.join(","))
        }
    }
}

impl TopOptions {
    /// Check the options without touching the network
    pub fn validate(&self) -> Result<ValidatedOptions, ValidationError> {
        let sort_by: SortBy = self.sort_by.parse()?;

        let target = self.target.as_deref().filter(|name| !name.is_empty());
        if target.is_some() && (!self.label_selector.is_empty() || !self.field_selector.is_empty()) {
            return Err(ValidationError::NameWithSelector);
        }

        let node_query = match target {
            Some(name) => ResourceQuery::named(name),
            None => ResourceQuery::selected(Selectors::parse(
                &self.label_selector,
                &self.field_selector,
            )?),
        };

        let pod_scope = if self.all_namespaces {
            NamespaceScope::All
        } else if self.namespace.is_empty() {
            NamespaceScope::Namespace(DEFAULT_NAMESPACE.to_string())
        } else {
            NamespaceScope::Namespace(self.namespace.clone())
        };

        Ok(ValidatedOptions {
            node_query,
            pod_scope,
            display: DisplayOptions {
                show_containers: self.show_containers,
                all_namespaces: self.all_namespaces,
                no_headers: self.no_headers,
                sort_by,
                sum: self.sum,
                capacity_kind: self.capacity_kind,
            },
            request_timeout: self.request_timeout,
        })
    }
}

/// Per-node report handed to the renderer
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TopReport {
    /// Nodes ordered by name, pods in display order
    pub nodes: Vec<NodeReport>,
    pub display: DisplayOptions,
    /// Pod samples left out because their node is unknown
    pub unattributed_pods: usize,
}

impl TopReport {
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// Await a fetch with a deadline and log its size
async fn timed<T, F>(
    logger: &ReportLogger,
    source: FetchSource,
    limit: Duration,
    fetch: F,
) -> Result<Vec<T>, FetchError>
where
    F: Future<Output = Result<Vec<T>, FetchError>>,
{
    let started = Instant::now();
    let items = tokio::time::timeout(limit, fetch)
        .await
        .map_err(|_| FetchError::timeout(source, limit))??;
    logger.log_fetch(source, items.len(), started.elapsed());
    Ok(items)
}

/// Build a per-node report
pub async fn run<S>(source: &S, options: &TopOptions) -> Result<TopReport, TopError>
where
    S: MetricsSource + ?Sized,
{
    let started = Instant::now();
    let validated = options.validate()?;
    let logger = ReportLogger::new(validated.scope_label());
    let limit = validated.request_timeout;

    if options.use_protocol_buffers {
        info!("Protocol buffers are not supported, reading metrics as JSON");
    }

    let available = tokio::time::timeout(limit, source.metrics_api_available())
        .await
        .map_err(|_| FetchError::timeout(FetchSource::Discovery, limit))??;
    if !available {
        return Err(PreconditionError::MetricsApiUnavailable.into());
    }

    // pod metrics are never narrowed by the node filter
    let pod_query = ResourceQuery::all();
    let (pod_metrics, node_metrics, capacities, roster) = tokio::try_join!(
        timed(
            &logger,
            FetchSource::PodMetrics,
            limit,
            source.fetch_pod_metrics(&pod_query, &validated.pod_scope),
        ),
        timed(
            &logger,
            FetchSource::NodeMetrics,
            limit,
            source.fetch_node_metrics(&validated.node_query),
        ),
        timed(
            &logger,
            FetchSource::NodeCapacity,
            limit,
            source.fetch_node_capacity(&validated.node_query, validated.display.capacity_kind),
        ),
        timed(&logger, FetchSource::PodRoster, limit, source.fetch_pod_roster()),
    )?;

    let binding = PodNodeBinding::from_roster(&roster);
    debug!(scheduled_pods = binding.len(), "Resolved pod placement");

    let outcome = aggregate(
        pod_metrics,
        node_metrics,
        capacities,
        &binding,
        AggregateOptions {
            sum: validated.display.sum,
            node_filter_active: validated.node_query.is_filtered(),
        },
    )?;
    logger.log_unattributed(outcome.unattributed);

    let nodes = assemble(outcome.nodes, validated.display.sort_by)?;
    let pods = nodes.iter().map(|n| n.pods.len()).sum();
    logger.log_report(nodes.len(), pods, started.elapsed());

    Ok(TopReport {
        nodes,
        display: validated.display,
        unattributed_pods: outcome.unattributed,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FetchCause;
    use crate::fetch::async_trait;
    use crate::models::{
        ContainerUsage, NodeCapacity, NodeMetricSample, NodeName, PodId, PodMetricSample,
        PodPlacement, ResourceKind, ResourceSet,
    };
    use crate::quantity::Quantity;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tokio_test::{assert_err, assert_ok};

    fn usage(cpu: &str, memory: &str) -> ResourceSet {
        [
            (ResourceKind::Cpu, cpu.parse::<Quantity>().unwrap()),
            (ResourceKind::Memory, memory.parse::<Quantity>().unwrap()),
        ]
        .into_iter()
        .collect()
    }

    /// In-memory source that records every call it receives
    #[derive(Default)]
    struct MockSource {
        unavailable: bool,
        fail_node_metrics: bool,
        slow_roster: bool,
        pods: Vec<PodMetricSample>,
        nodes: Vec<NodeMetricSample>,
        capacities: Vec<NodeCapacity>,
        roster: Vec<PodPlacement>,
        discovery_calls: AtomicUsize,
        fetch_calls: AtomicUsize,
        node_queries: Mutex<Vec<ResourceQuery>>,
        pod_scopes: Mutex<Vec<NamespaceScope>>,
    }

    impl MockSource {
        fn cluster() -> Self {
            let pod = |ns: &str, name: &str, cpu: &str, memory: &str| PodMetricSample {
                pod: PodId::new(ns, name),
                timestamp: None,
                window: None,
                containers: vec![ContainerUsage {
                    name: "app".to_string(),
                    usage: usage(cpu, memory),
                }],
            };
            let placement = |ns: &str, name: &str, node: Option<&str>| PodPlacement {
                pod: PodId::new(ns, name),
                node: node.map(NodeName::new),
            };

            Self {
                pods: vec![
                    pod("default", "a", "500m", "10Mi"),
                    pod("default", "b", "100m", "50Mi"),
                    pod("kube-system", "dns", "20m", "30Mi"),
                    pod("default", "gone", "1m", "1Mi"),
                ],
                nodes: vec![
                    NodeMetricSample {
                        node: NodeName::new("n1"),
                        timestamp: None,
                        window: None,
                        usage: usage("1", "2Gi"),
                    },
                    NodeMetricSample {
                        node: NodeName::new("n2"),
                        timestamp: None,
                        window: None,
                        usage: usage("500m", "1Gi"),
                    },
                ],
                capacities: vec![
                    NodeCapacity {
                        node: NodeName::new("n2"),
                        kind: CapacityKind::Allocatable,
                        resources: usage("4", "8Gi"),
                    },
                    NodeCapacity {
                        node: NodeName::new("n3"),
                        kind: CapacityKind::Allocatable,
                        resources: usage("4", "8Gi"),
                    },
                ],
                roster: vec![
                    placement("default", "a", Some("n1")),
                    placement("default", "b", Some("n1")),
                    placement("kube-system", "dns", Some("n2")),
                    placement("default", "pending", None),
                ],
                ..Default::default()
            }
        }

        fn fetches(&self) -> usize {
            self.fetch_calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl MetricsSource for MockSource {
        async fn metrics_api_available(&self) -> Result<bool, FetchError> {
            self.discovery_calls.fetch_add(1, Ordering::SeqCst);
            Ok(!self.unavailable)
        }

        async fn fetch_pod_metrics(
            &self,
            _query: &ResourceQuery,
            scope: &NamespaceScope,
        ) -> Result<Vec<PodMetricSample>, FetchError> {
            self.fetch_calls.fetch_add(1, Ordering::SeqCst);
            self.pod_scopes.lock().unwrap().push(scope.clone());
            Ok(self.pods.clone())
        }

        async fn fetch_node_metrics(
            &self,
            query: &ResourceQuery,
        ) -> Result<Vec<NodeMetricSample>, FetchError> {
            self.fetch_calls.fetch_add(1, Ordering::SeqCst);
            self.node_queries.lock().unwrap().push(query.clone());
            if self.fail_node_metrics {
                return Err(FetchError::timeout(
                    FetchSource::NodeMetrics,
                    Duration::from_secs(1),
                ));
            }
            Ok(self
                .nodes
                .iter()
                .filter(|n| query.target.as_deref().map_or(true, |t| n.node.as_str() == t))
                .cloned()
                .collect())
        }

        async fn fetch_pod_roster(&self) -> Result<Vec<PodPlacement>, FetchError> {
            self.fetch_calls.fetch_add(1, Ordering::SeqCst);
            if self.slow_roster {
                tokio::time::sleep(Duration::from_secs(5)).await;
            }
            Ok(self.roster.clone())
        }

        async fn fetch_node_capacity(
            &self,
            query: &ResourceQuery,
            _kind: CapacityKind,
        ) -> Result<Vec<NodeCapacity>, FetchError> {
            self.fetch_calls.fetch_add(1, Ordering::SeqCst);
            Ok(self
                .capacities
                .iter()
                .filter(|c| query.target.as_deref().map_or(true, |t| c.node.as_str() == t))
                .cloned()
                .collect())
        }
    }

    #[tokio::test]
    async fn test_full_cluster_report() {
        let source = MockSource::cluster();
        let report = assert_ok!(run(&source, &TopOptions::default()).await);

        let nodes: Vec<&str> = report.nodes.iter().map(|n| n.node.as_str()).collect();
        assert_eq!(nodes, vec!["n1", "n2", "n3"]);
        assert_eq!(report.unattributed_pods, 1);
        assert_eq!(source.fetches(), 4);

        // sorted by memory by default
        let n1_pods: Vec<&str> = report.nodes[0].pods.iter().map(|p| p.pod.name.as_str()).collect();
        assert_eq!(n1_pods, vec!["b", "a"]);

        let n1_sum = report.nodes[0].sum.as_ref().unwrap();
        assert_eq!(n1_sum.cpu().unwrap().milli_value(), 600);

        assert!(report.nodes[0].capacity.is_none());
        assert!(report.nodes[2].metrics.is_none());
    }

    #[tokio::test]
    async fn test_sort_by_cpu() {
        let source = MockSource::cluster();
        let options = TopOptions {
            sort_by: "cpu".to_string(),
            ..Default::default()
        };
        let report = assert_ok!(run(&source, &options).await);

        let n1_pods: Vec<&str> = report.nodes[0].pods.iter().map(|p| p.pod.name.as_str()).collect();
        assert_eq!(n1_pods, vec!["a", "b"]);
        assert_eq!(report.display.sort_by, SortBy::Cpu);
    }

    #[tokio::test]
    async fn test_name_with_selector_makes_no_calls() {
        let source = MockSource::cluster();
        let options = TopOptions {
            target: Some("n1".to_string()),
            label_selector: "role=worker".to_string(),
            ..Default::default()
        };

        let err = assert_err!(run(&source, &options).await);
        assert!(matches!(
            err,
            TopError::Validation(ValidationError::NameWithSelector)
        ));
        assert_eq!(source.discovery_calls.load(Ordering::SeqCst), 0);
        assert_eq!(source.fetches(), 0);
    }

    #[tokio::test]
    async fn test_bad_sort_key_and_selector_make_no_calls() {
        let source = MockSource::cluster();

        let options = TopOptions {
            sort_by: "disk".to_string(),
            ..Default::default()
        };
        let err = assert_err!(run(&source, &options).await);
        assert!(matches!(
            err,
            TopError::Validation(ValidationError::UnsupportedSortKey(_))
        ));

        let options = TopOptions {
            label_selector: "a in b".to_string(),
            ..Default::default()
        };
        let err = assert_err!(run(&source, &options).await);
        assert!(matches!(err, TopError::Validation(ValidationError::Selector(_))));

        assert_eq!(source.discovery_calls.load(Ordering::SeqCst), 0);
        assert_eq!(source.fetches(), 0);
    }

    #[tokio::test]
    async fn test_missing_metrics_api_stops_before_fetching() {
        let source = MockSource {
            unavailable: true,
            ..MockSource::cluster()
        };

        let err = assert_err!(run(&source, &TopOptions::default()).await);
        assert!(matches!(
            err,
            TopError::Precondition(PreconditionError::MetricsApiUnavailable)
        ));
        assert_eq!(err.to_string(), "metrics API not available");
        assert_eq!(source.discovery_calls.load(Ordering::SeqCst), 1);
        assert_eq!(source.fetches(), 0);
    }

    #[tokio::test]
    async fn test_fetch_failure_aborts_run() {
        let source = MockSource {
            fail_node_metrics: true,
            ..MockSource::cluster()
        };

        let err = assert_err!(run(&source, &TopOptions::default()).await);
        match err {
            TopError::Fetch(fetch) => assert_eq!(fetch.source_kind, FetchSource::NodeMetrics),
            other => panic!("unexpected error: {}", other),
        }
    }

    #[tokio::test]
    async fn test_slow_fetch_times_out() {
        let source = MockSource {
            slow_roster: true,
            ..MockSource::cluster()
        };
        let options = TopOptions {
            request_timeout: Duration::from_millis(20),
            ..Default::default()
        };

        let err = assert_err!(run(&source, &options).await);
        match err {
            TopError::Fetch(fetch) => {
                assert_eq!(fetch.source_kind, FetchSource::PodRoster);
                assert!(matches!(fetch.cause, FetchCause::Timeout(_)));
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[tokio::test]
    async fn test_named_node_scopes_node_queries() {
        let source = MockSource::cluster();
        let options = TopOptions {
            target: Some("n2".to_string()),
            ..Default::default()
        };
        let report = assert_ok!(run(&source, &options).await);

        let nodes: Vec<&str> = report.nodes.iter().map(|n| n.node.as_str()).collect();
        assert_eq!(nodes, vec!["n2"]);
        assert_eq!(report.nodes[0].pods[0].pod.name, "dns");

        let queries = source.node_queries.lock().unwrap();
        assert_eq!(queries[0], ResourceQuery::named("n2"));
    }

    #[tokio::test]
    async fn test_zero_match_selector_yields_empty_report() {
        let source = MockSource {
            nodes: vec![],
            capacities: vec![],
            ..MockSource::cluster()
        };
        let options = TopOptions {
            label_selector: "role=none".to_string(),
            ..Default::default()
        };

        let report = assert_ok!(run(&source, &options).await);
        assert!(report.is_empty());
    }

    #[tokio::test]
    async fn test_field_selector_nodes_follow_resources_listing() {
        // the resources listing applied spec.unschedulable; node metrics could not
        let source = MockSource::cluster();
        let options = TopOptions {
            field_selector: "spec.unschedulable=true".to_string(),
            ..Default::default()
        };

        let report = assert_ok!(run(&source, &options).await);
        let nodes: Vec<&str> = report.nodes.iter().map(|n| n.node.as_str()).collect();
        assert_eq!(nodes, vec!["n2", "n3"]);
        assert!(report.nodes[0].metrics.is_some());
        assert!(report.nodes[1].metrics.is_none());
    }

    #[tokio::test]
    async fn test_namespace_scope() {
        let source = MockSource::cluster();
        let options = TopOptions {
            all_namespaces: false,
            namespace: "kube-system".to_string(),
            ..Default::default()
        };
        assert_ok!(run(&source, &options).await);

        let scopes = source.pod_scopes.lock().unwrap();
        assert_eq!(scopes[0], NamespaceScope::Namespace("kube-system".to_string()));
    }

    #[test]
    fn test_validate_defaults() {
        let validated = TopOptions::default().validate().unwrap();
        assert_eq!(validated.node_query, ResourceQuery::all());
        assert_eq!(validated.pod_scope, NamespaceScope::All);
        assert_eq!(validated.display.sort_by, SortBy::Memory);
        assert!(validated.display.sum);
        assert_eq!(validated.request_timeout, DEFAULT_REQUEST_TIMEOUT);
        assert_eq!(validated.scope_label(), "cluster");
    }

    #[test]
    fn test_empty_target_is_no_target() {
        let options = TopOptions {
            target: Some(String::new()),
            label_selector: "role=worker".to_string(),
            ..Default::default()
        };
        let validated = options.validate().unwrap();
        assert_eq!(validated.node_query.target, None);
        assert_eq!(validated.scope_label(), "nodes[role=worker]");
    }
}
