//! Structured logging for report runs
//!
//! Events carry an `event` field so JSON log output can be filtered the same
//! way for every run.

use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::FetchSource;

/// Structured logger for report events
#[derive(Debug, Clone)]
pub struct ReportLogger {
    scope: String,
}

impl ReportLogger {
    /// `scope` names what the run covers: a node, a selector or the cluster
    pub fn new(scope: impl Into<String>) -> Self {
        Self {
            scope: scope.into(),
        }
    }

    pub fn scope(&self) -> &str {
        &self.scope
    }

    /// Log a completed fetch
    pub fn log_fetch(&self, source: FetchSource, items: usize, elapsed: Duration) {
        debug!(
            event = "fetch_completed",
            scope = %self.scope,
            source = %source,
            items = items,
            elapsed_ms = elapsed.as_millis() as u64,
            "Fetched {}",
            source
        );
    }

    /// Log pod samples that could not be placed on a node
    pub fn log_unattributed(&self, pods: usize) {
        if pods == 0 {
            return;
        }
        warn!(
            event = "pods_unattributed",
            scope = %self.scope,
            pods = pods,
            "Pod metrics without a scheduled node were left out"
        );
    }

    /// Log the finished report
    pub fn log_report(&self, nodes: usize, pods: usize, elapsed: Duration) {
        info!(
            event = "report_built",
            scope = %self.scope,
            nodes = nodes,
            pods = pods,
            elapsed_ms = elapsed.as_millis() as u64,
            "Built node report"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_logger_keeps_scope() {
        let logger = ReportLogger::new("node/worker-1");
        assert_eq!(logger.scope(), "node/worker-1");

        // events are emitted without a subscriber installed
        logger.log_fetch(FetchSource::NodeMetrics, 3, Duration::from_millis(12));
        logger.log_unattributed(0);
        logger.log_unattributed(2);
        logger.log_report(3, 40, Duration::from_millis(80));
    }
}
