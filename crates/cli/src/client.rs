//! Kubernetes client construction

use anyhow::{Context, Result};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Client, Config};
use std::path::PathBuf;
use std::time::Duration;
use tracing::debug;

/// A client plus the namespace its kubeconfig context selects
pub struct Connection {
    pub client: Client,
    pub namespace: String,
}

/// Read and merge the kubeconfig files
fn read_kubeconfig(paths: &[PathBuf]) -> Result<Kubeconfig> {
    let mut merged: Option<Kubeconfig> = None;
    for path in paths {
        let next = Kubeconfig::read_from(path)
            .with_context(|| format!("Failed to read kubeconfig {}", path.display()))?;
        merged = Some(match merged {
            Some(current) => current
                .merge(next)
                .with_context(|| format!("Failed to merge kubeconfig {}", path.display()))?,
            None => next,
        });
    }
    merged.context("No kubeconfig file given")
}

/// Connect using the given kubeconfig files and optional context
pub async fn connect(
    kubeconfig: &[PathBuf],
    context: Option<&str>,
    request_timeout: Duration,
) -> Result<Connection> {
    let kubeconfig = read_kubeconfig(kubeconfig)?;
    let options = KubeConfigOptions {
        context: context.map(String::from),
        ..Default::default()
    };

    let mut config = Config::from_custom_kubeconfig(kubeconfig, &options)
        .await
        .with_context(|| match context {
            Some(name) => format!("Failed to load kubeconfig for context '{}'", name),
            None => "Failed to load kubeconfig".to_string(),
        })?;
    config.read_timeout = Some(request_timeout);

    let namespace = config.default_namespace.clone();
    debug!(cluster = %config.cluster_url, namespace = %namespace, "Connecting to cluster");

    let client = Client::try_from(config).context("Failed to create Kubernetes client")?;
    Ok(Connection { client, namespace })
}
