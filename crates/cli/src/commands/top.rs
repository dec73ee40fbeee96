//! The node report command

use anyhow::{anyhow, bail, Result};
use clap::ValueEnum;
use nodetop_lib::{CapacityKind, KubeMetricsSource, SortBy, TopOptions, DEFAULT_REQUEST_TIMEOUT};
use std::time::Duration;
use tracing::debug;

use crate::client;
use crate::config::{kubeconfig_paths, Config};
use crate::output::{print_report, OutputFormat};
use crate::Cli;

/// Merge flags over the configuration file and environment
pub fn top_options(cli: &Cli, config: &Config) -> Result<TopOptions> {
    let show_capacity = cli.show_capacity.or(config.show_capacity).unwrap_or(false);
    let request_timeout = match cli.request_timeout.or(config.request_timeout_secs) {
        Some(0) => bail!("request_timeout_secs in configuration must be at least 1"),
        Some(secs) => Duration::from_secs(secs),
        None => DEFAULT_REQUEST_TIMEOUT,
    };

    Ok(TopOptions {
        target: cli.name.clone(),
        label_selector: cli.selector.clone(),
        field_selector: cli.field_selector.clone(),
        sort_by: cli
            .sort_by
            .clone()
            .or_else(|| config.sort_by.clone())
            .unwrap_or_else(|| SortBy::default().to_string()),
        show_containers: cli.containers,
        all_namespaces: cli.all_namespaces,
        // filled from the kubeconfig context when empty
        namespace: cli
            .namespace
            .clone()
            .or_else(|| config.default_namespace.clone())
            .unwrap_or_default(),
        no_headers: cli.no_headers,
        use_protocol_buffers: cli.use_protocol_buffers,
        sum: cli.sum.or(config.sum).unwrap_or(true),
        capacity_kind: if show_capacity {
            CapacityKind::Capacity
        } else {
            CapacityKind::Allocatable
        },
        request_timeout,
    })
}

/// Output format from the flag, then the configuration
pub fn output_format(cli: &Cli, config: &Config) -> Result<OutputFormat> {
    if let Some(format) = cli.format {
        return Ok(format);
    }
    match config.default_format.as_deref() {
        Some(name) => OutputFormat::from_str(name, true)
            .map_err(|_| anyhow!("Unknown output format {:?} in configuration", name)),
        None => Ok(OutputFormat::default()),
    }
}

/// Build and print the report
pub async fn execute(cli: &Cli) -> Result<()> {
    let config = Config::load()?;
    let mut options = top_options(cli, &config)?;
    let format = output_format(cli, &config)?;

    // usage errors are reported before the kubeconfig is read
    options.validate()?;

    let paths = kubeconfig_paths(cli.kubeconfig.as_deref())?;
    let connection =
        client::connect(&paths, cli.context.as_deref(), options.request_timeout).await?;
    if options.namespace.is_empty() {
        options.namespace = connection.namespace;
    }
    debug!(?options, "Running node report");

    let source = KubeMetricsSource::new(connection.client);
    let report = nodetop_lib::run(&source, &options).await?;
    print_report(&report, format)
}
