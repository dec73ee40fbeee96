//! Output formatting utilities

use anyhow::Result;
use clap::ValueEnum;
use colored::Colorize;
use nodetop_lib::{
    container_rows, DisplayOptions, NodeReport, Quantity, QuantityError, ResourceSet, TopReport,
};
use std::fmt::Write;
use tabled::{builder::Builder, settings::Style, Tabled};

/// Output format for the report
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Table format (default)
    #[default]
    Table,
    /// JSON format
    Json,
}

/// Shown where a figure was not reported
const UNKNOWN: &str = "<unknown>";

/// Row of the node table
#[derive(Tabled)]
struct NodeRow {
    #[tabled(rename = "NAME")]
    name: String,
    #[tabled(rename = "CPU(cores)")]
    cpu: String,
    #[tabled(rename = "CPU%")]
    cpu_percent: String,
    #[tabled(rename = "MEMORY(bytes)")]
    memory: String,
    #[tabled(rename = "MEMORY%")]
    memory_percent: String,
}

impl NodeRow {
    fn new(report: &NodeReport) -> Self {
        let usage = report.metrics.as_ref().map(|m| &m.usage);
        let available = report.capacity.as_ref().map(|c| &c.resources);

        Self {
            name: report.node.to_string(),
            cpu: usage.map_or_else(|| UNKNOWN.to_string(), |u| format_cpu(u.cpu())),
            cpu_percent: format_percent(
                usage.and_then(ResourceSet::cpu),
                available.and_then(ResourceSet::cpu),
            ),
            memory: usage.map_or_else(|| UNKNOWN.to_string(), |u| format_memory(u.memory())),
            memory_percent: format_percent(
                usage.and_then(ResourceSet::memory),
                available.and_then(ResourceSet::memory),
            ),
        }
    }
}

/// Render rows of a `Tabled` type without borders
fn render_rows<T: Tabled>(rows: &[T], no_headers: bool) -> String {
    let mut builder = Builder::default();
    if !no_headers {
        builder.push_record(T::headers().into_iter().map(|h| h.into_owned()));
    }
    for row in rows {
        builder.push_record(row.fields().into_iter().map(|f| f.into_owned()));
    }
    builder.build().with(Style::blank()).to_string()
}

/// Render the pod table of one node, with the sum row when requested
fn render_pods(report: &NodeReport, display: &DisplayOptions) -> Result<String, QuantityError> {
    let mut header = Vec::new();
    if display.all_namespaces {
        header.push("NAMESPACE");
    }
    if display.show_containers {
        header.extend(["POD", "NAME"]);
    } else {
        header.push("NAME");
    }
    header.extend(["CPU(cores)", "MEMORY(bytes)"]);

    let mut builder = Builder::default();
    if !display.no_headers {
        builder.push_record(header.iter().map(|h| h.to_string()));
    }

    let mut push = |namespace: &str, pod: &str, container: Option<&str>, usage: &ResourceSet| {
        let mut record = Vec::new();
        if display.all_namespaces {
            record.push(namespace.to_string());
        }
        record.push(pod.to_string());
        if let Some(container) = container {
            record.push(container.to_string());
        }
        record.push(format_cpu(usage.cpu()));
        record.push(format_memory(usage.memory()));
        builder.push_record(record);
    };

    if display.show_containers {
        for row in container_rows(report, display.sort_by) {
            push(&row.pod.namespace, &row.pod.name, Some(row.container.as_str()), &row.usage);
        }
    } else {
        for pod in &report.pods {
            let total = pod.total()?;
            push(&pod.pod.namespace, &pod.pod.name, None, &total);
        }
    }

    if let Some(sum) = report.sum.as_ref().filter(|_| display.sum) {
        let padding = header.len() - 2;
        let mut separator = vec![String::new(); padding];
        separator.extend(["________".to_string(), "________".to_string()]);
        builder.push_record(separator);

        let mut totals = vec![String::new(); padding];
        totals.push(format_cpu(sum.cpu()));
        totals.push(format_memory(sum.memory()));
        builder.push_record(totals);
    }

    Ok(builder.build().with(Style::blank()).to_string())
}

/// Render the whole report as text
pub fn render_report(report: &TopReport) -> Result<String> {
    let mut out = String::new();
    for (index, node) in report.nodes.iter().enumerate() {
        let title = format!("{}. Node ({})", index + 1, node.node);
        let _ = writeln!(out, "{}", title.bold());
        let _ = writeln!(out, "{}", "=".repeat(46));
        let _ = writeln!(out);
        let _ = writeln!(
            out,
            "{}",
            render_rows(&[NodeRow::new(node)], report.display.no_headers)
        );
        let _ = writeln!(out);
        let _ = writeln!(out, "{}", "Pods".bold());
        let _ = writeln!(out, "====");
        let _ = writeln!(out);
        if node.pods.is_empty() {
            let _ = writeln!(out, "{}", "No pod metrics found".yellow());
        } else {
            let _ = writeln!(out, "{}", render_pods(node, &report.display)?);
        }
        let _ = writeln!(out);
    }
    Ok(out)
}

/// Print the report in the requested format
pub fn print_report(report: &TopReport, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(report)?;
            println!("{}", json);
        }
        OutputFormat::Table => {
            if report.is_empty() {
                print_warning("No resources found");
                return Ok(());
            }
            print!("{}", render_report(report)?);
        }
    }
    Ok(())
}

/// Print an error message
pub fn print_error(message: &str) {
    eprintln!("{} {}", "error:".red().bold(), message);
}

/// Print a warning message
pub fn print_warning(message: &str) {
    eprintln!("{} {}", "⚠".yellow().bold(), message);
}

/// Format CPU as millicores
pub fn format_cpu(quantity: Option<&Quantity>) -> String {
    match quantity {
        Some(q) => format!("{}m", q.milli_value()),
        None => "0m".to_string(),
    }
}

/// Format memory as mebibytes
pub fn format_memory(quantity: Option<&Quantity>) -> String {
    const MIB: i128 = 1024 * 1024;
    match quantity {
        Some(q) => format!("{}Mi", q.value() / MIB),
        None => "0Mi".to_string(),
    }
}

/// Usage as a percentage of the node figure
pub fn format_percent(usage: Option<&Quantity>, available: Option<&Quantity>) -> String {
    match (usage, available) {
        (Some(used), Some(total)) if !total.is_zero() => {
            format!("{}%", used.milli_value() * 100 / total.milli_value())
        }
        _ => UNKNOWN.to_string(),
    }
}
