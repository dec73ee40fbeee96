//! nodetop CLI
//!
//! Shows live pod resource usage grouped by the node each pod runs on,
//! next to the node's own usage and its allocatable or capacity figures.

mod client;
mod commands;
mod config;
mod logging;
mod output;

use clap::{ArgAction, Parser};
use std::process::ExitCode;

use crate::logging::LogFormat;
use crate::output::{print_error, OutputFormat};

/// Per-node pod resource usage
#[derive(Parser, Debug)]
#[command(name = "nodetop")]
#[command(author, version, about = "Show pod resource usage grouped by node", long_about = None)]
pub struct Cli {
    /// Only report on this node
    pub name: Option<String>,

    /// Node label selector (e.g. -l role=worker)
    #[arg(short = 'l', long, default_value = "")]
    pub selector: String,

    /// Node field selector (e.g. --field-selector metadata.name!=master)
    #[arg(long, default_value = "")]
    pub field_selector: String,

    /// Sort pods by cpu or memory [default: memory]
    #[arg(long)]
    pub sort_by: Option<String>,

    /// Show one row per container
    #[arg(long)]
    pub containers: bool,

    /// Read pod metrics from every namespace
    #[arg(
        short = 'A',
        long,
        default_value_t = true,
        num_args = 0..=1,
        require_equals = true,
        default_missing_value = "true",
        action = ArgAction::Set
    )]
    pub all_namespaces: bool,

    /// Namespace of pod metrics when --all-namespaces=false
    #[arg(short = 'n', long)]
    pub namespace: Option<String>,

    /// Print tables without headers
    #[arg(long)]
    pub no_headers: bool,

    /// Request protocol buffers from the metrics API (metrics are always read as JSON)
    #[arg(long)]
    pub use_protocol_buffers: bool,

    /// Print the per-node usage sum [default: true]
    #[arg(
        long,
        num_args = 0..=1,
        require_equals = true,
        default_missing_value = "true",
        action = ArgAction::Set
    )]
    pub sum: Option<bool>,

    /// Compare usage with node capacity instead of allocatable [default: false]
    #[arg(
        long,
        num_args = 0..=1,
        require_equals = true,
        default_missing_value = "true",
        action = ArgAction::Set
    )]
    pub show_capacity: Option<bool>,

    /// Path to kubeconfig file (uses default if not specified)
    #[arg(long, env = "KUBECONFIG")]
    pub kubeconfig: Option<String>,

    /// Kubeconfig context to use
    #[arg(long)]
    pub context: Option<String>,

    /// Seconds to wait for each API request [default: 30]
    #[arg(long, value_name = "SECONDS", value_parser = clap::value_parser!(u64).range(1..))]
    pub request_timeout: Option<u64>,

    /// Output format
    #[arg(long, short = 'o')]
    pub format: Option<OutputFormat>,

    /// Enable verbose output
    #[arg(long, short)]
    pub verbose: bool,

    /// Log line format on stderr
    #[arg(long, default_value = "text")]
    pub log_format: LogFormat,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::init(cli.verbose, cli.log_format);

    match commands::top::execute(&cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            print_error(&format!("{:#}", err));
            ExitCode::FAILURE
        }
    }
}
