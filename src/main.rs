use anyhow::{Context, Result};
use clap::Parser;
use graphtrace::agent::Agent;
use graphtrace::cli::{Cli, OutputFormat};
use graphtrace::config::AgentConfig;
use graphtrace::metrics::{self, AggregatedMetrics, MetricKind};
use graphtrace::node_id::NodeIdGenerator;
use graphtrace::replay;
use graphtrace::trace::TraceRecord;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Initialize tracing subscriber for debug output
fn init_tracing(debug: bool) {
    if debug {
        tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::from_default_env().add_directive(tracing::Level::TRACE.into()),
            )
            .with_writer(std::io::stderr)
            .init();
    }
}

/// Load config file (if any) and apply CLI overrides
fn build_config(args: &Cli) -> Result<AgentConfig> {
    let mut config = match &args.config {
        Some(path) => AgentConfig::from_toml(path)?,
        None => AgentConfig::default(),
    };

    if let Some(force_every) = args.force_every {
        config.outliers.force_every = force_every;
    }
    if let Some(archive_size) = args.archive_size {
        config.outliers.archive_size = archive_size;
    }
    if let Some(max_z_score) = args.max_z_score {
        config.outliers.max_z_score = max_z_score;
    }

    Ok(config)
}

/// Reported values per identity, keyed by metric wire name
fn formatted_metrics(
    aggregated: &AggregatedMetrics,
) -> BTreeMap<String, BTreeMap<&'static str, f64>> {
    aggregated
        .iter()
        .map(|(identity, metric_map)| {
            let values = metric_map
                .iter()
                .map(|(kind, acc)| (kind.wire_name(), metrics::format(*kind, acc)))
                .collect();
            (identity.clone(), values)
        })
        .collect()
}

fn print_text(requests: usize, aggregated: &AggregatedMetrics, outliers: &[TraceRecord]) {
    println!("=== Aggregated Metrics ({} requests) ===", requests);
    for (identity, metric_map) in aggregated.iter() {
        let name = if identity.is_empty() {
            "<unidentified>"
        } else {
            identity.as_str()
        };
        let time = metric_map
            .get(MetricKind::Time)
            .map_or(0.0, |acc| metrics::format(MetricKind::Time, acc));
        let count = metric_map
            .get(MetricKind::Count)
            .map_or(0.0, |acc| metrics::format(MetricKind::Count, acc));
        println!("  {}: avg {:.2} ms, {} calls", name, time, count);
    }
    println!();

    println!("=== Outlier Traces ({}) ===", outliers.len());
    for (i, trace) in outliers.iter().enumerate() {
        let path = if trace.path.is_empty() {
            "<top level>".to_string()
        } else {
            trace
                .path
                .iter()
                .map(|entry| entry.name.as_str())
                .collect::<Vec<_>>()
                .join(" > ")
        };
        println!(
            "  {}. {} - {:.2} ms (path: {})",
            i + 1,
            trace.name,
            trace.time,
            path
        );
    }
}

fn print_json(
    requests: usize,
    aggregated: &AggregatedMetrics,
    outliers: &[TraceRecord],
) -> Result<()> {
    let report = serde_json::json!({
        "requests": requests,
        "metrics": formatted_metrics(aggregated),
        "outliers": outliers,
    });
    let rendered =
        serde_json::to_string_pretty(&report).context("Failed to serialize JSON report")?;
    println!("{}", rendered);
    Ok(())
}

fn main() -> Result<()> {
    let args = Cli::parse();

    if args.window == 0 {
        anyhow::bail!("Invalid value for --window: 0 (must be >= 1)");
    }

    init_tracing(args.debug);

    let config = build_config(&args)?;
    let requests = replay::load_requests(&args.input)?;

    let agent = Agent::new(config)?;
    let ids = Arc::new(NodeIdGenerator::new());
    let mut aggregated = AggregatedMetrics::new();
    let mut outliers = Vec::new();

    for (i, request) in requests.iter().enumerate() {
        let tree = request.build_tree(Arc::clone(&ids))?;
        let tree_metrics = agent
            .process_tree(&tree)
            .with_context(|| format!("Failed to process request {}", i))?;
        aggregated.merge(&tree_metrics);

        if (i + 1) % args.window == 0 {
            outliers.extend(agent.flush());
        }
    }
    if requests.len() % args.window != 0 {
        outliers.extend(agent.flush());
    }

    match args.format {
        OutputFormat::Text => print_text(requests.len(), &aggregated, &outliers),
        OutputFormat::Json => print_json(requests.len(), &aggregated, &outliers)?,
    }

    Ok(())
}
