//! `trueno-sweep` command line: run a sweep file and report the results.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing::{info, warn};
use trueno_sweep::config::SweepFile;
use trueno_sweep::sweep::cancellation;
use trueno_sweep::table::{sum_of, ResultTable};

#[derive(Parser, Debug)]
#[command(name = "trueno-sweep")]
#[command(about = "Run an external simulator over a parameter sweep and collect its statistics")]
struct Cli {
    /// Sweep description (JSON)
    sweep: PathBuf,

    /// Worker-pool size (overrides the sweep file)
    #[arg(long)]
    workers: Option<usize>,

    /// Per-run timeout in milliseconds (overrides the sweep file)
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// Parameter to group by for per-group reports
    #[arg(long, requires = "metric")]
    group_by: Option<String>,

    /// Metric maximized in per-group reports
    #[arg(long)]
    metric: Option<String>,

    /// Report the cheapest configuration within this fraction of each group's best
    #[arg(long, requires = "group_by")]
    threshold: Option<f64>,

    /// Parameters summed into the cost of a configuration
    #[arg(long, value_delimiter = ',')]
    cost: Vec<String>,

    /// Print rows as JSON lines
    #[arg(long)]
    json: bool,

    /// Log per-configuration progress
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let mut file = SweepFile::load(&cli.sweep)
        .with_context(|| format!("failed to load sweep file {}", cli.sweep.display()))?;
    if cli.workers.is_some() {
        file.workers = cli.workers;
    }
    if cli.timeout_ms.is_some() {
        file.timeout_ms = cli.timeout_ms;
    }
    let sweep = file.into_sweep().context("invalid sweep")?;

    let (canceller, signal) = cancellation();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted, cancelling sweep");
            canceller.cancel();
        }
    });

    info!(sweep = %cli.sweep.display(), "running");
    let table = sweep.run_until_cancelled(signal).await;

    print_rows(&table, cli.json)?;
    if let (Some(group), Some(metric)) = (&cli.group_by, &cli.metric) {
        print_groups(&table, group, metric, cli.threshold, &cli.cost)?;
    }
    eprintln!("{}", table.summary());
    Ok(())
}

fn print_rows(table: &ResultTable, json: bool) -> Result<()> {
    if json {
        for row in table.to_json_rows() {
            println!("{}", serde_json::to_string(&row)?);
        }
        return Ok(());
    }

    let metric_names = table.metric_names();
    let header: Vec<&str> = table
        .parameter_names()
        .iter()
        .chain(&metric_names)
        .map(String::as_str)
        .chain(["status"])
        .collect();
    println!("{}", header.join("\t"));

    for row in table.rows() {
        let cells: Vec<String> = row
            .values
            .iter()
            .map(ToString::to_string)
            .chain(
                row.metrics
                    .iter()
                    .map(|m| m.map_or_else(|| "-".to_string(), |v| v.to_string())),
            )
            .chain([row.status.to_string()])
            .collect();
        println!("{}", cells.join("\t"));
    }
    Ok(())
}

fn print_groups(
    table: &ResultTable,
    group: &str,
    metric: &str,
    threshold: Option<f64>,
    cost: &[String],
) -> Result<()> {
    println!();
    println!("best {metric} by {group}:");
    for (key, best) in table.group_max(table.param_key(group)?, metric) {
        println!("  {key}\t{:.4}\t{}", best.value, best.configuration);
    }

    let Some(fraction) = threshold else {
        return Ok(());
    };
    println!();
    println!(
        "cheapest within {:.1}% of best (cost: {}):",
        fraction * 100.0,
        if cost.is_empty() { "none".to_string() } else { cost.join("+") }
    );
    let selections = table.select_min_cost(table.param_key(group)?, metric, fraction, sum_of(cost))?;
    for (key, pick) in selections {
        println!(
            "  {key}\t{:.4}\tcost {}\t{}",
            pick.candidate.value, pick.cost, pick.candidate.configuration
        );
    }
    Ok(())
}
