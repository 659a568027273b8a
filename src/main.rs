use anyhow::{Context, Result};
use chrono::Local;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use std::{fs, path::PathBuf};

use sellerdash::{config::Config, run, RunSummary};

/// Turn a directory of Amazon seller CSV exports into an Excel dashboard.
#[derive(Debug, Parser)]
#[command(name = "sellerdash", version, about)]
struct Args {
    /// Directory to scan for CSV exports
    #[arg(long, default_value = ".", value_name = "DIR")]
    source: PathBuf,

    /// Where to write the workbook [default: output/Amazon_Dashboard_<timestamp>.xlsx]
    #[arg(long, value_name = "FILE")]
    output: Option<PathBuf>,

    /// Days of stock below which a product is at stockout risk
    #[arg(long, default_value_t = 7.0, value_name = "DAYS")]
    stockout_days: f64,

    /// Days of stock above which a product is overstocked
    #[arg(long, default_value_t = 30.0, value_name = "DAYS")]
    overstock_days: f64,

    /// Profit margin (as a ratio of revenue) below which a product is flagged
    #[arg(long, default_value_t = 0.15, value_name = "RATIO")]
    low_margin: f64,

    /// Average review rating below which a product is flagged
    #[arg(long, default_value_t = 3.0, value_name = "STARS")]
    low_rating: f64,

    /// Do not flag products with ad spend but no attributed orders
    #[arg(long)]
    no_wasted_spend: bool,

    /// How many products the dashboard's top-performers table shows
    #[arg(long, default_value_t = 10, value_name = "N")]
    top_n: usize,

    /// Print the run summary as JSON on stdout
    #[arg(long)]
    json: bool,

    /// Log more detail to stderr
    #[arg(long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let default_level = if args.verbose {
        "sellerdash=debug"
    } else {
        "sellerdash=info"
    };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(env_filter)
        .init();

    let config = Config {
        stockout_days: args.stockout_days,
        overstock_days: args.overstock_days,
        low_margin: args.low_margin,
        low_rating: args.low_rating,
        wasted_spend: !args.no_wasted_spend,
        top_n: args.top_n,
    };

    let output = args.output.unwrap_or_else(default_output);
    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating output directory {}", parent.display()))?;
    }

    let summary = run(&args.source, &output, &config)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        print_summary(&summary);
    }
    Ok(())
}

fn default_output() -> PathBuf {
    let stamp = Local::now().format("%Y%m%d_%H%M%S");
    PathBuf::from("output").join(format!("Amazon_Dashboard_{stamp}.xlsx"))
}

fn print_summary(summary: &RunSummary) {
    println!(
        "Files: {} matched, {} loaded, {} skipped, {} failed",
        summary.files_matched,
        summary.files_loaded,
        summary.files_skipped.len(),
        summary.load_failures.len(),
    );
    for path in &summary.files_skipped {
        println!("  skipped (no category): {}", path.display());
    }
    for failure in &summary.load_failures {
        println!(
            "  failed ({}): {}: {}",
            failure.category,
            failure.path.display(),
            failure.reason
        );
    }
    println!(
        "Rows: {} loaded, {} field warning(s)",
        summary.rows_loaded, summary.row_warnings
    );
    println!("Products: {}", summary.products);
    println!(
        "Alerts: {} critical, {} warning, {} info",
        summary.alerts.critical, summary.alerts.warning, summary.alerts.info
    );
    println!("Dashboard saved to {}", summary.output.display());
}
