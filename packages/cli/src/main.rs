#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! CLI entry point for postcode clustering.
//!
//! Loads records from a CSV file, resolves their postcodes through the
//! selected lookup service and prints the resulting clusters.
//!
//! Uses `indicatif-log-bridge` (via [`postcode_cluster_cli_utils::init_logger`])
//! to route `log` output through `indicatif::MultiProgress` so that log
//! lines and the lookup bar never fight for the terminal.

use std::path::PathBuf;
use std::time::Instant;

use clap::Parser;
use postcode_cluster_analysis::{
    PipelineOptions, PipelineResult, records::load_csv, records_with_unresolved_codes,
    run_pipeline,
};
use postcode_cluster_cli_utils::IndicatifProgress;
use postcode_cluster_geocoder::service_registry::{enabled_services, find_service, locator_for};
use postcode_cluster_spatial::haversine::spread_km;

#[derive(Parser)]
#[command(
    name = "postcode_cluster",
    about = "Group records into geographic clusters by postcode"
)]
struct Cli {
    /// CSV file with a `postal` column
    csv: PathBuf,
    /// Lookup service id (e.g., "`postcodes_io`", "`fixed_table`")
    #[arg(long, default_value = "postcodes_io")]
    service: String,
    /// Number of centroids to seed
    #[arg(long, default_value = "5")]
    clusters: usize,
    /// Maximum K-means iterations
    #[arg(long, default_value = "25")]
    iterations: usize,
    /// Seed for centroid placement (random when omitted)
    #[arg(long)]
    seed: Option<u64>,
    /// Lookup batches in flight at once (defaults to the service config)
    #[arg(long)]
    concurrency: Option<usize>,
    /// Skip the per-cluster place name lookup
    #[arg(long)]
    no_place_names: bool,
    /// Print the full result as JSON instead of a table
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let multi = postcode_cluster_cli_utils::init_logger();
    let cli = Cli::parse();

    let Some(service) = find_service(&cli.service) else {
        let known: Vec<String> = enabled_services().into_iter().map(|s| s.id).collect();
        return Err(format!(
            "Unknown service '{}' (available: {})",
            cli.service,
            known.join(", ")
        )
        .into());
    };
    let locator = locator_for(&service)?;

    let records = load_csv(&cli.csv)?;

    let options = PipelineOptions {
        cluster_count: cli.clusters,
        max_iterations: cli.iterations,
        seed: cli.seed,
        resolve_place_names: !cli.no_place_names,
        concurrent_batches: cli
            .concurrency
            .unwrap_or_else(|| service.concurrent_batches()),
        ..PipelineOptions::default()
    };

    let cancel = options.cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::warn!("Interrupted; stopping after the current iteration");
            cancel.cancel();
        }
    });

    let progress = if cli.json {
        IndicatifProgress::hidden()
    } else {
        IndicatifProgress::lookup_bar(&multi, &format!("Looking up postcodes via {}", service.name))
    };

    let start = Instant::now();
    let result = match run_pipeline(&records, locator.as_ref(), &options, &progress).await {
        Ok(result) => result,
        Err(e) => {
            if let Some(partial) = e.partial_result() {
                if cli.json {
                    println!("{}", serde_json::to_string_pretty(partial)?);
                } else {
                    print_summary(partial, records_with_unresolved_codes(&records, partial).len());
                }
            }
            return Err(e.into());
        }
    };
    log::info!("Pipeline finished in {:.1}s", start.elapsed().as_secs_f64());

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print_summary(&result, records_with_unresolved_codes(&records, &result).len());
    }

    Ok(())
}

fn print_summary(result: &PipelineResult, unresolved_records: usize) {
    println!();
    println!(
        "{:<4} {:<12} {:<24} {:>9} {:>8} {:>11} {:>11} {:>10}",
        "#", "CENTRE", "PLACE", "POSTCODES", "RECORDS", "LATITUDE", "LONGITUDE", "SPREAD KM"
    );
    println!("{}", "-".repeat(96));
    for (i, cluster) in result.clusters.iter().enumerate() {
        println!(
            "{:<4} {:<12} {:<24} {:>9} {:>8} {:>11.5} {:>11.5} {:>10.1}",
            i + 1,
            cluster.representative_code,
            cluster.representative_place_name.as_deref().unwrap_or("-"),
            cluster.postcode_count(),
            cluster.record_count(),
            cluster.centroid_latitude,
            cluster.centroid_longitude,
            spread_km(cluster),
        );
    }
    println!();

    println!(
        "Resolved {} of {} postcodes in {} iterations (converged: {})",
        result.resolved_count(),
        result.locations.len(),
        result.iterations,
        result.converged,
    );

    if result.unresolved_count() > 0 {
        println!(
            "{} postcodes ({unresolved_records} records) could not be located: {}",
            result.unresolved_count(),
            result.unresolved_codes().join(", ")
        );
    }
    for failure in &result.failed_batches {
        println!(
            "Batch {} ({} postcodes) failed: {}",
            failure.batch_index,
            failure.codes.len(),
            failure.message
        );
    }
}
