//! RfmForge: Customer Segmentation CLI using quantile-based RFM scoring
//!
//! This is the main entrypoint that orchestrates data loading, scoring,
//! reporting, visualization and export.

use anyhow::{Context, Result};
use clap::Parser;
use rfmforge::{
    export_csv, generate_chart_report, load_transactions, report, run_pipeline, Args,
    CustomerMetrics, RfmAnalysis, ScoredCustomer,
};
use std::time::Instant;

fn main() -> Result<()> {
    // Parse command-line arguments
    let args = Args::parse();

    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(args.default_log_filter()),
    )
    .init();

    if args.verbose {
        println!("RfmForge - Customer Segmentation using RFM scoring");
        println!("==================================================\n");
    }

    // Check if in scoring mode
    if let Some(rfm_values) = args.parse_rfm_values()? {
        run_scoring_mode(&args, rfm_values)?;
    } else {
        run_full_pipeline(&args)?;
    }

    Ok(())
}

fn analyze(args: &Args) -> Result<RfmAnalysis> {
    log::debug!("Loading transactions from: {}", args.input.display());
    let records = load_transactions(&args.input, &args.column_map())
        .with_context(|| format!("failed to load {}", args.input.display()))?;

    let options = args.pipeline_options()?;
    let analysis = run_pipeline(records, &options).context("RFM analysis failed")?;
    Ok(analysis)
}

/// Score a single hypothetical customer against the breakpoints of the loaded data
fn run_scoring_mode(args: &Args, rfm_values: (f64, f64, f64)) -> Result<()> {
    println!("=== Scoring Mode ===");
    println!(
        "Input RFM values: R={}, F={}, M={}",
        rfm_values.0, rfm_values.1, rfm_values.2
    );

    let start_time = Instant::now();
    let analysis = analyze(args)?;

    let scores = analysis
        .breakpoints
        .score(rfm_values.0, rfm_values.1, rfm_values.2);
    let customer = ScoredCustomer::new(
        CustomerMetrics {
            customer_id: "input".to_string(),
            recency: rfm_values.0.round() as i64,
            frequency: rfm_values.1.max(0.0).round() as usize,
            monetary: rfm_values.2,
        },
        scores,
    );

    let elapsed = start_time.elapsed();

    println!("\n✓ Scores: R={}, F={}, M={}", scores.r, scores.f, scores.m);
    println!("  Segment code: {}", customer.segment_code);
    println!("  RFM score: {}", customer.rfm_score);
    println!("  Value tier: {}", customer.value_tier);
    println!("  Lifecycle segment: {}", customer.lifecycle);
    println!("  Processing time: {:.2}s", elapsed.as_secs_f64());

    let peers = analysis
        .customers
        .iter()
        .filter(|c| c.lifecycle == customer.lifecycle)
        .count();
    println!(
        "\n{} existing customers share this segment ({:.1}% of {})",
        peers,
        peers as f64 / analysis.customers.len() as f64 * 100.0,
        analysis.customers.len()
    );

    Ok(())
}

/// Run full segmentation pipeline
fn run_full_pipeline(args: &Args) -> Result<()> {
    println!("=== Full RFM Pipeline ===\n");

    let start_time = Instant::now();

    // Step 1-4: load, clean, aggregate, score, classify
    let analysis = analyze(args)?;
    println!("✓ Scored {} customers", analysis.customers.len());
    if args.verbose {
        println!("  Analysis time: {:.2}s", start_time.elapsed().as_secs_f64());
    }

    report::print_segment_report(&analysis, args.verbose);

    // Step 5: charts
    if args.no_charts {
        log::info!("Chart rendering disabled");
    } else {
        let viz_start = Instant::now();
        let charts = generate_chart_report(&analysis, &args.chart_dir)
            .context("failed to render charts")?;
        println!("\n✓ Visualizations generated");
        for path in &charts {
            println!("  {}", path.display());
        }
        if args.verbose {
            println!("  Visualization time: {:.2}s", viz_start.elapsed().as_secs_f64());
        }
    }

    // Step 6: export
    export_csv(&analysis.customers, &args.output)
        .with_context(|| format!("failed to write {}", args.output.display()))?;

    let total_time = start_time.elapsed();
    println!("\n=== Pipeline Complete ===");
    println!("Total processing time: {:.2}s", total_time.as_secs_f64());
    println!("Customer table saved to: {}", args.output.display());

    Ok(())
}
