//! Pre-aggregated views over the scored table, console summary and CSV export

use std::collections::BTreeMap;
use std::fs::File;
use std::path::Path;

use polars::prelude::*;

use crate::error::Result;
use crate::model::{RfmAnalysis, ScoredCustomer};
use crate::segment::{LifecycleSegment, ValueTier};

/// Customers in one (tier, lifecycle segment) pair
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TierSegmentCount {
    pub tier: ValueTier,
    pub segment: LifecycleSegment,
    pub count: usize,
}

/// Mean R, F and M score of one lifecycle segment
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SegmentScoreMeans {
    pub segment: LifecycleSegment,
    pub customers: usize,
    pub r: f64,
    pub f: f64,
    pub m: f64,
}

/// Customers per value tier, Low to High, zero counts included
pub fn tier_counts(customers: &[ScoredCustomer]) -> Vec<(ValueTier, usize)> {
    ValueTier::ALL
        .iter()
        .map(|&tier| {
            let count = customers.iter().filter(|c| c.value_tier == tier).count();
            (tier, count)
        })
        .collect()
}

/// Customers per (tier, segment) pair present in the table, largest first
pub fn tier_segment_counts(customers: &[ScoredCustomer]) -> Vec<TierSegmentCount> {
    let mut counts: BTreeMap<(ValueTier, LifecycleSegment), usize> = BTreeMap::new();
    for customer in customers {
        *counts
            .entry((customer.value_tier, customer.lifecycle))
            .or_default() += 1;
    }

    let mut rows: Vec<TierSegmentCount> = counts
        .into_iter()
        .map(|((tier, segment), count)| TierSegmentCount {
            tier,
            segment,
            count,
        })
        .collect();
    // Stable sort keeps key order among equal counts
    rows.sort_by(|a, b| b.count.cmp(&a.count));
    rows
}

/// Mean scores per lifecycle segment present in the table, best segment first
pub fn segment_score_means(customers: &[ScoredCustomer]) -> Vec<SegmentScoreMeans> {
    let mut sums: BTreeMap<LifecycleSegment, (usize, u64, u64, u64)> = BTreeMap::new();
    for customer in customers {
        let entry = sums.entry(customer.lifecycle).or_default();
        entry.0 += 1;
        entry.1 += u64::from(customer.scores.r);
        entry.2 += u64::from(customer.scores.f);
        entry.3 += u64::from(customer.scores.m);
    }

    sums.into_iter()
        .map(|(segment, (n, r, f, m))| {
            let n_f = n as f64;
            SegmentScoreMeans {
                segment,
                customers: n,
                r: r as f64 / n_f,
                f: f as f64 / n_f,
                m: m as f64 / n_f,
            }
        })
        .collect()
}

/// Build the flat per-customer table
pub fn to_dataframe(customers: &[ScoredCustomer]) -> Result<DataFrame> {
    let ids: Vec<String> = customers.iter().map(|c| c.metrics.customer_id.clone()).collect();
    let recency: Vec<i64> = customers.iter().map(|c| c.metrics.recency).collect();
    let frequency: Vec<i64> = customers.iter().map(|c| c.metrics.frequency as i64).collect();
    let monetary: Vec<f64> = customers.iter().map(|c| c.metrics.monetary).collect();
    let r: Vec<i32> = customers.iter().map(|c| i32::from(c.scores.r)).collect();
    let f: Vec<i32> = customers.iter().map(|c| i32::from(c.scores.f)).collect();
    let m: Vec<i32> = customers.iter().map(|c| i32::from(c.scores.m)).collect();
    let codes: Vec<String> = customers.iter().map(|c| c.segment_code.clone()).collect();
    let scores: Vec<i32> = customers.iter().map(|c| i32::from(c.rfm_score)).collect();
    let tiers: Vec<&str> = customers.iter().map(|c| c.value_tier.label()).collect();
    let segments: Vec<&str> = customers.iter().map(|c| c.lifecycle.label()).collect();

    let df = df!(
        "CustomerID" => ids,
        "Recency" => recency,
        "Frequency" => frequency,
        "Monetary" => monetary,
        "R" => r,
        "F" => f,
        "M" => m,
        "RFM_Segment" => codes,
        "RFM_Score" => scores,
        "RFM_Segment_Labels" => tiers,
        "RFM_Customer_Segment" => segments
    )?;
    Ok(df)
}

/// Write one CSV row per customer, in table order
pub fn export_csv<P: AsRef<Path>>(customers: &[ScoredCustomer], output_path: P) -> Result<()> {
    let output_path = output_path.as_ref();
    let mut df = to_dataframe(customers)?;

    let mut file = File::create(output_path)?;
    CsvWriter::new(&mut file)
        .include_header(true)
        .finish(&mut df)?;

    log::info!(
        "stage=export rows={} path={}",
        df.height(),
        output_path.display()
    );
    Ok(())
}

/// Print the run summary to stdout
pub fn print_segment_report(analysis: &RfmAnalysis, verbose: bool) {
    let stats = &analysis.stats;
    let total = analysis.customers.len();

    println!("\n=== Data Summary ===");
    println!("Rows read: {}", stats.input_rows);
    println!("Rows kept: {} (dropped {})", stats.kept, stats.dropped());
    if verbose {
        println!("  Missing customer:     {}", stats.missing_customer);
        println!("  Duplicate invoice:    {}", stats.duplicate_invoice);
        println!("  Unparsable timestamp: {}", stats.unparsable_timestamp);
        println!("  Missing amount:       {}", stats.missing_amount);
    }
    println!("Reference date: {}", analysis.reference_date);
    println!("Customers: {}", total);

    if verbose {
        let bp = &analysis.breakpoints;
        println!("\nQuantile breakpoints:");
        println!("  Metric    |      Q25 |      Q50 |      Q75");
        println!("  ----------|----------|----------|---------");
        for (name, q) in [
            ("Recency", bp.recency),
            ("Frequency", bp.frequency),
            ("Monetary", bp.monetary),
        ] {
            println!("  {:9} | {:8.2} | {:8.2} | {:8.2}", name, q.q25, q.q50, q.q75);
        }
    }

    println!("\n=== Customers by Value Tier ===");
    for (tier, count) in tier_counts(&analysis.customers) {
        println!("  {:10}: {} customers ({:.1}%)", tier.label(), count, percentage(count, total));
    }

    println!("\n=== Customers by Tier and Segment ===");
    for row in tier_segment_counts(&analysis.customers) {
        println!("  {:10} / {:15}: {}", row.tier.label(), row.segment.label(), row.count);
    }

    println!("\n=== Mean Scores by Segment ===");
    println!("  Segment         | Customers |    R |    F |    M");
    println!("  ----------------|-----------|------|------|-----");
    for row in segment_score_means(&analysis.customers) {
        println!(
            "  {:15} | {:9} | {:4.2} | {:4.2} | {:4.2}",
            row.segment.label(),
            row.customers,
            row.r,
            row.f,
            row.m
        );
    }
}

fn percentage(count: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        count as f64 / total as f64 * 100.0
    }
}
