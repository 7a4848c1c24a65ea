//! Visualization functions using Plotters for segment analysis

use std::path::{Path, PathBuf};

use plotters::prelude::*;

use crate::model::RfmAnalysis;
use crate::report::{
    segment_score_means, tier_counts, tier_segment_counts, SegmentScoreMeans, TierSegmentCount,
};
use crate::segment::ValueTier;

/// Bar colors per value tier, Low to High
static TIER_COLORS: [RGBColor; 3] = [
    RGBColor(251, 180, 174),
    RGBColor(179, 205, 227),
    RGBColor(204, 235, 197),
];

/// Recency, Frequency and Monetary bar colors
static SCORE_COLORS: [RGBColor; 3] = [
    RGBColor(158, 202, 225),
    RGBColor(94, 158, 217),
    RGBColor(32, 102, 148),
];

/// Slots per group in the grouped score chart: three bars and a gap
const GROUP_WIDTH: u32 = 4;

pub const TIER_CHART: &str = "rfm_tiers.png";
pub const TIER_SEGMENT_CHART: &str = "rfm_tier_segments.png";
pub const SEGMENT_SCORE_CHART: &str = "rfm_segment_scores.png";

fn tier_color(tier: ValueTier) -> &'static RGBColor {
    match tier {
        ValueTier::Low => &TIER_COLORS[0],
        ValueTier::Mid => &TIER_COLORS[1],
        ValueTier::High => &TIER_COLORS[2],
    }
}

/// Upper bound of a count axis with some headroom
fn count_axis_max(max: usize) -> u32 {
    let max = max as u32;
    max + max / 10 + 1
}

/// Bar chart of customers per value tier
///
/// # Arguments
/// * `counts` - Tier counts, as produced by [`tier_counts`]
/// * `output_path` - Path to save the PNG plot
pub fn create_tier_chart(counts: &[(ValueTier, usize)], output_path: &Path) -> crate::Result<()> {
    let max_count = counts.iter().map(|(_, count)| *count).max().unwrap_or(0);
    let names: Vec<&str> = counts.iter().map(|(tier, _)| tier.label()).collect();

    let root = BitMapBackend::new(output_path, (800, 600)).into_drawing_area();
    root.fill(&WHITE)?;

    let mut chart = ChartBuilder::on(&root)
        .caption("Customer Distribution by RFM Segment", ("sans-serif", 30))
        .margin(10)
        .x_label_area_size(50)
        .y_label_area_size(60)
        .build_cartesian_2d(
            (0u32..counts.len() as u32).into_segmented(),
            0u32..count_axis_max(max_count),
        )?;

    chart
        .configure_mesh()
        .disable_x_mesh()
        .x_desc("RFM Segment")
        .y_desc("Number of Customers")
        .axis_desc_style(("sans-serif", 15))
        .x_label_formatter(&|value| segment_label(value, &names))
        .draw()?;

    chart.draw_series(counts.iter().enumerate().map(|(idx, (tier, count))| {
        let x = idx as u32;
        Rectangle::new(
            [
                (SegmentValue::Exact(x), 0),
                (SegmentValue::Exact(x + 1), *count as u32),
            ],
            tier_color(*tier).filled(),
        )
    }))?;

    root.present()?;
    log::info!("Tier chart saved to: {}", output_path.display());

    Ok(())
}

/// Bar chart of customers per (tier, lifecycle segment) pair, colored by tier
pub fn create_tier_segment_chart(
    rows: &[TierSegmentCount],
    output_path: &Path,
) -> crate::Result<()> {
    let max_count = rows.iter().map(|row| row.count).max().unwrap_or(0);
    let names: Vec<String> = rows
        .iter()
        .map(|row| format!("{} / {}", row.tier.label(), row.segment.label()))
        .collect();
    let names: Vec<&str> = names.iter().map(String::as_str).collect();

    let root = BitMapBackend::new(output_path, (1000, 600)).into_drawing_area();
    root.fill(&WHITE)?;

    let mut chart = ChartBuilder::on(&root)
        .caption("RFM Customer Segments by Value", ("sans-serif", 30))
        .margin(10)
        .x_label_area_size(60)
        .y_label_area_size(60)
        .build_cartesian_2d(
            (0u32..rows.len() as u32).into_segmented(),
            0u32..count_axis_max(max_count),
        )?;

    chart
        .configure_mesh()
        .disable_x_mesh()
        .x_labels(rows.len())
        .x_desc("Value Tier / Lifecycle Segment")
        .y_desc("Number of Customers")
        .axis_desc_style(("sans-serif", 15))
        .x_label_style(("sans-serif", 11))
        .x_label_formatter(&|value| segment_label(value, &names))
        .draw()?;

    for tier in ValueTier::ALL {
        let color = tier_color(tier);
        let bars: Vec<_> = rows
            .iter()
            .enumerate()
            .filter(|(_, row)| row.tier == tier)
            .map(|(idx, row)| {
                let x = idx as u32;
                Rectangle::new(
                    [
                        (SegmentValue::Exact(x), 0),
                        (SegmentValue::Exact(x + 1), row.count as u32),
                    ],
                    color.filled(),
                )
            })
            .collect();
        if bars.is_empty() {
            continue;
        }

        chart
            .draw_series(bars)?
            .label(tier.label())
            .legend(move |(x, y)| Rectangle::new([(x, y - 5), (x + 10, y + 5)], color.filled()));
    }

    chart
        .configure_series_labels()
        .background_style(&WHITE.mix(0.8))
        .border_style(&BLACK)
        .draw()?;

    root.present()?;
    log::info!("Tier/segment chart saved to: {}", output_path.display());

    Ok(())
}

/// Grouped bars of mean R, F and M score per lifecycle segment
pub fn create_segment_score_chart(
    means: &[SegmentScoreMeans],
    output_path: &Path,
) -> crate::Result<()> {
    let slots = means.len() as u32 * GROUP_WIDTH;
    let names: Vec<&str> = means.iter().map(|row| row.segment.label()).collect();

    let root = BitMapBackend::new(output_path, (1000, 600)).into_drawing_area();
    root.fill(&WHITE)?;

    let mut chart = ChartBuilder::on(&root)
        .caption(
            "Comparison of RFM Segments based on Recency, Frequency, and Monetary Scores",
            ("sans-serif", 24),
        )
        .margin(10)
        .x_label_area_size(50)
        .y_label_area_size(60)
        .build_cartesian_2d((0u32..slots).into_segmented(), 0f64..4.5f64)?;

    chart
        .configure_mesh()
        .disable_x_mesh()
        .x_labels(slots as usize)
        .x_desc("RFM Segments")
        .y_desc("Score")
        .axis_desc_style(("sans-serif", 15))
        .x_label_formatter(&|value| match value {
            // Label the middle bar of each group
            SegmentValue::CenterOf(slot) if slot % GROUP_WIDTH == 1 => names
                .get((slot / GROUP_WIDTH) as usize)
                .map(|name| name.to_string())
                .unwrap_or_default(),
            _ => String::new(),
        })
        .draw()?;

    let series: [(&str, fn(&SegmentScoreMeans) -> f64); 3] = [
        ("Recency Score", |row| row.r),
        ("Frequency Score", |row| row.f),
        ("Monetary Score", |row| row.m),
    ];

    for (offset, ((label, value), color)) in series.iter().zip(SCORE_COLORS.iter()).enumerate() {
        let bars = means.iter().enumerate().map(|(group, row)| {
            let x = group as u32 * GROUP_WIDTH + offset as u32;
            Rectangle::new(
                [
                    (SegmentValue::Exact(x), 0.0),
                    (SegmentValue::Exact(x + 1), value(row)),
                ],
                color.filled(),
            )
        });

        chart
            .draw_series(bars)?
            .label(*label)
            .legend(move |(x, y)| Rectangle::new([(x, y - 5), (x + 10, y + 5)], color.filled()));
    }

    chart
        .configure_series_labels()
        .background_style(&WHITE.mix(0.8))
        .border_style(&BLACK)
        .draw()?;

    root.present()?;
    log::info!("Segment score chart saved to: {}", output_path.display());

    Ok(())
}

/// Render every chart into `output_dir`, returning the paths written
///
/// Charts whose view is empty are skipped.
pub fn generate_chart_report(
    analysis: &RfmAnalysis,
    output_dir: &Path,
) -> crate::Result<Vec<PathBuf>> {
    let mut written = Vec::new();

    if analysis.customers.is_empty() {
        log::warn!("No customers to chart; skipping visualizations");
        return Ok(written);
    }

    std::fs::create_dir_all(output_dir)?;

    let tier_path = output_dir.join(TIER_CHART);
    create_tier_chart(&tier_counts(&analysis.customers), &tier_path)?;
    written.push(tier_path);

    let pair_rows = tier_segment_counts(&analysis.customers);
    let pair_path = output_dir.join(TIER_SEGMENT_CHART);
    create_tier_segment_chart(&pair_rows, &pair_path)?;
    written.push(pair_path);

    let means = segment_score_means(&analysis.customers);
    let means_path = output_dir.join(SEGMENT_SCORE_CHART);
    create_segment_score_chart(&means, &means_path)?;
    written.push(means_path);

    Ok(written)
}

fn segment_label(value: &SegmentValue<u32>, names: &[&str]) -> String {
    match value {
        SegmentValue::CenterOf(idx) => names
            .get(*idx as usize)
            .map(|name| name.to_string())
            .unwrap_or_default(),
        _ => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::TransactionRecord;
    use crate::model::{run_pipeline, PipelineOptions};
    use tempfile::tempdir;

    fn create_test_analysis() -> RfmAnalysis {
        let rows = [
            ("1", "A", "2024-01-01", 1, 10.0),
            ("1", "B", "2024-03-01", 3, 10.0),
            ("2", "C", "2024-02-15", 1, 300.0),
            ("3", "D", "2023-11-20", 2, 5.0),
            ("4", "E", "2024-03-10", 8, 12.5),
            ("4", "F", "2024-03-12", 1, 99.0),
            ("5", "G", "2023-06-01", 1, 1.0),
        ];
        let records: Vec<TransactionRecord> = rows
            .iter()
            .map(|(cust, inv, date, qty, price)| TransactionRecord {
                customer_id: Some(cust.to_string()),
                invoice_no: inv.to_string(),
                invoice_date: date.to_string(),
                quantity: Some(*qty),
                unit_price: Some(*price),
            })
            .collect();

        run_pipeline(records, &PipelineOptions::default()).unwrap()
    }

    #[test]
    fn test_create_tier_chart() {
        let analysis = create_test_analysis();
        let temp_dir = tempdir().unwrap();
        let output_path = temp_dir.path().join("tiers.png");

        let result = create_tier_chart(&tier_counts(&analysis.customers), &output_path);
        assert!(result.is_ok());
        assert!(output_path.exists());
    }

    #[test]
    fn test_create_tier_segment_chart() {
        let analysis = create_test_analysis();
        let temp_dir = tempdir().unwrap();
        let output_path = temp_dir.path().join("pairs.png");

        let rows = tier_segment_counts(&analysis.customers);
        let result = create_tier_segment_chart(&rows, &output_path);
        assert!(result.is_ok());
        assert!(output_path.exists());
    }

    #[test]
    fn test_create_segment_score_chart() {
        let analysis = create_test_analysis();
        let temp_dir = tempdir().unwrap();
        let output_path = temp_dir.path().join("means.png");

        let means = segment_score_means(&analysis.customers);
        let result = create_segment_score_chart(&means, &output_path);
        assert!(result.is_ok());
        assert!(output_path.exists());
    }

    #[test]
    fn test_generate_chart_report() {
        let analysis = create_test_analysis();
        let temp_dir = tempdir().unwrap();
        let chart_dir = temp_dir.path().join("charts");

        let written = generate_chart_report(&analysis, &chart_dir).unwrap();
        assert_eq!(written.len(), 3);
        for path in written {
            assert!(path.exists(), "missing {}", path.display());
        }
    }
}
