//! Command-line interface definitions and argument parsing

use std::path::PathBuf;

use clap::Parser;

use crate::data::{parse_finite, parse_timestamp, ColumnMap};
use crate::model::PipelineOptions;

/// Customer segmentation CLI using quantile-based RFM scoring
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to the input CSV file
    #[arg(short, long, default_value = "data.csv")]
    pub input: PathBuf,

    /// Output path for the per-customer CSV export
    #[arg(short, long, default_value = "final_analysis.csv")]
    pub output: PathBuf,

    /// Directory the PNG charts are written to
    #[arg(long, default_value = ".")]
    pub chart_dir: PathBuf,

    /// Skip chart rendering
    #[arg(long)]
    pub no_charts: bool,

    /// Measure recency from this date instead of the day after the latest invoice
    #[arg(long)]
    pub reference_date: Option<String>,

    /// Scoring mode: provide R,F,M values as comma-separated string
    /// Example: --score "30,10,500.0" for Recency=30, Frequency=10, Monetary=500.0
    #[arg(short, long)]
    pub score: Option<String>,

    /// Customer identifier column
    #[arg(long, default_value = "CustomerID")]
    pub customer_col: String,

    /// Invoice number column
    #[arg(long, default_value = "InvoiceNo")]
    pub invoice_col: String,

    /// Invoice timestamp column
    #[arg(long, default_value = "InvoiceDate")]
    pub date_col: String,

    /// Quantity column
    #[arg(long, default_value = "Quantity")]
    pub quantity_col: String,

    /// Unit price column
    #[arg(long, default_value = "UnitPrice")]
    pub price_col: String,

    /// Enable verbose output
    #[arg(short, long)]
    pub verbose: bool,
}

impl Args {
    /// Parse RFM values from the score string
    /// Expected format: "recency,frequency,monetary"
    pub fn parse_rfm_values(&self) -> anyhow::Result<Option<(f64, f64, f64)>> {
        if let Some(ref score_str) = self.score {
            let parts: Vec<&str> = score_str.split(',').collect();
            if parts.len() != 3 {
                anyhow::bail!("Score values must be in format 'recency,frequency,monetary'");
            }

            let value = |idx: usize, name: &str| {
                parse_finite(parts[idx])
                    .ok_or_else(|| anyhow::anyhow!("Invalid {} value: {}", name, parts[idx]))
            };
            let recency = value(0, "recency")?;
            let frequency = value(1, "frequency")?;
            let monetary = value(2, "monetary")?;

            Ok(Some((recency, frequency, monetary)))
        } else {
            Ok(None)
        }
    }

    pub fn pipeline_options(&self) -> anyhow::Result<PipelineOptions> {
        let reference_date = match self.reference_date.as_deref() {
            Some(raw) => Some(
                parse_timestamp(raw)
                    .ok_or_else(|| anyhow::anyhow!("Invalid reference date: {}", raw))?,
            ),
            None => None,
        };

        Ok(PipelineOptions { reference_date })
    }

    pub fn column_map(&self) -> ColumnMap {
        ColumnMap {
            customer: self.customer_col.clone(),
            invoice: self.invoice_col.clone(),
            date: self.date_col.clone(),
            quantity: self.quantity_col.clone(),
            price: self.price_col.clone(),
        }
    }

    /// Log filter used when `RUST_LOG` is unset
    pub fn default_log_filter(&self) -> &'static str {
        if self.verbose {
            "debug"
        } else {
            "info"
        }
    }
}
