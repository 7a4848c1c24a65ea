//! Error types for the RFM pipeline

use std::fmt;

use chrono::NaiveDateTime;
use plotters::drawing::DrawingAreaErrorKind;
use thiserror::Error;

/// Pipeline stage, carried by errors for diagnosis
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Normalize,
    Aggregate,
    Score,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Normalize => "normalize",
            Stage::Aggregate => "aggregate",
            Stage::Score => "score",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug)]
pub enum RfmError {
    #[error("no data to analyze: {stage} stage received nothing ({rows} input rows)")]
    NoData { stage: Stage, rows: usize },

    #[error("input is missing required column '{column}'")]
    MissingColumn { column: String },

    #[error("reference date {reference} must be after the latest invoice ({latest})")]
    InvalidReferenceDate {
        reference: NaiveDateTime,
        latest: NaiveDateTime,
    },

    #[error("chart rendering failed: {0}")]
    Chart(String),

    #[error("Polars error: {0}")]
    Polars(#[from] polars::error::PolarsError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl RfmError {
    /// True for the "nothing to analyze" condition, whichever stage raised it
    pub fn is_no_data(&self) -> bool {
        matches!(self, RfmError::NoData { .. })
    }
}

impl<E> From<DrawingAreaErrorKind<E>> for RfmError
where
    E: std::error::Error + Send + Sync,
{
    fn from(err: DrawingAreaErrorKind<E>) -> Self {
        RfmError::Chart(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, RfmError>;
