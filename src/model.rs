//! Customer aggregation and quantile-based RFM scoring

use chrono::{Duration, NaiveDateTime};
use polars::prelude::*;

use crate::data::{
    normalize_transactions, to_micros, transactions_frame, NormalizationStats,
    NormalizedTransaction, TransactionRecord, CUSTOMER, INVOICE, TIMESTAMP, TOTAL,
};
use crate::error::{Result, RfmError, Stage};
use crate::segment::{classify, LifecycleSegment, RfmScores, ValueTier};

const LAST_PURCHASE: &str = "LastPurchaseDate";
const FREQUENCY: &str = "Frequency";
const MONETARY: &str = "Monetary";
const MICROS_PER_DAY: i64 = 86_400 * 1_000_000;

/// Recency, frequency and monetary value of one customer
#[derive(Debug, Clone, PartialEq)]
pub struct CustomerMetrics {
    pub customer_id: String,
    /// Whole days from the reference date back to the latest invoice
    pub recency: i64,
    /// Distinct invoices
    pub frequency: usize,
    /// Sum of line totals, returns included
    pub monetary: f64,
}

/// Per-customer metrics and the reference date they were measured against
#[derive(Debug, Clone)]
pub struct AggregatedCustomers {
    pub reference_date: NaiveDateTime,
    /// Ordered by customer id
    pub customers: Vec<CustomerMetrics>,
}

/// Which end of a metric is the good end
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Small values score 4 (recency)
    LowerIsBetter,
    /// Large values score 4 (frequency, monetary)
    HigherIsBetter,
}

/// 25th, 50th and 75th percentile of one metric
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QuantileBreakpoints {
    pub q25: f64,
    pub q50: f64,
    pub q75: f64,
}

impl QuantileBreakpoints {
    /// Compute breakpoints with linear interpolation; `None` for an empty input
    pub fn from_values<I>(values: I) -> Result<Option<Self>>
    where
        I: IntoIterator<Item = f64>,
    {
        let values = Float64Chunked::from_vec("values", values.into_iter().collect());
        let quantile = |q: f64| values.quantile(q, QuantileInterpolOptions::Linear);

        match (quantile(0.25)?, quantile(0.50)?, quantile(0.75)?) {
            (Some(q25), Some(q50), Some(q75)) => Ok(Some(Self { q25, q50, q75 })),
            _ => Ok(None),
        }
    }

    /// Map a raw value to a score in 1..=4
    ///
    /// A value equal to a breakpoint falls into the lower bucket.
    pub fn score(&self, value: f64, direction: Direction) -> u8 {
        let bucket = if value <= self.q25 {
            0
        } else if value <= self.q50 {
            1
        } else if value <= self.q75 {
            2
        } else {
            3
        };

        match direction {
            Direction::HigherIsBetter => bucket + 1,
            Direction::LowerIsBetter => 4 - bucket,
        }
    }
}

/// Breakpoints for all three metrics, computed over the whole customer set
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RfmBreakpoints {
    pub recency: QuantileBreakpoints,
    pub frequency: QuantileBreakpoints,
    pub monetary: QuantileBreakpoints,
}

impl RfmBreakpoints {
    pub fn compute(customers: &[CustomerMetrics]) -> Result<Self> {
        let no_data = || RfmError::NoData {
            stage: Stage::Score,
            rows: customers.len(),
        };

        let recency =
            QuantileBreakpoints::from_values(customers.iter().map(|c| c.recency as f64))?
                .ok_or_else(no_data)?;
        let frequency =
            QuantileBreakpoints::from_values(customers.iter().map(|c| c.frequency as f64))?
                .ok_or_else(no_data)?;
        let monetary = QuantileBreakpoints::from_values(customers.iter().map(|c| c.monetary))?
            .ok_or_else(no_data)?;

        Ok(Self {
            recency,
            frequency,
            monetary,
        })
    }

    pub fn score(&self, recency: f64, frequency: f64, monetary: f64) -> RfmScores {
        RfmScores {
            r: self.recency.score(recency, Direction::LowerIsBetter),
            f: self.frequency.score(frequency, Direction::HigherIsBetter),
            m: self.monetary.score(monetary, Direction::HigherIsBetter),
        }
    }

    pub fn score_customer(&self, customer: &CustomerMetrics) -> RfmScores {
        self.score(
            customer.recency as f64,
            customer.frequency as f64,
            customer.monetary,
        )
    }
}

/// A customer with scores and both segment labels attached
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredCustomer {
    pub metrics: CustomerMetrics,
    pub scores: RfmScores,
    /// R, F and M digits, e.g. "432"
    pub segment_code: String,
    /// `R + F + M`
    pub rfm_score: u8,
    pub value_tier: ValueTier,
    pub lifecycle: LifecycleSegment,
}

impl ScoredCustomer {
    pub fn new(metrics: CustomerMetrics, scores: RfmScores) -> Self {
        let class = classify(scores);
        Self {
            metrics,
            scores,
            segment_code: class.segment_code,
            rfm_score: class.rfm_score,
            value_tier: class.value_tier,
            lifecycle: class.lifecycle,
        }
    }
}

/// Options for a pipeline run
#[derive(Debug, Clone, Default)]
pub struct PipelineOptions {
    /// Measure recency from this instant instead of the day after the latest invoice
    pub reference_date: Option<NaiveDateTime>,
}

/// Result of a full run
#[derive(Debug, Clone)]
pub struct RfmAnalysis {
    pub stats: NormalizationStats,
    pub reference_date: NaiveDateTime,
    pub breakpoints: RfmBreakpoints,
    /// One entry per customer, ordered by customer id
    pub customers: Vec<ScoredCustomer>,
}

/// Latest invoice timestamp plus one day
pub fn default_reference_date(transactions: &[NormalizedTransaction]) -> Option<NaiveDateTime> {
    transactions
        .iter()
        .map(|tx| tx.invoice_date)
        .max()
        .map(|latest| latest + Duration::days(1))
}

/// Collapse transactions into one metrics record per customer
///
/// # Arguments
/// * `transactions` - Cleaned transactions
/// * `reference_date` - Optional override; must be after every invoice
///
/// # Returns
/// * Metrics ordered by customer id, with the reference date used
pub fn aggregate_customers(
    transactions: &[NormalizedTransaction],
    reference_date: Option<NaiveDateTime>,
) -> Result<AggregatedCustomers> {
    let default_reference = default_reference_date(transactions).ok_or(RfmError::NoData {
        stage: Stage::Aggregate,
        rows: 0,
    })?;
    let latest = default_reference - Duration::days(1);

    let reference_date = match reference_date {
        Some(reference) if reference <= latest => {
            return Err(RfmError::InvalidReferenceDate { reference, latest });
        }
        Some(reference) => reference,
        None => default_reference,
    };

    let grouped = transactions_frame(transactions)?
        .lazy()
        .group_by([col(CUSTOMER)])
        .agg([
            col(TIMESTAMP).max().alias(LAST_PURCHASE),
            col(INVOICE).n_unique().alias(FREQUENCY),
            col(TOTAL).sum().alias(MONETARY),
        ])
        .sort([CUSTOMER], SortMultipleOptions::default())
        .collect()?;

    let reference_micros = to_micros(reference_date);
    let ids = grouped.column(CUSTOMER)?.str()?;
    let last_purchase = grouped.column(LAST_PURCHASE)?.i64()?;
    let frequency = grouped.column(FREQUENCY)?.cast(&DataType::UInt64)?;
    let frequency = frequency.u64()?;
    let monetary = grouped.column(MONETARY)?.f64()?;

    let customers: Vec<CustomerMetrics> = ids
        .into_iter()
        .zip(last_purchase)
        .zip(frequency)
        .zip(monetary)
        .filter_map(|(((id, last), invoices), monetary)| {
            Some(CustomerMetrics {
                customer_id: id?.to_string(),
                recency: (reference_micros - last?) / MICROS_PER_DAY,
                frequency: invoices? as usize,
                monetary: monetary?,
            })
        })
        .collect();

    log::info!(
        "stage=aggregate transactions={} customers={} reference_date={}",
        transactions.len(),
        customers.len(),
        reference_date
    );

    Ok(AggregatedCustomers {
        reference_date,
        customers,
    })
}

/// Score every customer against breakpoints computed over all of them
pub fn score_customers(
    customers: Vec<CustomerMetrics>,
) -> Result<(RfmBreakpoints, Vec<ScoredCustomer>)> {
    let breakpoints = RfmBreakpoints::compute(&customers)?;

    log::debug!(
        "stage=score recency={:?} frequency={:?} monetary={:?}",
        breakpoints.recency,
        breakpoints.frequency,
        breakpoints.monetary
    );

    let scored = customers
        .into_iter()
        .map(|metrics| {
            let scores = breakpoints.score_customer(&metrics);
            ScoredCustomer::new(metrics, scores)
        })
        .collect();

    Ok((breakpoints, scored))
}

/// Run normalize, aggregate, score and classify over a full batch of raw rows
pub fn run_pipeline<I>(records: I, options: &PipelineOptions) -> Result<RfmAnalysis>
where
    I: IntoIterator<Item = TransactionRecord>,
{
    let normalized = normalize_transactions(records)?;
    if normalized.transactions.is_empty() {
        return Err(RfmError::NoData {
            stage: Stage::Normalize,
            rows: normalized.stats.input_rows,
        });
    }

    let aggregated = aggregate_customers(&normalized.transactions, options.reference_date)?;
    let (breakpoints, customers) = score_customers(aggregated.customers)?;

    for tier in ValueTier::ALL {
        let count = customers.iter().filter(|c| c.value_tier == tier).count();
        log::info!("stage=classify tier=\"{tier}\" customers={count}");
    }

    Ok(RfmAnalysis {
        stats: normalized.stats,
        reference_date: aggregated.reference_date,
        breakpoints,
        customers,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(y: i32, m: u32, d: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d).unwrap().and_hms_opt(0, 0, 0).unwrap()
    }

    fn tx(
        customer: &str,
        invoice: &str,
        date: NaiveDateTime,
        qty: i64,
        price: f64,
    ) -> NormalizedTransaction {
        NormalizedTransaction {
            customer_id: customer.to_string(),
            invoice_no: invoice.to_string(),
            invoice_date: date,
            quantity: qty,
            unit_price: price,
            total_amount: qty as f64 * price,
        }
    }

    fn metrics(id: &str, recency: i64, frequency: usize, monetary: f64) -> CustomerMetrics {
        CustomerMetrics {
            customer_id: id.to_string(),
            recency,
            frequency,
            monetary,
        }
    }

    #[test]
    fn test_quantile_linear_interpolation() {
        let bp = QuantileBreakpoints::from_values([4.0, 1.0, 3.0, 2.0])
            .unwrap()
            .unwrap();
        assert!((bp.q25 - 1.75).abs() < 1e-9);
        assert!((bp.q50 - 2.5).abs() < 1e-9);
        assert!((bp.q75 - 3.25).abs() < 1e-9);

        let single = QuantileBreakpoints::from_values([7.0]).unwrap().unwrap();
        assert_eq!(
            single,
            QuantileBreakpoints {
                q25: 7.0,
                q50: 7.0,
                q75: 7.0
            }
        );

        assert!(QuantileBreakpoints::from_values(Vec::new()).unwrap().is_none());
    }

    #[test]
    fn test_score_directions_and_boundaries() {
        let bp = QuantileBreakpoints {
            q25: 10.0,
            q50: 20.0,
            q75: 30.0,
        };

        assert_eq!(bp.score(5.0, Direction::HigherIsBetter), 1);
        assert_eq!(bp.score(10.0, Direction::HigherIsBetter), 1);
        assert_eq!(bp.score(10.5, Direction::HigherIsBetter), 2);
        assert_eq!(bp.score(20.0, Direction::HigherIsBetter), 2);
        assert_eq!(bp.score(30.0, Direction::HigherIsBetter), 3);
        assert_eq!(bp.score(31.0, Direction::HigherIsBetter), 4);

        assert_eq!(bp.score(5.0, Direction::LowerIsBetter), 4);
        assert_eq!(bp.score(10.0, Direction::LowerIsBetter), 4);
        assert_eq!(bp.score(20.0, Direction::LowerIsBetter), 3);
        assert_eq!(bp.score(30.0, Direction::LowerIsBetter), 2);
        assert_eq!(bp.score(31.0, Direction::LowerIsBetter), 1);
    }

    #[test]
    fn test_aggregate_reference_scenario() {
        let txs = vec![
            tx("1", "A", at(2024, 1, 1), 2, 10.0),
            tx("2", "B", at(2024, 1, 10), 1, 100.0),
        ];

        let agg = aggregate_customers(&txs, None).unwrap();
        assert_eq!(agg.reference_date, at(2024, 1, 11));
        assert_eq!(
            agg.customers,
            vec![metrics("1", 10, 1, 20.0), metrics("2", 1, 1, 100.0)]
        );
    }

    #[test]
    fn test_aggregate_multiple_invoices() {
        let txs = vec![
            tx("7", "A", at(2024, 1, 1), 1, 5.0),
            tx("7", "B", at(2024, 1, 5), -1, 5.0),
            tx("7", "C", at(2024, 1, 3), 4, 2.5),
            tx("8", "D", at(2024, 1, 9), 1, 1.0),
        ];

        let agg = aggregate_customers(&txs, None).unwrap();
        let seven = &agg.customers[0];
        assert_eq!(seven.customer_id, "7");
        assert_eq!(seven.frequency, 3);
        assert_eq!(seven.recency, 5);
        assert!((seven.monetary - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_aggregate_with_reference_override() {
        let txs = vec![tx("1", "A", at(2024, 1, 1), 1, 1.0)];

        let agg = aggregate_customers(&txs, Some(at(2024, 2, 1))).unwrap();
        assert_eq!(agg.customers[0].recency, 31);

        let err = aggregate_customers(&txs, Some(at(2024, 1, 1))).unwrap_err();
        assert!(matches!(err, RfmError::InvalidReferenceDate { .. }));
    }

    #[test]
    fn test_aggregate_empty_is_no_data() {
        let err = aggregate_customers(&[], None).unwrap_err();
        assert!(err.is_no_data());
    }

    #[test]
    fn test_score_empty_is_no_data() {
        let err = score_customers(Vec::new()).unwrap_err();
        assert!(matches!(err, RfmError::NoData { stage: Stage::Score, rows: 0 }));
    }

    #[test]
    fn test_identical_frequency_collapses_to_one_score() {
        let customers: Vec<_> = (0..8)
            .map(|i| metrics(&i.to_string(), i * 3, 1, 10.0 * i as f64))
            .collect();

        let (breakpoints, scored) = score_customers(customers).unwrap();
        assert_eq!(breakpoints.frequency.q25, 1.0);
        assert_eq!(breakpoints.frequency.q75, 1.0);
        assert!(scored.iter().all(|c| c.scores.f == 1));
    }

    #[test]
    fn test_zero_monetary_scores_normally() {
        let customers = vec![metrics("1", 4, 1, 0.0), metrics("2", 9, 2, 50.0)];

        let (_, scored) = score_customers(customers).unwrap();
        let zero = &scored[0];
        assert!((1..=4).contains(&zero.scores.m));
        assert_eq!(zero.scores.m, 1);
        assert_eq!(zero.rfm_score, zero.scores.composite());
    }

    #[test]
    fn test_scored_customer_carries_labels() {
        let customers: Vec<_> = (1..=4)
            .map(|i| metrics(&format!("c{i}"), 40 - 10 * i, i as usize, 100.0 * i as f64))
            .collect();

        let (_, scored) = score_customers(customers).unwrap();
        let best = scored.iter().find(|c| c.metrics.customer_id == "c4").unwrap();
        assert_eq!(best.scores, RfmScores { r: 4, f: 4, m: 4 });
        assert_eq!(best.segment_code, "444");
        assert_eq!(best.value_tier, ValueTier::High);
        assert_eq!(best.lifecycle, LifecycleSegment::VipLoyal);

        let worst = scored.iter().find(|c| c.metrics.customer_id == "c1").unwrap();
        assert_eq!(worst.scores, RfmScores { r: 1, f: 1, m: 1 });
        assert_eq!(worst.lifecycle, LifecycleSegment::Lost);
        assert_eq!(worst.value_tier, ValueTier::Low);
    }

    #[test]
    fn test_run_pipeline_empty_after_normalization() {
        let records = vec![TransactionRecord {
            customer_id: None,
            invoice_no: "A".to_string(),
            invoice_date: "2024-01-01".to_string(),
            quantity: Some(1),
            unit_price: Some(1.0),
        }];

        let err = run_pipeline(records, &PipelineOptions::default()).unwrap_err();
        assert!(matches!(err, RfmError::NoData { stage: Stage::Normalize, rows: 1 }));
    }

    #[test]
    fn test_default_reference_date() {
        let txs = vec![
            tx("1", "A", at(2024, 3, 1), 1, 1.0),
            tx("2", "B", at(2024, 2, 1), 1, 1.0),
        ];
        assert_eq!(default_reference_date(&txs), Some(at(2024, 3, 2)));
        assert_eq!(default_reference_date(&[]), None);

        let agg = aggregate_customers(&txs, None).unwrap();
        assert_eq!(Some(agg.reference_date), default_reference_date(&txs));
    }

    #[test]
    fn test_aggregate_orders_customers_by_id() {
        let txs = vec![
            tx("b", "A", at(2024, 1, 1), 1, 1.0),
            tx("9", "B", at(2024, 1, 2), 1, 1.0),
            tx("a", "C", at(2024, 1, 3), 1, 1.0),
            tx("10", "D", at(2024, 1, 4), 1, 1.0),
            tx("b", "E", at(2024, 1, 4), 2, 1.0),
        ];

        let agg = aggregate_customers(&txs, None).unwrap();
        let ids: Vec<&str> = agg.customers.iter().map(|c| c.customer_id.as_str()).collect();
        assert_eq!(ids, vec!["10", "9", "a", "b"]);
        assert_eq!(agg.customers[3].frequency, 2);
        assert_eq!(agg.customers[3].recency, 1);
        assert!((agg.customers[3].monetary - 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_recency_counts_whole_days() {
        let late = NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(23, 59, 0)
            .unwrap();
        let txs = vec![tx("1", "A", late, 1, 1.0), tx("2", "B", at(2024, 1, 3), 1, 1.0)];

        let agg = aggregate_customers(&txs, None).unwrap();
        // 2024-01-04 00:00 minus 2024-01-01 23:59 is two days and one minute
        assert_eq!(agg.customers[0].recency, 2);
        assert_eq!(agg.customers[1].recency, 1);
    }
}
