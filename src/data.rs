//! Transaction loading and cleaning
//!
//! The loader reads the raw sales log with Polars; the normalizer turns those rows into
//! the cleaned transaction set the aggregator works on.

use std::path::Path;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use polars::prelude::*;

use crate::error::{Result, RfmError};

/// Datetime layouts tried in order after RFC 3339
const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
    "%Y/%m/%d %H:%M:%S",
    "%Y/%m/%d %H:%M",
    "%d-%m-%Y %H:%M:%S",
    "%d-%m-%Y %H:%M",
];

/// Date-only layouts, interpreted as midnight
const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%m/%d/%Y", "%Y/%m/%d", "%d-%m-%Y"];

// Column names of the working frames
pub(crate) const CUSTOMER: &str = "CustomerID";
pub(crate) const INVOICE: &str = "InvoiceNo";
pub(crate) const TIMESTAMP: &str = "InvoiceTimestamp";
pub(crate) const TOTAL: &str = "TotalAmount";
const RAW_DATE: &str = "InvoiceDate";
const QUANTITY: &str = "Quantity";
const PRICE: &str = "UnitPrice";

/// Names of the input columns the loader needs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnMap {
    pub customer: String,
    pub invoice: String,
    pub date: String,
    pub quantity: String,
    pub price: String,
}

impl Default for ColumnMap {
    fn default() -> Self {
        Self {
            customer: "CustomerID".to_string(),
            invoice: "InvoiceNo".to_string(),
            date: "InvoiceDate".to_string(),
            quantity: "Quantity".to_string(),
            price: "UnitPrice".to_string(),
        }
    }
}

/// One raw row of the sales log
#[derive(Debug, Clone, PartialEq)]
pub struct TransactionRecord {
    pub customer_id: Option<String>,
    pub invoice_no: String,
    /// Timestamp as it appears in the file, any supported layout
    pub invoice_date: String,
    /// Negative for returns; `None` when blank or not a whole number
    pub quantity: Option<i64>,
    /// `None` when blank or not a number
    pub unit_price: Option<f64>,
}

/// A transaction that survived cleaning
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedTransaction {
    pub customer_id: String,
    pub invoice_no: String,
    pub invoice_date: NaiveDateTime,
    pub quantity: i64,
    pub unit_price: f64,
    /// `quantity * unit_price`, negative for returns
    pub total_amount: f64,
}

/// Row accounting for one normalization pass
///
/// `input_rows == kept + dropped()`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NormalizationStats {
    pub input_rows: usize,
    pub missing_customer: usize,
    pub duplicate_invoice: usize,
    pub unparsable_timestamp: usize,
    /// Quantity or unit price blank or unreadable
    pub missing_amount: usize,
    pub kept: usize,
}

impl NormalizationStats {
    pub fn dropped(&self) -> usize {
        self.missing_customer
            + self.duplicate_invoice
            + self.unparsable_timestamp
            + self.missing_amount
    }
}

/// Output of [`normalize_transactions`]
#[derive(Debug, Clone)]
pub struct NormalizedData {
    pub transactions: Vec<NormalizedTransaction>,
    pub stats: NormalizationStats,
}

/// Load raw transaction rows from a CSV file
///
/// # Arguments
/// * `file_path` - Path to the CSV file
/// * `columns` - Names of the customer, invoice, date, quantity and price columns
///
/// # Returns
/// * One `TransactionRecord` per data row, in file order
pub fn load_transactions<P: AsRef<Path>>(
    file_path: P,
    columns: &ColumnMap,
) -> Result<Vec<TransactionRecord>> {
    let file_path = file_path.as_ref();

    // Every column is read as text; numbers and timestamps are parsed below
    let df = CsvReadOptions::default()
        .with_has_header(true)
        .with_infer_schema_length(Some(0))
        .try_into_reader_with_file_path(Some(file_path.to_path_buf()))?
        .finish()?;

    log::info!(
        "stage=load rows={} columns={} path={}",
        df.height(),
        df.width(),
        file_path.display()
    );

    let customer_col = string_column(&df, &columns.customer)?;
    let invoice_col = string_column(&df, &columns.invoice)?;
    let date_col = string_column(&df, &columns.date)?;
    let quantity_col = string_column(&df, &columns.quantity)?;
    let price_col = string_column(&df, &columns.price)?;

    let customers = customer_col.str()?;
    let invoices = invoice_col.str()?;
    let dates = date_col.str()?;
    let quantities = quantity_col.str()?;
    let prices = price_col.str()?;

    let mut records = Vec::with_capacity(df.height());
    let rows = customers
        .into_iter()
        .zip(invoices)
        .zip(dates)
        .zip(quantities)
        .zip(prices);

    for (idx, ((((customer, invoice), date), quantity), price)) in rows.enumerate() {
        let parsed_quantity = parse_quantity(quantity);
        let parsed_price = parse_price(price);
        if parsed_quantity.is_none() || parsed_price.is_none() {
            log::debug!(
                "stage=load row={} unreadable amount quantity={:?} unit_price={:?}",
                idx + 1,
                quantity,
                price
            );
        }

        records.push(TransactionRecord {
            customer_id: customer
                .map(str::trim)
                .filter(|id| !id.is_empty())
                .map(str::to_string),
            invoice_no: invoice.unwrap_or_default().trim().to_string(),
            invoice_date: date.unwrap_or_default().trim().to_string(),
            quantity: parsed_quantity,
            unit_price: parsed_price,
        });
    }

    Ok(records)
}

/// Clean raw rows into the transaction set used for aggregation
///
/// Rows without a customer are dropped, later rows repeating an invoice number are
/// dropped (first occurrence wins), and rows whose timestamp cannot be parsed or that
/// lack a quantity or unit price are excluded entirely. Surviving rows get
/// `total_amount = quantity * unit_price`.
pub fn normalize_transactions<I>(records: I) -> Result<NormalizedData>
where
    I: IntoIterator<Item = TransactionRecord>,
{
    let mut stats = NormalizationStats::default();
    let mut customers = Vec::new();
    let mut invoices = Vec::new();
    let mut dates = Vec::new();
    let mut quantities = Vec::new();
    let mut prices = Vec::new();

    for record in records {
        stats.input_rows += 1;

        let Some(customer_id) = canonical_customer_id(record.customer_id.as_deref()) else {
            stats.missing_customer += 1;
            continue;
        };

        customers.push(customer_id);
        invoices.push(record.invoice_no);
        dates.push(record.invoice_date);
        quantities.push(record.quantity);
        prices.push(record.unit_price);
    }

    let identified = df!(
        CUSTOMER => customers,
        INVOICE => invoices,
        RAW_DATE => dates,
        QUANTITY => quantities,
        PRICE => prices
    )?;

    // The first row of an invoice claims it even if that row is dropped later
    let mut deduped = identified.unique_stable(
        Some(&[INVOICE.to_string()]),
        UniqueKeepStrategy::First,
        None,
    )?;
    stats.duplicate_invoice = identified.height() - deduped.height();

    let timestamps: Vec<Option<i64>> = deduped
        .column(RAW_DATE)?
        .str()?
        .into_iter()
        .map(|raw| {
            let parsed = raw.and_then(parse_timestamp);
            if parsed.is_none() {
                log::debug!(
                    "stage=normalize unparsable timestamp '{}'",
                    raw.unwrap_or_default()
                );
            }
            parsed.map(to_micros)
        })
        .collect();
    deduped.with_column(Series::new(TIMESTAMP, timestamps))?;
    let deduped_rows = deduped.height();

    let dated = deduped
        .lazy()
        .filter(col(TIMESTAMP).is_not_null())
        .collect()?;
    stats.unparsable_timestamp = deduped_rows - dated.height();
    let dated_rows = dated.height();

    let priced = dated
        .lazy()
        .filter(col(QUANTITY).is_not_null().and(col(PRICE).is_not_null()))
        .with_columns([(col(QUANTITY).cast(DataType::Float64) * col(PRICE)).alias(TOTAL)])
        .collect()?;
    stats.missing_amount = dated_rows - priced.height();

    let transactions = frame_transactions(&priced)?;
    stats.kept = transactions.len();
    log::info!(
        "stage=normalize input={} kept={} missing_customer={} duplicate_invoice={} \
         unparsable_timestamp={} missing_amount={}",
        stats.input_rows,
        stats.kept,
        stats.missing_customer,
        stats.duplicate_invoice,
        stats.unparsable_timestamp,
        stats.missing_amount
    );

    Ok(NormalizedData {
        transactions,
        stats,
    })
}

/// Parse an invoice timestamp in any of the supported layouts
///
/// Offsets are converted to UTC. Returns `None` when no layout matches.
pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.naive_utc());
    }

    DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .or_else(|| {
            DATE_FORMATS
                .iter()
                .find_map(|fmt| NaiveDate::parse_from_str(raw, fmt).ok())
                .and_then(|date| date.and_hms_opt(0, 0, 0))
        })
}

/// Frame of cleaned transactions, timestamps as epoch microseconds
pub(crate) fn transactions_frame(transactions: &[NormalizedTransaction]) -> Result<DataFrame> {
    let customers: Vec<&str> = transactions
        .iter()
        .map(|tx| tx.customer_id.as_str())
        .collect();
    let invoices: Vec<&str> = transactions
        .iter()
        .map(|tx| tx.invoice_no.as_str())
        .collect();
    let timestamps: Vec<i64> = transactions
        .iter()
        .map(|tx| to_micros(tx.invoice_date))
        .collect();
    let totals: Vec<f64> = transactions.iter().map(|tx| tx.total_amount).collect();

    let df = df!(
        CUSTOMER => customers,
        INVOICE => invoices,
        TIMESTAMP => timestamps,
        TOTAL => totals
    )?;
    Ok(df)
}

pub(crate) fn to_micros(timestamp: NaiveDateTime) -> i64 {
    timestamp.and_utc().timestamp_micros()
}

fn from_micros(micros: i64) -> Option<NaiveDateTime> {
    DateTime::from_timestamp_micros(micros).map(|dt| dt.naive_utc())
}

/// Read the cleaned frame back into typed transactions
fn frame_transactions(df: &DataFrame) -> Result<Vec<NormalizedTransaction>> {
    let customers = df.column(CUSTOMER)?.str()?;
    let invoices = df.column(INVOICE)?.str()?;
    let timestamps = df.column(TIMESTAMP)?.i64()?;
    let quantities = df.column(QUANTITY)?.i64()?;
    let prices = df.column(PRICE)?.f64()?;
    let totals = df.column(TOTAL)?.f64()?;

    let rows = customers
        .into_iter()
        .zip(invoices)
        .zip(timestamps)
        .zip(quantities)
        .zip(prices)
        .zip(totals);

    let transactions = rows
        .filter_map(|(((((customer, invoice), micros), quantity), price), total)| {
            Some(NormalizedTransaction {
                customer_id: customer?.to_string(),
                invoice_no: invoice?.to_string(),
                invoice_date: from_micros(micros?)?,
                quantity: quantity?,
                unit_price: price?,
                total_amount: total?,
            })
        })
        .collect();

    Ok(transactions)
}

/// Trim an identifier; blank means missing and `"17850.0"` becomes `"17850"`
fn canonical_customer_id(raw: Option<&str>) -> Option<String> {
    let trimmed = raw?.trim();
    if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("nan") {
        return None;
    }

    if let Some(int_part) = trimmed.strip_suffix(".0") {
        if !int_part.is_empty() && int_part.bytes().all(|b| b.is_ascii_digit()) {
            return Some(int_part.to_string());
        }
    }

    Some(trimmed.to_string())
}

fn string_column(df: &DataFrame, name: &str) -> Result<Series> {
    let column = df.column(name).map_err(|_| RfmError::MissingColumn {
        column: name.to_string(),
    })?;
    Ok(column.cast(&DataType::String)?)
}

fn parse_quantity(raw: Option<&str>) -> Option<i64> {
    let text = raw?.trim();
    if let Ok(value) = text.parse::<i64>() {
        return Some(value);
    }

    // Integral floats such as "6.0"
    match text.parse::<f64>() {
        Ok(value) if value.is_finite() && value.fract() == 0.0 => Some(value as i64),
        _ => None,
    }
}

fn parse_price(raw: Option<&str>) -> Option<f64> {
    parse_finite(raw?)
}

/// Parse a number, rejecting NaN and infinities
pub(crate) fn parse_finite(text: &str) -> Option<f64> {
    text.trim().parse::<f64>().ok().filter(|value| value.is_finite())
}
