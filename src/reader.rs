/*!
 * Tolerant CSV reader for CMS rate files
 *
 * Fee schedule and payment addendum exports are hand-edited spreadsheets
 * saved as CSV: headers carry stray quotes and whitespace, the header row is
 * sometimes repeated as the first data row, rows are ragged, and numbers are
 * formatted as currency. This module turns such files into plain
 * column-name to value rows and provides the numeric coercions used at the
 * ingestion boundary.
 */

use std::collections::BTreeMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::time::Instant;

use csv::ReaderBuilder;
use log::{debug, warn};

use crate::{
    data_types::{FeeScheduleRecord, PaymentRecord, ProcedureCode},
    schema::{FeeScheduleSchema, PaymentAddendumSchema, CODE_COLUMN},
    ErrorContext, RatesError, Result,
};

/// Reports the expected columns missing from a header row
pub type SchemaCheck = fn(&[String]) -> Vec<&'static str>;

/// One parsed data row keyed by cleaned column name
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CsvRow {
    fields: BTreeMap<String, String>,
}

impl CsvRow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, column: &str, value: &str) {
        self.fields.insert(clean_header(column), clean_value(value));
    }

    /// Value of a column; empty cells read as `None`
    pub fn get(&self, column: &str) -> Option<&str> {
        self.fields
            .get(column)
            .map(|s| s.as_str())
            .filter(|s| !s.is_empty())
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(|k| k.as_str())
    }
}

/// CSV reader for fee schedule and payment addendum files
pub struct RateFileReader {
    /// Missing columns reported with `warn!`
    schema_check: Option<SchemaCheck>,
    /// Missing columns that only merit a `debug!`
    optional_check: Option<SchemaCheck>,
}

impl Default for RateFileReader {
    fn default() -> Self {
        Self::new()
    }
}

impl RateFileReader {
    pub fn new() -> Self {
        Self {
            schema_check: None,
            optional_check: None,
        }
    }

    /// Reader preconfigured for physician fee schedule files
    pub fn fee_schedule() -> Self {
        Self::new()
            .with_schema_check(FeeScheduleSchema::missing_columns)
            .with_optional_columns(FeeScheduleSchema::missing_optional_columns)
    }

    /// Reader preconfigured for payment addendum files
    pub fn payment_addendum() -> Self {
        Self::new().with_schema_check(PaymentAddendumSchema::missing_columns)
    }

    pub fn with_schema_check(mut self, check: SchemaCheck) -> Self {
        self.schema_check = Some(check);
        self
    }

    pub fn with_optional_columns(mut self, check: SchemaCheck) -> Self {
        self.optional_check = Some(check);
        self
    }

    /// Read and clean every row of a file on disk
    pub fn read_path<P: AsRef<Path>>(&self, path: P) -> Result<Vec<CsvRow>> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(RatesError::file_not_found_with_suggestion(path.to_path_buf()));
        }

        let start_time = Instant::now();
        let file = File::open(path).map_err(|e| RatesError::Io {
            message: format!("Failed to open {}: {}", path.display(), e),
            source: e,
            context: ErrorContext {
                file_path: Some(path.to_path_buf()),
                ..Default::default()
            },
        })?;

        let rows = self.read_rows(file, Some(path))?;

        if rows.is_empty() {
            warn!("No data rows found in {}", path.display());
        } else {
            debug!(
                "Parsed {} rows from {} in {:.3}s",
                rows.len(),
                path.display(),
                start_time.elapsed().as_secs_f64()
            );
        }

        Ok(rows)
    }

    /// Read rows from in-memory CSV text
    pub fn read_str(&self, text: &str) -> Result<Vec<CsvRow>> {
        self.read_rows(text.as_bytes(), None)
    }

    /// Read rows from any byte source
    pub fn read_from<R: Read>(&self, source: R) -> Result<Vec<CsvRow>> {
        self.read_rows(source, None)
    }

    fn read_rows<R: Read>(&self, source: R, path: Option<&Path>) -> Result<Vec<CsvRow>> {
        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(source);

        let headers: Vec<String> = reader
            .byte_headers()
            .map_err(|e| csv_error(e, path))?
            .iter()
            .map(|h| clean_header(&String::from_utf8_lossy(h)))
            .collect();

        if !headers.iter().all(|h| h.is_empty()) {
            let source = || path.map(|p| p.display().to_string()).unwrap_or_else(|| "input".to_string());
            if let Some(missing) = self.schema_check.map(|check| check(&headers)).filter(|m| !m.is_empty()) {
                warn!("{} is missing required columns: {}", source(), missing.join(", "));
            }
            if let Some(missing) = self.optional_check.map(|check| check(&headers)).filter(|m| !m.is_empty()) {
                debug!("{} has no {} columns, using defaults", source(), missing.join(", "));
            }
        }

        let mut rows = Vec::new();
        for result in reader.byte_records() {
            let record = result.map_err(|e| csv_error(e, path))?;

            let mut row = CsvRow::new();
            for (header, field) in headers.iter().zip(record.iter()) {
                if header.is_empty() {
                    continue;
                }
                row.insert(header, &String::from_utf8_lossy(field));
            }

            if row.fields.values().all(|v| v.is_empty()) {
                continue;
            }
            rows.push(row);
        }

        // Some exports repeat the header line as the first data row
        if rows
            .first()
            .and_then(|row| row.get(CODE_COLUMN))
            .is_some_and(|code| code == CODE_COLUMN)
        {
            rows.remove(0);
        }

        Ok(rows)
    }
}

fn csv_error(err: csv::Error, path: Option<&Path>) -> RatesError {
    let line = err.position().map(|pos| pos.line() as usize);
    RatesError::CsvParse {
        message: err.to_string(),
        line,
        context: ErrorContext {
            file_path: path.map(|p| p.to_path_buf()),
            line_number: line,
            ..Default::default()
        },
    }
}

fn strip_quotes(value: &str) -> &str {
    let value = value.strip_prefix('"').unwrap_or(value);
    value.strip_suffix('"').unwrap_or(value)
}

/// Trim a header, dropping a byte order mark and one layer of quotes
pub fn clean_header(header: &str) -> String {
    let header = header.trim_start_matches('\u{feff}').trim();
    strip_quotes(header).trim().to_string()
}

/// Trim a cell value and drop one layer of surrounding quotes
pub fn clean_value(value: &str) -> String {
    strip_quotes(value.trim()).trim().to_string()
}

/// Parse a currency or plain numeric cell
///
/// Strips quotes, a leading `$`, and thousands separators. Returns `None`
/// for empty, non-numeric, or non-finite values.
pub fn parse_currency(value: &str) -> Option<f64> {
    let cleaned = clean_value(value);
    let cleaned = cleaned.strip_prefix('$').unwrap_or(&cleaned);
    let cleaned: String = cleaned.chars().filter(|c| *c != ',').collect();
    let cleaned = cleaned.trim();

    if cleaned.is_empty() {
        return None;
    }

    cleaned.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Parse a numeric cell, falling back to `default` when absent or invalid
pub fn currency_or(value: Option<&str>, default: f64) -> f64 {
    value.and_then(parse_currency).unwrap_or(default)
}

/// Parse a GPCI multiplier; absent or invalid values are neutral (1.0)
pub fn parse_ratio(value: Option<&str>) -> f64 {
    currency_or(value, 1.0)
}

/// Whether a code cell holds a real procedure code
fn is_data_code(code: &str) -> bool {
    !code.is_empty() && code != CODE_COLUMN
}

impl FeeScheduleRecord {
    /// Normalize a fee schedule row
    ///
    /// Returns `None` for rows without a code or echoing the header.
    pub fn from_row(row: &CsvRow) -> Option<Self> {
        let code = row.get(CODE_COLUMN).filter(|c| is_data_code(c))?;

        Some(Self {
            code: ProcedureCode::new(code),
            work_rvu: currency_or(row.get(FeeScheduleSchema::WORK_RVU), 0.0),
            facility_pe_rvu: currency_or(row.get(FeeScheduleSchema::FACILITY_PE_RVU), 0.0),
            transitioned_facility_pe_rvu: currency_or(
                row.get(FeeScheduleSchema::TRANSITIONED_FACILITY_PE_RVU),
                0.0,
            ),
            non_facility_pe_rvu: currency_or(row.get(FeeScheduleSchema::NON_FACILITY_PE_RVU), 0.0),
            transitioned_non_facility_pe_rvu: currency_or(
                row.get(FeeScheduleSchema::TRANSITIONED_NON_FACILITY_PE_RVU),
                0.0,
            ),
            mp_rvu: currency_or(row.get(FeeScheduleSchema::MP_RVU), 0.0),
            gpci_work: parse_ratio(row.get(FeeScheduleSchema::GPCI_WORK)),
            gpci_pe: parse_ratio(row.get(FeeScheduleSchema::GPCI_PE)),
            gpci_mp: parse_ratio(row.get(FeeScheduleSchema::GPCI_MP)),
            conversion_factor: currency_or(row.get(FeeScheduleSchema::CONVERSION_FACTOR), 0.0),
        })
    }
}

impl PaymentRecord {
    /// Normalize a payment addendum row
    ///
    /// Returns `None` when the code is missing or the payment cell is empty
    /// or unparseable.
    pub fn from_row(row: &CsvRow) -> Option<Self> {
        let code = row.get(CODE_COLUMN).filter(|c| is_data_code(c))?;
        let payment_rate = row
            .get(PaymentAddendumSchema::PAYMENT_RATE)
            .and_then(parse_currency)?;

        Some(Self {
            code: ProcedureCode::new(code),
            payment_rate,
        })
    }
}
