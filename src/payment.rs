/*!
 * Payment series loader
 *
 * Reads every hospital outpatient payment addendum in a directory and keeps
 * the payment rate of a set of target codes, keyed by the year inferred from
 * each filename.
 */

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

use lazy_static::lazy_static;
use log::{debug, error, info, warn};
use regex::Regex;
use serde::{Deserialize, Serialize};

#[cfg(feature = "progress")]
use indicatif::{ProgressBar, ProgressStyle};

use crate::{
    data_types::{PaymentRecord, ProcedureCode, RateTable, YearLabel},
    reader::RateFileReader,
    RatesError, Result,
};

lazy_static! {
    static ref YEAR_IN_FILENAME: Regex = Regex::new(r"20\d\d").unwrap();
}

/// Filename prefixes that name their year explicitly
const KNOWN_PREFIXES: &[(&str, &str)] = &[
    ("2020_january", "2020"),
    ("2021_january", "2021"),
    ("2023_january", "2023"),
];

/// Years recognised anywhere in a filename, first match wins
///
/// "2025" is checked before "2024", so a 2025 release whose name also
/// mentions 2024 (e.g. `addendum_b_2024_2025.csv`) is filed under 2025.
const KNOWN_SUBSTRINGS: &[&str] = &["2025", "2022", "2024"];

/// Infer the payment year of an addendum from its filename
///
/// Known release prefixes win, then a fixed list of years found anywhere in
/// the name, then the first `20xx` sequence. Names with no year map to
/// "unknown".
pub fn infer_year_from_filename(file_name: &str) -> YearLabel {
    if let Some((_, year)) = KNOWN_PREFIXES.iter().find(|(prefix, _)| file_name.starts_with(prefix)) {
        return YearLabel::new(year);
    }

    if let Some(year) = KNOWN_SUBSTRINGS.iter().find(|year| file_name.contains(*year)) {
        return YearLabel::new(year);
    }

    YEAR_IN_FILENAME
        .find(file_name)
        .map(|m| YearLabel::new(m.as_str()))
        .unwrap_or_else(YearLabel::unknown)
}

/// Payment rates by year and code
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PaymentSeries {
    pub years: BTreeMap<YearLabel, RateTable>,
}

impl PaymentSeries {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the year exists at all, even with no target codes
    pub fn has_year(&self, year: &YearLabel) -> bool {
        self.years.contains_key(year)
    }

    pub fn get(&self, year: &YearLabel, code: &ProcedureCode) -> Option<f64> {
        self.years.get(year).and_then(|table| table.get(code)).copied()
    }

    pub fn year(&self, year: &YearLabel) -> Option<&RateTable> {
        self.years.get(year)
    }

    /// Record a rate; a later insert for the same key replaces the earlier one
    pub fn insert(&mut self, year: YearLabel, code: ProcedureCode, rate: f64) {
        self.years.entry(year).or_default().insert(code, rate);
    }

    /// Payment rate of a code by year
    pub fn code_rates(&self, code: &ProcedureCode) -> BTreeMap<YearLabel, f64> {
        self.years
            .iter()
            .filter_map(|(year, table)| table.get(code).map(|rate| (year.clone(), *rate)))
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.years.is_empty()
    }

    /// Number of (year, code) rates held
    pub fn rate_count(&self) -> usize {
        self.years.values().map(|t| t.len()).sum()
    }
}

/// Loads a payment series from a directory of addendum files
pub struct PaymentLoader {
    payment_dir: PathBuf,
    target_codes: BTreeSet<ProcedureCode>,
    reader: RateFileReader,
    show_progress: bool,
}

impl PaymentLoader {
    pub fn new<P: AsRef<Path>>(payment_dir: P, target_codes: &[ProcedureCode]) -> Self {
        Self {
            payment_dir: payment_dir.as_ref().to_path_buf(),
            target_codes: target_codes.iter().cloned().collect(),
            reader: RateFileReader::payment_addendum(),
            show_progress: false,
        }
    }

    /// Show a progress bar while files are processed
    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    /// CSV files of the payment directory in filename order
    fn list_files(&self) -> Result<Vec<PathBuf>> {
        let entries = fs::read_dir(&self.payment_dir).map_err(|e| RatesError::DirectoryRead {
            path: self.payment_dir.clone(),
            message: e.to_string(),
        })?;

        let mut files = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| RatesError::DirectoryRead {
                path: self.payment_dir.clone(),
                message: e.to_string(),
            })?;
            let path = entry.path();
            let is_csv = path
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"));
            if is_csv && path.is_file() {
                files.push(path);
            }
        }

        files.sort();
        Ok(files)
    }

    /// Load every addendum file
    ///
    /// A missing directory gives an empty series. A directory that cannot
    /// be listed is an error. Files that fail to parse are skipped.
    pub fn load(&self) -> Result<PaymentSeries> {
        let mut series = PaymentSeries::new();

        if !self.payment_dir.exists() {
            warn!("Payment directory not found: {}", self.payment_dir.display());
            return Ok(series);
        }

        let files = self.list_files()?;

        #[cfg(feature = "progress")]
        let progress_bar = if self.show_progress {
            let pb = ProgressBar::new(files.len() as u64);
            pb.set_style(
                ProgressStyle::default_bar()
                    .template("[{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
                    .unwrap_or_else(|_| ProgressStyle::default_bar())
                    .progress_chars("#>-"),
            );
            Some(pb)
        } else {
            None
        };

        for path in &files {
            let file_name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            let year = infer_year_from_filename(&file_name);
            info!("Processing payment file for year {}: {}", year, file_name);

            #[cfg(feature = "progress")]
            if let Some(ref pb) = progress_bar {
                pb.set_message(file_name.clone());
            }

            match self.reader.read_path(path) {
                Ok(rows) => {
                    // The year exists once its file parsed, even with no target codes
                    series.years.entry(year.clone()).or_default();

                    let mut matched = 0usize;
                    for record in rows.iter().filter_map(PaymentRecord::from_row) {
                        if self.target_codes.contains(&record.code) {
                            series.insert(year.clone(), record.code, record.payment_rate);
                            matched += 1;
                        }
                    }
                    debug!("{}: {} target code rows out of {}", file_name, matched, rows.len());
                }
                Err(e) => {
                    error!("Error processing payment file {}: {}", file_name, e);
                }
            }

            #[cfg(feature = "progress")]
            if let Some(ref pb) = progress_bar {
                pb.inc(1);
            }
        }

        #[cfg(feature = "progress")]
        if let Some(pb) = progress_bar {
            pb.finish_with_message("Payment files loaded");
        }

        info!(
            "Loaded {} payment rates across {} years",
            series.rate_count(),
            series.years.len()
        );

        Ok(series)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn codes(list: &[&str]) -> Vec<ProcedureCode> {
        list.iter().map(|c| ProcedureCode::new(c)).collect()
    }

    #[test]
    fn test_infer_year_from_filename() {
        assert_eq!(infer_year_from_filename("2020_january_web_addendum_b.csv").as_str(), "2020");
        assert_eq!(infer_year_from_filename("2021_january_addendum_b.csv").as_str(), "2021");
        assert_eq!(infer_year_from_filename("2023_january_2024_update.csv").as_str(), "2023");
        assert_eq!(infer_year_from_filename("addendum_b_2024_2025.csv").as_str(), "2025");
        assert_eq!(infer_year_from_filename("2024_addendum_for_2025.csv").as_str(), "2025");
        assert_eq!(infer_year_from_filename("jan_2022_addendum.csv").as_str(), "2022");
        assert_eq!(infer_year_from_filename("october_2024.csv").as_str(), "2024");
        assert_eq!(infer_year_from_filename("addendum_2019.csv").as_str(), "2019");
        assert_eq!(infer_year_from_filename("addendum_b.csv").as_str(), "unknown");
    }

    #[test]
    fn test_missing_directory_is_empty() {
        let series = PaymentLoader::new("/nonexistent/payment/dir", &codes(&["61885"]))
            .load()
            .unwrap();
        assert!(series.is_empty());
    }

    #[test]
    fn test_unreadable_directory_is_error() {
        let temp = TempDir::new().unwrap();
        let not_a_dir = temp.path().join("AB");
        std::fs::write(&not_a_dir, "HCPCS Code,Payment Rate\n").unwrap();

        let err = PaymentLoader::new(&not_a_dir, &codes(&["61885"]))
            .with_progress(false)
            .load()
            .unwrap_err();
        assert!(matches!(err, RatesError::DirectoryRead { ref path, .. } if path == &not_a_dir));
    }

    #[test]
    fn test_last_row_wins() {
        let temp = TempDir::new().unwrap();
        fs::write(
            temp.path().join("2021_january_addendum.csv"),
            "HCPCS Code,Short Descriptor,Payment Rate\n\
             61885,Implant neurostim,\"$1,000.00\"\n\
             61885,Implant neurostim,\"$1,250.50\"\n\
             99999,Other,$5.00\n",
        )
        .unwrap();

        let series = PaymentLoader::new(temp.path(), &codes(&["61885"])).load().unwrap();
        let year = YearLabel::new("2021");
        assert_eq!(series.get(&year, &ProcedureCode::new("61885")), Some(1250.5));
        assert_eq!(series.get(&year, &ProcedureCode::new("99999")), None);
    }

    #[test]
    fn test_year_without_target_codes_still_exists() {
        let temp = TempDir::new().unwrap();
        fs::write(
            temp.path().join("october_2024_addendum.CSV"),
            "HCPCS Code,Payment Rate\n12345,$10.00\n",
        )
        .unwrap();
        fs::write(temp.path().join("notes.txt"), "not a csv").unwrap();

        let series = PaymentLoader::new(temp.path(), &codes(&["61885"])).load().unwrap();
        assert!(series.has_year(&YearLabel::new("2024")));
        assert_eq!(series.rate_count(), 0);
        assert_eq!(series.years.len(), 1);
    }

    #[test]
    fn test_unparseable_payment_is_skipped() {
        let temp = TempDir::new().unwrap();
        fs::write(
            temp.path().join("2025_addendum.csv"),
            "HCPCS Code,Payment Rate\n0001A,\n0002A,pending\n0003A,$40.00\n",
        )
        .unwrap();

        let series = PaymentLoader::new(temp.path(), &codes(&["0001A", "0002A", "0003A"]))
            .load()
            .unwrap();
        let year = YearLabel::new("2025");
        assert_eq!(series.get(&year, &ProcedureCode::new("0001A")), None);
        assert_eq!(series.get(&year, &ProcedureCode::new("0002A")), None);
        assert_eq!(series.get(&year, &ProcedureCode::new("0003A")), Some(40.0));
    }
}
