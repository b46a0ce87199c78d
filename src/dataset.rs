/*!
 * Unified dataset API for HCPCS rate data
 *
 * Runs the whole pipeline (fee schedules, payment addenda, reconciliation)
 * through a builder and exposes the results behind one lookup interface.
 */

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Instant;

use log::info;
use serde::{Deserialize, Serialize};

use crate::{
    analytics::{CodeHistory, RateAnalytics},
    config::AnalysisConfig,
    data_types::{CodeGroup, FacilityType, ProcedureCode, YearLabel},
    payment::{PaymentLoader, PaymentSeries},
    reconcile::{CodeYearEntry, CombinedRates, GroupCombined, Reconciler, YearMap},
    series::{GroupSeries, ReimbursementSeries, YearSeriesBuilder},
    Result,
};

/// Builder for running the rate pipeline
///
/// # Example
/// ```no_run
/// # use hcpcs_rates::dataset::RateDatasetBuilder;
/// let dataset = RateDatasetBuilder::new()
///     .data_dir("data")
///     .payment_dir("data/AB")
///     .years(&["2023", "2024A", "2024B"])
///     .build()?;
/// # Ok::<(), hcpcs_rates::RatesError>(())
/// ```
pub struct RateDatasetBuilder {
    config: AnalysisConfig,
    keep_records: bool,
}

impl Default for RateDatasetBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl RateDatasetBuilder {
    pub fn new() -> Self {
        Self::from_config(AnalysisConfig::default())
    }

    pub fn from_config(config: AnalysisConfig) -> Self {
        Self {
            config,
            keep_records: false,
        }
    }

    pub fn data_dir<P: AsRef<Path>>(mut self, dir: P) -> Self {
        self.config.data_dir = dir.as_ref().to_path_buf();
        self
    }

    pub fn payment_dir<P: AsRef<Path>>(mut self, dir: P) -> Self {
        self.config.payment_dir = dir.as_ref().to_path_buf();
        self
    }

    pub fn groups(mut self, groups: Vec<CodeGroup>) -> Self {
        self.config.groups = groups;
        self
    }

    pub fn years(mut self, years: &[&str]) -> Self {
        self.config.years = years.iter().map(|y| YearLabel::new(y)).collect();
        self
    }

    pub fn year_map(mut self, year_map: YearMap) -> Self {
        self.config.year_map = year_map;
        self
    }

    pub fn target_codes(mut self, codes: &[&str]) -> Self {
        self.config.target_codes = codes.iter().map(|c| ProcedureCode::new(c)).collect();
        self
    }

    pub fn facility_type(mut self, facility_type: FacilityType) -> Self {
        self.config.facility_type = facility_type;
        self
    }

    pub fn show_progress(mut self, show: bool) -> Self {
        self.config.show_progress = show;
        self
    }

    /// Keep normalized fee schedule rows in the reimbursement series
    pub fn keep_records(mut self, keep: bool) -> Self {
        self.keep_records = keep;
        self
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    /// Compute the reimbursement series only
    pub fn build_reimbursement(&self) -> Result<ReimbursementSeries> {
        YearSeriesBuilder::new(&self.config.data_dir, self.config.years.clone())
            .with_facility_type(self.config.facility_type)
            .with_records(self.keep_records)
            .build_all(&self.config.groups)
    }

    /// Load the payment series only
    pub fn load_payments(&self) -> Result<PaymentSeries> {
        PaymentLoader::new(&self.config.payment_dir, &self.config.target_codes)
            .with_progress(self.config.show_progress)
            .load()
    }

    /// Reconcile an already computed reimbursement series with fresh payments
    pub fn build_with_reimbursement(&self, reimbursement: ReimbursementSeries) -> Result<RateDataset> {
        let payment = self.load_payments()?;
        Ok(RateDataset::new(
            reimbursement,
            payment,
            self.config.year_map.clone(),
            self.config.facility_type,
        ))
    }

    /// Run the full pipeline
    pub fn build(self) -> Result<RateDataset> {
        let start_time = Instant::now();
        info!(
            "Building rate dataset from {} ({} groups, {} years)",
            self.config.data_dir.display(),
            self.config.groups.len(),
            self.config.years.len()
        );

        let reimbursement = self.build_reimbursement()?;
        let dataset = self.build_with_reimbursement(reimbursement)?;

        info!("Rate dataset built in {:.2}s", start_time.elapsed().as_secs_f64());
        Ok(dataset)
    }
}

/// Reimbursement, payment, and combined rates from one pipeline run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateDataset {
    pub reimbursement: ReimbursementSeries,
    pub payment: PaymentSeries,
    pub combined: CombinedRates,
    pub facility_type: FacilityType,
}

impl RateDataset {
    /// Reconcile two series into a dataset
    pub fn new(
        reimbursement: ReimbursementSeries,
        payment: PaymentSeries,
        year_map: YearMap,
        facility_type: FacilityType,
    ) -> Self {
        let combined = Reconciler::new(year_map).reconcile(&reimbursement, &payment);
        Self {
            reimbursement,
            payment,
            combined,
            facility_type,
        }
    }

    /// Load with the default groups and years from a data directory
    /// holding the group folders and an `AB` payment folder
    pub fn load_standard<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref();
        let payment_dir: PathBuf = dir.join(crate::constants::PAYMENT_SUBDIR);
        RateDatasetBuilder::new()
            .data_dir(dir)
            .payment_dir(payment_dir)
            .show_progress(false)
            .build()
    }

    pub fn get_group(&self, name: &str) -> Option<&GroupSeries> {
        self.reimbursement.get(name)
    }

    pub fn get_combined_group(&self, name: &str) -> Option<&GroupCombined> {
        self.combined.group(name)
    }

    pub fn get_code(&self, code: &ProcedureCode) -> Option<&BTreeMap<YearLabel, CodeYearEntry>> {
        self.combined.code(code)
    }

    /// Full history of one code, or `None` if no series mentions it
    pub fn history(&self, code: &ProcedureCode) -> Option<CodeHistory> {
        CodeHistory::collect(self, code)
    }

    pub fn analytics(&self) -> RateAnalytics<'_> {
        RateAnalytics::new(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn fixture() -> TempDir {
        let temp = TempDir::new().unwrap();
        let group = CodeGroup::national("618", &["61885"]);
        let group_dir = temp.path().join("618");
        fs::create_dir_all(&group_dir).unwrap();
        for (year, cf) in [("2023", "30"), ("2024A", "33")] {
            fs::write(
                group_dir.join(group.file_name(&YearLabel::new(year))),
                format!("HCPCS Code,Work RVU,Fully Implemented Facility PE RVU,MP RVU,Conv Fact\n61885,5,4,1,{}\n", cf),
            )
            .unwrap();
        }

        let ab = temp.path().join("AB");
        fs::create_dir_all(&ab).unwrap();
        fs::write(ab.join("2024_addendum_b.csv"), "HCPCS Code,Payment Rate\n61885,$100.00\n").unwrap();
        temp
    }

    #[test]
    fn test_builder_runs_pipeline() {
        let temp = fixture();
        let dataset = RateDatasetBuilder::new()
            .data_dir(temp.path())
            .payment_dir(temp.path().join("AB"))
            .groups(vec![CodeGroup::national("618", &["61885"])])
            .years(&["2023", "2024A"])
            .show_progress(false)
            .build()
            .unwrap();

        let code = ProcedureCode::new("61885");
        let series = dataset.get_group("618").unwrap();
        assert_eq!(series.rate(&YearLabel::new("2023"), &code), Some(300.0));

        let by_year = dataset.get_code(&code).unwrap();
        assert_eq!(by_year[&YearLabel::new("2024A")].entry.combined, Some(430.0));
        assert_eq!(by_year[&YearLabel::new("2023")].entry.payment, None);

        assert!(dataset.get_group("700").is_none());
        assert!(dataset.get_code(&ProcedureCode::new("99999")).is_none());
    }

    #[test]
    fn test_load_standard_with_missing_groups() {
        let temp = fixture();
        let dataset = RateDataset::load_standard(temp.path()).unwrap();

        // Default groups 645 and 959 have no files and stay empty
        assert_eq!(dataset.reimbursement.groups.len(), 3);
        assert!(dataset.get_group("645").unwrap().populated_years().is_empty());
        assert!(dataset.get_combined_group("959").unwrap().years.is_empty());
    }
}
