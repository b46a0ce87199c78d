/*!
 * Reimbursement series builder
 *
 * For each code group, loads the fee schedule of every requested year,
 * computes a reimbursement rate per code and derives the year-over-year
 * change table. A missing fee schedule leaves its year empty.
 */

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use log::{info, warn};
use serde::{Deserialize, Serialize};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use crate::{
    calculator::calculate_reimbursement_rate,
    changes::{compute_yearly_changes, ChangeTable},
    data_types::{CodeGroup, FacilityType, FeeScheduleRecord, ProcedureCode, RateTable, YearLabel},
    reader::RateFileReader,
    RatesError, Result,
};

/// Rates and changes for one code group
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupSeries {
    pub group: String,
    /// Years in the order they were requested
    pub years: Vec<YearLabel>,
    /// Normalized fee schedule rows per year
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub records: BTreeMap<YearLabel, Vec<FeeScheduleRecord>>,
    /// year → code → rate; every requested year has an entry
    pub rates: BTreeMap<YearLabel, RateTable>,
    pub changes: ChangeTable,
}

impl GroupSeries {
    pub fn rate(&self, year: &YearLabel, code: &ProcedureCode) -> Option<f64> {
        self.rates.get(year).and_then(|table| table.get(code)).copied()
    }

    /// Years that produced at least one rate
    pub fn populated_years(&self) -> Vec<&YearLabel> {
        self.years
            .iter()
            .filter(|y| self.rates.get(*y).is_some_and(|t| !t.is_empty()))
            .collect()
    }

    /// Every code with a rate in any year
    pub fn codes(&self) -> Vec<&ProcedureCode> {
        let mut codes: Vec<&ProcedureCode> = self.rates.values().flat_map(|t| t.keys()).collect();
        codes.sort();
        codes.dedup();
        codes
    }
}

/// Reimbursement series for every group, keyed by group name
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReimbursementSeries {
    pub groups: BTreeMap<String, GroupSeries>,
}

impl ReimbursementSeries {
    pub fn get(&self, group: &str) -> Option<&GroupSeries> {
        self.groups.get(group)
    }

    pub fn group_names(&self) -> Vec<String> {
        self.groups.keys().cloned().collect()
    }

    /// Reimbursement rate of a code by year, across all groups
    pub fn code_rates(&self, code: &ProcedureCode) -> BTreeMap<YearLabel, f64> {
        let mut rates = BTreeMap::new();
        for series in self.groups.values() {
            for (year, table) in &series.rates {
                if let Some(rate) = table.get(code) {
                    rates.insert(year.clone(), *rate);
                }
            }
        }
        rates
    }
}

/// Builds reimbursement series from a directory of fee schedules
pub struct YearSeriesBuilder {
    data_dir: PathBuf,
    years: Vec<YearLabel>,
    facility_type: FacilityType,
    keep_records: bool,
    reader: RateFileReader,
}

impl YearSeriesBuilder {
    pub fn new<P: AsRef<Path>>(data_dir: P, years: Vec<YearLabel>) -> Self {
        Self {
            data_dir: data_dir.as_ref().to_path_buf(),
            years,
            facility_type: FacilityType::Facility,
            keep_records: false,
            reader: RateFileReader::fee_schedule(),
        }
    }

    pub fn with_facility_type(mut self, facility_type: FacilityType) -> Self {
        self.facility_type = facility_type;
        self
    }

    /// Keep the normalized fee schedule rows in the output
    pub fn with_records(mut self, keep: bool) -> Self {
        self.keep_records = keep;
        self
    }

    /// Build the series for every group
    pub fn build_all(&self, groups: &[CodeGroup]) -> Result<ReimbursementSeries> {
        let mut series = ReimbursementSeries::default();
        for group in groups {
            series.groups.insert(group.name.clone(), self.build_group(group)?);
        }
        Ok(series)
    }

    /// Build the series for one group
    pub fn build_group(&self, group: &CodeGroup) -> Result<GroupSeries> {
        info!("Processing group {} ({} years)", group.name, self.years.len());

        #[cfg(feature = "parallel")]
        let loaded: Vec<(YearLabel, Vec<FeeScheduleRecord>)> = self
            .years
            .par_iter()
            .map(|year| self.load_year(group, year).map(|records| (year.clone(), records)))
            .collect::<Result<Vec<_>>>()?;

        #[cfg(not(feature = "parallel"))]
        let loaded: Vec<(YearLabel, Vec<FeeScheduleRecord>)> = self
            .years
            .iter()
            .map(|year| self.load_year(group, year).map(|records| (year.clone(), records)))
            .collect::<Result<Vec<_>>>()?;

        let mut rates = BTreeMap::new();
        let mut records = BTreeMap::new();
        for (year, year_records) in loaded {
            let table: RateTable = year_records
                .iter()
                .map(|record| {
                    (
                        record.code.clone(),
                        calculate_reimbursement_rate(record, self.facility_type),
                    )
                })
                .collect();
            rates.insert(year.clone(), table);
            if self.keep_records {
                records.insert(year, year_records);
            }
        }

        let changes = compute_yearly_changes(&rates, &self.years);

        Ok(GroupSeries {
            group: group.name.clone(),
            years: self.years.clone(),
            records,
            rates,
            changes,
        })
    }

    fn load_year(&self, group: &CodeGroup, year: &YearLabel) -> Result<Vec<FeeScheduleRecord>> {
        let path = group.file_path(&self.data_dir, year);
        info!("Processing year {} in group {}", year, group.name);

        match self.reader.read_path(&path) {
            Ok(rows) => Ok(rows.iter().filter_map(FeeScheduleRecord::from_row).collect()),
            Err(RatesError::FileNotFound { path, .. }) => {
                warn!("File not found: {}", path.display());
                Ok(Vec::new())
            }
            Err(e) => Err(e),
        }
    }
}
