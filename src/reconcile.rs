/*!
 * Reimbursement and payment series reconciliation
 *
 * The two series are keyed by different year labels: fee schedules may be
 * split into half-years ("2024A", "2024B") while payment addenda are
 * published per calendar year. A [`YearMap`] translates each reimbursement
 * year into an ordered list of payment year candidates.
 *
 * Reconciliation first produces one flat list of [`CombinedRecord`]s; the
 * by-group and by-code views are both derived from that list.
 */

use std::collections::BTreeMap;

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::{
    changes::{compute_combined_changes, CombinedChangeTable, CombinedYears},
    data_types::{CombinedEntry, ProcedureCode, YearLabel},
    payment::PaymentSeries,
    series::ReimbursementSeries,
};

/// Canonical year → ordered payment year candidates
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct YearMap {
    entries: BTreeMap<YearLabel, Vec<YearLabel>>,
}

impl Default for YearMap {
    fn default() -> Self {
        let mut map = Self::identity();
        map.insert("2024A", &["2024", "2024A"]);
        map.insert("2024B", &["2024", "2024B"]);
        map
    }
}

impl YearMap {
    /// A map where every year is its own only candidate
    pub fn identity() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }

    pub fn insert(&mut self, year: &str, candidates: &[&str]) {
        self.entries.insert(
            YearLabel::new(year),
            candidates.iter().map(|c| YearLabel::new(c)).collect(),
        );
    }

    /// Candidate payment years, in preference order
    pub fn candidates(&self, year: &YearLabel) -> Vec<YearLabel> {
        match self.entries.get(year) {
            Some(candidates) if !candidates.is_empty() => candidates.clone(),
            _ => vec![year.clone()],
        }
    }

    /// First candidate present in the payment series
    ///
    /// A payment year counts as present even when it holds no rates.
    pub fn resolve(&self, year: &YearLabel, payments: &PaymentSeries) -> Option<YearLabel> {
        self.candidates(year).into_iter().find(|c| payments.has_year(c))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// One reconciled (group, year, code) cell
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CombinedRecord {
    pub group: String,
    pub year: YearLabel,
    pub code: ProcedureCode,
    pub entry: CombinedEntry,
    /// Payment year the payment was taken from
    pub payment_year: Option<YearLabel>,
}

/// Combined entries and changes for one group
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GroupCombined {
    /// year → code → entry, populated years only
    pub years: CombinedYears,
    pub changes: CombinedChangeTable,
}

impl GroupCombined {
    pub fn entry(&self, year: &YearLabel, code: &ProcedureCode) -> Option<&CombinedEntry> {
        self.years.get(year).and_then(|codes| codes.get(code))
    }

    pub fn contains_code(&self, code: &ProcedureCode) -> bool {
        self.years.values().any(|codes| codes.contains_key(code))
    }
}

/// A by-code entry tagged with the group it came from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CodeYearEntry {
    #[serde(flatten)]
    pub entry: CombinedEntry,
    pub group: String,
}

/// Reconciled rates, indexed by group and by code
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CombinedRates {
    pub by_group: BTreeMap<String, GroupCombined>,
    pub by_code: BTreeMap<ProcedureCode, BTreeMap<YearLabel, CodeYearEntry>>,
    #[serde(skip)]
    records: Vec<CombinedRecord>,
}

impl CombinedRates {
    /// Derive both indexes from a flat record list
    ///
    /// Every name in `group_names` gets a by-group entry, populated or not.
    /// When a code appears in several groups, the by-code view keeps the
    /// record that comes last.
    pub fn from_records(group_names: &[String], records: Vec<CombinedRecord>) -> Self {
        let mut by_group: BTreeMap<String, GroupCombined> = group_names
            .iter()
            .map(|name| (name.clone(), GroupCombined::default()))
            .collect();
        let mut by_code: BTreeMap<ProcedureCode, BTreeMap<YearLabel, CodeYearEntry>> = BTreeMap::new();

        for record in &records {
            by_group
                .entry(record.group.clone())
                .or_default()
                .years
                .entry(record.year.clone())
                .or_default()
                .insert(record.code.clone(), record.entry);

            by_code.entry(record.code.clone()).or_default().insert(
                record.year.clone(),
                CodeYearEntry {
                    entry: record.entry,
                    group: record.group.clone(),
                },
            );
        }

        for group in by_group.values_mut() {
            group.changes = compute_combined_changes(&group.years);
        }

        Self {
            by_group,
            by_code,
            records,
        }
    }

    pub fn records(&self) -> &[CombinedRecord] {
        &self.records
    }

    pub fn group(&self, name: &str) -> Option<&GroupCombined> {
        self.by_group.get(name)
    }

    pub fn code(&self, code: &ProcedureCode) -> Option<&BTreeMap<YearLabel, CodeYearEntry>> {
        self.by_code.get(code)
    }

    /// Reduced view holding only one code, or `None` if the code is unknown
    pub fn filter_code(&self, code: &ProcedureCode) -> Option<Self> {
        let code_entries = self.by_code.get(code)?;

        let mut by_group = BTreeMap::new();
        for (name, group) in &self.by_group {
            if !group.contains_code(code) {
                continue;
            }

            let years: CombinedYears = group
                .years
                .iter()
                .filter_map(|(year, codes)| {
                    codes
                        .get(code)
                        .map(|entry| (year.clone(), BTreeMap::from([(code.clone(), *entry)])))
                })
                .collect();
            let changes: CombinedChangeTable = group
                .changes
                .get(code)
                .map(|periods| BTreeMap::from([(code.clone(), periods.clone())]))
                .unwrap_or_default();

            by_group.insert(name.clone(), GroupCombined { years, changes });
        }

        Some(Self {
            by_group,
            by_code: BTreeMap::from([(code.clone(), code_entries.clone())]),
            records: self.records.iter().filter(|r| &r.code == code).cloned().collect(),
        })
    }

    /// Reduced view holding only one group, or `None` if the group is unknown
    pub fn filter_group(&self, name: &str) -> Option<Self> {
        let group = self.by_group.get(name)?;

        let mut by_code: BTreeMap<ProcedureCode, BTreeMap<YearLabel, CodeYearEntry>> = BTreeMap::new();
        for (year, codes) in &group.years {
            for code in codes.keys() {
                let years = by_code.entry(code.clone()).or_default();
                if let Some(entry) = self.by_code.get(code).and_then(|y| y.get(year)) {
                    years.insert(year.clone(), entry.clone());
                }
            }
        }

        Some(Self {
            by_group: BTreeMap::from([(name.to_string(), group.clone())]),
            by_code,
            records: self.records.iter().filter(|r| r.group == name).cloned().collect(),
        })
    }

    /// Number of records that found a payment
    pub fn payment_coverage(&self) -> (usize, usize) {
        let with_payment = self.records.iter().filter(|r| r.entry.payment.is_some()).count();
        (with_payment, self.records.len())
    }
}

/// Joins a reimbursement series with a payment series
pub struct Reconciler {
    year_map: YearMap,
}

impl Default for Reconciler {
    fn default() -> Self {
        Self::new(YearMap::default())
    }
}

impl Reconciler {
    pub fn new(year_map: YearMap) -> Self {
        Self { year_map }
    }

    pub fn year_map(&self) -> &YearMap {
        &self.year_map
    }

    /// Flat list of combined records in group, year, code order
    pub fn combine(&self, reimbursement: &ReimbursementSeries, payments: &PaymentSeries) -> Vec<CombinedRecord> {
        let mut records = Vec::new();

        for (group_name, series) in &reimbursement.groups {
            for (year, rates) in &series.rates {
                if rates.is_empty() {
                    continue;
                }

                let payment_year = self.year_map.resolve(year, payments);
                debug!(
                    "Group {} year {} uses payment year {}",
                    group_name,
                    year,
                    payment_year.as_ref().map(|y| y.as_str()).unwrap_or("none")
                );

                for (code, rate) in rates {
                    let payment = payment_year.as_ref().and_then(|py| payments.get(py, code));
                    records.push(CombinedRecord {
                        group: group_name.clone(),
                        year: year.clone(),
                        code: code.clone(),
                        entry: CombinedEntry::new(Some(*rate), payment),
                        payment_year: payment_year.clone(),
                    });
                }
            }
        }

        records
    }

    /// Reconcile both series into by-group and by-code views
    pub fn reconcile(&self, reimbursement: &ReimbursementSeries, payments: &PaymentSeries) -> CombinedRates {
        let records = self.combine(reimbursement, payments);
        info!(
            "Reconciled {} records across {} groups",
            records.len(),
            reimbursement.groups.len()
        );
        CombinedRates::from_records(&reimbursement.group_names(), records)
    }
}
