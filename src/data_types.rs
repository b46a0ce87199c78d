/*!
 * Data type definitions for HCPCS rate analysis
 *
 * This module contains the value types shared by the ingestion, calculation,
 * and reconciliation stages: procedure codes, year labels, code groups, the
 * normalized fee schedule record, and the combined/change entries produced by
 * the reconciler.
 */

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// HCPCS procedure code, e.g. "61885" or "0001A"
///
/// Codes are opaque: they are compared by exact string equality and never
/// coerced to numbers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProcedureCode(pub String);

impl ProcedureCode {
    /// Create a code, trimming surrounding whitespace
    pub fn new(code: impl AsRef<str>) -> Self {
        ProcedureCode(code.as_ref().trim().to_string())
    }

    /// Get the code as a string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProcedureCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ProcedureCode {
    fn from(code: &str) -> Self {
        ProcedureCode::new(code)
    }
}

/// Year label such as "2023" or a split half-year such as "2024A"
///
/// Labels order by their 4-digit numeric prefix first and by the full string
/// when prefixes tie, so "2023" < "2024A" < "2024B" < "2025". Labels without
/// a numeric prefix (e.g. "unknown") sort after every dated label.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct YearLabel(String);

impl YearLabel {
    pub fn new(label: impl AsRef<str>) -> Self {
        YearLabel(label.as_ref().trim().to_string())
    }

    /// Label used when no year can be inferred from a filename
    pub fn unknown() -> Self {
        YearLabel("unknown".to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Numeric calendar year taken from the first four characters
    pub fn numeric_year(&self) -> Option<u32> {
        let prefix = self.0.get(0..4)?;
        if prefix.chars().all(|c| c.is_ascii_digit()) {
            prefix.parse().ok()
        } else {
            None
        }
    }

    /// Whether the label carries a sub-year suffix ("2024A")
    pub fn is_split(&self) -> bool {
        self.numeric_year().is_some() && self.0.len() > 4
    }
}

impl Ord for YearLabel {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self.numeric_year(), other.numeric_year()) {
            (Some(a), Some(b)) => a.cmp(&b).then_with(|| self.0.cmp(&other.0)),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => self.0.cmp(&other.0),
        }
    }
}

impl PartialOrd for YearLabel {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for YearLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for YearLabel {
    fn from(label: &str) -> Self {
        YearLabel::new(label)
    }
}

/// A pair of consecutive years, rendered as "2023 to 2024A"
///
/// Periods order by their starting year, then their ending year, and
/// serialize as their label so they can key JSON objects.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Period {
    pub from: YearLabel,
    pub to: YearLabel,
}

impl Period {
    pub fn new(from: YearLabel, to: YearLabel) -> Self {
        Self { from, to }
    }

    pub fn label(&self) -> String {
        format!("{} to {}", self.from, self.to)
    }

    /// Parse a "<from> to <to>" label
    pub fn parse(label: &str) -> Option<Self> {
        let (from, to) = label.split_once(" to ")?;
        Some(Self::new(YearLabel::new(from), YearLabel::new(to)))
    }

    /// Consecutive pairs of an ordered year list
    pub fn consecutive(years: &[YearLabel]) -> Vec<Period> {
        years
            .windows(2)
            .map(|pair| Period::new(pair[0].clone(), pair[1].clone()))
            .collect()
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} to {}", self.from, self.to)
    }
}

impl Serialize for Period {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.label())
    }
}

impl<'de> Deserialize<'de> for Period {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let label = String::deserialize(deserializer)?;
        Period::parse(&label)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid period label '{}'", label)))
    }
}

/// Which practice expense RVU the calculator uses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum FacilityType {
    #[default]
    Facility,
    NonFacility,
}

impl FacilityType {
    pub fn from_str_opt(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "facility" | "fac" => Some(FacilityType::Facility),
            "non-facility" | "nonfacility" | "non_facility" | "non-fac" => Some(FacilityType::NonFacility),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FacilityType::Facility => "facility",
            FacilityType::NonFacility => "non-facility",
        }
    }
}

impl fmt::Display for FacilityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A named set of related codes sharing one fee schedule naming convention
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeGroup {
    /// Group name, also the sub-directory holding its files (e.g. "618")
    pub name: String,
    /// Codes belonging to the group
    pub codes: Vec<ProcedureCode>,
    /// Filename template; `{year}` is replaced with the year label
    pub file_template: String,
}

impl CodeGroup {
    pub fn new(name: &str, codes: &[&str], file_template: &str) -> Self {
        Self {
            name: name.to_string(),
            codes: codes.iter().map(|c| ProcedureCode::new(c)).collect(),
            file_template: file_template.to_string(),
        }
    }

    /// Create a group using the standard national payment amount template
    pub fn national(name: &str, codes: &[&str]) -> Self {
        let joined = codes.join("-");
        let template = format!("{{year}}-all-{}-national_payment_amount.csv", joined);
        Self::new(name, codes, &template)
    }

    /// Resolve the fee schedule filename for a year
    pub fn file_name(&self, year: &YearLabel) -> String {
        self.file_template.replace("{year}", year.as_str())
    }

    /// Full path of the fee schedule for a year under a data directory
    pub fn file_path(&self, data_dir: &Path, year: &YearLabel) -> PathBuf {
        data_dir.join(&self.name).join(self.file_name(year))
    }

    pub fn contains(&self, code: &ProcedureCode) -> bool {
        self.codes.contains(code)
    }
}

/// One normalized row of a Medicare physician fee schedule file
///
/// All numeric fields have already been coerced at the ingestion boundary:
/// RVUs and the conversion factor default to 0, GPCIs default to 1.0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeeScheduleRecord {
    pub code: ProcedureCode,
    pub work_rvu: f64,
    pub facility_pe_rvu: f64,
    pub transitioned_facility_pe_rvu: f64,
    pub non_facility_pe_rvu: f64,
    pub transitioned_non_facility_pe_rvu: f64,
    pub mp_rvu: f64,
    pub gpci_work: f64,
    pub gpci_pe: f64,
    pub gpci_mp: f64,
    pub conversion_factor: f64,
}

impl FeeScheduleRecord {
    /// A record with zero RVUs and neutral GPCIs
    pub fn empty(code: ProcedureCode) -> Self {
        Self {
            code,
            work_rvu: 0.0,
            facility_pe_rvu: 0.0,
            transitioned_facility_pe_rvu: 0.0,
            non_facility_pe_rvu: 0.0,
            transitioned_non_facility_pe_rvu: 0.0,
            mp_rvu: 0.0,
            gpci_work: 1.0,
            gpci_pe: 1.0,
            gpci_mp: 1.0,
            conversion_factor: 0.0,
        }
    }
}

/// One row of a hospital outpatient payment addendum
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentRecord {
    pub code: ProcedureCode,
    pub payment_rate: f64,
}

/// Rates for every code in one year
pub type RateTable = BTreeMap<ProcedureCode, f64>;

/// Reimbursement, payment, and combined rate for one code in one year
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct CombinedEntry {
    pub reimbursement: Option<f64>,
    pub payment: Option<f64>,
    pub combined: Option<f64>,
}

impl CombinedEntry {
    /// Combine a reimbursement with an optional payment
    ///
    /// The combined value is the rounded sum when both sides are present and
    /// falls back to the reimbursement alone otherwise.
    pub fn new(reimbursement: Option<f64>, payment: Option<f64>) -> Self {
        let reimbursement = reimbursement.filter(|v| v.is_finite());
        let payment = payment.filter(|v| v.is_finite());
        let combined = match (reimbursement, payment) {
            (Some(r), Some(p)) => Some(crate::calculator::round2(r + p)),
            (r, _) => r,
        };
        Self { reimbursement, payment, combined }
    }
}

/// Year-over-year percentage changes for the three rate series
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct ChangeEntry {
    pub reimbursement: Option<f64>,
    pub payment: Option<f64>,
    pub combined: Option<f64>,
}

impl ChangeEntry {
    /// Entry used when the code is missing in one year of the pair
    pub fn unavailable() -> Self {
        Self::default()
    }

    pub fn between(prev: &CombinedEntry, curr: &CombinedEntry) -> Self {
        use crate::calculator::percentage_change;
        Self {
            reimbursement: percentage_change(prev.reimbursement, curr.reimbursement),
            payment: percentage_change(prev.payment, curr.payment),
            combined: percentage_change(prev.combined, curr.combined),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_year_label_ordering() {
        let mut years: Vec<YearLabel> = ["2025", "2024B", "unknown", "2020", "2024A", "2024"]
            .iter()
            .map(|y| YearLabel::new(y))
            .collect();
        years.sort();

        let sorted: Vec<&str> = years.iter().map(|y| y.as_str()).collect();
        assert_eq!(sorted, vec!["2020", "2024", "2024A", "2024B", "2025", "unknown"]);
    }

    #[test]
    fn test_year_label_numeric_prefix() {
        assert_eq!(YearLabel::new("2024A").numeric_year(), Some(2024));
        assert!(YearLabel::new("2024A").is_split());
        assert!(!YearLabel::new("2024").is_split());
        assert_eq!(YearLabel::unknown().numeric_year(), None);
    }

    #[test]
    fn test_period_label_and_order() {
        let years: Vec<YearLabel> = ["2023", "2024A", "2024B"].iter().map(|y| YearLabel::new(y)).collect();
        let periods = Period::consecutive(&years);
        assert_eq!(periods.len(), 2);
        assert_eq!(periods[0].label(), "2023 to 2024A");
        assert!(periods[0] < periods[1]);
        assert_eq!(Period::parse("2024A to 2024B"), Some(periods[1].clone()));

        let json = serde_json::to_string(&periods[0]).unwrap();
        assert_eq!(json, "\"2023 to 2024A\"");
    }

    #[test]
    fn test_code_group_file_name() {
        let group = CodeGroup::national("645", &["64568", "64569", "64570"]);
        assert_eq!(
            group.file_name(&YearLabel::new("2024A")),
            "2024A-all-64568-64569-64570-national_payment_amount.csv"
        );
        assert!(group.contains(&ProcedureCode::new("64569")));
        assert!(!group.contains(&ProcedureCode::new("61885")));
    }

    #[test]
    fn test_procedure_code_is_not_numeric() {
        assert_ne!(ProcedureCode::new("0001A"), ProcedureCode::new("1A"));
        assert_ne!(ProcedureCode::new("064568"), ProcedureCode::new("64568"));
        assert_eq!(ProcedureCode::new(" 61885 "), ProcedureCode::new("61885"));
    }

    #[test]
    fn test_combined_entry_degrades_to_reimbursement() {
        let entry = CombinedEntry::new(Some(512.34), None);
        assert_eq!(entry.combined, Some(512.34));
        assert_eq!(entry.payment, None);

        let entry = CombinedEntry::new(Some(100.10), Some(200.205));
        assert_eq!(entry.combined, Some(300.31));
    }

    #[test]
    fn test_facility_type_parsing() {
        assert_eq!(FacilityType::from_str_opt("Facility"), Some(FacilityType::Facility));
        assert_eq!(FacilityType::from_str_opt("non-facility"), Some(FacilityType::NonFacility));
        assert_eq!(FacilityType::from_str_opt("office"), None);
    }
}
