/*!
 * # HCPCS Rates Library
 *
 * Computes Medicare reimbursement rates for groups of HCPCS codes from
 * yearly fee schedule files, joins them with Addendum B payment rates, and
 * reports year-over-year changes.
 *
 * ## Features
 *
 * - **RVU formula**: `((work × GPCI) + (PE × GPCI) + (MP × GPCI)) × CF`, rounded to cents
 * - **Split years**: labels such as `2024A`/`2024B` map onto payment years through a `YearMap`
 * - **Tolerant ingestion**: missing files and directories degrade to empty data with a warning
 * - **Reports**: JSON, HTML, and plain text renderings
 * - **Caching**: `RateService` keeps computed results for a configurable TTL
 *
 * ## Quick Start
 *
 * ```no_run
 * use hcpcs_rates::prelude::*;
 *
 * # fn main() -> Result<()> {
 * let dataset = RateDataset::load_standard("./data")?;
 *
 * if let Some(history) = dataset.history(&ProcedureCode::new("61885")) {
 *     println!("{:?}", history.reimbursement);
 * }
 *
 * dataset.analytics().summary().print_summary();
 * # Ok(())
 * # }
 * ```
 *
 * ## Loading Data
 *
 * ```no_run
 * # use hcpcs_rates::prelude::*;
 * # fn main() -> Result<()> {
 * let dataset = RateDatasetBuilder::new()
 *     .data_dir("data")
 *     .payment_dir("data/AB")
 *     .years(&["2023", "2024A", "2024B", "2025"])
 *     .facility_type(FacilityType::NonFacility)
 *     .build()?;
 *
 * let html = dataset.combined_report(ExportFormat::Html)?;
 * # Ok(())
 * # }
 * ```
 *
 * ## Data Layout
 *
 * - Fee schedules: `<data_dir>/<group>/<year>-all-<codes>-national_payment_amount.csv`
 * - Payment addenda: any `.csv` under `<payment_dir>`, year inferred from the file name
 */

// Re-export error types from root
pub use error::{ErrorContext, ExportFormat, LookupKind, RatesError, Result};

use data_types::{CodeGroup, ProcedureCode};

// Public modules
pub mod analytics;
pub mod cache;
pub mod calculator;
pub mod changes;
pub mod config;
pub mod data_types;
pub mod dataset;
pub mod error;
pub mod export;
pub mod payment;
pub mod reader;
pub mod reconcile;
pub mod schema;
pub mod series;
pub mod service;

/// Prelude module for convenient imports
///
/// ```
/// use hcpcs_rates::prelude::*;
/// ```
pub mod prelude {
    pub use crate::analytics::{CodeHistory, DatasetStats, RateAnalytics};
    pub use crate::calculator::{calculate_from_inputs, RvuInputs};
    pub use crate::config::{AnalysisConfig, ConfigBuilder};
    pub use crate::data_types::*;
    pub use crate::dataset::{RateDataset, RateDatasetBuilder};
    pub use crate::error::{RatesError, Result};
    pub use crate::export::{HtmlReport, JsonExporter, ReportRenderer, TextReport};
    pub use crate::reconcile::{CombinedRates, YearMap};
    pub use crate::series::{GroupSeries, ReimbursementSeries};
    pub use crate::service::{RateService, ReportFilter};
    pub use crate::ExportFormat;
}

/// Default data settings
pub mod constants {
    /// Canonical years, oldest first
    pub const DEFAULT_YEARS: &[&str] = &["2020", "2021", "2022", "2023", "2024A", "2024B", "2025"];

    pub const DEFAULT_CACHE_TTL_SECS: u64 = 3600;

    /// Codes read from payment addenda
    pub const DEFAULT_TARGET_CODES: &[&str] = &[
        "61885", "61888", "64568", "64569", "64570", "95970", "95976", "95977", "95983", "0001A", "0002A",
        "0003A", "0004A",
    ];

    /// Group name and member codes
    pub const DEFAULT_GROUPS: &[(&str, &[&str])] = &[
        ("618", &["61885", "61888", "61889", "61891", "61892"]),
        ("645", &["64568", "64569", "64570"]),
        ("959", &["95970", "95976", "95977", "95983"]),
    ];

    /// Payment addenda folder under the data directory
    pub const PAYMENT_SUBDIR: &str = "AB";
}

/// The three national code groups
pub fn default_groups() -> Vec<CodeGroup> {
    constants::DEFAULT_GROUPS
        .iter()
        .map(|(name, codes)| CodeGroup::national(name, codes))
        .collect()
}

pub fn default_target_codes() -> Vec<ProcedureCode> {
    constants::DEFAULT_TARGET_CODES.iter().map(ProcedureCode::new).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_types::YearLabel;

    #[test]
    fn test_default_groups() {
        let groups = default_groups();
        assert_eq!(groups.len(), 3);
        assert_eq!(
            groups[0].file_name(&YearLabel::new("2024A")),
            "2024A-all-61885-61888-61889-61891-61892-national_payment_amount.csv"
        );
        assert!(groups[2].contains(&ProcedureCode::new("95983")));
    }

    #[test]
    fn test_default_target_codes() {
        let codes = default_target_codes();
        assert_eq!(codes.len(), 13);
        assert!(codes.contains(&ProcedureCode::new("0001A")));
        assert!(!codes.contains(&ProcedureCode::new("61889")));
    }
}
