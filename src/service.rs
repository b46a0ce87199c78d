/*!
 * Cached access to rate data
 *
 * `RateService` owns two result caches: one for the reimbursement series
 * alone and one for the full dataset. Building the dataset reuses the cached
 * reimbursement series and reloads payments. Unknown codes or groups become
 * `RatesError::NotFound` here.
 */

use std::sync::Arc;

use chrono::{DateTime, Utc};
use log::info;
use serde::{Deserialize, Serialize};

use crate::{
    cache::{CacheStats, ResultCache},
    calculator::{calculate_from_inputs, CalculationResult, RvuInputs},
    config::AnalysisConfig,
    data_types::{FacilityType, ProcedureCode, YearLabel},
    dataset::{RateDataset, RateDatasetBuilder},
    export::renderer_for,
    reconcile::{CombinedRates, GroupCombined},
    series::{GroupSeries, ReimbursementSeries},
    ExportFormat, RatesError, Result,
};

/// Which slice of the combined data a report covers
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ReportFilter {
    #[default]
    All,
    Code(ProcedureCode),
    Group(String),
}

/// Context attached to every response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseMetadata {
    pub generated_at: DateTime<Utc>,
    pub facility_type: FacilityType,
    pub years: Vec<YearLabel>,
    /// Age of the cached data in seconds
    pub cache_age_secs: Option<u64>,
}

/// A response body with its metadata
#[derive(Debug, Clone, Serialize)]
pub struct Response<T> {
    pub metadata: ResponseMetadata,
    pub data: T,
}

pub struct RateService {
    builder: RateDatasetBuilder,
    reimbursement: ResultCache<ReimbursementSeries>,
    dataset: ResultCache<RateDataset>,
}

impl RateService {
    pub fn new(config: AnalysisConfig) -> Self {
        let ttl = config.cache_ttl();
        Self {
            builder: RateDatasetBuilder::from_config(config),
            reimbursement: ResultCache::new(ttl),
            dataset: ResultCache::new(ttl),
        }
    }

    pub fn config(&self) -> &AnalysisConfig {
        self.builder.config()
    }

    /// Reimbursement series for every configured group
    pub fn reimbursement(&self, force_refresh: bool) -> Result<Arc<ReimbursementSeries>> {
        self.reimbursement.get_or_compute(force_refresh, || {
            info!("Computing reimbursement series");
            self.builder.build_reimbursement()
        })
    }

    /// Reimbursement series for one group
    pub fn reimbursement_group(&self, name: &str, force_refresh: bool) -> Result<GroupSeries> {
        let series = self.reimbursement(force_refresh)?;
        series
            .get(name)
            .cloned()
            .ok_or_else(|| RatesError::group_not_found(name))
    }

    /// Full dataset with payments and combined rates
    pub fn dataset(&self, force_refresh: bool) -> Result<Arc<RateDataset>> {
        self.dataset.get_or_compute(force_refresh, || {
            let reimbursement = self.reimbursement(force_refresh)?;
            info!("Reconciling payment rates");
            self.builder.build_with_reimbursement(reimbursement.as_ref().clone())
        })
    }

    pub fn combined(&self, force_refresh: bool) -> Result<CombinedRates> {
        Ok(self.dataset(force_refresh)?.combined.clone())
    }

    /// Combined rates narrowed to one code
    pub fn combined_code(&self, code: &ProcedureCode, force_refresh: bool) -> Result<CombinedRates> {
        self.dataset(force_refresh)?
            .combined
            .filter_code(code)
            .ok_or_else(|| RatesError::code_not_found(code.as_str()))
    }

    /// Combined entries and changes for one group
    pub fn combined_group(&self, name: &str, force_refresh: bool) -> Result<GroupCombined> {
        self.dataset(force_refresh)?
            .combined
            .group(name)
            .cloned()
            .ok_or_else(|| RatesError::group_not_found(name))
    }

    /// Render the combined report, optionally filtered
    pub fn combined_report(
        &self,
        filter: &ReportFilter,
        format: ExportFormat,
        force_refresh: bool,
    ) -> Result<String> {
        let dataset = self.dataset(force_refresh)?;
        let combined = match filter {
            ReportFilter::All => dataset.combined.clone(),
            ReportFilter::Code(code) => dataset
                .combined
                .filter_code(code)
                .ok_or_else(|| RatesError::code_not_found(code.as_str()))?,
            ReportFilter::Group(name) => dataset
                .combined
                .filter_group(name)
                .ok_or_else(|| RatesError::group_not_found(name))?,
        };
        renderer_for(format).render_combined(&combined)
    }

    /// Render the reimbursement-only report, optionally for one group
    pub fn reimbursement_report(
        &self,
        group: Option<&str>,
        format: ExportFormat,
        force_refresh: bool,
    ) -> Result<String> {
        let series = self.reimbursement(force_refresh)?;
        let series = match group {
            Some(name) => {
                let group = series.get(name).cloned().ok_or_else(|| RatesError::group_not_found(name))?;
                let mut filtered = ReimbursementSeries::default();
                filtered.groups.insert(name.to_string(), group);
                filtered
            }
            None => series.as_ref().clone(),
        };
        renderer_for(format).render_reimbursement(&series)
    }

    /// Reimbursement rate from raw RVU inputs; uncached
    pub fn calculate(&self, inputs: RvuInputs) -> Result<CalculationResult> {
        calculate_from_inputs(inputs)
    }

    /// Metadata describing the currently cached data
    pub fn metadata(&self) -> ResponseMetadata {
        let age = self.dataset.age().or_else(|| self.reimbursement.age());
        ResponseMetadata {
            generated_at: Utc::now(),
            facility_type: self.config().facility_type,
            years: self.config().years.clone(),
            cache_age_secs: age.map(|a| a.as_secs()),
        }
    }

    /// Wrap a value with the current metadata
    pub fn respond<T>(&self, data: T) -> Response<T> {
        Response {
            metadata: self.metadata(),
            data,
        }
    }

    /// Drop both cached values
    pub fn invalidate(&self) {
        self.reimbursement.invalidate();
        self.dataset.invalidate();
    }

    /// (reimbursement, dataset) cache counters
    pub fn cache_stats(&self) -> (CacheStats, CacheStats) {
        (self.reimbursement.stats(), self.dataset.stats())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigBuilder;
    use crate::data_types::CodeGroup;
    use std::fs;
    use tempfile::TempDir;

    fn service(temp: &TempDir) -> RateService {
        let group = CodeGroup::national("618", &["61885"]);
        let group_dir = temp.path().join("618");
        fs::create_dir_all(&group_dir).unwrap();
        fs::write(
            group_dir.join(group.file_name(&YearLabel::new("2023"))),
            "HCPCS Code,Work RVU,Fully Implemented Facility PE RVU,MP RVU,Conv Fact\n61885,5,4,1,30\n",
        )
        .unwrap();
        fs::create_dir_all(temp.path().join("AB")).unwrap();
        fs::write(temp.path().join("AB/2023_january.csv"), "HCPCS Code,Payment Rate\n61885,$50.00\n").unwrap();

        let config = ConfigBuilder::new()
            .data_dir(temp.path())
            .payment_dir(temp.path().join("AB"))
            .groups(vec![group])
            .years(&["2023"])
            .show_progress(false)
            .build();
        RateService::new(config)
    }

    #[test]
    fn test_cached_until_refresh() {
        let temp = TempDir::new().unwrap();
        let service = service(&temp);

        let first = service.dataset(false).unwrap();
        let second = service.dataset(false).unwrap();
        assert!(Arc::ptr_eq(&first, &second));

        let code = ProcedureCode::new("61885");
        let year = YearLabel::new("2023");
        assert_eq!(first.combined.code(&code).unwrap()[&year].entry.combined, Some(350.0));

        fs::write(temp.path().join("AB/2023_january.csv"), "HCPCS Code,Payment Rate\n61885,$60.00\n").unwrap();
        let stale = service.dataset(false).unwrap();
        assert_eq!(stale.combined.code(&code).unwrap()[&year].entry.payment, Some(50.0));

        let refreshed = service.dataset(true).unwrap();
        assert_eq!(refreshed.combined.code(&code).unwrap()[&year].entry.payment, Some(60.0));
        // A reader holding the old value still sees it
        assert_eq!(first.combined.code(&code).unwrap()[&year].entry.payment, Some(50.0));
    }

    #[test]
    fn test_failed_refresh_keeps_cached_dataset() {
        let temp = TempDir::new().unwrap();
        let service = service(&temp);
        let cached = service.dataset(false).unwrap();

        let ab = temp.path().join("AB");
        fs::remove_dir_all(&ab).unwrap();
        fs::write(&ab, "not a directory").unwrap();

        let err = service.dataset(true).unwrap_err();
        assert!(matches!(err, RatesError::DirectoryRead { .. }));

        let still_cached = service.dataset(false).unwrap();
        assert!(Arc::ptr_eq(&cached, &still_cached));
    }

    #[test]
    fn test_unknown_keys_are_not_found() {
        let temp = TempDir::new().unwrap();
        let service = service(&temp);

        let err = service.combined_code(&ProcedureCode::new("99999"), false).unwrap_err();
        assert!(err.is_not_found());
        assert!(service.combined_group("700", false).unwrap_err().is_not_found());
        assert!(service.reimbursement_group("700", false).unwrap_err().is_not_found());
        assert!(service
            .combined_report(&ReportFilter::Group("700".into()), ExportFormat::Html, false)
            .unwrap_err()
            .is_not_found());

        assert!(service.combined_group("618", false).is_ok());
    }

    #[test]
    fn test_reports_and_metadata() {
        let temp = TempDir::new().unwrap();
        let service = service(&temp);

        let html = service
            .combined_report(&ReportFilter::Code(ProcedureCode::new("61885")), ExportFormat::Html, false)
            .unwrap();
        assert!(html.contains("HCPCS Code: 61885"));

        let text = service.reimbursement_report(Some("618"), ExportFormat::Text, false).unwrap();
        assert!(text.contains("300.00"));

        let metadata = service.metadata();
        assert_eq!(metadata.years, vec![YearLabel::new("2023")]);
        assert!(metadata.cache_age_secs.is_some());

        let response = service.respond(1u8);
        assert_eq!(response.data, 1);
    }

    #[test]
    fn test_calculate() {
        let temp = TempDir::new().unwrap();
        let service = service(&temp);
        let result = service.calculate(RvuInputs::new(6.05, 6.76, 2.12, 36.0896)).unwrap();
        assert_eq!(result.result, 538.82);
    }
}
