/*!
 * Analytics over computed rate data
 *
 * Summary statistics, per-code histories, and trend series derived from a
 * [`RateDataset`]. Nothing here re-reads files; everything is computed from
 * the reconciled series.
 */

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::{
    calculator::round2,
    data_types::{CombinedEntry, Period, ProcedureCode, RateTable, YearLabel},
    dataset::RateDataset,
    reconcile::CodeYearEntry,
};

/// Number of codes reported by default in rankings
pub const DEFAULT_TOP_CODES: usize = 5;

/// Analytics engine for rate data
pub struct RateAnalytics<'a> {
    dataset: &'a RateDataset,
}

/// One code's rate in one year
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CodeRate {
    pub code: ProcedureCode,
    pub group: String,
    pub year: YearLabel,
    pub rate: f64,
}

/// Everything known about a single code
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CodeHistory {
    pub code: ProcedureCode,
    pub reimbursement: BTreeMap<YearLabel, f64>,
    pub payment: BTreeMap<YearLabel, f64>,
    pub combined: BTreeMap<YearLabel, CodeYearEntry>,
    /// Reimbursement-only changes
    pub changes: BTreeMap<Period, f64>,
}

impl CodeHistory {
    /// Gather a code's history; `None` when no series mentions the code
    pub fn collect(dataset: &RateDataset, code: &ProcedureCode) -> Option<Self> {
        let reimbursement = dataset.reimbursement.code_rates(code);
        let payment = dataset.payment.code_rates(code);
        let combined = dataset.combined.code(code).cloned().unwrap_or_default();

        let mut changes = BTreeMap::new();
        for series in dataset.reimbursement.groups.values() {
            if let Some(code_changes) = series.changes.get(code) {
                changes.extend(code_changes.iter().map(|(p, c)| (p.clone(), *c)));
            }
        }

        if reimbursement.is_empty() && payment.is_empty() && combined.is_empty() {
            return None;
        }

        Some(Self {
            code: code.clone(),
            reimbursement,
            payment,
            combined,
            changes,
        })
    }
}

/// Raw rates and averages of one group
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupTrend {
    pub years: BTreeMap<YearLabel, RateTable>,
    pub average_by_year: BTreeMap<YearLabel, f64>,
}

/// Series of one ranked code
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CodeTrend {
    pub reimbursement: BTreeMap<YearLabel, f64>,
    pub payment: BTreeMap<YearLabel, f64>,
    pub combined: BTreeMap<YearLabel, CombinedEntry>,
}

/// Chart-ready trend data
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trends {
    pub yearly_averages: BTreeMap<YearLabel, f64>,
    pub code_groups: BTreeMap<String, GroupTrend>,
    pub top_codes: BTreeMap<ProcedureCode, CodeTrend>,
}

/// Dashboard summary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateSummary {
    pub stats: DatasetStats,
    pub highest_reimbursement: Vec<CodeRate>,
    pub yearly_trends: BTreeMap<YearLabel, f64>,
}

fn average(values: impl Iterator<Item = f64>) -> Option<f64> {
    let (sum, count) = values.fold((0.0, 0usize), |(s, c), v| (s + v, c + 1));
    if count == 0 {
        None
    } else {
        Some(round2(sum / count as f64))
    }
}

impl<'a> RateAnalytics<'a> {
    pub fn new(dataset: &'a RateDataset) -> Self {
        Self { dataset }
    }

    /// Basic counts across all series
    pub fn dataset_stats(&self) -> DatasetStats {
        let reimbursement = &self.dataset.reimbursement;

        let codes: BTreeSet<&ProcedureCode> = reimbursement
            .groups
            .values()
            .flat_map(|s| s.rates.values())
            .flat_map(|t| t.keys())
            .collect();
        let years_with_data: BTreeSet<&YearLabel> = reimbursement
            .groups
            .values()
            .flat_map(|s| s.rates.iter())
            .filter(|(_, t)| !t.is_empty())
            .map(|(y, _)| y)
            .collect();
        let reimbursement_rates = reimbursement
            .groups
            .values()
            .flat_map(|s| s.rates.values())
            .map(|t| t.len())
            .sum();
        let (records_with_payment, combined_records) = self.dataset.combined.payment_coverage();

        DatasetStats {
            groups: reimbursement.groups.len(),
            codes: codes.len(),
            years_with_data: years_with_data.len(),
            reimbursement_rates,
            payment_years: self.dataset.payment.years.len(),
            payment_rates: self.dataset.payment.rate_count(),
            combined_records,
            records_with_payment,
        }
    }

    /// Codes with the highest reimbursement in their latest populated year
    pub fn highest_reimbursement(&self, limit: usize) -> Vec<CodeRate> {
        let mut latest: BTreeMap<&ProcedureCode, CodeRate> = BTreeMap::new();

        for (group, series) in &self.dataset.reimbursement.groups {
            for (year, table) in &series.rates {
                for (code, rate) in table {
                    let newer = latest.get(code).map_or(true, |current| *year >= current.year);
                    if newer {
                        latest.insert(
                            code,
                            CodeRate {
                                code: code.clone(),
                                group: group.clone(),
                                year: year.clone(),
                                rate: *rate,
                            },
                        );
                    }
                }
            }
        }

        let mut ranked: Vec<CodeRate> = latest.into_values().collect();
        ranked.sort_by(|a, b| b.rate.total_cmp(&a.rate).then_with(|| a.code.cmp(&b.code)));
        ranked.truncate(limit);
        ranked
    }

    /// Mean rate per populated year within one group
    pub fn average_by_year(&self, group: &str) -> Option<BTreeMap<YearLabel, f64>> {
        let series = self.dataset.reimbursement.get(group)?;
        Some(
            series
                .rates
                .iter()
                .filter_map(|(year, table)| average(table.values().copied()).map(|avg| (year.clone(), avg)))
                .collect(),
        )
    }

    /// Mean rate per year across every group
    pub fn yearly_averages(&self) -> BTreeMap<YearLabel, f64> {
        let mut by_year: BTreeMap<YearLabel, Vec<f64>> = BTreeMap::new();
        for series in self.dataset.reimbursement.groups.values() {
            for (year, table) in &series.rates {
                by_year.entry(year.clone()).or_default().extend(table.values().copied());
            }
        }

        by_year
            .into_iter()
            .filter_map(|(year, rates)| average(rates.into_iter()).map(|avg| (year, avg)))
            .collect()
    }

    pub fn code_history(&self, code: &ProcedureCode) -> Option<CodeHistory> {
        CodeHistory::collect(self.dataset, code)
    }

    /// Group averages plus the series of the top ranked codes
    pub fn trends(&self, top: usize) -> Trends {
        let code_groups = self
            .dataset
            .reimbursement
            .groups
            .iter()
            .map(|(name, series)| {
                let trend = GroupTrend {
                    years: series.rates.clone(),
                    average_by_year: self.average_by_year(name).unwrap_or_default(),
                };
                (name.clone(), trend)
            })
            .collect();

        let top_codes = self
            .highest_reimbursement(top)
            .into_iter()
            .map(|ranked| {
                let combined = self
                    .dataset
                    .combined
                    .code(&ranked.code)
                    .map(|years| years.iter().map(|(y, e)| (y.clone(), e.entry)).collect())
                    .unwrap_or_default();
                let trend = CodeTrend {
                    reimbursement: self.dataset.reimbursement.code_rates(&ranked.code),
                    payment: self.dataset.payment.code_rates(&ranked.code),
                    combined,
                };
                (ranked.code, trend)
            })
            .collect();

        Trends {
            yearly_averages: self.yearly_averages(),
            code_groups,
            top_codes,
        }
    }

    pub fn summary(&self) -> RateSummary {
        RateSummary {
            stats: self.dataset_stats(),
            highest_reimbursement: self.highest_reimbursement(DEFAULT_TOP_CODES),
            yearly_trends: self.yearly_averages(),
        }
    }
}

/// Statistics about a rate dataset
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetStats {
    pub groups: usize,
    pub codes: usize,
    pub years_with_data: usize,
    pub reimbursement_rates: usize,
    pub payment_years: usize,
    pub payment_rates: usize,
    pub combined_records: usize,
    pub records_with_payment: usize,
}

impl DatasetStats {
    /// Share of combined records that found a payment, in percent
    pub fn payment_coverage_percent(&self) -> f64 {
        if self.combined_records == 0 {
            0.0
        } else {
            (self.records_with_payment as f64 / self.combined_records as f64) * 100.0
        }
    }

    /// Print formatted statistics
    pub fn print_summary(&self) {
        println!("=== HCPCS Rate Dataset Statistics ===");
        println!("Code Groups: {}", self.groups);
        println!("Procedure Codes: {}", self.codes);
        println!("Years With Data: {}", self.years_with_data);
        println!("Reimbursement Rates: {}", self.reimbursement_rates);
        println!("Payment Years: {}", self.payment_years);
        println!("Payment Rates: {}", self.payment_rates);
        println!("Combined Records: {}", self.combined_records);

        if self.combined_records > 0 {
            println!("Payment Coverage: {:.1}%", self.payment_coverage_percent());
        }
    }
}

impl RateSummary {
    pub fn print_summary(&self) {
        self.stats.print_summary();

        if !self.highest_reimbursement.is_empty() {
            println!();
            println!("Highest Reimbursement:");
            for item in &self.highest_reimbursement {
                println!("  {} ({}, {}): ${:.2}", item.code, item.group, item.year, item.rate);
            }
        }

        if !self.yearly_trends.is_empty() {
            println!();
            println!("Average Rate by Year:");
            for (year, avg) in &self.yearly_trends {
                println!("  {}: ${:.2}", year, avg);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_types::FacilityType;
    use crate::payment::PaymentSeries;
    use crate::reconcile::YearMap;
    use crate::series::{GroupSeries, ReimbursementSeries};
    use crate::changes::compute_yearly_changes;

    fn table(entries: &[(&str, f64)]) -> RateTable {
        entries.iter().map(|(c, r)| (ProcedureCode::new(c), *r)).collect()
    }

    fn group(name: &str, years: &[(&str, RateTable)]) -> GroupSeries {
        let labels: Vec<YearLabel> = years.iter().map(|(y, _)| YearLabel::new(y)).collect();
        let rates: BTreeMap<YearLabel, RateTable> =
            years.iter().map(|(y, t)| (YearLabel::new(y), t.clone())).collect();
        GroupSeries {
            group: name.to_string(),
            changes: compute_yearly_changes(&rates, &labels),
            years: labels,
            records: BTreeMap::new(),
            rates,
        }
    }

    fn dataset() -> RateDataset {
        let mut reimbursement = ReimbursementSeries::default();
        reimbursement.groups.insert(
            "618".to_string(),
            group(
                "618",
                &[
                    ("2023", table(&[("61885", 500.0), ("61888", 300.0)])),
                    ("2024A", table(&[("61885", 550.0)])),
                    ("2025", RateTable::new()),
                ],
            ),
        );
        reimbursement.groups.insert(
            "645".to_string(),
            group("645", &[("2023", table(&[("64568", 700.0)]))]),
        );

        let mut payment = PaymentSeries::new();
        payment.insert(YearLabel::new("2024"), ProcedureCode::new("61885"), 50.0);

        RateDataset::new(reimbursement, payment, YearMap::default(), FacilityType::Facility)
    }

    #[test]
    fn test_dataset_stats() {
        let dataset = dataset();
        let stats = dataset.analytics().dataset_stats();
        assert_eq!(stats.groups, 2);
        assert_eq!(stats.codes, 3);
        assert_eq!(stats.years_with_data, 2);
        assert_eq!(stats.reimbursement_rates, 4);
        assert_eq!(stats.combined_records, 4);
        assert_eq!(stats.records_with_payment, 1);
        assert_eq!(stats.payment_coverage_percent(), 25.0);
    }

    #[test]
    fn test_highest_reimbursement_uses_latest_year() {
        let dataset = dataset();
        let top = dataset.analytics().highest_reimbursement(2);
        assert_eq!(top.len(), 2);
        assert_eq!(top[0].code, ProcedureCode::new("64568"));
        assert_eq!(top[1].code, ProcedureCode::new("61885"));
        assert_eq!(top[1].year, YearLabel::new("2024A"));
        assert_eq!(top[1].rate, 550.0);
    }

    #[test]
    fn test_averages_skip_empty_years() {
        let dataset = dataset();
        let analytics = dataset.analytics();

        let by_year = analytics.average_by_year("618").unwrap();
        assert_eq!(by_year.get(&YearLabel::new("2023")), Some(&400.0));
        assert!(by_year.get(&YearLabel::new("2025")).is_none());
        assert!(analytics.average_by_year("700").is_none());

        let overall = analytics.yearly_averages();
        assert_eq!(overall.get(&YearLabel::new("2023")), Some(&500.0));
    }

    #[test]
    fn test_code_history() {
        let dataset = dataset();
        let history = dataset.history(&ProcedureCode::new("61885")).unwrap();

        assert_eq!(history.reimbursement.len(), 2);
        assert_eq!(history.payment.get(&YearLabel::new("2024")), Some(&50.0));
        assert_eq!(
            history.combined[&YearLabel::new("2024A")].entry.combined,
            Some(600.0)
        );
        assert_eq!(history.changes.get(&Period::parse("2023 to 2024A").unwrap()), Some(&10.0));

        assert!(dataset.history(&ProcedureCode::new("99999")).is_none());
    }

    #[test]
    fn test_trends() {
        let dataset = dataset();
        let trends = dataset.analytics().trends(1);
        assert_eq!(trends.code_groups.len(), 2);
        assert_eq!(trends.top_codes.len(), 1);
        assert!(trends.top_codes.contains_key(&ProcedureCode::new("64568")));
    }
}
