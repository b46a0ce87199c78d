/*!
 * Year-over-year change calculation
 *
 * Two policies exist for codes that are missing in one year of a pair:
 * the reimbursement-only table omits the pair entirely, while the combined
 * table records an explicit entry with every change absent.
 */

use std::collections::{BTreeMap, BTreeSet};

use crate::{
    calculator::percentage_change,
    data_types::{ChangeEntry, CombinedEntry, Period, ProcedureCode, RateTable, YearLabel},
};

/// code → period → percentage change
pub type ChangeTable = BTreeMap<ProcedureCode, BTreeMap<Period, f64>>;

/// code → period → change entry for all three series
pub type CombinedChangeTable = BTreeMap<ProcedureCode, BTreeMap<Period, ChangeEntry>>;

/// year → code → combined entry
pub type CombinedYears = BTreeMap<YearLabel, BTreeMap<ProcedureCode, CombinedEntry>>;

/// Percentage changes between consecutive years of a rate series
///
/// `years` gives the pair order. Every code seen in any year gets a key,
/// even when none of its pairs has data on both sides.
pub fn compute_yearly_changes(rates: &BTreeMap<YearLabel, RateTable>, years: &[YearLabel]) -> ChangeTable {
    let all_codes: BTreeSet<&ProcedureCode> = rates.values().flat_map(|table| table.keys()).collect();
    let periods = Period::consecutive(years);

    let mut changes = ChangeTable::new();
    for code in all_codes {
        let per_code = changes.entry(code.clone()).or_default();

        for period in &periods {
            let prev = rates.get(&period.from).and_then(|t| t.get(code)).copied();
            let curr = rates.get(&period.to).and_then(|t| t.get(code)).copied();

            if let (Some(_), Some(_)) = (prev, curr) {
                if let Some(change) = percentage_change(prev, curr) {
                    per_code.insert(period.clone(), change);
                }
            }
        }
    }

    changes
}

/// Changes across the combined series of one group
///
/// Years are taken from the populated keys of `years` in label order. A code
/// present in only one year of a pair gets an all-absent entry.
pub fn compute_combined_changes(years: &CombinedYears) -> CombinedChangeTable {
    let ordered: Vec<YearLabel> = years.keys().cloned().collect();
    let all_codes: BTreeSet<&ProcedureCode> = years.values().flat_map(|codes| codes.keys()).collect();
    let periods = Period::consecutive(&ordered);

    let mut changes = CombinedChangeTable::new();
    for code in all_codes {
        let per_code = changes.entry(code.clone()).or_default();

        for period in &periods {
            let prev = years.get(&period.from).and_then(|codes| codes.get(code));
            let curr = years.get(&period.to).and_then(|codes| codes.get(code));

            let entry = match (prev, curr) {
                (Some(prev), Some(curr)) => ChangeEntry::between(prev, curr),
                _ => ChangeEntry::unavailable(),
            };
            per_code.insert(period.clone(), entry);
        }
    }

    changes
}

#[cfg(test)]
mod tests {
    use super::*;

    fn years(labels: &[&str]) -> Vec<YearLabel> {
        labels.iter().map(|y| YearLabel::new(y)).collect()
    }

    fn table(entries: &[(&str, f64)]) -> RateTable {
        entries.iter().map(|(c, r)| (ProcedureCode::new(c), *r)).collect()
    }

    #[test]
    fn test_yearly_changes() {
        let mut rates = BTreeMap::new();
        rates.insert(YearLabel::new("2020"), table(&[("61885", 100.0), ("61888", 0.0)]));
        rates.insert(YearLabel::new("2021"), table(&[("61885", 110.0), ("61888", 40.0)]));

        let changes = compute_yearly_changes(&rates, &years(&["2020", "2021"]));
        let period = Period::parse("2020 to 2021").unwrap();

        assert_eq!(changes[&ProcedureCode::new("61885")][&period], 10.0);
        assert_eq!(changes[&ProcedureCode::new("61888")][&period], 0.0);
    }

    #[test]
    fn test_missing_year_yields_no_entry() {
        let mut rates = BTreeMap::new();
        rates.insert(YearLabel::new("2020"), table(&[("61885", 100.0)]));
        rates.insert(YearLabel::new("2021"), RateTable::new());
        rates.insert(YearLabel::new("2022"), table(&[("61885", 120.0), ("61889", 5.0)]));

        let changes = compute_yearly_changes(&rates, &years(&["2020", "2021", "2022"]));
        assert!(changes[&ProcedureCode::new("61885")].is_empty());
        assert!(changes[&ProcedureCode::new("61889")].is_empty());
    }

    #[test]
    fn test_combined_changes_emit_unavailable() {
        let mut combined = CombinedYears::new();
        combined.insert(
            YearLabel::new("2024B"),
            [(ProcedureCode::new("64568"), CombinedEntry::new(Some(220.0), Some(80.0)))].into(),
        );
        combined.insert(
            YearLabel::new("2024A"),
            [
                (ProcedureCode::new("64568"), CombinedEntry::new(Some(200.0), Some(100.0))),
                (ProcedureCode::new("64569"), CombinedEntry::new(Some(50.0), None)),
            ]
            .into(),
        );

        let changes = compute_combined_changes(&combined);
        let period = Period::parse("2024A to 2024B").unwrap();

        let entry = changes[&ProcedureCode::new("64568")][&period];
        assert_eq!(entry.reimbursement, Some(10.0));
        assert_eq!(entry.payment, Some(-20.0));
        assert_eq!(entry.combined, Some(0.0));

        assert_eq!(changes[&ProcedureCode::new("64569")][&period], ChangeEntry::unavailable());
    }
}
