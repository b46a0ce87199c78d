/*!
 * End-to-end tests over a small fee schedule and payment addendum tree
 *
 * Layout built per test:
 *   <tmp>/618/<year>-all-61885-61888-national_payment_amount.csv (2023, 2024A)
 *   <tmp>/AB/2023_january.csv
 *   <tmp>/AB/2024_addendum_b.csv (61885 listed twice)
 * The 2024B fee schedule is intentionally absent.
 */

use std::fs;

use hcpcs_rates::calculator::round2;
use hcpcs_rates::prelude::*;
use tempfile::TempDir;

const FEE_HEADER: &str = "HCPCS Code,Work RVU,Fully Implemented Facility PE RVU,Transitioned Facility PE RVU,MP RVU,Conv Fact";

fn group() -> CodeGroup {
    CodeGroup::national("618", &["61885", "61888"])
}

fn fixture() -> TempDir {
    let temp = TempDir::new().unwrap();
    let group = group();
    let group_dir = temp.path().join("618");
    fs::create_dir_all(&group_dir).unwrap();

    fs::write(
        group_dir.join(group.file_name(&YearLabel::new("2023"))),
        format!("{}\n61885,6.05,6.76,0,2.12,36.0896\n61888,5,0,4,1,30\n", FEE_HEADER),
    )
    .unwrap();
    fs::write(
        group_dir.join(group.file_name(&YearLabel::new("2024A"))),
        format!("\u{feff}{}\n\"HCPCS Code\",,,,,\n61885,6.05,6.76,0,2.12,33\n\n61888,5,4,0,1,33\n", FEE_HEADER),
    )
    .unwrap();

    let ab = temp.path().join("AB");
    fs::create_dir_all(&ab).unwrap();
    fs::write(ab.join("2023_january.csv"), "HCPCS Code,Payment Rate\n61885,$100.00\n99999,$5.00\n").unwrap();
    fs::write(
        ab.join("2024_addendum_b.csv"),
        "HCPCS Code,Payment Rate\n61885,$10.00\n61885,\"$1,020.00\"\n61888,\n",
    )
    .unwrap();
    temp
}

fn build(temp: &TempDir) -> RateDataset {
    RateDatasetBuilder::new()
        .data_dir(temp.path())
        .payment_dir(temp.path().join("AB"))
        .groups(vec![group()])
        .years(&["2023", "2024A", "2024B"])
        .target_codes(&["61885", "61888"])
        .show_progress(false)
        .build()
        .unwrap()
}

fn year(label: &str) -> YearLabel {
    YearLabel::new(label)
}

fn code(value: &str) -> ProcedureCode {
    ProcedureCode::new(value)
}

#[test]
fn pipeline_is_idempotent() {
    let temp = fixture();
    assert_eq!(build(&temp), build(&temp));
}

#[test]
fn reimbursement_rates_follow_formula() {
    let temp = fixture();
    let dataset = build(&temp);
    let series = dataset.get_group("618").unwrap();

    assert_eq!(series.rate(&year("2023"), &code("61885")), Some(538.82));
    // Fully implemented PE of 0 falls back to the transitioned value
    assert_eq!(series.rate(&year("2023"), &code("61888")), Some(300.0));
    assert_eq!(series.rate(&year("2024A"), &code("61885")), Some(492.69));
    assert_eq!(series.rate(&year("2024A"), &code("61888")), Some(330.0));

    for table in series.rates.values() {
        for rate in table.values() {
            assert_eq!(*rate, round2(*rate));
        }
    }
}

#[test]
fn missing_fee_schedule_leaves_empty_year() {
    let temp = fixture();
    let dataset = build(&temp);
    let series = dataset.get_group("618").unwrap();

    assert!(series.rates[&year("2024B")].is_empty());
    assert_eq!(series.populated_years(), vec![&year("2023"), &year("2024A")]);

    let changes = &series.changes[&code("61888")];
    let first = Period::new(year("2023"), year("2024A"));
    let second = Period::new(year("2024A"), year("2024B"));
    assert_eq!(changes.get(&first), Some(&10.0));
    assert!(changes.get(&second).is_none());
}

#[test]
fn split_year_uses_shared_payment_year() {
    let temp = fixture();
    let dataset = build(&temp);
    let by_year = dataset.get_code(&code("61885")).unwrap();

    // Last of the duplicate rows wins
    let entry = by_year[&year("2024A")].entry;
    assert_eq!(entry.payment, Some(1020.0));
    assert_eq!(entry.combined, Some(1512.69));

    let entry = by_year[&year("2023")].entry;
    assert_eq!(entry.payment, Some(100.0));
    assert_eq!(entry.combined, Some(638.82));

    assert!(!by_year.contains_key(&year("2024B")));
}

#[test]
fn combined_degrades_without_payment() {
    let temp = fixture();
    let dataset = build(&temp);
    let group = dataset.get_combined_group("618").unwrap();

    let entry = group.entry(&year("2024A"), &code("61888")).unwrap();
    assert_eq!(entry.payment, None);
    assert_eq!(entry.combined, entry.reimbursement);

    let change = group.changes[&code("61888")][&Period::new(year("2023"), year("2024A"))];
    assert_eq!(change.reimbursement, Some(10.0));
    assert_eq!(change.payment, None);
    assert_eq!(change.combined, Some(10.0));
}

#[test]
fn payments_outside_target_codes_are_ignored() {
    let temp = fixture();
    let dataset = build(&temp);
    assert!(dataset.payment.get(&year("2023"), &code("99999")).is_none());
    assert!(dataset.payment.get(&year("2024"), &code("61888")).is_none());
    assert!(dataset.history(&code("99999")).is_none());
}

#[test]
fn service_reports_and_lookups() {
    let temp = fixture();
    let config = ConfigBuilder::new()
        .data_dir(temp.path())
        .payment_dir(temp.path().join("AB"))
        .groups(vec![group()])
        .years(&["2023", "2024A", "2024B"])
        .target_codes(&["61885", "61888"])
        .show_progress(false)
        .build();
    let service = RateService::new(config);

    let html = service.combined_report(&ReportFilter::All, ExportFormat::Html, false).unwrap();
    assert!(html.contains("HCPCS Payment and Reimbursement Analysis"));
    assert!(html.contains("HCPCS Code: 61888"));

    let filtered = service.combined_code(&code("61885"), false).unwrap();
    assert_eq!(filtered.by_code.len(), 1);

    let err = service.combined_code(&code("00000"), false).unwrap_err();
    assert!(err.is_not_found());
    assert!(err.user_message().contains("00000"));

    let text = service.reimbursement_report(None, ExportFormat::Text, true).unwrap();
    assert!(text.contains("538.82"));
}

#[test]
fn formula_on_raw_inputs() {
    let result = calculate_from_inputs(RvuInputs::new(6.05, 6.76, 2.12, 36.0896)).unwrap();
    assert_eq!(result.result, 538.82);

    let inputs = RvuInputs::from_json(r#"{"workRVU": 10, "peRVU": 5, "mpRVU": 1, "conversionFactor": 32.5}"#).unwrap();
    assert_eq!(inputs.work_gpci, 1.0);
    assert_eq!(calculate_from_inputs(inputs).unwrap().result, 520.0);

    assert!(RvuInputs::from_json(r#"{"workRVU": 10}"#).is_err());
}
