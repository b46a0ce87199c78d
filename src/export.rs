/*!
 * Report rendering and export
 *
 * Renders reimbursement and combined rate data as JSON, HTML, or a plain
 * text console table. Missing values render as `N/A`; change cells carry a
 * class for positive, negative, or missing values in HTML.
 */

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use serde::Serialize;

use crate::{
    data_types::{CombinedEntry, Period, ProcedureCode, YearLabel},
    dataset::RateDataset,
    reconcile::{CombinedRates, GroupCombined},
    series::{GroupSeries, ReimbursementSeries},
    ExportFormat, RatesError, Result,
};

/// Placeholder for absent values
pub const MISSING: &str = "N/A";

/// Trait for implementing report renderers
pub trait ReportRenderer {
    /// Render the reimbursement-only series
    fn render_reimbursement(&self, series: &ReimbursementSeries) -> Result<String>;

    /// Render reconciled reimbursement and payment rates
    fn render_combined(&self, combined: &CombinedRates) -> Result<String>;

    /// Get the export format
    fn format(&self) -> ExportFormat;
}

/// Pick the renderer for a format
pub fn renderer_for(format: ExportFormat) -> Box<dyn ReportRenderer> {
    match format {
        ExportFormat::Json => Box::new(JsonExporter::new()),
        ExportFormat::Html => Box::new(HtmlReport::new()),
        ExportFormat::Text => Box::new(TextReport::new()),
    }
}

/// Escape text for HTML element content and attribute values
pub fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

/// Dollar amount with two decimals, or the placeholder
pub fn format_rate(value: Option<f64>) -> String {
    match value {
        Some(v) if v.is_finite() => format!("{:.2}", v),
        _ => MISSING.to_string(),
    }
}

/// Signed percentage such as "+10%" or "-25%", or the placeholder
pub fn format_change(value: Option<f64>) -> String {
    match value {
        Some(v) if v.is_finite() => {
            let sign = if v >= 0.0 { "+" } else { "" };
            format!("{}{}%", sign, v)
        }
        _ => MISSING.to_string(),
    }
}

/// CSS class of a change cell
pub fn change_class(value: Option<f64>) -> &'static str {
    match value {
        Some(v) if v >= 0.0 => "positive-change",
        Some(_) => "negative-change",
        None => "missing-data",
    }
}

/// Write rendered content to a file
pub fn write_report<P: AsRef<Path>>(path: P, content: &str, format: ExportFormat) -> Result<()> {
    let path = path.as_ref();
    let file = File::create(path).map_err(|e| RatesError::Export {
        message: format!("Cannot create {}: {}", path.display(), e),
        format,
    })?;
    let mut writer = BufWriter::new(file);
    writer.write_all(content.as_bytes())?;
    writer.flush()?;
    Ok(())
}

/// JSON exporter for rate data
pub struct JsonExporter {
    /// Whether to pretty-print the JSON
    pub pretty_print: bool,
}

impl Default for JsonExporter {
    fn default() -> Self {
        Self { pretty_print: true }
    }
}

impl JsonExporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_pretty_print(mut self, pretty: bool) -> Self {
        self.pretty_print = pretty;
        self
    }

    /// Serialize any value with this exporter's settings
    pub fn render_value<T: Serialize>(&self, value: &T) -> Result<String> {
        let json = if self.pretty_print {
            serde_json::to_string_pretty(value)?
        } else {
            serde_json::to_string(value)?
        };
        Ok(json)
    }
}

impl ReportRenderer for JsonExporter {
    fn render_reimbursement(&self, series: &ReimbursementSeries) -> Result<String> {
        self.render_value(series)
    }

    fn render_combined(&self, combined: &CombinedRates) -> Result<String> {
        self.render_value(combined)
    }

    fn format(&self) -> ExportFormat {
        ExportFormat::Json
    }
}

const REPORT_STYLE: &str = r#"
    body { font-family: Arial, sans-serif; margin: 20px; }
    h1, h2, h3 { color: #333; }
    table { border-collapse: collapse; width: 100%; margin-bottom: 20px; }
    th, td { border: 1px solid #ddd; padding: 8px; text-align: right; }
    th { background-color: #f2f2f2; text-align: center; }
    tr:nth-child(even) { background-color: #f9f9f9; }
    .code-cell { text-align: left; font-weight: bold; }
    .positive-change { color: green; }
    .negative-change { color: red; }
    .missing-data { color: #999; font-style: italic; }
    .rate-type { font-style: italic; color: #666; }
    .section { margin-bottom: 30px; }
"#;

/// HTML report renderer
pub struct HtmlReport {
    title: Option<String>,
}

impl Default for HtmlReport {
    fn default() -> Self {
        Self::new()
    }
}

impl HtmlReport {
    pub fn new() -> Self {
        Self { title: None }
    }

    /// Override the page title
    pub fn with_title(mut self, title: &str) -> Self {
        self.title = Some(title.to_string());
        self
    }

    fn page(&self, default_title: &str, body: &str) -> String {
        let title = escape_html(self.title.as_deref().unwrap_or(default_title));
        format!(
            "<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n  <meta charset=\"UTF-8\">\n  \
             <meta name=\"viewport\" content=\"width=device-width, initial-scale=1.0\">\n  \
             <title>{title}</title>\n  <style>{style}</style>\n</head>\n<body>\n  <h1>{title}</h1>\n{body}</body>\n</html>\n",
            title = title,
            style = REPORT_STYLE,
            body = body
        )
    }

    fn rate_cell(value: Option<f64>) -> String {
        match value {
            Some(_) => format!("<td>{}</td>", format_rate(value)),
            None => format!("<td><span class=\"missing-data\">{}</span></td>", MISSING),
        }
    }

    fn change_cell(value: Option<f64>) -> String {
        match value {
            Some(_) => format!("<td class=\"{}\">{}</td>", change_class(value), format_change(value)),
            None => format!("<td class=\"missing-data\">{}</td>", MISSING),
        }
    }

    fn header_row(first: &[&str], columns: &[String]) -> String {
        let mut row = String::from("<tr>");
        for label in first {
            row.push_str(&format!("<th>{}</th>", label));
        }
        for column in columns {
            row.push_str(&format!("<th>{}</th>", escape_html(column)));
        }
        row.push_str("</tr>");
        row
    }

    fn reimbursement_section(group: &GroupSeries) -> String {
        let years: Vec<String> = group.years.iter().map(|y| y.to_string()).collect();
        let periods = Period::consecutive(&group.years);
        let period_labels: Vec<String> = periods.iter().map(|p| p.label()).collect();

        let mut html = format!(
            "  <div class=\"section\">\n    <h2>HCPCS Codes in Group {}</h2>\n",
            escape_html(&group.group)
        );

        html.push_str("    <h3>Reimbursement Rates (in dollars)</h3>\n    <table>\n      <thead>");
        html.push_str(&Self::header_row(&["HCPCS Code"], &years));
        html.push_str("</thead>\n      <tbody>\n");
        for code in group.codes() {
            html.push_str(&format!("        <tr><td class=\"code-cell\">{}</td>", escape_html(code.as_str())));
            for year in &group.years {
                html.push_str(&Self::rate_cell(group.rate(year, code)));
            }
            html.push_str("</tr>\n");
        }
        html.push_str("      </tbody>\n    </table>\n");

        html.push_str("    <h3>Percentage Changes Year-over-Year</h3>\n    <table>\n      <thead>");
        html.push_str(&Self::header_row(&["HCPCS Code"], &period_labels));
        html.push_str("</thead>\n      <tbody>\n");
        for code in group.codes() {
            html.push_str(&format!("        <tr><td class=\"code-cell\">{}</td>", escape_html(code.as_str())));
            let code_changes = group.changes.get(code);
            for period in &periods {
                let change = code_changes.and_then(|c| c.get(period)).copied();
                html.push_str(&Self::change_cell(change));
            }
            html.push_str("</tr>\n");
        }
        html.push_str("      </tbody>\n    </table>\n  </div>\n");

        html
    }

    fn combined_group_section(name: &str, group: &GroupCombined) -> String {
        let years: Vec<&YearLabel> = group.years.keys().collect();
        let year_labels: Vec<String> = years.iter().map(|y| y.to_string()).collect();
        let mut codes: Vec<&ProcedureCode> = group.years.values().flat_map(|c| c.keys()).collect();
        codes.sort();
        codes.dedup();

        let mut periods: Vec<&Period> = group.changes.values().flat_map(|p| p.keys()).collect();
        periods.sort();
        periods.dedup();
        let period_labels: Vec<String> = periods.iter().map(|p| p.label()).collect();

        let series: [(&str, fn(&CombinedEntry) -> Option<f64>); 3] = [
            ("Reimbursement", |e| e.reimbursement),
            ("Payment", |e| e.payment),
            ("Combined", |e| e.combined),
        ];

        let mut html = format!(
            "    <div class=\"section\">\n      <h3>HCPCS Codes in Group {}</h3>\n",
            escape_html(name)
        );

        html.push_str("      <h4>Rates by Year</h4>\n      <table>\n        <thead>");
        html.push_str(&Self::header_row(&["HCPCS Code", "Rate Type"], &year_labels));
        html.push_str("</thead>\n        <tbody>\n");
        for code in &codes {
            for (i, (label, pick)) in series.iter().enumerate() {
                html.push_str("          <tr>");
                if i == 0 {
                    html.push_str(&format!(
                        "<td class=\"code-cell\" rowspan=\"3\">{}</td>",
                        escape_html(code.as_str())
                    ));
                }
                html.push_str(&format!("<td class=\"rate-type\">{}</td>", label));
                for year in &years {
                    let value = group.entry(year, code).and_then(pick);
                    html.push_str(&Self::rate_cell(value));
                }
                html.push_str("</tr>\n");
            }
        }
        html.push_str("        </tbody>\n      </table>\n");

        html.push_str("      <h4>Percentage Changes Year-over-Year</h4>\n      <table>\n        <thead>");
        html.push_str(&Self::header_row(&["HCPCS Code", "Rate Type"], &period_labels));
        html.push_str("</thead>\n        <tbody>\n");
        for code in &codes {
            let code_changes = group.changes.get(*code);
            for (i, (label, _)) in series.iter().enumerate() {
                html.push_str("          <tr>");
                if i == 0 {
                    html.push_str(&format!(
                        "<td class=\"code-cell\" rowspan=\"3\">{}</td>",
                        escape_html(code.as_str())
                    ));
                }
                html.push_str(&format!("<td class=\"rate-type\">{}</td>", label));
                for period in &periods {
                    let change = code_changes.and_then(|c| c.get(*period)).and_then(|entry| match i {
                        0 => entry.reimbursement,
                        1 => entry.payment,
                        _ => entry.combined,
                    });
                    html.push_str(&Self::change_cell(change));
                }
                html.push_str("</tr>\n");
            }
        }
        html.push_str("        </tbody>\n      </table>\n    </div>\n");

        html
    }

    fn combined_code_section(combined: &CombinedRates) -> String {
        let mut html = String::new();
        for (code, years) in &combined.by_code {
            html.push_str(&format!(
                "    <div class=\"section\">\n      <h3>HCPCS Code: {}</h3>\n      <table>\n        <thead>",
                escape_html(code.as_str())
            ));
            html.push_str(&Self::header_row(
                &["Year", "Group", "Reimbursement Rate", "Payment Rate", "Combined Rate"],
                &[],
            ));
            html.push_str("</thead>\n        <tbody>\n");
            for (year, entry) in years {
                html.push_str(&format!(
                    "          <tr><td>{}</td><td>{}</td>{}{}{}</tr>\n",
                    escape_html(year.as_str()),
                    escape_html(&entry.group),
                    Self::rate_cell(entry.entry.reimbursement),
                    Self::rate_cell(entry.entry.payment),
                    Self::rate_cell(entry.entry.combined),
                ));
            }
            html.push_str("        </tbody>\n      </table>\n    </div>\n");
        }
        html
    }
}

impl ReportRenderer for HtmlReport {
    fn render_reimbursement(&self, series: &ReimbursementSeries) -> Result<String> {
        let mut body = String::new();
        for group in series.groups.values() {
            body.push_str(&Self::reimbursement_section(group));
        }
        Ok(self.page("HCPCS Reimbursement Analysis", &body))
    }

    fn render_combined(&self, combined: &CombinedRates) -> Result<String> {
        let mut body = String::from(
            "  <div class=\"section\">\n    <h2>Overview</h2>\n    \
             <p>Medicare reimbursement rates calculated with the RVU formula, combined with \
             hospital outpatient payment rates.</p>\n    <ul>\n      \
             <li><strong>Reimbursement Rate:</strong> [(Work RVU × Work GPCI) + (PE RVU × PE GPCI) + \
             (MP RVU × MP GPCI)] × Conversion Factor</li>\n      \
             <li><strong>Payment Rate:</strong> Payment value from the payment addendum</li>\n      \
             <li><strong>Combined Rate:</strong> Sum of reimbursement and payment rates</li>\n    </ul>\n  </div>\n",
        );

        body.push_str("  <div class=\"section\" id=\"by-group\">\n    <h2>Analysis by Group</h2>\n");
        for (name, group) in &combined.by_group {
            body.push_str(&Self::combined_group_section(name, group));
        }
        body.push_str("  </div>\n");

        body.push_str("  <div class=\"section\" id=\"by-code\">\n    <h2>Analysis by Code</h2>\n");
        body.push_str(&Self::combined_code_section(combined));
        body.push_str("  </div>\n");

        Ok(self.page("HCPCS Payment and Reimbursement Analysis", &body))
    }

    fn format(&self) -> ExportFormat {
        ExportFormat::Html
    }
}

/// Plain text console report
pub struct TextReport {
    column_width: usize,
}

impl Default for TextReport {
    fn default() -> Self {
        Self::new()
    }
}

impl TextReport {
    pub fn new() -> Self {
        Self { column_width: 10 }
    }

    pub fn with_column_width(mut self, width: usize) -> Self {
        self.column_width = width.max(4);
        self
    }

    fn row(&self, first: &str, cells: &[String], width: usize) -> String {
        let mut line = format!("{:<12}|", first);
        for cell in cells {
            line.push_str(&format!(" {:<width$} |", cell, width = width));
        }
        line.push('\n');
        line
    }

    fn banner(title: &str) -> String {
        let rule = "=".repeat(32);
        format!("\n{}\n{}\n{}\n\n", rule, title, rule)
    }
}

impl ReportRenderer for TextReport {
    fn render_reimbursement(&self, series: &ReimbursementSeries) -> Result<String> {
        let mut out = String::new();

        for group in series.groups.values() {
            out.push_str(&Self::banner(&format!("HCPCS Codes in Group {}", group.group)));

            let width = self.column_width;
            let years: Vec<String> = group.years.iter().map(|y| y.to_string()).collect();
            out.push_str("Reimbursement Rates (in dollars)\n");
            out.push_str(&self.row("Code", &years, width));
            out.push_str(&format!("{}\n", "-".repeat(13 + years.len() * (width + 3))));
            for code in group.codes() {
                let cells: Vec<String> = group.years.iter().map(|y| format_rate(group.rate(y, code))).collect();
                out.push_str(&self.row(code.as_str(), &cells, width));
            }

            let periods = Period::consecutive(&group.years);
            let labels: Vec<String> = periods.iter().map(|p| p.label()).collect();
            let change_width = labels.iter().map(|l| l.len()).max().unwrap_or(width).max(width);
            out.push_str("\nPercentage Changes Year-over-Year\n");
            out.push_str(&self.row("Code", &labels, change_width));
            out.push_str(&format!("{}\n", "-".repeat(13 + labels.len() * (change_width + 3))));
            for code in group.codes() {
                let code_changes = group.changes.get(code);
                let cells: Vec<String> = periods
                    .iter()
                    .map(|p| format_change(code_changes.and_then(|c| c.get(p)).copied()))
                    .collect();
                out.push_str(&self.row(code.as_str(), &cells, change_width));
            }
        }

        Ok(out)
    }

    fn render_combined(&self, combined: &CombinedRates) -> Result<String> {
        let mut out = String::new();
        let width = self.column_width;

        for (name, group) in &combined.by_group {
            out.push_str(&Self::banner(&format!("HCPCS Codes in Group {}", name)));

            let years: Vec<&YearLabel> = group.years.keys().collect();
            let labels: Vec<String> = years.iter().map(|y| y.to_string()).collect();
            out.push_str(&self.row("Code/Type", &labels, width));
            out.push_str(&format!("{}\n", "-".repeat(13 + labels.len() * (width + 3))));

            let mut codes: Vec<&ProcedureCode> = group.years.values().flat_map(|c| c.keys()).collect();
            codes.sort();
            codes.dedup();

            for code in codes {
                let rows: [(&str, fn(&CombinedEntry) -> Option<f64>); 3] = [
                    ("reimb", |e| e.reimbursement),
                    ("payment", |e| e.payment),
                    ("combined", |e| e.combined),
                ];
                for (label, pick) in rows {
                    let cells: Vec<String> = years
                        .iter()
                        .map(|y| format_rate(group.entry(y, code).and_then(pick)))
                        .collect();
                    out.push_str(&self.row(&format!("{} {}", code, label), &cells, width));
                }
            }
        }

        Ok(out)
    }

    fn format(&self) -> ExportFormat {
        ExportFormat::Text
    }
}

impl RateDataset {
    /// Export the full dataset as JSON
    pub fn export_json<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let json = JsonExporter::new().render_value(self)?;
        write_report(path, &json, ExportFormat::Json)
    }

    /// Render the reimbursement-only report
    pub fn reimbursement_report(&self, format: ExportFormat) -> Result<String> {
        renderer_for(format).render_reimbursement(&self.reimbursement)
    }

    /// Render the combined report
    pub fn combined_report(&self, format: ExportFormat) -> Result<String> {
        renderer_for(format).render_combined(&self.combined)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_types::{FacilityType, RateTable};
    use crate::payment::PaymentSeries;
    use crate::reconcile::YearMap;
    use crate::changes::compute_yearly_changes;
    use std::collections::BTreeMap;

    fn dataset() -> RateDataset {
        let years = vec![YearLabel::new("2023"), YearLabel::new("2024A")];
        let mut rates = BTreeMap::new();
        rates.insert(
            YearLabel::new("2023"),
            RateTable::from([(ProcedureCode::new("61885"), 100.0), (ProcedureCode::new("61888"), 80.0)]),
        );
        rates.insert(YearLabel::new("2024A"), RateTable::from([(ProcedureCode::new("61885"), 90.0)]));

        let mut reimbursement = ReimbursementSeries::default();
        reimbursement.groups.insert(
            "618".to_string(),
            GroupSeries {
                group: "618".to_string(),
                changes: compute_yearly_changes(&rates, &years),
                years,
                records: BTreeMap::new(),
                rates,
            },
        );

        let mut payment = PaymentSeries::new();
        payment.insert(YearLabel::new("2024"), ProcedureCode::new("61885"), 10.0);

        RateDataset::new(reimbursement, payment, YearMap::default(), FacilityType::Facility)
    }

    #[test]
    fn test_formatting_helpers() {
        assert_eq!(format_rate(Some(538.8)), "538.80");
        assert_eq!(format_rate(None), "N/A");
        assert_eq!(format_change(Some(10.0)), "+10%");
        assert_eq!(format_change(Some(-25.5)), "-25.5%");
        assert_eq!(format_change(Some(0.0)), "+0%");
        assert_eq!(change_class(Some(-1.0)), "negative-change");
        assert_eq!(change_class(None), "missing-data");
        assert_eq!(escape_html("<a & 'b'>"), "&lt;a &amp; &#39;b&#39;&gt;");
    }

    #[test]
    fn test_reimbursement_html() {
        let html = dataset().reimbursement_report(ExportFormat::Html).unwrap();
        assert!(html.starts_with("<!DOCTYPE html>"));
        assert!(html.contains("HCPCS Codes in Group 618"));
        assert!(html.contains("<th>2023 to 2024A</th>"));
        assert!(html.contains("<td class=\"negative-change\">-10%</td>"));
        // 61888 has no 2024A rate
        assert!(html.contains("<span class=\"missing-data\">N/A</span>"));
    }

    #[test]
    fn test_combined_html() {
        let html = dataset().combined_report(ExportFormat::Html).unwrap();
        assert!(html.contains("Analysis by Group"));
        assert!(html.contains("HCPCS Code: 61885"));
        assert!(html.contains("<td>100.00</td>"));
        // 90 + 10 = 100 combined in 2024A, unchanged from 2023
        assert!(html.contains("<td class=\"positive-change\">+0%</td>"));
    }

    #[test]
    fn test_text_report() {
        let text = dataset().reimbursement_report(ExportFormat::Text).unwrap();
        assert!(text.contains("Reimbursement Rates (in dollars)"));
        assert!(text.contains("61885"));
        assert!(text.contains("-10%"));
        assert!(text.contains("N/A"));
    }

    #[test]
    fn test_json_export() {
        let dataset = dataset();
        let json = dataset.reimbursement_report(ExportFormat::Json).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["618"]["rates"]["2023"]["61885"], 100.0);
        assert_eq!(value["618"]["changes"]["61885"]["2023 to 2024A"], -10.0);

        let temp = tempfile::TempDir::new().unwrap();
        let path = temp.path().join("dataset.json");
        dataset.export_json(&path).unwrap();
        assert!(std::fs::read_to_string(&path).unwrap().contains("by_group"));
    }
}
