/*!
 * Schema definitions for CMS rate files
 *
 * Column names used by the Medicare physician fee schedule exports and the
 * hospital outpatient payment addendum. Files in the wild drift over the
 * years, so these schemas only report which expected columns are absent;
 * parsing itself stays tolerant.
 */

/// Column holding the procedure code in both file families
pub const CODE_COLUMN: &str = "HCPCS Code";

/// Physician fee schedule ("national payment amount") file schema
pub struct FeeScheduleSchema;

impl FeeScheduleSchema {
    pub const WORK_RVU: &'static str = "Work RVU";
    pub const FACILITY_PE_RVU: &'static str = "Fully Implemented Facility PE RVU";
    pub const TRANSITIONED_FACILITY_PE_RVU: &'static str = "Transitioned Facility PE RVU";
    pub const NON_FACILITY_PE_RVU: &'static str = "Fully Implemented Non-FAC PE RVU";
    pub const TRANSITIONED_NON_FACILITY_PE_RVU: &'static str = "Transitioned Non-FAC PE RVU";
    pub const MP_RVU: &'static str = "MP RVU";
    pub const GPCI_WORK: &'static str = "GPCI Work";
    pub const GPCI_PE: &'static str = "GPCI PE";
    pub const GPCI_MP: &'static str = "GPCI MP";
    pub const CONVERSION_FACTOR: &'static str = "Conv Fact";

    /// Every column the reimbursement calculator can read
    pub fn column_names() -> Vec<&'static str> {
        vec![
            CODE_COLUMN,
            Self::WORK_RVU,
            Self::FACILITY_PE_RVU,
            Self::TRANSITIONED_FACILITY_PE_RVU,
            Self::NON_FACILITY_PE_RVU,
            Self::TRANSITIONED_NON_FACILITY_PE_RVU,
            Self::MP_RVU,
            Self::GPCI_WORK,
            Self::GPCI_PE,
            Self::GPCI_MP,
            Self::CONVERSION_FACTOR,
        ]
    }

    pub fn column_count() -> usize {
        Self::column_names().len()
    }

    /// Columns without which no rate can be computed
    pub fn required_columns() -> Vec<&'static str> {
        vec![CODE_COLUMN, Self::WORK_RVU, Self::MP_RVU, Self::CONVERSION_FACTOR]
    }

    fn pe_columns() -> [&'static str; 4] {
        [
            Self::FACILITY_PE_RVU,
            Self::TRANSITIONED_FACILITY_PE_RVU,
            Self::NON_FACILITY_PE_RVU,
            Self::TRANSITIONED_NON_FACILITY_PE_RVU,
        ]
    }

    /// Required columns not present in a header row
    ///
    /// Any one PE column satisfies the PE requirement; when none is present
    /// the facility column is reported.
    pub fn missing_columns(headers: &[String]) -> Vec<&'static str> {
        let mut missing = missing_from(&Self::required_columns(), headers);
        if missing_from(&Self::pe_columns(), headers).len() == Self::pe_columns().len() {
            missing.push(Self::FACILITY_PE_RVU);
        }
        missing
    }

    /// Absent columns that fall back to a default (GPCI 1.0, PE 0)
    pub fn missing_optional_columns(headers: &[String]) -> Vec<&'static str> {
        let required = Self::required_columns();
        let optional: Vec<&'static str> = Self::column_names()
            .into_iter()
            .filter(|c| !required.contains(c))
            .collect();
        missing_from(&optional, headers)
    }
}

/// Hospital outpatient payment addendum ("Addendum B") schema
pub struct PaymentAddendumSchema;

impl PaymentAddendumSchema {
    pub const PAYMENT_RATE: &'static str = "Payment Rate";

    pub fn column_names() -> Vec<&'static str> {
        vec![CODE_COLUMN, Self::PAYMENT_RATE]
    }

    pub fn column_count() -> usize {
        2
    }

    pub fn missing_columns(headers: &[String]) -> Vec<&'static str> {
        missing_from(&Self::column_names(), headers)
    }
}

fn missing_from(expected: &[&'static str], headers: &[String]) -> Vec<&'static str> {
    expected
        .iter()
        .filter(|column| !headers.iter().any(|h| h == *column))
        .copied()
        .collect()
}
