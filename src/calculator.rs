/*!
 * Medicare reimbursement calculator
 *
 * Implements the physician fee schedule payment formula:
 *
 * ```text
 * rate = ((Work RVU × Work GPCI) + (PE RVU × PE GPCI) + (MP RVU × MP GPCI)) × CF
 * ```
 *
 * The practice expense RVU depends on the place of service. The fully
 * implemented value is used when present; a value of exactly 0 is treated as
 * absent and the transitioned value is used instead. A genuine zero PE RVU
 * is therefore indistinguishable from a missing one, which is a known
 * approximation of the published methodology.
 */

use serde::{Deserialize, Serialize};

use crate::{
    data_types::{FacilityType, FeeScheduleRecord},
    RatesError, Result,
};

/// Round to 2 decimal places, half away from zero
///
/// Results that round to zero are returned as positive zero.
pub fn round2(value: f64) -> f64 {
    let rounded = (value * 100.0).round() / 100.0;
    if rounded == 0.0 {
        0.0
    } else {
        rounded
    }
}

/// Practice expense RVU for the requested place of service
pub fn select_pe_rvu(record: &FeeScheduleRecord, facility_type: FacilityType) -> f64 {
    let (fully_implemented, transitioned) = match facility_type {
        FacilityType::Facility => (record.facility_pe_rvu, record.transitioned_facility_pe_rvu),
        FacilityType::NonFacility => (
            record.non_facility_pe_rvu,
            record.transitioned_non_facility_pe_rvu,
        ),
    };

    if fully_implemented.is_finite() && fully_implemented != 0.0 {
        fully_implemented
    } else {
        transitioned
    }
}

fn apply_formula(work: f64, pe: f64, mp: f64, gpci: (f64, f64, f64), conversion_factor: f64) -> f64 {
    let rate = (work * gpci.0 + pe * gpci.1 + mp * gpci.2) * conversion_factor;
    if rate.is_finite() {
        round2(rate)
    } else {
        0.0
    }
}

/// Reimbursement rate for one fee schedule record
///
/// Always finite and rounded to cents; a non-finite intermediate yields 0.
pub fn calculate_reimbursement_rate(record: &FeeScheduleRecord, facility_type: FacilityType) -> f64 {
    apply_formula(
        record.work_rvu,
        select_pe_rvu(record, facility_type),
        record.mp_rvu,
        (record.gpci_work, record.gpci_pe, record.gpci_mp),
        record.conversion_factor,
    )
}

/// Year-over-year percentage change
///
/// `None` when either side is missing or not finite, `Some(0.0)` when the
/// prior value is exactly zero, otherwise the change rounded to 2 places.
pub fn percentage_change(prev: Option<f64>, curr: Option<f64>) -> Option<f64> {
    let prev = prev.filter(|v| v.is_finite())?;
    let curr = curr.filter(|v| v.is_finite())?;

    if prev == 0.0 {
        return Some(0.0);
    }

    Some(round2((curr - prev) / prev * 100.0))
}

fn one() -> f64 {
    1.0
}

/// Raw formula inputs for an on-demand calculation
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RvuInputs {
    #[serde(rename = "workRVU", alias = "work_rvu")]
    pub work_rvu: f64,
    #[serde(rename = "peRVU", alias = "pe_rvu")]
    pub pe_rvu: f64,
    #[serde(rename = "mpRVU", alias = "mp_rvu")]
    pub mp_rvu: f64,
    #[serde(rename = "workGPCI", alias = "work_gpci", default = "one")]
    pub work_gpci: f64,
    #[serde(rename = "peGPCI", alias = "pe_gpci", default = "one")]
    pub pe_gpci: f64,
    #[serde(rename = "mpGPCI", alias = "mp_gpci", default = "one")]
    pub mp_gpci: f64,
    #[serde(rename = "conversionFactor", alias = "conversion_factor")]
    pub conversion_factor: f64,
}

impl RvuInputs {
    /// Inputs with neutral GPCIs
    pub fn new(work_rvu: f64, pe_rvu: f64, mp_rvu: f64, conversion_factor: f64) -> Self {
        Self {
            work_rvu,
            pe_rvu,
            mp_rvu,
            work_gpci: 1.0,
            pe_gpci: 1.0,
            mp_gpci: 1.0,
            conversion_factor,
        }
    }

    pub fn with_gpci(mut self, work: f64, pe: f64, mp: f64) -> Self {
        self.work_gpci = work;
        self.pe_gpci = pe;
        self.mp_gpci = mp;
        self
    }

    /// Parse a JSON request body; the four RVU/CF fields are required
    pub fn from_json(body: &str) -> Result<Self> {
        serde_json::from_str(body).map_err(|e| RatesError::InvalidInput {
            message: format!(
                "Missing or invalid parameters ({}). Please provide workRVU, peRVU, mpRVU, and conversionFactor.",
                e
            ),
            field: None,
        })
    }

    fn validate(&self) -> Result<()> {
        let fields = [
            ("workRVU", self.work_rvu),
            ("peRVU", self.pe_rvu),
            ("mpRVU", self.mp_rvu),
            ("workGPCI", self.work_gpci),
            ("peGPCI", self.pe_gpci),
            ("mpGPCI", self.mp_gpci),
            ("conversionFactor", self.conversion_factor),
        ];

        for (name, value) in fields {
            if !value.is_finite() {
                return Err(RatesError::invalid_input(name, format!("{} must be a finite number", name)));
            }
        }
        Ok(())
    }
}

/// Echoed inputs and the computed rate
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CalculationResult {
    pub inputs: RvuInputs,
    pub result: f64,
}

/// Apply the reimbursement formula to raw inputs
pub fn calculate_from_inputs(inputs: RvuInputs) -> Result<CalculationResult> {
    inputs.validate()?;

    let result = apply_formula(
        inputs.work_rvu,
        inputs.pe_rvu,
        inputs.mp_rvu,
        (inputs.work_gpci, inputs.pe_gpci, inputs.mp_gpci),
        inputs.conversion_factor,
    );

    Ok(CalculationResult { inputs, result })
}
