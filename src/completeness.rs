//! Completeness gate: are all required meters read and approved for a period?

use crate::catalog::MeterCatalog;
use crate::reading::{MeterReading, ReadingStatus};
use serde::{Deserialize, Serialize};

/// Gate outcome. Meter names appear in catalog order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletenessReport {
    /// Required meters with no usable reading (none, or rejected)
    pub missing: Vec<String>,
    /// Required meters whose reading awaits approval
    pub pending: Vec<String>,
    pub complete: bool,
}

impl CompletenessReport {
    /// All unresolved meter names, missing first.
    pub fn unresolved(&self) -> Vec<String> {
        self.missing.iter().chain(self.pending.iter()).cloned().collect()
    }
}

/// Classify the catalog's required meters against the period's readings.
///
/// `readings` should be every reading submitted for one apartment and period, in any
/// status. Readings for meters outside the catalog are ignored.
pub fn check(catalog: &MeterCatalog, readings: &[MeterReading]) -> CompletenessReport {
    let mut missing = Vec::new();
    let mut pending = Vec::new();

    for meter in catalog.required_meters() {
        let status = readings
            .iter()
            .filter(|r| r.meter_id == meter.id)
            .map(|r| r.status)
            .max_by_key(|s| status_rank(*s));
        match status {
            Some(ReadingStatus::Approved) => {}
            Some(ReadingStatus::Pending) => pending.push(meter.name.clone()),
            Some(ReadingStatus::Rejected) | None => missing.push(meter.name.clone()),
        }
    }

    let complete = missing.is_empty() && pending.is_empty();
    CompletenessReport {
        missing,
        pending,
        complete,
    }
}

// Approved beats pending beats rejected when a caller passes more than one reading.
fn status_rank(s: ReadingStatus) -> u8 {
    match s {
        ReadingStatus::Approved => 2,
        ReadingStatus::Pending => 1,
        ReadingStatus::Rejected => 0,
    }
}
