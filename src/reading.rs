use crate::error::{Error, Result};
use crate::period::Period;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Approval status lifecycle: Pending -> Approved | Rejected. Terminal states never change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadingStatus {
    Pending,
    Approved,
    Rejected,
}

/// A submitted meter value for one apartment and period.
///
/// Identity: `(meter_id, apartment_id, period)`
///
/// Readings are never deleted; approved history is the source for previous-reading lookups.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MeterReading {
    pub meter_id: String,
    pub apartment_id: String,
    pub period: Period,
    pub value: Decimal,
    pub status: ReadingStatus,
    #[serde(default)]
    pub submitted_at: Option<DateTime<Utc>>,
}

impl MeterReading {
    /// New submission awaiting approval
    pub fn pending(meter_id: &str, apartment_id: &str, period: Period, value: Decimal) -> Self {
        MeterReading {
            meter_id: meter_id.to_string(),
            apartment_id: apartment_id.to_string(),
            period,
            value,
            status: ReadingStatus::Pending,
            submitted_at: None,
        }
    }

    /// Already-approved reading (imports, tests)
    pub fn approved(meter_id: &str, apartment_id: &str, period: Period, value: Decimal) -> Self {
        MeterReading {
            status: ReadingStatus::Approved,
            ..MeterReading::pending(meter_id, apartment_id, period, value)
        }
    }

    pub fn submitted(mut self, at: DateTime<Utc>) -> Self {
        self.submitted_at = Some(at);
        self
    }

    pub fn is_approved(&self) -> bool {
        self.status == ReadingStatus::Approved
    }

    pub fn is_pending(&self) -> bool {
        self.status == ReadingStatus::Pending
    }

    pub fn approve(&mut self) -> Result<()> {
        self.transition(ReadingStatus::Approved)
    }

    pub fn reject(&mut self) -> Result<()> {
        self.transition(ReadingStatus::Rejected)
    }

    fn transition(&mut self, to: ReadingStatus) -> Result<()> {
        if self.status != ReadingStatus::Pending {
            return Err(Error::InvalidTransition(format!(
                "reading {}/{}/{} is {:?}, only pending readings can become {:?}",
                self.meter_id, self.apartment_id, self.period, self.status, to
            )));
        }
        self.status = to;
        Ok(())
    }

    /// Storage key, unique per `(meter_id, apartment_id, period)`.
    pub fn key(&self) -> String {
        format!("{}:{}:{}", self.meter_id, self.apartment_id, self.period)
    }
}

/// A current reading with the previous approved value resolved up front.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadingPair {
    pub current: MeterReading,
    pub previous: Option<Decimal>,
}

impl ReadingPair {
    pub fn new(current: MeterReading, previous: Option<Decimal>) -> Self {
        ReadingPair { current, previous }
    }
}
