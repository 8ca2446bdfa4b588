//! Meter catalog: which utilities an address has and what they cost.

use crate::error::{Error, Result};
use crate::money;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Utility kind. `Custom` carries its own label (e.g. "elevator").
#[derive(Debug, Clone, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MeterKind {
    ColdWater,
    HotWater,
    Electricity,
    Heating,
    Gas,
    Garbage,
    Custom(String),
}

impl MeterKind {
    /// Stable key used by the price schedule.
    pub fn key(&self) -> String {
        match self {
            MeterKind::ColdWater => "cold_water".to_string(),
            MeterKind::HotWater => "hot_water".to_string(),
            MeterKind::Electricity => "electricity".to_string(),
            MeterKind::Heating => "heating".to_string(),
            MeterKind::Gas => "gas".to_string(),
            MeterKind::Garbage => "garbage".to_string(),
            MeterKind::Custom(name) => format!("custom:{}", name),
        }
    }
}

impl fmt::Display for MeterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key())
    }
}

/// One utility meter configured for an address.
///
/// Invariants:
/// - `unit_price >= 0`
/// - `id` is unique within a catalog
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MeterDefinition {
    pub id: String,

    /// Display name used in completeness reports
    pub name: String,

    pub kind: MeterKind,

    /// Measurement unit (m3, kWh, Gcal, ...)
    pub unit: String,

    /// A reading must exist and be approved before settlement
    pub is_required: bool,

    /// Read per apartment; otherwise the cost is shared by floor area
    pub has_individual_meter: bool,

    pub unit_price: Decimal,
}

impl MeterDefinition {
    /// Individually metered meter
    pub fn individual(id: &str, name: &str, kind: MeterKind, unit: &str, unit_price: Decimal) -> Self {
        MeterDefinition {
            id: id.to_string(),
            name: name.to_string(),
            kind,
            unit: unit.to_string(),
            is_required: true,
            has_individual_meter: true,
            unit_price,
        }
    }

    /// Building-level meter apportioned by area
    pub fn shared(id: &str, name: &str, kind: MeterKind, unit: &str, unit_price: Decimal) -> Self {
        MeterDefinition {
            id: id.to_string(),
            name: name.to_string(),
            kind,
            unit: unit.to_string(),
            is_required: false,
            has_individual_meter: false,
            unit_price,
        }
    }

    pub fn optional(mut self) -> Self {
        self.is_required = false;
        self
    }
}

/// Flat monthly charge billed regardless of consumption.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FixedCharge {
    /// e.g. "garbage", "maintenance"
    pub name: String,
    pub amount: Decimal,
}

impl FixedCharge {
    pub fn new(name: &str, amount: Decimal) -> Self {
        FixedCharge {
            name: name.to_string(),
            amount,
        }
    }
}

/// Per-utility unit prices plus fixed monthly charges.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct PriceSchedule {
    /// Unit prices keyed by `MeterKind::key()`; override the meter definition's own price
    #[serde(default)]
    pub unit_prices: BTreeMap<String, Decimal>,

    #[serde(default)]
    pub fixed_charges: Vec<FixedCharge>,

    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl PriceSchedule {
    pub fn with_fixed(mut self, name: &str, amount: Decimal) -> Self {
        self.fixed_charges.push(FixedCharge::new(name, amount));
        self
    }

    pub fn with_unit_price(mut self, kind: &MeterKind, price: Decimal) -> Self {
        self.unit_prices.insert(kind.key(), price);
        self
    }

    pub fn fixed_total(&self) -> Result<Decimal> {
        money::checked_sum(self.fixed_charges.iter().map(|c| c.amount), "fixed charges")
    }
}

/// Meters and prices for one property address.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MeterCatalog {
    pub address_id: String,
    pub meters: Vec<MeterDefinition>,
    #[serde(default)]
    pub schedule: PriceSchedule,
}

impl MeterCatalog {
    pub fn new(address_id: &str, meters: Vec<MeterDefinition>, schedule: PriceSchedule) -> Self {
        MeterCatalog {
            address_id: address_id.to_string(),
            meters,
            schedule,
        }
    }

    /// Reject configurations that would yield silently wrong money.
    pub fn validate(&self) -> Result<()> {
        let mut seen = std::collections::HashSet::new();
        for meter in &self.meters {
            if !seen.insert(meter.id.as_str()) {
                return Err(Error::InvalidInput(format!(
                    "Duplicate meter id {} in catalog for {}",
                    meter.id, self.address_id
                )));
            }
            // Readings for shared meters are never priced, so the gate could not be satisfied
            if meter.is_required && !meter.has_individual_meter {
                return Err(Error::InvalidInput(format!(
                    "Shared meter {} cannot be required in catalog for {}",
                    meter.id, self.address_id
                )));
            }
            let price = self.unit_price(meter);
            if price.is_sign_negative() && !price.is_zero() {
                return Err(Error::NegativeUnitPrice {
                    meter_id: meter.id.clone(),
                    price: price.to_string(),
                });
            }
        }
        for charge in &self.schedule.fixed_charges {
            if charge.amount.is_sign_negative() && !charge.amount.is_zero() {
                return Err(Error::InvalidInput(format!(
                    "Negative fixed charge {} = {}",
                    charge.name, charge.amount
                )));
            }
        }
        self.schedule.fixed_total()?;
        Ok(())
    }

    /// Effective unit price: schedule price for the kind, else the meter's own.
    pub fn unit_price(&self, meter: &MeterDefinition) -> Decimal {
        self.schedule
            .unit_prices
            .get(&meter.kind.key())
            .copied()
            .unwrap_or(meter.unit_price)
    }

    pub fn get_meter(&self, meter_id: &str) -> Option<&MeterDefinition> {
        self.meters.iter().find(|m| m.id == meter_id)
    }

    pub fn required_meters(&self) -> impl Iterator<Item = &MeterDefinition> {
        self.meters.iter().filter(|m| m.is_required)
    }

    pub fn individual_meters(&self) -> impl Iterator<Item = &MeterDefinition> {
        self.meters.iter().filter(|m| m.has_individual_meter)
    }

    pub fn shared_meters(&self) -> impl Iterator<Item = &MeterDefinition> {
        self.meters.iter().filter(|m| !m.has_individual_meter)
    }
}
