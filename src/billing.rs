//! Consumption & charge calculator: readings + catalog -> one period's utility bill.

use crate::catalog::{MeterCatalog, MeterDefinition, MeterKind};
use crate::error::{Error, Result};
use crate::money;
use crate::period::Period;
use crate::reading::{ReadingPair, ReadingStatus};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use tracing::{debug, warn};

/// Where a charge line's quantity came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum ChargeSource {
    /// Individually metered: quantity is `current - previous`, clamped at zero
    Metered { current: Decimal, previous: Decimal },
    /// Shared meter: quantity is the apartment's share of the building floor area
    AreaShare {
        apartment_area: Decimal,
        building_area: Option<Decimal>,
    },
}

/// One priced line of a communal bill.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChargeLine {
    pub meter_id: String,
    pub kind: MeterKind,
    pub source: ChargeSource,
    /// Always >= 0
    pub consumption: Decimal,
    pub unit_price: Decimal,
    /// `consumption * unit_price`, unrounded
    pub total: Decimal,
}

impl ChargeLine {
    pub fn current(&self) -> Option<Decimal> {
        match self.source {
            ChargeSource::Metered { current, .. } => Some(current),
            ChargeSource::AreaShare { .. } => None,
        }
    }

    pub fn previous(&self) -> Option<Decimal> {
        match self.source {
            ChargeSource::Metered { previous, .. } => Some(previous),
            ChargeSource::AreaShare { .. } => None,
        }
    }
}

/// Recoverable data-quality findings. They never abort a calculation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum BillingWarning {
    ReadingBelowPrevious {
        meter_id: String,
        current: Decimal,
        previous: Decimal,
    },
    MissingPreviousReading { meter_id: String },
    MissingBuildingArea,
    UnknownMeter { meter_id: String },
    ReadingForSharedMeter { meter_id: String },
    ForeignReading {
        meter_id: String,
        apartment_id: String,
        period: Period,
    },
    ReadingNotApproved {
        meter_id: String,
        status: ReadingStatus,
    },
}

impl fmt::Display for BillingWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BillingWarning::ReadingBelowPrevious {
                meter_id,
                current,
                previous,
            } => write!(
                f,
                "meter {}: reading {} is below previous {}, consumption clamped to 0",
                meter_id, current, previous
            ),
            BillingWarning::MissingPreviousReading { meter_id } => write!(
                f,
                "meter {}: no previous approved reading, current value taken as baseline",
                meter_id
            ),
            BillingWarning::MissingBuildingArea => {
                f.write_str("total building area unknown or zero, shared costs reported as 0")
            }
            BillingWarning::UnknownMeter { meter_id } => {
                write!(f, "meter {} is not in the catalog, reading ignored", meter_id)
            }
            BillingWarning::ReadingForSharedMeter { meter_id } => write!(
                f,
                "meter {} is shared, apartment reading ignored",
                meter_id
            ),
            BillingWarning::ForeignReading {
                meter_id,
                apartment_id,
                period,
            } => write!(
                f,
                "reading for meter {} belongs to {} / {}, ignored",
                meter_id, apartment_id, period
            ),
            BillingWarning::ReadingNotApproved { meter_id, status } => write!(
                f,
                "meter {}: reading is {:?}, excluded from billing",
                meter_id, status
            ),
        }
    }
}

/// Utility bill for one apartment and period.
///
/// Invariant: `total_amount == fixed_charges + variable_charges` and
/// `variable_charges == sum(lines.total)`, exactly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommunalCalculation {
    pub apartment_id: String,
    pub period: Period,
    pub lines: Vec<ChargeLine>,
    pub fixed_charges: Decimal,
    pub variable_charges: Decimal,
    pub total_amount: Decimal,
    #[serde(default)]
    pub warnings: Vec<BillingWarning>,
}

impl CommunalCalculation {
    /// Total rounded for display or invoicing.
    pub fn settled_total(&self) -> Decimal {
        money::settle_amount(self.total_amount)
    }

    pub fn line(&self, meter_id: &str) -> Option<&ChargeLine> {
        self.lines.iter().find(|l| l.meter_id == meter_id)
    }
}

/// Consumption between two readings; never negative.
pub fn consumption(current: Decimal, previous: Decimal) -> Result<Decimal> {
    if current < previous {
        Ok(Decimal::ZERO)
    } else {
        money::checked_sub(current, previous, "consumption")
    }
}

/// Compute the bill for `apartment_id` in `period`.
///
/// `readings` carry the previous approved value already resolved. Only approved readings
/// for individually metered catalog meters are priced; everything else is reported as a
/// warning. Shared meters are apportioned by `apartment_area / total_building_area`.
pub fn calculate(
    catalog: &MeterCatalog,
    apartment_id: &str,
    period: Period,
    readings: &[ReadingPair],
    apartment_area: Decimal,
    total_building_area: Option<Decimal>,
) -> Result<CommunalCalculation> {
    catalog.validate()?;
    if apartment_area.is_sign_negative() && !apartment_area.is_zero() {
        return Err(Error::InvalidInput(format!(
            "Negative apartment area {} for {}",
            apartment_area, apartment_id
        )));
    }
    if let Some(area) = total_building_area {
        if area.is_sign_negative() && !area.is_zero() {
            return Err(Error::InvalidInput(format!("Negative building area {}", area)));
        }
    }

    let mut warnings = Vec::new();
    let mut by_meter: HashMap<&str, &ReadingPair> = HashMap::new();

    for pair in readings {
        let r = &pair.current;
        if r.apartment_id != apartment_id || r.period != period {
            warnings.push(BillingWarning::ForeignReading {
                meter_id: r.meter_id.clone(),
                apartment_id: r.apartment_id.clone(),
                period: r.period,
            });
            continue;
        }
        let Some(meter) = catalog.get_meter(&r.meter_id) else {
            warnings.push(BillingWarning::UnknownMeter {
                meter_id: r.meter_id.clone(),
            });
            continue;
        };
        if !meter.has_individual_meter {
            warnings.push(BillingWarning::ReadingForSharedMeter {
                meter_id: r.meter_id.clone(),
            });
            continue;
        }
        if by_meter.insert(r.meter_id.as_str(), pair).is_some() {
            return Err(Error::DuplicateReading {
                meter_id: r.meter_id.clone(),
                apartment_id: apartment_id.to_string(),
                period: period.to_string(),
            });
        }
    }

    let share = area_share(apartment_area, total_building_area);
    if share.is_none() && catalog.shared_meters().next().is_some() {
        warnings.push(BillingWarning::MissingBuildingArea);
    }

    let mut lines = Vec::new();
    for meter in &catalog.meters {
        let unit_price = catalog.unit_price(meter);
        if meter.has_individual_meter {
            let Some(pair) = by_meter.get(meter.id.as_str()) else {
                continue;
            };
            if let Some(line) = metered_line(meter, unit_price, pair, &mut warnings)? {
                lines.push(line);
            }
        } else {
            let quantity = share.unwrap_or(Decimal::ZERO);
            lines.push(ChargeLine {
                meter_id: meter.id.clone(),
                kind: meter.kind.clone(),
                source: ChargeSource::AreaShare {
                    apartment_area,
                    building_area: total_building_area,
                },
                consumption: quantity,
                unit_price,
                total: money::checked_mul(quantity, unit_price, "shared charge")?,
            });
        }
    }

    for w in &warnings {
        warn!(apartment = apartment_id, period = %period, "{}", w);
    }

    let fixed_charges = catalog.schedule.fixed_total()?;
    let variable_charges = money::checked_sum(lines.iter().map(|l| l.total), "variable charges")?;
    let total_amount = money::checked_add(fixed_charges, variable_charges, "bill total")?;

    debug!(
        apartment = apartment_id,
        period = %period,
        lines = lines.len(),
        total = %total_amount,
        "communal calculation complete"
    );

    Ok(CommunalCalculation {
        apartment_id: apartment_id.to_string(),
        period,
        lines,
        fixed_charges,
        variable_charges,
        total_amount,
        warnings,
    })
}

/// Apartment share of the building, or `None` when the denominator is unusable.
fn area_share(apartment_area: Decimal, total_building_area: Option<Decimal>) -> Option<Decimal> {
    match total_building_area {
        Some(total) if total > Decimal::ZERO => apartment_area.checked_div(total),
        _ => None,
    }
}

fn metered_line(
    meter: &MeterDefinition,
    unit_price: Decimal,
    pair: &ReadingPair,
    warnings: &mut Vec<BillingWarning>,
) -> Result<Option<ChargeLine>> {
    let reading = &pair.current;
    if !reading.is_approved() {
        warnings.push(BillingWarning::ReadingNotApproved {
            meter_id: meter.id.clone(),
            status: reading.status,
        });
        return Ok(None);
    }

    let previous = match pair.previous {
        Some(p) => p,
        None => {
            warnings.push(BillingWarning::MissingPreviousReading {
                meter_id: meter.id.clone(),
            });
            reading.value
        }
    };
    if reading.value < previous {
        warnings.push(BillingWarning::ReadingBelowPrevious {
            meter_id: meter.id.clone(),
            current: reading.value,
            previous,
        });
    }

    let used = consumption(reading.value, previous)?;
    let total = money::checked_mul(used, unit_price, "metered charge")?;
    Ok(Some(ChargeLine {
        meter_id: meter.id.clone(),
        kind: meter.kind.clone(),
        source: ChargeSource::Metered {
            current: reading.value,
            previous,
        },
        consumption: used,
        unit_price,
        total,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{MeterDefinition, PriceSchedule};
    use crate::reading::MeterReading;
    use rust_decimal_macros::dec;

    fn period() -> Period {
        Period::parse("2024-02").unwrap()
    }

    fn catalog() -> MeterCatalog {
        MeterCatalog::new(
            "addr-1",
            vec![
                MeterDefinition::individual("cw", "Cold water", MeterKind::ColdWater, "m3", dec!(1.32)),
                MeterDefinition::individual("hw", "Hot water", MeterKind::HotWater, "m3", dec!(4.10)),
                MeterDefinition::shared("heat", "Heating", MeterKind::Heating, "Gcal", dec!(1000)),
            ],
            PriceSchedule::default()
                .with_fixed("garbage", dec!(5))
                .with_fixed("maintenance", dec!(10)),
        )
    }

    fn approved(meter: &str, value: Decimal, previous: Option<Decimal>) -> ReadingPair {
        ReadingPair::new(MeterReading::approved(meter, "apt-1", period(), value), previous)
    }

    #[test]
    fn test_consumption_and_total() {
        let calc = calculate(
            &catalog(),
            "apt-1",
            period(),
            &[approved("cw", dec!(49), Some(dec!(45)))],
            dec!(50),
            Some(dec!(1000)),
        )
        .unwrap();
        let cw = calc.line("cw").unwrap();
        assert_eq!(cw.consumption, dec!(4));
        assert_eq!(cw.total, dec!(5.28));
        assert_eq!(cw.current(), Some(dec!(49)));
        assert_eq!(cw.previous(), Some(dec!(45)));

        let heat = calc.line("heat").unwrap();
        assert_eq!(heat.consumption, dec!(0.05));
        assert_eq!(heat.total, dec!(50));

        assert_eq!(calc.fixed_charges, dec!(15));
        assert_eq!(calc.variable_charges, dec!(55.28));
        assert_eq!(calc.total_amount, dec!(70.28));
        assert!(calc.warnings.is_empty());
    }

    #[test]
    fn test_consumption() {
        assert_eq!(consumption(dec!(49), dec!(45)), Ok(dec!(4)));
        assert_eq!(consumption(dec!(40), dec!(45)), Ok(Decimal::ZERO));
        assert!(consumption(Decimal::MAX, dec!(-1)).is_err());
    }

    #[test]
    fn test_overflowing_charge_is_an_error() {
        let mut c = catalog();
        c.meters[0].unit_price = Decimal::from(1_000_000_000_000i64);
        let huge = Decimal::from_i128_with_scale(10i128.pow(20), 0);
        let result = calculate(
            &c,
            "apt-1",
            period(),
            &[approved("cw", huge, Some(Decimal::ZERO))],
            dec!(50),
            Some(dec!(1000)),
        );
        assert!(matches!(result, Err(Error::InvalidInput(ref m)) if m.contains("overflow")));

        let mut c = catalog();
        c.meters[2].unit_price = Decimal::MAX;
        let result = calculate(&c, "apt-1", period(), &[], dec!(5000), Some(dec!(1000)));
        assert!(matches!(result, Err(Error::InvalidInput(_))));
    }

    #[test]
    fn test_reading_below_previous_clamps() {
        let calc = calculate(
            &catalog(),
            "apt-1",
            period(),
            &[approved("cw", dec!(40), Some(dec!(45)))],
            dec!(50),
            Some(dec!(1000)),
        )
        .unwrap();
        assert_eq!(calc.line("cw").unwrap().consumption, Decimal::ZERO);
        assert!(matches!(
            calc.warnings[0],
            BillingWarning::ReadingBelowPrevious { .. }
        ));
    }

    #[test]
    fn test_missing_building_area_is_degraded_not_fatal() {
        for area in [None, Some(Decimal::ZERO)] {
            let calc = calculate(&catalog(), "apt-1", period(), &[], dec!(50), area).unwrap();
            assert_eq!(calc.line("heat").unwrap().total, Decimal::ZERO);
            assert_eq!(calc.total_amount, dec!(15));
            assert!(calc.warnings.contains(&BillingWarning::MissingBuildingArea));
        }
    }

    #[test]
    fn test_pending_reading_excluded() {
        let pending = ReadingPair::new(
            MeterReading::pending("hw", "apt-1", period(), dec!(12)),
            Some(dec!(10)),
        );
        let calc =
            calculate(&catalog(), "apt-1", period(), &[pending], dec!(50), Some(dec!(1000))).unwrap();
        assert!(calc.line("hw").is_none());
        assert!(matches!(
            calc.warnings[0],
            BillingWarning::ReadingNotApproved {
                status: ReadingStatus::Pending,
                ..
            }
        ));
    }

    #[test]
    fn test_missing_previous_is_baseline() {
        let calc = calculate(
            &catalog(),
            "apt-1",
            period(),
            &[approved("cw", dec!(49), None)],
            dec!(50),
            Some(dec!(1000)),
        )
        .unwrap();
        assert_eq!(calc.line("cw").unwrap().consumption, Decimal::ZERO);
        assert_eq!(
            calc.warnings,
            vec![BillingWarning::MissingPreviousReading {
                meter_id: "cw".to_string()
            }]
        );
    }

    #[test]
    fn test_unknown_and_foreign_readings_skipped() {
        let foreign = ReadingPair::new(
            MeterReading::approved("cw", "apt-2", period(), dec!(10)),
            Some(dec!(1)),
        );
        let calc = calculate(
            &catalog(),
            "apt-1",
            period(),
            &[approved("gas", dec!(10), Some(dec!(1))), foreign],
            dec!(50),
            Some(dec!(1000)),
        )
        .unwrap();
        assert_eq!(calc.lines.len(), 1);
        assert_eq!(calc.warnings.len(), 2);
    }

    #[test]
    fn test_duplicate_reading_is_fatal() {
        let r = approved("cw", dec!(49), Some(dec!(45)));
        let err = calculate(&catalog(), "apt-1", period(), &[r.clone(), r], dec!(50), Some(dec!(1000)))
            .unwrap_err();
        assert!(matches!(err, Error::DuplicateReading { .. }));
    }

    #[test]
    fn test_negative_unit_price_is_fatal() {
        let mut c = catalog();
        c.meters[1].unit_price = dec!(-0.01);
        assert!(matches!(
            calculate(&c, "apt-1", period(), &[], dec!(50), Some(dec!(1000))),
            Err(Error::NegativeUnitPrice { .. })
        ));
    }

    #[test]
    fn test_lines_follow_catalog_order() {
        let calc = calculate(
            &catalog(),
            "apt-1",
            period(),
            &[approved("hw", dec!(3), Some(dec!(1))), approved("cw", dec!(49), Some(dec!(45)))],
            dec!(50),
            Some(dec!(1000)),
        )
        .unwrap();
        let ids: Vec<_> = calc.lines.iter().map(|l| l.meter_id.as_str()).collect();
        assert_eq!(ids, vec!["cw", "hw", "heat"]);
    }
}
