//! Settlement orchestrator: fetch inputs through the injected repository, then run the
//! pure calculators in order (gate -> billing -> deposit).

use crate::billing::{self, CommunalCalculation};
use crate::catalog::MeterCatalog;
use crate::completeness::{self, CompletenessReport};
use crate::deposit::{
    self, BlockingReason, LateFeeStatus, SettlementConfig, SettlementRequest, SettlementResult,
};
use crate::error::{Error, Result};
use crate::money;
use crate::period::Period;
use crate::reading::{MeterReading, ReadingPair};
use crate::storage::Repository;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// A billed month and what the tenant has already paid toward it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BilledPeriod {
    pub period: Period,
    #[serde(default)]
    pub paid: Decimal,
}

impl BilledPeriod {
    pub fn new(period: Period, paid: Decimal) -> Self {
        BilledPeriod { period, paid }
    }
}

/// Tenancy snapshot the orchestrator settles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tenancy {
    pub id: String,
    pub address_id: String,
    pub apartment_id: String,
    pub deposit: Decimal,
    pub apartment_area: Decimal,
    #[serde(default)]
    pub total_building_area: Option<Decimal>,
    /// Utility periods whose unpaid balance counts as debt
    #[serde(default)]
    pub billed_periods: Vec<BilledPeriod>,
    #[serde(default)]
    pub late_fee_status: LateFeeStatus,
}

/// Composes catalog, gate, charge calculator and deposit calculator over a repository.
pub struct SettlementOrchestrator<'a, R: Repository + ?Sized> {
    repo: &'a R,
    config: SettlementConfig,
}

impl<'a, R: Repository + ?Sized> SettlementOrchestrator<'a, R> {
    pub fn new(repo: &'a R, config: SettlementConfig) -> Self {
        SettlementOrchestrator { repo, config }
    }

    pub fn config(&self) -> &SettlementConfig {
        &self.config
    }

    /// Validated catalog for an address; absence is a precondition failure.
    pub fn catalog(&self, address_id: &str) -> Result<MeterCatalog> {
        let catalog = self
            .repo
            .get_catalog(address_id)?
            .ok_or_else(|| Error::CatalogNotFound(address_id.to_string()))?;
        catalog.validate()?;
        Ok(catalog)
    }

    /// Completeness of required readings for one apartment and period.
    pub fn check(&self, address_id: &str, apartment_id: &str, period: Period) -> Result<CompletenessReport> {
        let catalog = self.catalog(address_id)?;
        let readings = self.repo.list_readings(apartment_id, period)?;
        Ok(completeness::check(&catalog, &readings))
    }

    /// Utility bill for one apartment and period.
    pub fn bill(
        &self,
        address_id: &str,
        apartment_id: &str,
        period: Period,
        apartment_area: Decimal,
        total_building_area: Option<Decimal>,
    ) -> Result<CommunalCalculation> {
        let catalog = self.catalog(address_id)?;
        let readings = self.repo.list_readings(apartment_id, period)?;
        self.bill_with(&catalog, apartment_id, period, readings, apartment_area, total_building_area)
    }

    fn bill_with(
        &self,
        catalog: &MeterCatalog,
        apartment_id: &str,
        period: Period,
        readings: Vec<MeterReading>,
        apartment_area: Decimal,
        total_building_area: Option<Decimal>,
    ) -> Result<CommunalCalculation> {
        let pairs = self.pair_readings(catalog, readings)?;
        billing::calculate(
            catalog,
            apartment_id,
            period,
            &pairs,
            apartment_area,
            total_building_area,
        )
    }

    /// Resolve the previous approved value once per approved, individually metered reading.
    fn pair_readings(&self, catalog: &MeterCatalog, readings: Vec<MeterReading>) -> Result<Vec<ReadingPair>> {
        let mut pairs = Vec::with_capacity(readings.len());
        for reading in readings {
            let metered = catalog
                .individual_meters()
                .any(|m| m.id == reading.meter_id);
            let previous = if metered && reading.is_approved() {
                self.repo
                    .get_previous_approved_reading(&reading.meter_id, &reading.apartment_id, reading.period)?
                    .map(|r| r.value)
            } else {
                None
            };
            pairs.push(ReadingPair::new(reading, previous));
        }
        Ok(pairs)
    }

    /// End-of-tenancy settlement.
    ///
    /// Short-circuits to `Blocked` with no refund figure while any billed period has
    /// unresolved required meters.
    pub fn settle(&self, tenancy: &Tenancy, today: NaiveDate) -> Result<SettlementResult> {
        let policy = self
            .repo
            .get_deposit_policy(&tenancy.id)?
            .ok_or_else(|| Error::MissingPolicy(tenancy.id.clone()))?;
        let catalog = self.catalog(&tenancy.address_id)?;

        let mut periods: Vec<&BilledPeriod> = tenancy.billed_periods.iter().collect();
        periods.sort_by_key(|b| b.period);

        let mut fetched = Vec::with_capacity(periods.len());
        let mut unresolved: Vec<String> = Vec::new();
        for billed in &periods {
            let readings = self.repo.list_readings(&tenancy.apartment_id, billed.period)?;
            let report = completeness::check(&catalog, &readings);
            for name in report.unresolved() {
                if !unresolved.contains(&name) {
                    unresolved.push(name);
                }
            }
            fetched.push((*billed, readings));
        }

        if !unresolved.is_empty() {
            info!(
                tenancy = %tenancy.id,
                meters = ?unresolved,
                "settlement blocked on unresolved meters"
            );
            return Ok(SettlementResult::blocked(
                tenancy.deposit,
                BlockingReason::RequiredMetersUnresolved { meters: unresolved },
            ));
        }

        let mut utility_debt = Decimal::ZERO;
        for (billed, readings) in fetched {
            let calc = self.bill_with(
                &catalog,
                &tenancy.apartment_id,
                billed.period,
                readings,
                tenancy.apartment_area,
                tenancy.total_building_area,
            )?;
            let unpaid = money::checked_sub(calc.total_amount, billed.paid, "utility debt")?;
            debug!(
                tenancy = %tenancy.id,
                period = %billed.period,
                total = %calc.total_amount,
                paid = %billed.paid,
                "utility period"
            );
            if unpaid > Decimal::ZERO {
                utility_debt = money::checked_add(utility_debt, unpaid, "utility debt")?;
            }
        }

        let request = SettlementRequest {
            deposit: tenancy.deposit,
            obligations: self.repo.list_obligations(&tenancy.id)?,
            move_out: self.repo.get_move_out_record(&tenancy.id)?,
            utility_debt,
            late_fee_status: tenancy.late_fee_status,
            unresolved_meters: Vec::new(),
        };
        deposit::settle(&request, &policy, &self.config, today)
    }
}
