use crate::catalog::MeterCatalog;
use crate::deposit::{DepositPolicy, MoveOutRecord, Obligation};
use crate::error::{Error, Result};
use crate::orchestrator::Tenancy;
use crate::period::Period;
use crate::reading::{MeterReading, ReadingStatus};
use crate::storage::{
    CatalogProvider, MoveOutProvider, ObligationProvider, PolicyProvider, ReadingProvider,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use tracing::debug;

/// In-memory repository; also the on-disk snapshot format of [`crate::storage::FileStorage`].
///
/// Readings are never removed. The only overwrite is a resubmission replacing a rejected reading.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryRepository {
    /// Catalogs indexed by address id
    #[serde(default)]
    pub catalogs: BTreeMap<String, MeterCatalog>,

    #[serde(default)]
    pub readings: Vec<MeterReading>,

    /// Obligations indexed by tenancy id
    #[serde(default)]
    pub obligations: BTreeMap<String, Vec<Obligation>>,

    #[serde(default)]
    pub move_outs: BTreeMap<String, MoveOutRecord>,

    #[serde(default)]
    pub policies: BTreeMap<String, DepositPolicy>,

    #[serde(default)]
    pub tenancies: BTreeMap<String, Tenancy>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        MemoryRepository::default()
    }

    /// Check invariants of a deserialized snapshot.
    pub fn validate(&self) -> Result<()> {
        let mut keys = HashSet::new();
        for r in &self.readings {
            if !keys.insert(r.key()) {
                return Err(duplicate(r));
            }
        }
        for catalog in self.catalogs.values() {
            catalog.validate()?;
        }
        Ok(())
    }

    pub fn insert_catalog(&mut self, catalog: MeterCatalog) {
        self.catalogs.insert(catalog.address_id.clone(), catalog);
    }

    /// Store a new reading.
    ///
    /// A rejected reading is replaced by a pending resubmission for the same meter, apartment
    /// and period. Any other existing reading for that key is a duplicate.
    pub fn submit_reading(&mut self, reading: MeterReading) -> Result<()> {
        let key = reading.key();
        let existing = self.readings.iter().position(|r| r.key() == key);
        match existing {
            None => self.readings.push(reading),
            Some(i) if self.readings[i].status == ReadingStatus::Rejected => {
                if !reading.is_pending() {
                    return Err(Error::InvalidTransition(format!(
                        "resubmitted reading {} must be pending, got {:?}",
                        key, reading.status
                    )));
                }
                debug!(reading = %key, "rejected reading resubmitted");
                self.readings[i] = reading;
            }
            Some(_) => return Err(duplicate(&reading)),
        }
        Ok(())
    }

    pub fn approve_reading(&mut self, meter_id: &str, apartment_id: &str, period: Period) -> Result<()> {
        self.find_mut(meter_id, apartment_id, period)?.approve()
    }

    pub fn reject_reading(&mut self, meter_id: &str, apartment_id: &str, period: Period) -> Result<()> {
        self.find_mut(meter_id, apartment_id, period)?.reject()
    }

    pub fn add_obligation(&mut self, tenancy_id: &str, obligation: Obligation) {
        self.obligations
            .entry(tenancy_id.to_string())
            .or_default()
            .push(obligation);
    }

    pub fn set_move_out(&mut self, tenancy_id: &str, record: MoveOutRecord) {
        self.move_outs.insert(tenancy_id.to_string(), record);
    }

    pub fn set_policy(&mut self, tenancy_id: &str, policy: DepositPolicy) {
        self.policies.insert(tenancy_id.to_string(), policy);
    }

    pub fn insert_tenancy(&mut self, tenancy: Tenancy) {
        self.tenancies.insert(tenancy.id.clone(), tenancy);
    }

    pub fn get_tenancy(&self, tenancy_id: &str) -> Option<&Tenancy> {
        self.tenancies.get(tenancy_id)
    }

    fn find(&self, meter_id: &str, apartment_id: &str, period: Period) -> Option<&MeterReading> {
        self.readings
            .iter()
            .find(|r| r.meter_id == meter_id && r.apartment_id == apartment_id && r.period == period)
    }

    fn find_mut(&mut self, meter_id: &str, apartment_id: &str, period: Period) -> Result<&mut MeterReading> {
        self.readings
            .iter_mut()
            .find(|r| r.meter_id == meter_id && r.apartment_id == apartment_id && r.period == period)
            .ok_or_else(|| Error::ReadingNotFound {
                meter_id: meter_id.to_string(),
                apartment_id: apartment_id.to_string(),
                period: period.to_string(),
            })
    }
}

fn duplicate(r: &MeterReading) -> Error {
    Error::DuplicateReading {
        meter_id: r.meter_id.clone(),
        apartment_id: r.apartment_id.clone(),
        period: r.period.to_string(),
    }
}

impl CatalogProvider for MemoryRepository {
    fn get_catalog(&self, address_id: &str) -> Result<Option<MeterCatalog>> {
        Ok(self.catalogs.get(address_id).cloned())
    }
}

impl ReadingProvider for MemoryRepository {
    fn get_approved_reading(
        &self,
        meter_id: &str,
        apartment_id: &str,
        period: Period,
    ) -> Result<Option<MeterReading>> {
        Ok(self
            .find(meter_id, apartment_id, period)
            .filter(|r| r.is_approved())
            .cloned())
    }

    fn get_previous_approved_reading(
        &self,
        meter_id: &str,
        apartment_id: &str,
        before_period: Period,
    ) -> Result<Option<MeterReading>> {
        Ok(self
            .readings
            .iter()
            .filter(|r| {
                r.meter_id == meter_id
                    && r.apartment_id == apartment_id
                    && r.period < before_period
                    && r.is_approved()
            })
            .max_by_key(|r| r.period)
            .cloned())
    }

    fn list_readings(&self, apartment_id: &str, period: Period) -> Result<Vec<MeterReading>> {
        Ok(self
            .readings
            .iter()
            .filter(|r| r.apartment_id == apartment_id && r.period == period)
            .cloned()
            .collect())
    }
}

impl ObligationProvider for MemoryRepository {
    fn list_obligations(&self, tenancy_id: &str) -> Result<Vec<Obligation>> {
        Ok(self.obligations.get(tenancy_id).cloned().unwrap_or_default())
    }
}

impl MoveOutProvider for MemoryRepository {
    fn get_move_out_record(&self, tenancy_id: &str) -> Result<Option<MoveOutRecord>> {
        Ok(self.move_outs.get(tenancy_id).cloned())
    }
}

impl PolicyProvider for MemoryRepository {
    fn get_deposit_policy(&self, tenancy_id: &str) -> Result<Option<DepositPolicy>> {
        Ok(self.policies.get(tenancy_id).copied())
    }
}
