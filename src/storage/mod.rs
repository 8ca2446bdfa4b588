pub mod kv;
pub mod memory;

pub use kv::FileStorage;
pub use memory::MemoryRepository;

use crate::catalog::MeterCatalog;
use crate::deposit::{DepositPolicy, MoveOutRecord, Obligation};
use crate::error::Result;
use crate::period::Period;
use crate::reading::MeterReading;

/// Catalog lookup by property address.
pub trait CatalogProvider {
    /// `None` when no catalog is configured for the address.
    fn get_catalog(&self, address_id: &str) -> Result<Option<MeterCatalog>>;
}

/// Reading store adapter.
///
/// Implementations own the `(meter_id, apartment_id, period)` uniqueness invariant.
/// Lookups are the only blocking operations in a calculation; callers perform them
/// before invoking the pure calculators.
pub trait ReadingProvider {
    /// Approved reading for exactly this period
    fn get_approved_reading(
        &self,
        meter_id: &str,
        apartment_id: &str,
        period: Period,
    ) -> Result<Option<MeterReading>>;

    /// Latest approved reading strictly before `before_period`
    fn get_previous_approved_reading(
        &self,
        meter_id: &str,
        apartment_id: &str,
        before_period: Period,
    ) -> Result<Option<MeterReading>>;

    /// Every reading submitted for the apartment in the period, any status
    fn list_readings(&self, apartment_id: &str, period: Period) -> Result<Vec<MeterReading>>;
}

pub trait ObligationProvider {
    fn list_obligations(&self, tenancy_id: &str) -> Result<Vec<Obligation>>;
}

pub trait MoveOutProvider {
    fn get_move_out_record(&self, tenancy_id: &str) -> Result<Option<MoveOutRecord>>;
}

pub trait PolicyProvider {
    fn get_deposit_policy(&self, tenancy_id: &str) -> Result<Option<DepositPolicy>>;
}

/// Everything the orchestrator reads from the outside world.
pub trait Repository:
    CatalogProvider + ReadingProvider + ObligationProvider + MoveOutProvider + PolicyProvider
{
}

impl<T> Repository for T where
    T: CatalogProvider + ReadingProvider + ObligationProvider + MoveOutProvider + PolicyProvider
{
}

/// Durable snapshot storage for a [`MemoryRepository`].
///
/// Implementations must write snapshots atomically (crash leaves the old or the new
/// snapshot, never a torn one).
pub trait SnapshotStore {
    /// `None` if no snapshot has been written yet.
    fn load_snapshot(&self) -> Result<Option<MemoryRepository>>;

    fn persist_snapshot(&mut self, repo: &MemoryRepository) -> Result<()>;
}
