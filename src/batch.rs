//! Parallel batch runs. Every calculation is independent, so work is split into
//! contiguous chunks over scoped threads and results come back in input order.

use crate::billing::CommunalCalculation;
use crate::deposit::SettlementResult;
use crate::error::Result;
use crate::orchestrator::{SettlementOrchestrator, Tenancy};
use crate::period::Period;
use crate::storage::Repository;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// One (apartment, period) bill to compute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillingJob {
    pub address_id: String,
    pub apartment_id: String,
    pub period: Period,
    pub apartment_area: Decimal,
    pub total_building_area: Option<Decimal>,
}

impl BillingJob {
    /// Bill for the tenancy's apartment in `period`.
    pub fn for_tenancy(tenancy: &Tenancy, period: Period) -> Self {
        BillingJob {
            address_id: tenancy.address_id.clone(),
            apartment_id: tenancy.apartment_id.clone(),
            period,
            apartment_area: tenancy.apartment_area,
            total_building_area: tenancy.total_building_area,
        }
    }
}

/// Map `f` over `items` on up to `workers` threads, preserving order.
pub fn run_parallel<T, O, F>(items: &[T], workers: usize, f: F) -> Vec<O>
where
    T: Sync,
    O: Send,
    F: Fn(&T) -> O + Sync,
{
    if items.is_empty() {
        return Vec::new();
    }
    let workers = workers.clamp(1, items.len());
    if workers == 1 {
        return items.iter().map(&f).collect();
    }
    let chunk = items.len().div_ceil(workers);
    let f = &f;

    std::thread::scope(|scope| {
        let handles: Vec<_> = items
            .chunks(chunk)
            .map(|part| scope.spawn(move || part.iter().map(f).collect::<Vec<O>>()))
            .collect();
        handles
            .into_iter()
            .flat_map(|h| match h.join() {
                Ok(out) => out,
                Err(panic) => std::panic::resume_unwind(panic),
            })
            .collect()
    })
}

/// Compute many bills concurrently.
pub fn bill_all<R>(
    orchestrator: &SettlementOrchestrator<'_, R>,
    jobs: &[BillingJob],
    workers: usize,
) -> Vec<Result<CommunalCalculation>>
where
    R: Repository + Sync + ?Sized,
{
    debug!(jobs = jobs.len(), workers, "billing batch");
    run_parallel(jobs, workers, |job| {
        orchestrator.bill(
            &job.address_id,
            &job.apartment_id,
            job.period,
            job.apartment_area,
            job.total_building_area,
        )
    })
}

/// Settle many tenancies concurrently.
pub fn settle_all<R>(
    orchestrator: &SettlementOrchestrator<'_, R>,
    tenancies: &[Tenancy],
    today: NaiveDate,
    workers: usize,
) -> Vec<Result<SettlementResult>>
where
    R: Repository + Sync + ?Sized,
{
    debug!(tenancies = tenancies.len(), workers, "settlement batch");
    run_parallel(tenancies, workers, |t| orchestrator.settle(t, today))
}
