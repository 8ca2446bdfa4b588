pub mod batch;
pub mod billing;
pub mod catalog;
pub mod completeness;
pub mod config;
pub mod deposit;
pub mod error;
pub mod fingerprint;
pub mod logger;
pub mod money;
pub mod orchestrator;
pub mod period;
pub mod reading;
pub mod storage;

pub use billing::{calculate, ChargeLine, CommunalCalculation};
pub use completeness::{check, CompletenessReport};
pub use deposit::{settle, Decision, DepositPolicy, SettlementResult};
pub use orchestrator::{SettlementOrchestrator, Tenancy};
pub use period::Period;

use sha2::{Digest, Sha256};

/// Calculate SHA256 digest
pub fn sha256_digest(data: &[u8]) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().to_vec()
}

/// Today's date in UTC, for callers that settle "as of now".
pub fn today_utc() -> chrono::NaiveDate {
    chrono::Utc::now().date_naive()
}
