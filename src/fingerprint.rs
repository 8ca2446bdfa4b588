//! Deterministic fingerprints of calculation results.
//!
//! Identical inputs yield identical results, so the fingerprint of a result can key a
//! cache or detect drift between a retried run and the first one.

use crate::billing::CommunalCalculation;
use crate::deposit::SettlementResult;
use crate::error::{Error, Result};
use crate::sha256_digest;
use serde::Serialize;

/// SHA256 hash of data, lowercase hex.
pub fn digest_hex(data: &[u8]) -> String {
    hex::encode(sha256_digest(data)).to_lowercase()
}

/// Canonical bytes (bincode) of any result value.
pub fn canonical_bytes<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    bincode::serialize(value)
        .map_err(|e| Error::InvalidInput(format!("Failed to encode value for fingerprint: {}", e)))
}

pub fn fingerprint<T: Serialize>(value: &T) -> Result<String> {
    Ok(digest_hex(&canonical_bytes(value)?))
}

impl CommunalCalculation {
    pub fn fingerprint(&self) -> Result<String> {
        fingerprint(self)
    }
}

impl SettlementResult {
    pub fn fingerprint(&self) -> Result<String> {
        fingerprint(self)
    }
}
