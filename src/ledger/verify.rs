//! Chain verification and rebuild planning.
//!
//! Both walk a tenant's records in NSR order and only carry the previous hash
//! from one record to the next, so callers can feed them page by page.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::database::models::TimecardEntry;
use crate::error::LedgerError;
use crate::ledger::chain::recompute_stored_hash;

/// Result of walking a chain. A non-empty `errors` list means the chain is
/// compromised.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntegrityCheck {
    pub is_valid: bool,
    pub errors: Vec<String>,
    pub records_checked: u64,
}

pub fn broken_link_message(nsr: i64) -> String {
    format!("NSR {}: Hash anterior inválido", nsr)
}

pub fn altered_record_message(nsr: i64) -> String {
    format!("NSR {}: Hash do registro foi alterado", nsr)
}

#[derive(Debug, Default)]
pub struct ChainWalker {
    previous_hash: Option<String>,
    errors: Vec<String>,
    records_checked: u64,
}

impl ChainWalker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check one record against the chain so far.
    ///
    /// The stored `record_hash` always becomes the next reference point, so a
    /// single altered record yields one error instead of one per later record.
    pub fn check(&mut self, entry: &TimecardEntry) -> Result<(), LedgerError> {
        self.records_checked += 1;

        if entry.previous_record_hash != self.previous_hash {
            self.errors.push(broken_link_message(entry.nsr));
        }

        let expected = recompute_stored_hash(entry, entry.previous_record_hash.as_deref())?;
        if expected != entry.record_hash {
            self.errors.push(altered_record_message(entry.nsr));
        }

        self.previous_hash = Some(entry.record_hash.clone());
        Ok(())
    }

    pub fn finish(self) -> IntegrityCheck {
        if !self.errors.is_empty() {
            warn!(
                "Chain verification found {} error(s) across {} record(s)",
                self.errors.len(),
                self.records_checked
            );
        }

        IntegrityCheck {
            is_valid: self.errors.is_empty(),
            errors: self.errors,
            records_checked: self.records_checked,
        }
    }
}

/// Hash fields a rebuild rewrites on one record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HashCorrection {
    pub entry_id: String,
    pub nsr: i64,
    pub old_record_hash: String,
    pub old_previous_hash: Option<String>,
    pub new_record_hash: String,
    pub new_previous_hash: Option<String>,
}

/// Recomputes the chain from stored field values, emitting a correction for
/// every record whose stored hashes differ from the rebuilt ones.
#[derive(Debug, Default)]
pub struct RebuildPlanner {
    rebuilt_previous: Option<String>,
}

impl RebuildPlanner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn plan(&mut self, entry: &TimecardEntry) -> Result<Option<HashCorrection>, LedgerError> {
        let expected_previous = self.rebuilt_previous.clone();
        let expected_hash = recompute_stored_hash(entry, expected_previous.as_deref())?;
        self.rebuilt_previous = Some(expected_hash.clone());

        if entry.previous_record_hash == expected_previous && entry.record_hash == expected_hash {
            return Ok(None);
        }

        Ok(Some(HashCorrection {
            entry_id: entry.id.clone(),
            nsr: entry.nsr,
            old_record_hash: entry.record_hash.clone(),
            old_previous_hash: entry.previous_record_hash.clone(),
            new_record_hash: expected_hash,
            new_previous_hash: expected_previous,
        }))
    }
}
