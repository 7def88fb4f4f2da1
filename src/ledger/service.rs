//! Integrity ledger orchestration.
//!
//! Ties the sequencer, chain builder, signer and auditor together. Writers of
//! a tenant (record creation, rebuild) are serialized by a per-tenant lock and
//! by writing the tenant's sequence row first in their transaction, which takes
//! the SQLite write lock before the chain tip is read. Verification takes no
//! lock.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::{SqliteConnection, SqlitePool};
use std::str::FromStr;
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::audit::{ActionContext, AuditAction, AuditLogger};
use crate::crypto::{KeyStore, RecordSigner};
use crate::database::models::{EntryStatus, NewTimecardEntry, TimecardEntry};
use crate::database::queries::Queries;
use crate::error::LedgerError;
use crate::ledger::chain::{self, HashInput};
use crate::ledger::locks::TenantLocks;
use crate::ledger::sequencer::{issue_nsr, lock_sequence_row, NsrSequencer};
use crate::ledger::state::{ChainState, ChainStates};
use crate::ledger::verify::{ChainWalker, HashCorrection, IntegrityCheck, RebuildPlanner};

pub const DEFAULT_PAGE_SIZE: i64 = 500;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedEntry {
    pub id: String,
    pub nsr: i64,
    pub record_hash: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RebuildOutcome {
    pub fixed: u64,
    pub errors: Vec<String>,
}

struct AttachedSignature {
    signature: String,
    signed_at: DateTime<Utc>,
    signed_by: String,
}

#[derive(Clone)]
pub struct IntegrityLedger {
    pool: SqlitePool,
    sequencer: NsrSequencer,
    audit: AuditLogger,
    signer: Arc<dyn RecordSigner>,
    locks: TenantLocks,
    states: ChainStates,
    page_size: i64,
}

impl IntegrityLedger {
    pub fn new(pool: SqlitePool, signer: Arc<dyn RecordSigner>) -> Self {
        Self {
            sequencer: NsrSequencer::new(pool.clone()),
            audit: AuditLogger::new(pool.clone()),
            pool,
            signer,
            locks: TenantLocks::new(),
            states: ChainStates::default(),
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    pub fn with_page_size(mut self, page_size: i64) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn audit(&self) -> &AuditLogger {
        &self.audit
    }

    pub fn page_size(&self) -> i64 {
        self.page_size
    }

    pub async fn chain_state(&self, tenant_id: &str) -> ChainState {
        self.states.get(tenant_id).await
    }

    /// Append a new record to the tenant's chain.
    ///
    /// The NSR is issued by the first statement of the record transaction, so
    /// issuance, the chain tip read and the insert all happen under one SQLite
    /// write lock. If anything after issuance fails the transaction is rolled
    /// back, the NSR is marked consumed and the error is returned; the gap is
    /// left for reconciliation.
    pub async fn create_entry(
        &self,
        data: NewTimecardEntry,
        context: &ActionContext,
    ) -> Result<CreatedEntry, LedgerError> {
        validate_new_entry(&data)?;
        let tenant_id = data.tenant_id.as_str();

        let _guard = self.locks.acquire(tenant_id).await;
        let mut tx = self.pool.begin().await?;
        let nsr = issue_nsr(&mut *tx, tenant_id).await?;

        let appended = self.append_record(&mut *tx, &data, nsr, context).await;
        let result = match appended {
            Ok(created) => tx.commit().await.map(|_| created).map_err(LedgerError::from),
            Err(e) => {
                if let Err(rollback) = tx.rollback().await {
                    warn!("Rollback of NSR {} for tenant {} failed: {}", nsr, tenant_id, rollback);
                }
                Err(e)
            }
        };

        match result {
            Ok(created) => {
                info!(
                    "Recorded timecard entry {} as NSR {} for tenant {}",
                    created.id, created.nsr, tenant_id
                );
                Ok(created)
            }
            Err(e) => {
                error!(
                    "NSR {} for tenant {} consumed without a record: {}",
                    nsr, tenant_id, e
                );
                if let Err(consume) = self.sequencer.consume_through(tenant_id, nsr).await {
                    error!(
                        "Could not mark NSR {} consumed for tenant {}: {}",
                        nsr, tenant_id, consume
                    );
                }
                Err(e)
            }
        }
    }

    async fn append_record(
        &self,
        conn: &mut SqliteConnection,
        data: &NewTimecardEntry,
        nsr: i64,
        context: &ActionContext,
    ) -> Result<CreatedEntry, LedgerError> {
        let tenant_id = data.tenant_id.as_str();
        let previous_hash = chain::last_hash(&mut *conn, tenant_id).await?;
        let id = Uuid::new_v4().to_string();
        let generated_at = Utc::now();
        let record_hash = chain::compute_hash(
            &HashInput::from_new(&id, data),
            nsr,
            previous_hash.as_deref(),
            generated_at,
        )?;

        let signature = self.try_sign(&mut *conn, tenant_id, &record_hash).await?;

        let entry = TimecardEntry {
            id: id.clone(),
            tenant_id: data.tenant_id.clone(),
            user_id: data.user_id.clone(),
            check_in: data.check_in,
            check_out: data.check_out,
            break_start: data.break_start,
            break_end: data.break_end,
            total_hours: data.total_hours.clone(),
            notes: data.notes.clone(),
            location: data.location.clone(),
            is_manual_entry: data.is_manual_entry,
            device_info: data.device_info.clone(),
            ip_address: data.ip_address.clone(),
            geo_location: data.geo_location.clone(),
            status: EntryStatus::Pending,
            nsr,
            record_hash: record_hash.clone(),
            previous_record_hash: previous_hash,
            original_record_hash: record_hash.clone(),
            hash_generated_at: generated_at,
            digital_signature: signature.as_ref().map(|s| s.signature.clone()),
            signature_timestamp: signature.as_ref().map(|s| s.signed_at),
            signed_by: signature.map(|s| s.signed_by),
            created_at: generated_at,
            updated_at: generated_at,
        };

        Queries::insert_entry(&mut *conn, &entry).await?;

        let snapshot = serde_json::to_value(&entry)?;
        self.audit
            .log_action(
                &mut *conn,
                tenant_id,
                &id,
                nsr,
                AuditAction::Create,
                context,
                None,
                Some(snapshot),
            )
            .await?;

        Ok(CreatedEntry {
            id,
            nsr,
            record_hash,
        })
    }

    /// Best-effort signature. No usable key, or a signer failure, leaves the
    /// record unsigned.
    async fn try_sign(
        &self,
        conn: &mut SqliteConnection,
        tenant_id: &str,
        record_hash: &str,
    ) -> Result<Option<AttachedSignature>, LedgerError> {
        let signed_at = Utc::now();
        let Some(key) = KeyStore::usable_key(&mut *conn, tenant_id, signed_at).await? else {
            warn!("No usable signing key for tenant {}; record left unsigned", tenant_id);
            return Ok(None);
        };

        match self.signer.sign(record_hash, &key, signed_at) {
            Ok(signature) => Ok(Some(AttachedSignature {
                signature,
                signed_at,
                signed_by: key.key_name,
            })),
            Err(e) => {
                warn!(
                    "Signing with key {} failed for tenant {}; record left unsigned: {}",
                    key.key_name, tenant_id, e
                );
                Ok(None)
            }
        }
    }

    /// Walk the tenant's chain in NSR order. Integrity failures are returned as
    /// data; only storage or computation failures are errors.
    pub async fn verify_integrity_chain(
        &self,
        tenant_id: &str,
    ) -> Result<IntegrityCheck, LedgerError> {
        self.states.transition(tenant_id, ChainState::Verifying).await;

        match self.walk_chain(tenant_id).await {
            Ok(check) => {
                let outcome = if check.is_valid {
                    ChainState::Valid
                } else {
                    warn!(
                        "Integrity chain for tenant {} is compromised: {} error(s)",
                        tenant_id,
                        check.errors.len()
                    );
                    ChainState::Invalid
                };
                self.states
                    .settle(tenant_id, ChainState::Verifying, outcome)
                    .await;
                Ok(check)
            }
            Err(e) => {
                self.states
                    .settle(tenant_id, ChainState::Verifying, ChainState::Unverified)
                    .await;
                Err(e)
            }
        }
    }

    async fn walk_chain(&self, tenant_id: &str) -> Result<IntegrityCheck, LedgerError> {
        let mut walker = ChainWalker::new();
        let mut after_nsr = 0;

        loop {
            let page =
                Queries::entries_after_nsr(&self.pool, tenant_id, after_nsr, self.page_size).await?;
            for entry in &page {
                walker.check(entry)?;
                after_nsr = entry.nsr;
            }
            if (page.len() as i64) < self.page_size {
                break;
            }
        }

        Ok(walker.finish())
    }

    /// Recompute and rewrite the tenant's chain from the first record forward.
    ///
    /// Runs under the tenant lock in a single transaction. Every rewritten
    /// record gets a REBUILD audit entry with its old and new hashes. If any
    /// correction cannot be written the whole rebuild is rolled back and
    /// reported with `fixed == 0`.
    pub async fn rebuild_integrity_chain(
        &self,
        tenant_id: &str,
        context: &ActionContext,
    ) -> Result<RebuildOutcome, LedgerError> {
        let _guard = self.locks.acquire(tenant_id).await;
        self.states.transition(tenant_id, ChainState::Rebuilding).await;

        let result = self.rebuild_locked(tenant_id, context).await;
        let outcome = match &result {
            Ok(outcome) if outcome.errors.is_empty() => ChainState::Rebuilt,
            _ => ChainState::Invalid,
        };
        self.states
            .settle(tenant_id, ChainState::Rebuilding, outcome)
            .await;
        result
    }

    async fn rebuild_locked(
        &self,
        tenant_id: &str,
        context: &ActionContext,
    ) -> Result<RebuildOutcome, LedgerError> {
        let mut tx = self.pool.begin().await?;
        lock_sequence_row(&mut *tx, tenant_id).await?;

        let mut planner = RebuildPlanner::new();
        let mut after_nsr = 0;
        let mut fixed = 0;
        let mut errors = Vec::new();

        loop {
            let page =
                Queries::entries_after_nsr(&mut *tx, tenant_id, after_nsr, self.page_size).await?;
            for entry in &page {
                after_nsr = entry.nsr;
                let Some(correction) = planner.plan(entry)? else {
                    continue;
                };

                match self
                    .apply_correction(&mut *tx, tenant_id, &correction, context)
                    .await
                {
                    Ok(()) => {
                        fixed += 1;
                        info!(
                            "Rebuilt NSR {} for tenant {}: {} -> {}",
                            correction.nsr,
                            tenant_id,
                            correction.old_record_hash,
                            correction.new_record_hash
                        );
                    }
                    Err(e) => errors.push(format!("NSR {}: {}", correction.nsr, e)),
                }
            }
            if (page.len() as i64) < self.page_size {
                break;
            }
        }

        if !errors.is_empty() {
            tx.rollback().await?;
            warn!(
                "Rebuild for tenant {} rolled back after {} error(s)",
                tenant_id,
                errors.len()
            );
            return Ok(RebuildOutcome { fixed: 0, errors });
        }

        tx.commit().await?;
        info!("Rebuild for tenant {} fixed {} record(s)", tenant_id, fixed);
        Ok(RebuildOutcome { fixed, errors })
    }

    async fn apply_correction(
        &self,
        conn: &mut SqliteConnection,
        tenant_id: &str,
        correction: &HashCorrection,
        context: &ActionContext,
    ) -> Result<(), LedgerError> {
        Queries::update_entry_hashes(
            &mut *conn,
            tenant_id,
            &correction.entry_id,
            &correction.new_record_hash,
            correction.new_previous_hash.as_deref(),
        )
        .await?;

        let mut context = context.clone();
        if context.reason.is_none() {
            context.reason = Some("Integrity chain rebuild".to_string());
        }

        self.audit
            .log_action(
                &mut *conn,
                tenant_id,
                &correction.entry_id,
                correction.nsr,
                AuditAction::Rebuild,
                &context,
                Some(json!({
                    "recordHash": correction.old_record_hash,
                    "previousRecordHash": correction.old_previous_hash,
                })),
                Some(json!({
                    "recordHash": correction.new_record_hash,
                    "previousRecordHash": correction.new_previous_hash,
                })),
            )
            .await?;
        Ok(())
    }

    pub async fn approve_entry(
        &self,
        tenant_id: &str,
        entry_id: &str,
        context: &ActionContext,
    ) -> Result<TimecardEntry, LedgerError> {
        self.decide(tenant_id, entry_id, EntryStatus::Approved, AuditAction::Approve, context)
            .await
    }

    pub async fn reject_entry(
        &self,
        tenant_id: &str,
        entry_id: &str,
        context: &ActionContext,
    ) -> Result<TimecardEntry, LedgerError> {
        self.decide(tenant_id, entry_id, EntryStatus::Rejected, AuditAction::Reject, context)
            .await
    }

    /// Move a pending entry to a final status. Status is not part of the chain
    /// hash, so this never touches the hash fields.
    async fn decide(
        &self,
        tenant_id: &str,
        entry_id: &str,
        status: EntryStatus,
        action: AuditAction,
        context: &ActionContext,
    ) -> Result<TimecardEntry, LedgerError> {
        let mut tx = self.pool.begin().await?;
        lock_sequence_row(&mut *tx, tenant_id).await?;

        let mut entry = Queries::get_entry(&mut *tx, tenant_id, entry_id)
            .await?
            .ok_or_else(|| LedgerError::entry_not_found(entry_id))?;

        if entry.status != EntryStatus::Pending {
            return Err(LedgerError::Validation(format!(
                "Entry {} is already {}",
                entry_id,
                entry.status.as_str()
            )));
        }

        Queries::update_entry_status(&mut *tx, tenant_id, entry_id, status).await?;

        self.audit
            .log_action(
                &mut *tx,
                tenant_id,
                entry_id,
                entry.nsr,
                action,
                context,
                Some(json!({ "status": entry.status.as_str() })),
                Some(json!({ "status": status.as_str() })),
            )
            .await?;

        tx.commit().await?;

        entry.status = status;
        info!(
            "Entry {} (NSR {}) {} by {}",
            entry_id,
            entry.nsr,
            status.as_str(),
            context.performed_by
        );
        Ok(entry)
    }

    pub async fn get_entry(
        &self,
        tenant_id: &str,
        entry_id: &str,
    ) -> Result<TimecardEntry, LedgerError> {
        Queries::get_entry(&self.pool, tenant_id, entry_id)
            .await?
            .ok_or_else(|| LedgerError::entry_not_found(entry_id))
    }

    pub async fn list_entries(
        &self,
        tenant_id: &str,
        user_id: Option<&str>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<TimecardEntry>, LedgerError> {
        Queries::list_entries(&self.pool, tenant_id, user_id, limit.max(1), offset.max(0)).await
    }
}

/// Reject submissions that could not form a meaningful record.
pub fn validate_new_entry(data: &NewTimecardEntry) -> Result<(), LedgerError> {
    if data.tenant_id.trim().is_empty() {
        return Err(LedgerError::Validation("tenantId is required".to_string()));
    }
    if data.user_id.trim().is_empty() {
        return Err(LedgerError::Validation("userId is required".to_string()));
    }

    if let Some(total) = &data.total_hours {
        let hours = Decimal::from_str(total.trim()).map_err(|_| {
            LedgerError::Validation(format!("totalHours is not a decimal: {}", total))
        })?;
        if hours < Decimal::ZERO {
            return Err(LedgerError::Validation(format!(
                "totalHours cannot be negative: {}",
                total
            )));
        }
    }

    if let (Some(check_in), Some(check_out)) = (data.check_in, data.check_out) {
        if check_out < check_in {
            return Err(LedgerError::Validation(
                "checkOut cannot be before checkIn".to_string(),
            ));
        }
    }

    if let (Some(start), Some(end)) = (data.break_start, data.break_end) {
        if end < start {
            return Err(LedgerError::Validation(
                "breakEnd cannot be before breakStart".to_string(),
            ));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn entry(total: &str) -> NewTimecardEntry {
        NewTimecardEntry {
            tenant_id: "tenant-a".to_string(),
            user_id: "user-1".to_string(),
            total_hours: Some(total.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_validate_accepts_decimal_hours() {
        assert!(validate_new_entry(&entry("8.25")).is_ok());
        assert!(validate_new_entry(&entry("0")).is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_hours() {
        assert!(matches!(
            validate_new_entry(&entry("eight")),
            Err(LedgerError::Validation(_))
        ));
        assert!(matches!(
            validate_new_entry(&entry("-1.5")),
            Err(LedgerError::Validation(_))
        ));
    }

    #[test]
    fn test_validate_requires_identity() {
        let mut data = entry("8.00");
        data.user_id = " ".to_string();
        assert!(validate_new_entry(&data).is_err());
    }

    #[test]
    fn test_validate_time_order() {
        let now = Utc::now();
        let mut data = entry("8.00");
        data.check_in = Some(now);
        data.check_out = Some(now - Duration::hours(1));
        assert!(validate_new_entry(&data).is_err());

        data.check_out = Some(now + Duration::hours(8));
        data.break_start = Some(now + Duration::hours(4));
        data.break_end = Some(now + Duration::hours(3));
        assert!(validate_new_entry(&data).is_err());
    }
}
