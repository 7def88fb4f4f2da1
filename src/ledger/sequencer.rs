//! NSR (Número Sequencial de Registro) issuance.

use chrono::Utc;
use sqlx::{SqliteExecutor, SqlitePool};
use tracing::debug;

use crate::database::models::NsrSequence;
use crate::error::LedgerError;

#[derive(Clone)]
pub struct NsrSequencer {
    pool: SqlitePool,
}

impl NsrSequencer {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Issue the next NSR for a tenant in a transaction of its own.
    ///
    /// The increment and read happen in one statement, so a returned NSR is
    /// always durable and never handed out twice. Record creation issues its
    /// NSR with [`issue_nsr`] inside the record transaction instead.
    pub async fn next_nsr(&self, tenant_id: &str) -> Result<i64, LedgerError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| LedgerError::Sequence(format!("Failed to open transaction: {}", e)))?;

        let nsr = issue_nsr(&mut *tx, tenant_id).await?;

        tx.commit()
            .await
            .map_err(|e| LedgerError::Sequence(format!("Failed to commit NSR {}: {}", nsr, e)))?;

        debug!("Issued NSR {} for tenant {}", nsr, tenant_id);
        Ok(nsr)
    }

    /// Mark every NSR up to `nsr` as consumed.
    ///
    /// Used after a record transaction that issued `nsr` rolled back, so the
    /// number is not handed out again. Never moves the sequence backwards.
    pub async fn consume_through(&self, tenant_id: &str, nsr: i64) -> Result<(), LedgerError> {
        sqlx::query(
            r#"
            INSERT INTO nsr_sequences (tenant_id, current_nsr, last_updated)
            VALUES (?, ?, ?)
            ON CONFLICT (tenant_id) DO UPDATE SET
                current_nsr = MAX(nsr_sequences.current_nsr, excluded.current_nsr),
                last_updated = excluded.last_updated
            "#,
        )
        .bind(tenant_id)
        .bind(nsr)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(|e| {
            LedgerError::Sequence(format!("Failed to consume NSR {} for {}: {}", nsr, tenant_id, e))
        })?;
        Ok(())
    }

    pub async fn current(&self, tenant_id: &str) -> Result<Option<NsrSequence>, LedgerError> {
        let row: Option<(String, i64, chrono::DateTime<Utc>)> = sqlx::query_as(
            "SELECT tenant_id, current_nsr, last_updated FROM nsr_sequences WHERE tenant_id = ?",
        )
        .bind(tenant_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|(tenant_id, current_nsr, last_updated)| NsrSequence {
            tenant_id,
            current_nsr,
            last_updated,
        }))
    }
}

/// Create the tenant's sequence at 1 or bump it, returning the new value.
///
/// This is a write on the tenant's sequence row, so as the first statement of
/// a transaction it takes the SQLite write lock: the NSR and the chain tip read
/// after it are fixed under the same lock, across processes sharing the file.
/// The increment rolls back with the transaction.
pub async fn issue_nsr<'e, E>(executor: E, tenant_id: &str) -> Result<i64, LedgerError>
where
    E: SqliteExecutor<'e>,
{
    sqlx::query_scalar(
        r#"
        INSERT INTO nsr_sequences (tenant_id, current_nsr, last_updated)
        VALUES (?, 1, ?)
        ON CONFLICT (tenant_id) DO UPDATE SET
            current_nsr = nsr_sequences.current_nsr + 1,
            last_updated = excluded.last_updated
        RETURNING current_nsr
        "#,
    )
    .bind(tenant_id)
    .bind(Utc::now())
    .fetch_one(executor)
    .await
    .map_err(|e| LedgerError::Sequence(format!("Failed to issue NSR for {}: {}", tenant_id, e)))
}

/// Take the write lock on the tenant's sequence row inside an open transaction.
///
/// Run first in transactions that rewrite a tenant's records without issuing
/// an NSR.
pub async fn lock_sequence_row<'e, E>(executor: E, tenant_id: &str) -> Result<(), LedgerError>
where
    E: SqliteExecutor<'e>,
{
    sqlx::query("UPDATE nsr_sequences SET last_updated = last_updated WHERE tenant_id = ?")
        .bind(tenant_id)
        .execute(executor)
        .await
        .map_err(|e| LedgerError::Sequence(format!("Failed to lock sequence row: {}", e)))?;
    Ok(())
}
