//! Backup metadata and verification.
//!
//! Backup files are produced by an external job; this module records their
//! metadata and checks that a file on disk still matches its recorded hash.

use chrono::{NaiveDate, Utc};
use sha2::{Digest, Sha256};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use std::path::Path;
use tracing::{info, warn};
use uuid::Uuid;

use crate::database::models::TimecardBackup;
use crate::error::LedgerError;

const BACKUP_COLUMNS: &str = "id, tenant_id, backup_date, backup_path, file_size, record_count, \
     backup_hash, is_verified, verification_date, created_at";

#[derive(Clone)]
pub struct BackupVerifier {
    pool: SqlitePool,
}

impl BackupVerifier {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn list_backups(&self, tenant_id: &str) -> Result<Vec<TimecardBackup>, LedgerError> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM timecard_backups WHERE tenant_id = ? ORDER BY backup_date DESC",
            BACKUP_COLUMNS
        ))
        .bind(tenant_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(backup_from_row).collect()
    }

    pub async fn get_backup(
        &self,
        tenant_id: &str,
        backup_date: NaiveDate,
    ) -> Result<Option<TimecardBackup>, LedgerError> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM timecard_backups WHERE tenant_id = ? AND backup_date = ?",
            BACKUP_COLUMNS
        ))
        .bind(tenant_id)
        .bind(backup_date)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(backup_from_row).transpose()
    }

    /// Record a backup file that already exists on disk, hashing it now.
    pub async fn register_backup(
        &self,
        tenant_id: &str,
        backup_date: NaiveDate,
        backup_path: &Path,
        record_count: i64,
    ) -> Result<TimecardBackup, LedgerError> {
        let (file_size, backup_hash) = hash_file(backup_path).await?;

        let backup = TimecardBackup {
            id: Uuid::new_v4().to_string(),
            tenant_id: tenant_id.to_string(),
            backup_date,
            backup_path: backup_path.to_string_lossy().into_owned(),
            file_size,
            record_count,
            backup_hash,
            is_verified: false,
            verification_date: None,
            created_at: Utc::now(),
        };

        sqlx::query(&format!(
            "INSERT INTO timecard_backups ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            BACKUP_COLUMNS
        ))
        .bind(&backup.id)
        .bind(&backup.tenant_id)
        .bind(backup.backup_date)
        .bind(&backup.backup_path)
        .bind(backup.file_size)
        .bind(backup.record_count)
        .bind(&backup.backup_hash)
        .bind(backup.is_verified)
        .bind(backup.verification_date)
        .bind(backup.created_at)
        .execute(&self.pool)
        .await?;

        info!(
            "Registered backup for tenant {} on {}: {} bytes",
            tenant_id, backup_date, backup.file_size
        );
        Ok(backup)
    }

    /// Re-hash the backup file for `backup_date` and compare it with the
    /// recorded hash. A missing or unreadable file verifies as `false`.
    pub async fn verify_backup(
        &self,
        tenant_id: &str,
        backup_date: NaiveDate,
    ) -> Result<bool, LedgerError> {
        let backup = self
            .get_backup(tenant_id, backup_date)
            .await?
            .ok_or_else(|| {
                LedgerError::NotFound(format!(
                    "No backup for tenant {} on {}",
                    tenant_id, backup_date
                ))
            })?;

        let verified = match hash_file(Path::new(&backup.backup_path)).await {
            Ok((_, hash)) => hash == backup.backup_hash,
            Err(e) => {
                warn!("Backup {} could not be read: {}", backup.id, e);
                false
            }
        };

        sqlx::query(
            "UPDATE timecard_backups SET is_verified = ?, verification_date = ? WHERE id = ?",
        )
        .bind(verified)
        .bind(Utc::now())
        .bind(&backup.id)
        .execute(&self.pool)
        .await?;

        if verified {
            info!("Backup {} for tenant {} verified", backup.id, tenant_id);
        } else {
            warn!("Backup {} for tenant {} failed verification", backup.id, tenant_id);
        }
        Ok(verified)
    }
}

async fn hash_file(path: &Path) -> Result<(i64, String), LedgerError> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| LedgerError::Backup(format!("Failed to read {}: {}", path.display(), e)))?;
    Ok((bytes.len() as i64, hex::encode(Sha256::digest(&bytes))))
}

fn backup_from_row(row: &SqliteRow) -> Result<TimecardBackup, LedgerError> {
    Ok(TimecardBackup {
        id: row.try_get("id")?,
        tenant_id: row.try_get("tenant_id")?,
        backup_date: row.try_get("backup_date")?,
        backup_path: row.try_get("backup_path")?,
        file_size: row.try_get("file_size")?,
        record_count: row.try_get("record_count")?,
        backup_hash: row.try_get("backup_hash")?,
        is_verified: row.try_get("is_verified")?,
        verification_date: row.try_get("verification_date")?,
        created_at: row.try_get("created_at")?,
    })
}
