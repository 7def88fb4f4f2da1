//! Audit Logger
//!
//! Append-only persistence of audit entries, plus filtered, paginated reads
//! for the compliance audit-log listing.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteExecutor, SqlitePool};
use tracing::debug;

use crate::audit::entry::{ActionContext, AuditAction, AuditLogEntry};
use crate::database::queries::{json_column, json_text};
use crate::error::LedgerError;

const AUDIT_COLUMNS: &str = "id, tenant_id, timecard_entry_id, nsr, action, performed_by, \
     performed_at, old_values, new_values, reason, ip_address, user_agent, device_info, \
     audit_hash, is_system_generated";

/// Filters for the audit-log listing. All bounds are inclusive.
#[derive(Debug, Clone, Default)]
pub struct AuditLogFilter {
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub performed_by: Option<String>,
    pub action: Option<AuditAction>,
    pub page: i64,
    pub limit: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditLogPage {
    pub entries: Vec<AuditLogEntry>,
    pub page: i64,
    pub limit: i64,
    pub total: i64,
}

#[derive(Clone)]
pub struct AuditLogger {
    pool: SqlitePool,
}

impl AuditLogger {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Build, hash and persist one audit entry through `executor`, so it can
    /// share the transaction of the mutation it records.
    ///
    /// Any failure is an [`LedgerError::AuditLogFailure`]: an unaudited
    /// mutation must not go through.
    #[allow(clippy::too_many_arguments)]
    pub async fn log_action<'e, E>(
        &self,
        executor: E,
        tenant_id: &str,
        entry_id: &str,
        nsr: i64,
        action: AuditAction,
        context: &ActionContext,
        old_values: Option<Value>,
        new_values: Option<Value>,
    ) -> Result<AuditLogEntry, LedgerError>
    where
        E: SqliteExecutor<'e>,
    {
        let entry = AuditLogEntry::new(
            tenant_id,
            entry_id,
            nsr,
            action,
            context,
            old_values,
            new_values,
            action == AuditAction::Rebuild,
        );

        self.append_entry(executor, entry).await
    }

    pub async fn append_entry<'e, E>(
        &self,
        executor: E,
        mut entry: AuditLogEntry,
    ) -> Result<AuditLogEntry, LedgerError>
    where
        E: SqliteExecutor<'e>,
    {
        if !entry.verify_hash() {
            return Err(LedgerError::AuditLogFailure(format!(
                "Refusing to append entry with invalid hash: {}",
                entry.summary()
            )));
        }

        let result = sqlx::query(
            r#"
            INSERT INTO timecard_audit_log
            (tenant_id, timecard_entry_id, nsr, action, performed_by, performed_at,
             old_values, new_values, reason, ip_address, user_agent, device_info,
             audit_hash, is_system_generated)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&entry.tenant_id)
        .bind(&entry.timecard_entry_id)
        .bind(entry.nsr)
        .bind(entry.action.as_str())
        .bind(&entry.performed_by)
        .bind(entry.performed_at)
        .bind(json_text(&entry.old_values).map_err(LedgerError::audit)?)
        .bind(json_text(&entry.new_values).map_err(LedgerError::audit)?)
        .bind(&entry.reason)
        .bind(&entry.ip_address)
        .bind(&entry.user_agent)
        .bind(json_text(&entry.device_info).map_err(LedgerError::audit)?)
        .bind(&entry.audit_hash)
        .bind(entry.is_system_generated)
        .execute(executor)
        .await
        .map_err(|e| LedgerError::AuditLogFailure(format!("Failed to write audit entry: {}", e)))?;

        entry.id = Some(result.last_insert_rowid());
        debug!("Appended audit entry: {}", entry.summary());
        Ok(entry)
    }

    pub async fn list(
        &self,
        tenant_id: &str,
        filter: &AuditLogFilter,
    ) -> Result<AuditLogPage, LedgerError> {
        let page = filter.page.max(1);
        let limit = filter.limit.max(1);
        let action = filter.action.map(|a| a.as_str());

        const WHERE: &str = r#"
            WHERE tenant_id = ?
              AND (? IS NULL OR performed_at >= ?)
              AND (? IS NULL OR performed_at <= ?)
              AND (? IS NULL OR performed_by = ?)
              AND (? IS NULL OR action = ?)
        "#;

        let total: i64 = sqlx::query_scalar(&format!(
            "SELECT COUNT(*) FROM timecard_audit_log {}",
            WHERE
        ))
        .bind(tenant_id)
        .bind(filter.start_date)
        .bind(filter.start_date)
        .bind(filter.end_date)
        .bind(filter.end_date)
        .bind(&filter.performed_by)
        .bind(&filter.performed_by)
        .bind(action)
        .bind(action)
        .fetch_one(&self.pool)
        .await?;

        let rows = sqlx::query(&format!(
            "SELECT {} FROM timecard_audit_log {} \
             ORDER BY performed_at DESC, id DESC LIMIT ? OFFSET ?",
            AUDIT_COLUMNS, WHERE
        ))
        .bind(tenant_id)
        .bind(filter.start_date)
        .bind(filter.start_date)
        .bind(filter.end_date)
        .bind(filter.end_date)
        .bind(&filter.performed_by)
        .bind(&filter.performed_by)
        .bind(action)
        .bind(action)
        .bind(limit)
        .bind((page - 1) * limit)
        .fetch_all(&self.pool)
        .await?;

        let entries = rows
            .iter()
            .map(audit_entry_from_row)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(AuditLogPage {
            entries,
            page,
            limit,
            total,
        })
    }

    /// All audit entries recorded against one timecard entry, oldest first.
    pub async fn entries_for(
        &self,
        tenant_id: &str,
        entry_id: &str,
    ) -> Result<Vec<AuditLogEntry>, LedgerError> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM timecard_audit_log \
             WHERE tenant_id = ? AND timecard_entry_id = ? ORDER BY id ASC",
            AUDIT_COLUMNS
        ))
        .bind(tenant_id)
        .bind(entry_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(audit_entry_from_row).collect()
    }

    /// Ids of a tenant's audit entries whose stored hash no longer matches.
    pub async fn find_tampered_entries(&self, tenant_id: &str) -> Result<Vec<i64>, LedgerError> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM timecard_audit_log WHERE tenant_id = ? ORDER BY id ASC",
            AUDIT_COLUMNS
        ))
        .bind(tenant_id)
        .fetch_all(&self.pool)
        .await?;

        let mut tampered = Vec::new();
        for row in &rows {
            let entry = audit_entry_from_row(row)?;
            if !entry.verify_hash() {
                tampered.extend(entry.id);
            }
        }
        Ok(tampered)
    }
}

fn audit_entry_from_row(row: &SqliteRow) -> Result<AuditLogEntry, LedgerError> {
    Ok(AuditLogEntry {
        id: Some(row.try_get("id")?),
        tenant_id: row.try_get("tenant_id")?,
        timecard_entry_id: row.try_get("timecard_entry_id")?,
        nsr: row.try_get("nsr")?,
        action: row
            .try_get::<String, _>("action")?
            .parse()
            .map_err(LedgerError::Database)?,
        performed_by: row.try_get("performed_by")?,
        performed_at: row.try_get("performed_at")?,
        old_values: json_column(row, "old_values")?,
        new_values: json_column(row, "new_values")?,
        reason: row.try_get("reason")?,
        ip_address: row.try_get("ip_address")?,
        user_agent: row.try_get("user_agent")?,
        device_info: json_column(row, "device_info")?,
        audit_hash: row.try_get("audit_hash")?,
        is_system_generated: row.try_get("is_system_generated")?,
    })
}
