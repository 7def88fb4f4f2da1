use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteExecutor};

use crate::database::models::*;
use crate::error::LedgerError;

const ENTRY_COLUMNS: &str = "id, tenant_id, user_id, check_in, check_out, break_start, break_end, \
     total_hours, notes, location, is_manual_entry, device_info, ip_address, geo_location, \
     status, nsr, record_hash, previous_record_hash, original_record_hash, hash_generated_at, \
     digital_signature, signature_timestamp, signed_by, created_at, updated_at";

pub struct Queries;

impl Queries {
    pub async fn get_entry<'e, E>(
        executor: E,
        tenant_id: &str,
        entry_id: &str,
    ) -> Result<Option<TimecardEntry>, LedgerError>
    where
        E: SqliteExecutor<'e>,
    {
        let row = sqlx::query(&format!(
            "SELECT {} FROM timecard_entries WHERE tenant_id = ? AND id = ?",
            ENTRY_COLUMNS
        ))
        .bind(tenant_id)
        .bind(entry_id)
        .fetch_optional(executor)
        .await?;

        row.as_ref().map(entry_from_row).transpose()
    }

    /// Next page of a tenant's chain in NSR order, starting after `after_nsr`.
    pub async fn entries_after_nsr<'e, E>(
        executor: E,
        tenant_id: &str,
        after_nsr: i64,
        limit: i64,
    ) -> Result<Vec<TimecardEntry>, LedgerError>
    where
        E: SqliteExecutor<'e>,
    {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM timecard_entries \
             WHERE tenant_id = ? AND nsr > ? ORDER BY nsr ASC LIMIT ?",
            ENTRY_COLUMNS
        ))
        .bind(tenant_id)
        .bind(after_nsr)
        .bind(limit)
        .fetch_all(executor)
        .await?;

        rows.iter().map(entry_from_row).collect()
    }

    /// Like [`Queries::entries_after_nsr`] but restricted to records whose clock-in
    /// (or creation time, for records without one) falls inside the period.
    pub async fn period_entries_after_nsr<'e, E>(
        executor: E,
        tenant_id: &str,
        period_start: DateTime<Utc>,
        period_end: DateTime<Utc>,
        after_nsr: i64,
        limit: i64,
    ) -> Result<Vec<TimecardEntry>, LedgerError>
    where
        E: SqliteExecutor<'e>,
    {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {} FROM timecard_entries
            WHERE tenant_id = ?
              AND COALESCE(check_in, created_at) >= ?
              AND COALESCE(check_in, created_at) <= ?
              AND nsr > ?
            ORDER BY nsr ASC
            LIMIT ?
            "#,
            ENTRY_COLUMNS
        ))
        .bind(tenant_id)
        .bind(period_start)
        .bind(period_end)
        .bind(after_nsr)
        .bind(limit)
        .fetch_all(executor)
        .await?;

        rows.iter().map(entry_from_row).collect()
    }

    pub async fn list_entries<'e, E>(
        executor: E,
        tenant_id: &str,
        user_id: Option<&str>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<TimecardEntry>, LedgerError>
    where
        E: SqliteExecutor<'e>,
    {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {} FROM timecard_entries
            WHERE tenant_id = ? AND (? IS NULL OR user_id = ?)
            ORDER BY nsr ASC
            LIMIT ? OFFSET ?
            "#,
            ENTRY_COLUMNS
        ))
        .bind(tenant_id)
        .bind(user_id)
        .bind(user_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(executor)
        .await?;

        rows.iter().map(entry_from_row).collect()
    }

    pub async fn insert_entry<'e, E>(executor: E, entry: &TimecardEntry) -> Result<(), LedgerError>
    where
        E: SqliteExecutor<'e>,
    {
        sqlx::query(&format!(
            "INSERT INTO timecard_entries ({}) VALUES \
             (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            ENTRY_COLUMNS
        ))
        .bind(&entry.id)
        .bind(&entry.tenant_id)
        .bind(&entry.user_id)
        .bind(entry.check_in)
        .bind(entry.check_out)
        .bind(entry.break_start)
        .bind(entry.break_end)
        .bind(&entry.total_hours)
        .bind(&entry.notes)
        .bind(&entry.location)
        .bind(entry.is_manual_entry)
        .bind(json_text(&entry.device_info)?)
        .bind(&entry.ip_address)
        .bind(json_text(&entry.geo_location)?)
        .bind(entry.status.as_str())
        .bind(entry.nsr)
        .bind(&entry.record_hash)
        .bind(&entry.previous_record_hash)
        .bind(&entry.original_record_hash)
        .bind(entry.hash_generated_at)
        .bind(&entry.digital_signature)
        .bind(entry.signature_timestamp)
        .bind(&entry.signed_by)
        .bind(entry.created_at)
        .bind(entry.updated_at)
        .execute(executor)
        .await?;

        Ok(())
    }

    /// Rewrites the chain fields of one record. Only the rebuild path calls this.
    pub async fn update_entry_hashes<'e, E>(
        executor: E,
        tenant_id: &str,
        entry_id: &str,
        record_hash: &str,
        previous_record_hash: Option<&str>,
    ) -> Result<(), LedgerError>
    where
        E: SqliteExecutor<'e>,
    {
        let result = sqlx::query(
            r#"
            UPDATE timecard_entries
            SET record_hash = ?, previous_record_hash = ?, updated_at = ?
            WHERE tenant_id = ? AND id = ?
            "#,
        )
        .bind(record_hash)
        .bind(previous_record_hash)
        .bind(Utc::now())
        .bind(tenant_id)
        .bind(entry_id)
        .execute(executor)
        .await?;

        if result.rows_affected() == 0 {
            return Err(LedgerError::entry_not_found(entry_id));
        }
        Ok(())
    }

    pub async fn update_entry_status<'e, E>(
        executor: E,
        tenant_id: &str,
        entry_id: &str,
        status: EntryStatus,
    ) -> Result<(), LedgerError>
    where
        E: SqliteExecutor<'e>,
    {
        let result = sqlx::query(
            "UPDATE timecard_entries SET status = ?, updated_at = ? WHERE tenant_id = ? AND id = ?",
        )
        .bind(status.as_str())
        .bind(Utc::now())
        .bind(tenant_id)
        .bind(entry_id)
        .execute(executor)
        .await?;

        if result.rows_affected() == 0 {
            return Err(LedgerError::entry_not_found(entry_id));
        }
        Ok(())
    }
}

pub fn entry_from_row(row: &SqliteRow) -> Result<TimecardEntry, LedgerError> {
    Ok(TimecardEntry {
        id: row.try_get("id")?,
        tenant_id: row.try_get("tenant_id")?,
        user_id: row.try_get("user_id")?,
        check_in: row.try_get("check_in")?,
        check_out: row.try_get("check_out")?,
        break_start: row.try_get("break_start")?,
        break_end: row.try_get("break_end")?,
        total_hours: row.try_get("total_hours")?,
        notes: row.try_get("notes")?,
        location: row.try_get("location")?,
        is_manual_entry: row.try_get("is_manual_entry")?,
        device_info: json_column(row, "device_info")?,
        ip_address: row.try_get("ip_address")?,
        geo_location: json_column(row, "geo_location")?,
        status: row
            .try_get::<String, _>("status")?
            .parse()
            .map_err(LedgerError::Database)?,
        nsr: row.try_get("nsr")?,
        record_hash: row.try_get("record_hash")?,
        previous_record_hash: row.try_get("previous_record_hash")?,
        original_record_hash: row.try_get("original_record_hash")?,
        hash_generated_at: row.try_get("hash_generated_at")?,
        digital_signature: row.try_get("digital_signature")?,
        signature_timestamp: row.try_get("signature_timestamp")?,
        signed_by: row.try_get("signed_by")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

/// Reads a nullable TEXT column holding JSON.
pub fn json_column(row: &SqliteRow, column: &str) -> Result<Option<Value>, LedgerError> {
    match row.try_get::<Option<String>, _>(column)? {
        Some(text) => Ok(Some(serde_json::from_str(&text)?)),
        None => Ok(None),
    }
}

pub fn json_text(value: &Option<Value>) -> Result<Option<String>, LedgerError> {
    value
        .as_ref()
        .map(serde_json::to_string)
        .transpose()
        .map_err(LedgerError::from)
}
