//! Chain builder
//!
//! Canonical serialization and SHA-256 hashing of timecard records. Every
//! record hash covers the previous record's hash, so altering any historical
//! record invalidates every hash after it.

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use sqlx::SqliteExecutor;

use crate::database::models::{NewTimecardEntry, TimecardEntry};
use crate::error::LedgerError;

/// The record fields covered by the chain hash.
#[derive(Debug, Clone, PartialEq)]
pub struct HashInput<'a> {
    pub id: &'a str,
    pub tenant_id: &'a str,
    pub user_id: &'a str,
    pub check_in: Option<DateTime<Utc>>,
    pub check_out: Option<DateTime<Utc>>,
    pub break_start: Option<DateTime<Utc>>,
    pub break_end: Option<DateTime<Utc>>,
    pub total_hours: Option<&'a str>,
    pub location: Option<&'a str>,
    pub is_manual_entry: bool,
}

impl<'a> HashInput<'a> {
    pub fn from_new(id: &'a str, entry: &'a NewTimecardEntry) -> Self {
        Self {
            id,
            tenant_id: &entry.tenant_id,
            user_id: &entry.user_id,
            check_in: entry.check_in,
            check_out: entry.check_out,
            break_start: entry.break_start,
            break_end: entry.break_end,
            total_hours: entry.total_hours.as_deref(),
            location: entry.location.as_deref(),
            is_manual_entry: entry.is_manual_entry,
        }
    }

    pub fn from_stored(entry: &'a TimecardEntry) -> Self {
        Self {
            id: &entry.id,
            tenant_id: &entry.tenant_id,
            user_id: &entry.user_id,
            check_in: entry.check_in,
            check_out: entry.check_out,
            break_start: entry.break_start,
            break_end: entry.break_end,
            total_hours: entry.total_hours.as_deref(),
            location: entry.location.as_deref(),
            is_manual_entry: entry.is_manual_entry,
        }
    }
}

/// ISO-8601 with millisecond precision and a `Z` suffix.
pub fn iso_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn iso_or_null(at: Option<DateTime<Utc>>) -> Value {
    at.map(|t| Value::String(iso_timestamp(t))).unwrap_or(Value::Null)
}

/// Serialize a JSON value with object keys sorted lexicographically at every
/// depth, independent of how the map was built.
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(key.clone()).to_string());
                out.push(':');
                write_canonical(&map[key.as_str()], out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}

pub fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Hash of the canonical form of `value`.
pub fn hash_value(value: &Value) -> String {
    sha256_hex(canonical_json(value).as_bytes())
}

/// The canonical object hashed for a record.
pub fn canonical_record(
    input: &HashInput<'_>,
    nsr: i64,
    previous_hash: Option<&str>,
    generated_at: DateTime<Utc>,
) -> Value {
    json!({
        "id": input.id,
        "tenantId": input.tenant_id,
        "userId": input.user_id,
        "nsr": nsr,
        "checkIn": iso_or_null(input.check_in),
        "checkOut": iso_or_null(input.check_out),
        "breakStart": iso_or_null(input.break_start),
        "breakEnd": iso_or_null(input.break_end),
        "totalHours": input.total_hours,
        "location": input.location,
        "isManualEntry": input.is_manual_entry,
        "previousHash": previous_hash,
        "timestamp": iso_timestamp(generated_at),
    })
}

/// Lowercase hex SHA-256 of the record's canonical JSON.
///
/// `generated_at` is persisted with the record so that verification can
/// reproduce the same digest later.
pub fn compute_hash(
    input: &HashInput<'_>,
    nsr: i64,
    previous_hash: Option<&str>,
    generated_at: DateTime<Utc>,
) -> Result<String, LedgerError> {
    if input.id.is_empty() || input.tenant_id.is_empty() {
        return Err(LedgerError::ChainComputation(
            "record id and tenant id are required to compute a hash".to_string(),
        ));
    }
    if nsr <= 0 {
        return Err(LedgerError::ChainComputation(format!(
            "NSR must be positive, got {}",
            nsr
        )));
    }

    Ok(hash_value(&canonical_record(
        input,
        nsr,
        previous_hash,
        generated_at,
    )))
}

/// Recompute the hash of a stored record against the given previous hash.
pub fn recompute_stored_hash(
    entry: &TimecardEntry,
    previous_hash: Option<&str>,
) -> Result<String, LedgerError> {
    compute_hash(
        &HashInput::from_stored(entry),
        entry.nsr,
        previous_hash,
        entry.hash_generated_at,
    )
}

/// `record_hash` of the tenant's highest-NSR record, or `None` for an empty chain.
pub async fn last_hash<'e, E>(executor: E, tenant_id: &str) -> Result<Option<String>, LedgerError>
where
    E: SqliteExecutor<'e>,
{
    let hash: Option<String> = sqlx::query_scalar(
        "SELECT record_hash FROM timecard_entries WHERE tenant_id = ? ORDER BY nsr DESC LIMIT 1",
    )
    .bind(tenant_id)
    .fetch_optional(executor)
    .await?;

    Ok(hash)
}
