//! Compliance Report Generator
//!
//! Builds hashed, immutable snapshots of a tenant's ledger for a period. The
//! report hash is fixed at generation time; later reads can re-check it but
//! never rewrite it.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use std::collections::BTreeSet;
use std::str::FromStr;
use tracing::{info, warn};
use uuid::Uuid;

use crate::database::models::{ComplianceReport, TimecardEntry};
use crate::database::queries::Queries;
use crate::error::LedgerError;
use crate::ledger::chain::{hash_value, iso_timestamp};
use crate::ledger::IntegrityLedger;

const REPORT_COLUMNS: &str = "id, tenant_id, report_type, period_start, period_end, total_records, \
     total_employees, total_hours, report_hash, report_content, generated_by, \
     is_submitted_to_authorities, submission_date, submission_protocol, created_at";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ReportType {
    Monthly,
    Quarterly,
    Annual,
    Audit,
}

impl ReportType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportType::Monthly => "MONTHLY",
            ReportType::Quarterly => "QUARTERLY",
            ReportType::Annual => "ANNUAL",
            ReportType::Audit => "AUDIT",
        }
    }
}

impl FromStr for ReportType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "MONTHLY" => Ok(ReportType::Monthly),
            "QUARTERLY" => Ok(ReportType::Quarterly),
            "ANNUAL" => Ok(ReportType::Annual),
            "AUDIT" => Ok(ReportType::Audit),
            _ => Err(format!("Unknown report type: {}", s)),
        }
    }
}

/// Report row without its content, for listings.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportSummary {
    pub id: String,
    pub report_type: String,
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
    pub total_records: i64,
    pub total_employees: i64,
    pub total_hours: String,
    pub report_hash: String,
    pub generated_by: String,
    pub is_submitted_to_authorities: bool,
    pub submission_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct PeriodStatistics {
    total_records: i64,
    employees: BTreeSet<String>,
    total_hours: Decimal,
    records: Vec<Value>,
}

impl PeriodStatistics {
    fn add(&mut self, entry: &TimecardEntry) -> Result<(), LedgerError> {
        if let Some(hours) = &entry.total_hours {
            let hours = Decimal::from_str(hours.trim()).map_err(|e| {
                LedgerError::ReportGeneration(format!(
                    "NSR {}: totalHours {:?} is not a decimal: {}",
                    entry.nsr, hours, e
                ))
            })?;
            self.total_hours += hours;
        }

        self.total_records += 1;
        self.employees.insert(entry.user_id.clone());
        self.records.push(json!({
            "nsr": entry.nsr,
            "userId": entry.user_id,
            "checkIn": entry.check_in.map(iso_timestamp),
            "checkOut": entry.check_out.map(iso_timestamp),
            "totalHours": entry.total_hours,
            "recordHash": entry.record_hash,
            "hasSignature": entry.digital_signature.is_some(),
        }));
        Ok(())
    }
}

#[derive(Clone)]
pub struct ReportGenerator {
    pool: SqlitePool,
    ledger: IntegrityLedger,
}

impl ReportGenerator {
    pub fn new(ledger: IntegrityLedger) -> Self {
        Self {
            pool: ledger.pool().clone(),
            ledger,
        }
    }

    /// Aggregate the period, embed a full chain check, hash the content and
    /// persist the report. Returns the new report id.
    pub async fn generate_report(
        &self,
        tenant_id: &str,
        report_type: ReportType,
        period_start: DateTime<Utc>,
        period_end: DateTime<Utc>,
        generated_by: &str,
    ) -> Result<String, LedgerError> {
        if generated_by.trim().is_empty() {
            return Err(LedgerError::Validation("generatedBy is required".to_string()));
        }
        if period_end < period_start {
            return Err(LedgerError::Validation(
                "periodEnd cannot be before periodStart".to_string(),
            ));
        }

        let stats = self
            .collect_period(tenant_id, period_start, period_end)
            .await
            .map_err(into_report_error)?;
        let integrity = self
            .ledger
            .verify_integrity_chain(tenant_id)
            .await
            .map_err(into_report_error)?;

        let id = Uuid::new_v4().to_string();
        let generated_at = Utc::now();
        let total_hours = stats.total_hours.to_string();
        let total_employees = stats.employees.len() as i64;

        let content = json!({
            "reportId": id,
            "tenantId": tenant_id,
            "reportType": report_type.as_str(),
            "periodStart": iso_timestamp(period_start),
            "periodEnd": iso_timestamp(period_end),
            "generatedAt": iso_timestamp(generated_at),
            "generatedBy": generated_by,
            "statistics": {
                "totalRecords": stats.total_records,
                "totalEmployees": total_employees,
                "totalHours": total_hours,
            },
            "integrityCheck": serde_json::to_value(&integrity).map_err(LedgerError::report)?,
            "records": stats.records,
        });
        let report_hash = hash_value(&content);
        let content_text = serde_json::to_string(&content).map_err(LedgerError::report)?;

        sqlx::query(&format!(
            "INSERT INTO compliance_reports ({}) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            REPORT_COLUMNS
        ))
        .bind(&id)
        .bind(tenant_id)
        .bind(report_type.as_str())
        .bind(period_start)
        .bind(period_end)
        .bind(stats.total_records)
        .bind(total_employees)
        .bind(&total_hours)
        .bind(&report_hash)
        .bind(content_text)
        .bind(generated_by)
        .bind(false)
        .bind(None::<DateTime<Utc>>)
        .bind(None::<String>)
        .bind(generated_at)
        .execute(&self.pool)
        .await
        .map_err(LedgerError::report)?;

        if !integrity.is_valid {
            warn!(
                "Report {} for tenant {} embeds a compromised chain ({} error(s))",
                id,
                tenant_id,
                integrity.errors.len()
            );
        }
        info!(
            "Generated {} report {} for tenant {}: {} record(s), {} hour(s)",
            report_type.as_str(),
            id,
            tenant_id,
            stats.total_records,
            total_hours
        );
        Ok(id)
    }

    async fn collect_period(
        &self,
        tenant_id: &str,
        period_start: DateTime<Utc>,
        period_end: DateTime<Utc>,
    ) -> Result<PeriodStatistics, LedgerError> {
        let page_size = self.ledger.page_size();
        let mut stats = PeriodStatistics::default();
        let mut after_nsr = 0;

        loop {
            let page = Queries::period_entries_after_nsr(
                &self.pool,
                tenant_id,
                period_start,
                period_end,
                after_nsr,
                page_size,
            )
            .await?;
            for entry in &page {
                stats.add(entry)?;
                after_nsr = entry.nsr;
            }
            if (page.len() as i64) < page_size {
                break;
            }
        }

        Ok(stats)
    }

    pub async fn list_reports(
        &self,
        tenant_id: &str,
        report_type: Option<ReportType>,
        year: Option<i32>,
    ) -> Result<Vec<ReportSummary>, LedgerError> {
        let report_type = report_type.map(|t| t.as_str());
        let year = year.map(|y| format!("{:04}", y));

        let rows = sqlx::query(
            r#"
            SELECT id, report_type, period_start, period_end, total_records, total_employees,
                   total_hours, report_hash, generated_by, is_submitted_to_authorities,
                   submission_date, created_at
            FROM compliance_reports
            WHERE tenant_id = ?
              AND (? IS NULL OR report_type = ?)
              AND (? IS NULL OR substr(period_start, 1, 4) = ?)
            ORDER BY created_at DESC
            "#,
        )
        .bind(tenant_id)
        .bind(report_type)
        .bind(report_type)
        .bind(&year)
        .bind(&year)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                Ok(ReportSummary {
                    id: row.try_get("id")?,
                    report_type: row.try_get("report_type")?,
                    period_start: row.try_get("period_start")?,
                    period_end: row.try_get("period_end")?,
                    total_records: row.try_get("total_records")?,
                    total_employees: row.try_get("total_employees")?,
                    total_hours: row.try_get("total_hours")?,
                    report_hash: row.try_get("report_hash")?,
                    generated_by: row.try_get("generated_by")?,
                    is_submitted_to_authorities: row.try_get("is_submitted_to_authorities")?,
                    submission_date: row.try_get("submission_date")?,
                    created_at: row.try_get("created_at")?,
                })
            })
            .collect()
    }

    pub async fn get_report(
        &self,
        tenant_id: &str,
        report_id: &str,
    ) -> Result<ComplianceReport, LedgerError> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM compliance_reports WHERE tenant_id = ? AND id = ?",
            REPORT_COLUMNS
        ))
        .bind(tenant_id)
        .bind(report_id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => report_from_row(&row),
            None => Err(LedgerError::report_not_found(report_id)),
        }
    }

    /// Record that a report was handed to the labor authorities.
    pub async fn mark_submitted(
        &self,
        tenant_id: &str,
        report_id: &str,
        protocol: &str,
    ) -> Result<ComplianceReport, LedgerError> {
        if protocol.trim().is_empty() {
            return Err(LedgerError::Validation("protocol is required".to_string()));
        }

        let result = sqlx::query(
            r#"
            UPDATE compliance_reports
            SET is_submitted_to_authorities = 1, submission_date = ?, submission_protocol = ?
            WHERE tenant_id = ? AND id = ? AND is_submitted_to_authorities = 0
            "#,
        )
        .bind(Utc::now())
        .bind(protocol)
        .bind(tenant_id)
        .bind(report_id)
        .execute(&self.pool)
        .await?;

        let report = self.get_report(tenant_id, report_id).await?;
        if result.rows_affected() == 0 {
            return Err(LedgerError::Validation(format!(
                "Report {} was already submitted",
                report_id
            )));
        }

        info!(
            "Report {} for tenant {} submitted under protocol {}",
            report_id, tenant_id, protocol
        );
        Ok(report)
    }
}

/// Whether the stored content still hashes to the stored report hash.
pub fn verify_report_hash(report: &ComplianceReport) -> bool {
    hash_value(&report.report_content) == report.report_hash
}

fn into_report_error(err: LedgerError) -> LedgerError {
    match err {
        LedgerError::ReportGeneration(_) => err,
        other => LedgerError::report(other),
    }
}

fn report_from_row(row: &SqliteRow) -> Result<ComplianceReport, LedgerError> {
    let content: String = row.try_get("report_content")?;
    Ok(ComplianceReport {
        id: row.try_get("id")?,
        tenant_id: row.try_get("tenant_id")?,
        report_type: row.try_get("report_type")?,
        period_start: row.try_get("period_start")?,
        period_end: row.try_get("period_end")?,
        total_records: row.try_get("total_records")?,
        total_employees: row.try_get("total_employees")?,
        total_hours: row.try_get("total_hours")?,
        report_hash: row.try_get("report_hash")?,
        report_content: serde_json::from_str(&content)?,
        generated_by: row.try_get("generated_by")?,
        is_submitted_to_authorities: row.try_get("is_submitted_to_authorities")?,
        submission_date: row.try_get("submission_date")?,
        submission_protocol: row.try_get("submission_protocol")?,
        created_at: row.try_get("created_at")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_type_parsing() {
        assert_eq!("monthly".parse::<ReportType>().unwrap(), ReportType::Monthly);
        assert_eq!("AUDIT".parse::<ReportType>().unwrap(), ReportType::Audit);
        assert!("weekly".parse::<ReportType>().is_err());
    }

    #[test]
    fn test_statistics_sum_decimal_hours() {
        let mut stats = PeriodStatistics::default();
        for (nsr, (user, hours)) in [("ana", "8.00"), ("ana", "7.50"), ("bia", "8.25")]
            .into_iter()
            .enumerate()
        {
            let entry = TimecardEntry {
                id: format!("entry-{}", nsr),
                tenant_id: "tenant-a".to_string(),
                user_id: user.to_string(),
                check_in: None,
                check_out: None,
                break_start: None,
                break_end: None,
                total_hours: Some(hours.to_string()),
                notes: None,
                location: None,
                is_manual_entry: false,
                device_info: None,
                ip_address: None,
                geo_location: None,
                status: crate::database::models::EntryStatus::Pending,
                nsr: nsr as i64 + 1,
                record_hash: "hash".to_string(),
                previous_record_hash: None,
                original_record_hash: "hash".to_string(),
                hash_generated_at: Utc::now(),
                digital_signature: None,
                signature_timestamp: None,
                signed_by: None,
                created_at: Utc::now(),
                updated_at: Utc::now(),
            };
            stats.add(&entry).unwrap();
        }

        assert_eq!(stats.total_records, 3);
        assert_eq!(stats.employees.len(), 2);
        assert_eq!(stats.total_hours.to_string(), "23.75");
        assert_eq!(stats.records[2]["hasSignature"], json!(false));
    }
}
