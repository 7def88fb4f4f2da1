//! Compliance routes: integrity checks, audit log, reports, backups and keys.

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::Json;
use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

use crate::api::context::TenantContext;
use crate::api::error::{ApiError, ApiResult};
use crate::api::AppState;
use crate::audit::{AuditAction, AuditLogFilter, AuditLogPage};
use crate::compliance::{verify_report_hash, ReportSummary, ReportType};
use crate::crypto::key_management::KeyStatusReport;
use crate::database::models::TimecardBackup;

const DEFAULT_AUDIT_PAGE_SIZE: i64 = 50;

pub async fn integrity_check(
    State(state): State<AppState>,
    tenant: TenantContext,
) -> ApiResult<Json<Value>> {
    let check = state.ledger.verify_integrity_chain(&tenant.tenant_id).await?;
    let chain_state = state.ledger.chain_state(&tenant.tenant_id).await;

    Ok(Json(json!({
        "isValid": check.is_valid,
        "errors": check.errors,
        "recordsChecked": check.records_checked,
        "chainState": chain_state.as_str(),
        "checkedAt": Utc::now(),
    })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditLogQuery {
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub user_id: Option<String>,
    pub action: Option<String>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

pub async fn audit_log(
    State(state): State<AppState>,
    tenant: TenantContext,
    query: Result<Query<AuditLogQuery>, QueryRejection>,
) -> ApiResult<Json<AuditLogPage>> {
    let Query(query) = query?;

    let action = query
        .action
        .as_deref()
        .map(str::parse::<AuditAction>)
        .transpose()
        .map_err(ApiError::BadRequest)?;

    let filter = AuditLogFilter {
        start_date: query.start_date,
        end_date: query.end_date,
        performed_by: query.user_id,
        action,
        page: query.page.unwrap_or(1).max(1),
        limit: query
            .limit
            .unwrap_or(DEFAULT_AUDIT_PAGE_SIZE)
            .clamp(1, state.audit_log_max_limit),
    };

    let page = state.ledger.audit().list(&tenant.tenant_id, &filter).await?;
    Ok(Json(page))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateReportRequest {
    pub report_type: Option<String>,
    pub period_start: Option<DateTime<Utc>>,
    pub period_end: Option<DateTime<Utc>>,
}

pub async fn generate_report(
    State(state): State<AppState>,
    tenant: TenantContext,
    payload: Result<Json<GenerateReportRequest>, JsonRejection>,
) -> ApiResult<Json<Value>> {
    let generated_by = tenant.require_user()?.to_string();
    let Json(request) = payload?;

    let (Some(report_type), Some(period_start), Some(period_end)) =
        (request.report_type, request.period_start, request.period_end)
    else {
        return Err(ApiError::BadRequest(
            "reportType, periodStart and periodEnd are required".to_string(),
        ));
    };
    let report_type: ReportType = report_type.parse().map_err(ApiError::BadRequest)?;

    let report_id = state
        .reports
        .generate_report(
            &tenant.tenant_id,
            report_type,
            period_start,
            period_end,
            &generated_by,
        )
        .await?;

    Ok(Json(json!({
        "reportId": report_id,
        "message": "Report generated",
    })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportListQuery {
    pub report_type: Option<String>,
    pub year: Option<i32>,
}

pub async fn list_reports(
    State(state): State<AppState>,
    tenant: TenantContext,
    query: Result<Query<ReportListQuery>, QueryRejection>,
) -> ApiResult<Json<Vec<ReportSummary>>> {
    let Query(query) = query?;
    let report_type = query
        .report_type
        .as_deref()
        .map(str::parse::<ReportType>)
        .transpose()
        .map_err(ApiError::BadRequest)?;

    let reports = state
        .reports
        .list_reports(&tenant.tenant_id, report_type, query.year)
        .await?;
    Ok(Json(reports))
}

pub async fn download_report(
    State(state): State<AppState>,
    tenant: TenantContext,
    Path(report_id): Path<String>,
) -> ApiResult<Json<Value>> {
    let report = state.reports.get_report(&tenant.tenant_id, &report_id).await?;
    let hash_verified = verify_report_hash(&report);

    Ok(Json(json!({
        "report": report,
        "hashVerified": hash_verified,
    })))
}

#[derive(Debug, Deserialize)]
pub struct SubmitReportRequest {
    pub protocol: Option<String>,
}

pub async fn submit_report(
    State(state): State<AppState>,
    tenant: TenantContext,
    Path(report_id): Path<String>,
    payload: Result<Json<SubmitReportRequest>, JsonRejection>,
) -> ApiResult<Json<Value>> {
    tenant.require_user()?;
    let Json(request) = payload?;
    let protocol = request
        .protocol
        .ok_or_else(|| ApiError::BadRequest("protocol is required".to_string()))?;

    let report = state
        .reports
        .mark_submitted(&tenant.tenant_id, &report_id, &protocol)
        .await?;

    Ok(Json(json!({
        "reportId": report.id,
        "isSubmittedToAuthorities": report.is_submitted_to_authorities,
        "submissionDate": report.submission_date,
        "submissionProtocol": report.submission_protocol,
    })))
}

pub async fn rebuild_integrity(
    State(state): State<AppState>,
    tenant: TenantContext,
) -> ApiResult<Json<Value>> {
    let context = tenant
        .action_context()?
        .with_reason("Integrity chain rebuild requested");

    info!(
        "Rebuild of tenant {} requested by {}",
        tenant.tenant_id, context.performed_by
    );
    let outcome = state
        .ledger
        .rebuild_integrity_chain(&tenant.tenant_id, &context)
        .await?;
    let chain_state = state.ledger.chain_state(&tenant.tenant_id).await;

    Ok(Json(json!({
        "fixed": outcome.fixed,
        "errors": outcome.errors,
        "chainState": chain_state.as_str(),
    })))
}

pub async fn list_backups(
    State(state): State<AppState>,
    tenant: TenantContext,
) -> ApiResult<Json<Vec<TimecardBackup>>> {
    Ok(Json(state.backups.list_backups(&tenant.tenant_id).await?))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyBackupRequest {
    pub backup_date: Option<NaiveDate>,
}

pub async fn verify_backup(
    State(state): State<AppState>,
    tenant: TenantContext,
    payload: Result<Json<VerifyBackupRequest>, JsonRejection>,
) -> ApiResult<Json<Value>> {
    let Json(request) = payload?;
    let backup_date = request
        .backup_date
        .ok_or_else(|| ApiError::BadRequest("backupDate is required".to_string()))?;

    let is_valid = state
        .backups
        .verify_backup(&tenant.tenant_id, backup_date)
        .await?;

    Ok(Json(json!({
        "backupDate": backup_date,
        "isValid": is_valid,
        "message": if is_valid { "Backup verificado" } else { "Backup comprometido" },
    })))
}

pub async fn key_status(
    State(state): State<AppState>,
    tenant: TenantContext,
) -> ApiResult<Json<Vec<KeyStatusReport>>> {
    Ok(Json(state.keys.list_keys(&tenant.tenant_id).await?))
}
