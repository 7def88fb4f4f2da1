use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;

use crate::api::context::TenantContext;
use crate::api::error::ApiResult;
use crate::api::AppState;
use crate::database::models::{NewTimecardEntry, TimecardEntry};
use crate::ledger::CreatedEntry;

const DEFAULT_ENTRY_PAGE_SIZE: i64 = 100;
const MAX_ENTRY_PAGE_SIZE: i64 = 500;

/// Clock event as submitted by a device. `userId` defaults to the caller.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateEntryRequest {
    pub user_id: Option<String>,
    pub check_in: Option<DateTime<Utc>>,
    pub check_out: Option<DateTime<Utc>>,
    pub break_start: Option<DateTime<Utc>>,
    pub break_end: Option<DateTime<Utc>>,
    pub total_hours: Option<String>,
    pub notes: Option<String>,
    pub location: Option<String>,
    #[serde(default)]
    pub is_manual_entry: bool,
    pub device_info: Option<Value>,
    pub geo_location: Option<Value>,
}

pub async fn create_entry(
    State(state): State<AppState>,
    tenant: TenantContext,
    payload: Result<Json<CreateEntryRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<CreatedEntry>)> {
    let mut context = tenant.action_context()?;
    let Json(request) = payload?;
    context.device_info = request.device_info.clone();

    let entry = NewTimecardEntry {
        tenant_id: tenant.tenant_id.clone(),
        user_id: request
            .user_id
            .unwrap_or_else(|| context.performed_by.clone()),
        check_in: request.check_in,
        check_out: request.check_out,
        break_start: request.break_start,
        break_end: request.break_end,
        total_hours: request.total_hours,
        notes: request.notes,
        location: request.location,
        is_manual_entry: request.is_manual_entry,
        device_info: request.device_info,
        ip_address: Some(tenant.ip_address.clone()),
        geo_location: request.geo_location,
    };

    let created = state.ledger.create_entry(entry, &context).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryListQuery {
    pub user_id: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

pub async fn list_entries(
    State(state): State<AppState>,
    tenant: TenantContext,
    query: Result<Query<EntryListQuery>, QueryRejection>,
) -> ApiResult<Json<Vec<TimecardEntry>>> {
    let Query(query) = query?;
    let entries = state
        .ledger
        .list_entries(
            &tenant.tenant_id,
            query.user_id.as_deref(),
            query
                .limit
                .unwrap_or(DEFAULT_ENTRY_PAGE_SIZE)
                .clamp(1, MAX_ENTRY_PAGE_SIZE),
            query.offset.unwrap_or(0),
        )
        .await?;
    Ok(Json(entries))
}

pub async fn get_entry(
    State(state): State<AppState>,
    tenant: TenantContext,
    Path(entry_id): Path<String>,
) -> ApiResult<Json<TimecardEntry>> {
    Ok(Json(state.ledger.get_entry(&tenant.tenant_id, &entry_id).await?))
}

pub async fn approve_entry(
    State(state): State<AppState>,
    tenant: TenantContext,
    Path(entry_id): Path<String>,
) -> ApiResult<Json<TimecardEntry>> {
    let context = tenant.action_context()?;
    let entry = state
        .ledger
        .approve_entry(&tenant.tenant_id, &entry_id, &context)
        .await?;
    Ok(Json(entry))
}

pub async fn reject_entry(
    State(state): State<AppState>,
    tenant: TenantContext,
    Path(entry_id): Path<String>,
) -> ApiResult<Json<TimecardEntry>> {
    let context = tenant.action_context()?;
    let entry = state
        .ledger
        .reject_entry(&tenant.tenant_id, &entry_id, &context)
        .await?;
    Ok(Json(entry))
}
