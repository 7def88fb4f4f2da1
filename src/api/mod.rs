//! HTTP surface of the ledger.
//!
//! All routes are tenant-scoped through the `x-tenant-id` header; see
//! [`context::TenantContext`].

pub mod compliance;
pub mod context;
pub mod error;
pub mod timecard;

use axum::response::Json;
use axum::routing::{get, post};
use axum::Router;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use crate::compliance::{BackupVerifier, ReportGenerator};
use crate::crypto::KeyStore;
use crate::ledger::IntegrityLedger;

#[derive(Clone)]
pub struct AppState {
    pub ledger: IntegrityLedger,
    pub reports: ReportGenerator,
    pub backups: BackupVerifier,
    pub keys: KeyStore,
    pub audit_log_max_limit: i64,
}

impl AppState {
    pub fn new(ledger: IntegrityLedger, audit_log_max_limit: i64) -> Self {
        let pool = ledger.pool().clone();
        Self {
            reports: ReportGenerator::new(ledger.clone()),
            backups: BackupVerifier::new(pool.clone()),
            keys: KeyStore::new(pool),
            ledger,
            audit_log_max_limit: audit_log_max_limit.max(1),
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/compliance/integrity-check", get(compliance::integrity_check))
        .route("/compliance/audit-log", get(compliance::audit_log))
        .route("/compliance/generate-report", post(compliance::generate_report))
        .route("/compliance/reports", get(compliance::list_reports))
        .route("/compliance/reports/:report_id", get(compliance::download_report))
        .route(
            "/compliance/reports/:report_id/submit",
            post(compliance::submit_report),
        )
        .route("/compliance/rebuild-integrity", post(compliance::rebuild_integrity))
        .route("/compliance/backups", get(compliance::list_backups))
        .route("/compliance/verify-backup", post(compliance::verify_backup))
        .route("/compliance/keys", get(compliance::key_status))
        .route(
            "/timecard/entries",
            post(timecard::create_entry).get(timecard::list_entries),
        )
        .route("/timecard/entries/:entry_id", get(timecard::get_entry))
        .route("/timecard/entries/:entry_id/approve", post(timecard::approve_entry))
        .route("/timecard/entries/:entry_id/reject", post(timecard::reject_entry))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .into_inner(),
        )
        .with_state(state)
}

async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "timecard-ledger",
        "timestamp": chrono::Utc::now()
    }))
}
