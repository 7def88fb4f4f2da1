#![allow(dead_code)]

use chrono::{DateTime, TimeZone, Utc};
use std::sync::Arc;

use timecard_ledger::audit::ActionContext;
use timecard_ledger::crypto::SimulatedSigner;
use timecard_ledger::database::models::NewTimecardEntry;
use timecard_ledger::database::Database;
use timecard_ledger::ledger::IntegrityLedger;

/// Small enough that a handful of records spans several pages.
pub const TEST_PAGE_SIZE: i64 = 2;

/// Setup an in-memory SQLite database for testing
pub async fn setup_test_db() -> Database {
    Database::new_in_memory()
        .await
        .expect("Failed to create test database")
}

/// Ledger over a fresh database with the simulated signer.
pub async fn setup_ledger() -> (Database, IntegrityLedger) {
    let db = setup_test_db().await;
    let ledger = IntegrityLedger::new(db.pool().clone(), Arc::new(SimulatedSigner))
        .with_page_size(TEST_PAGE_SIZE);
    (db, ledger)
}

pub fn context(user: &str) -> ActionContext {
    ActionContext::new(user, "10.0.0.1")
}

/// A clock event on May `day`, 2024, starting at 08:00 UTC.
pub fn entry(tenant: &str, user: &str, hours: &str, day: u32) -> NewTimecardEntry {
    NewTimecardEntry {
        tenant_id: tenant.to_string(),
        user_id: user.to_string(),
        check_in: Some(may(day, 8)),
        check_out: Some(may(day, 17)),
        total_hours: Some(hours.to_string()),
        location: Some("Matriz".to_string()),
        ..Default::default()
    }
}

pub fn may(day: u32, hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, day, hour, 0, 0)
        .single()
        .expect("valid test timestamp")
}

pub fn may_period() -> (DateTime<Utc>, DateTime<Utc>) {
    (
        Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap(),
        Utc.with_ymd_and_hms(2024, 5, 31, 23, 59, 59).unwrap(),
    )
}
