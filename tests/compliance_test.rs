//! Compliance report and backup verification tests.

mod common;

use chrono::NaiveDate;
use std::io::Write;

use timecard_ledger::compliance::{verify_report_hash, BackupVerifier, ReportGenerator, ReportType};
use timecard_ledger::error::LedgerError;

use common::{context, entry, may, may_period, setup_ledger};

const TENANT: &str = "tenant-a";

#[tokio::test]
async fn test_monthly_report_end_to_end() {
    let (_db, ledger) = setup_ledger().await;
    let reports = ReportGenerator::new(ledger.clone());

    let mut nsrs = Vec::new();
    for (day, hours) in [(2, "8.00"), (3, "7.50"), (6, "8.25")] {
        let created = ledger
            .create_entry(entry(TENANT, "ana", hours, day), &context("ana"))
            .await
            .unwrap();
        nsrs.push(created.nsr);
    }
    assert_eq!(nsrs, vec![1, 2, 3]);

    let check = ledger.verify_integrity_chain(TENANT).await.unwrap();
    assert!(check.is_valid);
    assert!(check.errors.is_empty());

    let (start, end) = may_period();
    let report_id = reports
        .generate_report(TENANT, ReportType::Monthly, start, end, "rh-user")
        .await
        .unwrap();
    let report = reports.get_report(TENANT, &report_id).await.unwrap();

    assert_eq!(report.report_type, "MONTHLY");
    assert_eq!(report.total_records, 3);
    assert_eq!(report.total_employees, 1);
    assert_eq!(report.total_hours, "23.75");
    assert_eq!(report.generated_by, "rh-user");
    assert!(!report.is_submitted_to_authorities);
    assert!(verify_report_hash(&report));

    let content = &report.report_content;
    assert_eq!(content["statistics"]["totalHours"], "23.75");
    assert_eq!(content["integrityCheck"]["isValid"], true);
    assert_eq!(content["records"].as_array().unwrap().len(), 3);
    assert_eq!(content["records"][0]["nsr"], 1);
    assert_eq!(content["records"][0]["hasSignature"], false);
}

#[tokio::test]
async fn test_distinct_employees_are_counted() {
    let (_db, ledger) = setup_ledger().await;
    let reports = ReportGenerator::new(ledger.clone());

    for (user, hours) in [("ana", "8.00"), ("bia", "7.50"), ("caio", "8.25")] {
        ledger
            .create_entry(entry(TENANT, user, hours, 2), &context(user))
            .await
            .unwrap();
    }

    let (start, end) = may_period();
    let id = reports
        .generate_report(TENANT, ReportType::Monthly, start, end, "rh-user")
        .await
        .unwrap();
    let report = reports.get_report(TENANT, &id).await.unwrap();
    assert_eq!(report.total_employees, 3);
    assert_eq!(report.total_hours, "23.75");
}

#[tokio::test]
async fn test_report_only_covers_its_period() {
    let (_db, ledger) = setup_ledger().await;
    let reports = ReportGenerator::new(ledger.clone());

    ledger
        .create_entry(entry(TENANT, "ana", "8.00", 2), &context("ana"))
        .await
        .unwrap();
    let mut june = entry(TENANT, "ana", "6.00", 2);
    june.check_in = Some(may(31, 8) + chrono::Duration::days(2));
    june.check_out = None;
    ledger.create_entry(june, &context("ana")).await.unwrap();

    let (start, end) = may_period();
    let id = reports
        .generate_report(TENANT, ReportType::Monthly, start, end, "rh-user")
        .await
        .unwrap();
    let report = reports.get_report(TENANT, &id).await.unwrap();
    assert_eq!(report.total_records, 1);
    assert_eq!(report.total_hours, "8.00");
    // The embedded check covers the whole chain, not just the period.
    assert_eq!(report.report_content["integrityCheck"]["recordsChecked"], 2);
}

#[tokio::test]
async fn test_reports_are_immutable_snapshots() {
    let (_db, ledger) = setup_ledger().await;
    let reports = ReportGenerator::new(ledger.clone());

    for day in [2, 3] {
        ledger
            .create_entry(entry(TENANT, "ana", "8.00", day), &context("ana"))
            .await
            .unwrap();
    }

    let (start, end) = may_period();
    let first_id = reports
        .generate_report(TENANT, ReportType::Monthly, start, end, "rh-user")
        .await
        .unwrap();
    let first = reports.get_report(TENANT, &first_id).await.unwrap();

    ledger
        .create_entry(entry(TENANT, "ana", "4.00", 10), &context("ana"))
        .await
        .unwrap();

    let reread = reports.get_report(TENANT, &first_id).await.unwrap();
    assert_eq!(reread.report_hash, first.report_hash);
    assert_eq!(reread.report_content, first.report_content);
    assert_eq!(reread.total_records, 2);

    let second_id = reports
        .generate_report(TENANT, ReportType::Monthly, start, end, "rh-user")
        .await
        .unwrap();
    assert_ne!(second_id, first_id);
    let second = reports.get_report(TENANT, &second_id).await.unwrap();
    assert_eq!(second.total_records, 3);
    assert_eq!(second.total_hours, "20.00");
    assert_ne!(second.report_hash, first.report_hash);
}

#[tokio::test]
async fn test_report_embeds_compromised_chain() {
    let (db, ledger) = setup_ledger().await;
    let reports = ReportGenerator::new(ledger.clone());

    for day in [2, 3, 6] {
        ledger
            .create_entry(entry(TENANT, "ana", "8.00", day), &context("ana"))
            .await
            .unwrap();
    }
    sqlx::query("UPDATE timecard_entries SET total_hours = '10.00' WHERE tenant_id = ? AND nsr = 2")
        .bind(TENANT)
        .execute(db.pool())
        .await
        .unwrap();

    let (start, end) = may_period();
    let id = reports
        .generate_report(TENANT, ReportType::Audit, start, end, "auditor")
        .await
        .unwrap();
    let report = reports.get_report(TENANT, &id).await.unwrap();
    assert_eq!(report.report_content["integrityCheck"]["isValid"], false);
    assert_eq!(
        report.report_content["integrityCheck"]["errors"][0],
        "NSR 2: Hash do registro foi alterado"
    );
}

#[tokio::test]
async fn test_altered_report_content_fails_hash_check() {
    let (db, ledger) = setup_ledger().await;
    let reports = ReportGenerator::new(ledger.clone());
    ledger
        .create_entry(entry(TENANT, "ana", "8.00", 2), &context("ana"))
        .await
        .unwrap();

    let (start, end) = may_period();
    let id = reports
        .generate_report(TENANT, ReportType::Monthly, start, end, "rh-user")
        .await
        .unwrap();

    let mut report = reports.get_report(TENANT, &id).await.unwrap();
    report.report_content["statistics"]["totalHours"] = "80.00".into();
    sqlx::query("UPDATE compliance_reports SET report_content = ? WHERE id = ?")
        .bind(report.report_content.to_string())
        .bind(&id)
        .execute(db.pool())
        .await
        .unwrap();

    let reread = reports.get_report(TENANT, &id).await.unwrap();
    assert!(!verify_report_hash(&reread));
}

#[tokio::test]
async fn test_list_filter_and_submit_reports() {
    let (_db, ledger) = setup_ledger().await;
    let reports = ReportGenerator::new(ledger.clone());
    let (start, end) = may_period();

    let monthly = reports
        .generate_report(TENANT, ReportType::Monthly, start, end, "rh-user")
        .await
        .unwrap();
    reports
        .generate_report(TENANT, ReportType::Audit, start, end, "auditor")
        .await
        .unwrap();

    assert_eq!(reports.list_reports(TENANT, None, None).await.unwrap().len(), 2);
    let only_monthly = reports
        .list_reports(TENANT, Some(ReportType::Monthly), Some(2024))
        .await
        .unwrap();
    assert_eq!(only_monthly.len(), 1);
    assert_eq!(only_monthly[0].id, monthly);
    assert!(reports
        .list_reports(TENANT, None, Some(2023))
        .await
        .unwrap()
        .is_empty());
    assert!(reports.list_reports("tenant-b", None, None).await.unwrap().is_empty());

    let submitted = reports
        .mark_submitted(TENANT, &monthly, "MTE-2024-000123")
        .await
        .unwrap();
    assert!(submitted.is_submitted_to_authorities);
    assert_eq!(submitted.submission_protocol.as_deref(), Some("MTE-2024-000123"));
    assert!(submitted.submission_date.is_some());
    assert!(verify_report_hash(&submitted));

    assert!(matches!(
        reports.mark_submitted(TENANT, &monthly, "MTE-2024-000124").await,
        Err(LedgerError::Validation(_))
    ));
    assert!(matches!(
        reports.mark_submitted(TENANT, "missing", "MTE-1").await,
        Err(LedgerError::NotFound(_))
    ));
    assert!(matches!(
        reports.get_report("tenant-b", &monthly).await,
        Err(LedgerError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_report_rejects_inverted_period() {
    let (_db, ledger) = setup_ledger().await;
    let reports = ReportGenerator::new(ledger);
    let (start, end) = may_period();

    assert!(matches!(
        reports
            .generate_report(TENANT, ReportType::Monthly, end, start, "rh-user")
            .await,
        Err(LedgerError::Validation(_))
    ));
}

#[tokio::test]
async fn test_backup_verification() {
    let (db, _ledger) = setup_ledger().await;
    let backups = BackupVerifier::new(db.pool().clone());
    let date = NaiveDate::from_ymd_opt(2024, 5, 31).unwrap();

    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(b"nsr,user,hours\n1,ana,8.00\n").unwrap();
    file.flush().unwrap();

    let registered = backups
        .register_backup(TENANT, date, file.path(), 1)
        .await
        .unwrap();
    assert!(!registered.is_verified);
    assert_eq!(registered.file_size, 26);

    assert!(backups.verify_backup(TENANT, date).await.unwrap());
    let listed = backups.list_backups(TENANT).await.unwrap();
    assert_eq!(listed.len(), 1);
    assert!(listed[0].is_verified);
    assert!(listed[0].verification_date.is_some());

    file.write_all(b"2,ana,9.00\n").unwrap();
    file.flush().unwrap();
    assert!(!backups.verify_backup(TENANT, date).await.unwrap());
    assert!(!backups.list_backups(TENANT).await.unwrap()[0].is_verified);

    let path = file.path().to_path_buf();
    drop(file);
    assert!(!path.exists());
    assert!(!backups.verify_backup(TENANT, date).await.unwrap());

    let other_day = NaiveDate::from_ymd_opt(2024, 6, 30).unwrap();
    assert!(matches!(
        backups.verify_backup(TENANT, other_day).await,
        Err(LedgerError::NotFound(_))
    ));
}
