pub mod backup;
pub mod report;

pub use backup::BackupVerifier;
pub use report::{verify_report_hash, ReportGenerator, ReportSummary, ReportType};
