use thiserror::Error;

impl From<serde_json::Error> for LedgerError {
    fn from(err: serde_json::Error) -> Self {
        Self::ChainComputation(format!("JSON serialization error: {}", err))
    }
}

impl From<sqlx::Error> for LedgerError {
    fn from(err: sqlx::Error) -> Self {
        Self::Database(format!("Database error: {}", err))
    }
}

impl From<sqlx::migrate::MigrateError> for LedgerError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        Self::Database(format!("Migration error: {}", err))
    }
}

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(String),

    /// NSR could not be issued or durably recorded.
    #[error("Sequence error: {0}")]
    Sequence(String),

    #[error("Chain computation error: {0}")]
    ChainComputation(String),

    /// Writing the audit trail failed; the enclosing operation fails with it.
    #[error("Audit log failure: {0}")]
    AuditLogFailure(String),

    #[error("Report generation error: {0}")]
    ReportGeneration(String),

    #[error("Cryptographic error: {0}")]
    Crypto(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Backup error: {0}")]
    Backup(String),
}

pub type LedgerResult<T> = Result<T, LedgerError>;

impl LedgerError {
    pub fn entry_not_found(id: &str) -> Self {
        Self::NotFound(format!("Timecard entry {} not found", id))
    }

    pub fn report_not_found(id: &str) -> Self {
        Self::NotFound(format!("Compliance report {} not found", id))
    }

    /// Wraps a lower-level failure as an audit failure, keeping its message.
    pub fn audit(err: impl std::fmt::Display) -> Self {
        Self::AuditLogFailure(err.to_string())
    }

    pub fn report(err: impl std::fmt::Display) -> Self {
        Self::ReportGeneration(err.to_string())
    }
}
