//! Audit Log System
//!
//! Records every mutating action taken against a timecard entry as an
//! immutable, individually hashed audit entry.

pub mod entry;
pub mod logger;

pub use entry::{ActionContext, AuditAction, AuditLogEntry};
pub use logger::{AuditLogFilter, AuditLogPage, AuditLogger};
