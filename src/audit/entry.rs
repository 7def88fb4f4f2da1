//! Audit Log Entry
//!
//! Immutable record of an action taken against a timecard entry. Each entry
//! carries a SHA-256 over its own canonicalized fields; entries are not
//! chained to one another.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::ledger::chain::{hash_value, iso_timestamp};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AuditAction {
    Create,
    Update,
    Delete,
    Approve,
    Reject,
    /// Hash fields rewritten by an integrity rebuild.
    Rebuild,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::Create => "CREATE",
            AuditAction::Update => "UPDATE",
            AuditAction::Delete => "DELETE",
            AuditAction::Approve => "APPROVE",
            AuditAction::Reject => "REJECT",
            AuditAction::Rebuild => "REBUILD",
        }
    }
}

impl std::str::FromStr for AuditAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "CREATE" => Ok(AuditAction::Create),
            "UPDATE" => Ok(AuditAction::Update),
            "DELETE" => Ok(AuditAction::Delete),
            "APPROVE" => Ok(AuditAction::Approve),
            "REJECT" => Ok(AuditAction::Reject),
            "REBUILD" => Ok(AuditAction::Rebuild),
            _ => Err(format!("Unknown audit action: {}", s)),
        }
    }
}

/// Who performed an action and from where.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionContext {
    pub performed_by: String,
    pub ip_address: String,
    pub user_agent: Option<String>,
    pub device_info: Option<Value>,
    pub reason: Option<String>,
}

impl ActionContext {
    pub fn new(performed_by: impl Into<String>, ip_address: impl Into<String>) -> Self {
        Self {
            performed_by: performed_by.into(),
            ip_address: ip_address.into(),
            ..Default::default()
        }
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditLogEntry {
    pub id: Option<i64>,
    pub tenant_id: String,
    pub timecard_entry_id: String,
    pub nsr: i64,
    pub action: AuditAction,
    pub performed_by: String,
    pub performed_at: DateTime<Utc>,
    pub old_values: Option<Value>,
    pub new_values: Option<Value>,
    pub reason: Option<String>,
    pub ip_address: String,
    pub user_agent: Option<String>,
    pub device_info: Option<Value>,
    pub audit_hash: String,
    pub is_system_generated: bool,
}

impl AuditLogEntry {
    /// Build an entry stamped now, with its hash already computed.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        tenant_id: &str,
        timecard_entry_id: &str,
        nsr: i64,
        action: AuditAction,
        context: &ActionContext,
        old_values: Option<Value>,
        new_values: Option<Value>,
        is_system_generated: bool,
    ) -> Self {
        let mut entry = Self {
            id: None,
            tenant_id: tenant_id.to_string(),
            timecard_entry_id: timecard_entry_id.to_string(),
            nsr,
            action,
            performed_by: context.performed_by.clone(),
            performed_at: Utc::now(),
            old_values,
            new_values,
            reason: context.reason.clone(),
            ip_address: context.ip_address.clone(),
            user_agent: context.user_agent.clone(),
            device_info: context.device_info.clone(),
            audit_hash: String::new(),
            is_system_generated,
        };

        entry.audit_hash = entry.calculate_hash();
        entry
    }

    /// Canonical object the audit hash covers.
    pub fn canonical_value(&self) -> Value {
        json!({
            "tenantId": self.tenant_id,
            "timecardEntryId": self.timecard_entry_id,
            "nsr": self.nsr,
            "action": self.action.as_str(),
            "performedBy": self.performed_by,
            "performedAt": iso_timestamp(self.performed_at),
            "oldValues": self.old_values,
            "newValues": self.new_values,
            "ipAddress": self.ip_address,
            "userAgent": self.user_agent,
            "deviceInfo": self.device_info,
        })
    }

    pub fn calculate_hash(&self) -> String {
        hash_value(&self.canonical_value())
    }

    pub fn verify_hash(&self) -> bool {
        self.audit_hash == self.calculate_hash()
    }

    pub fn summary(&self) -> String {
        format!(
            "{} NSR {} ({}) by {}",
            self.action.as_str(),
            self.nsr,
            self.timecard_entry_id,
            self.performed_by
        )
    }
}
