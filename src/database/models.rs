use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EntryStatus {
    Pending,
    Approved,
    Rejected,
}

impl EntryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryStatus::Pending => "PENDING",
            EntryStatus::Approved => "APPROVED",
            EntryStatus::Rejected => "REJECTED",
        }
    }
}

impl std::str::FromStr for EntryStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(EntryStatus::Pending),
            "APPROVED" => Ok(EntryStatus::Approved),
            "REJECTED" => Ok(EntryStatus::Rejected),
            _ => Err(format!("Unknown entry status: {}", s)),
        }
    }
}

/// One clock-in/out record and its chain fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimecardEntry {
    pub id: String,
    pub tenant_id: String,
    pub user_id: String,
    pub check_in: Option<DateTime<Utc>>,
    pub check_out: Option<DateTime<Utc>>,
    pub break_start: Option<DateTime<Utc>>,
    pub break_end: Option<DateTime<Utc>>,
    pub total_hours: Option<String>,
    pub notes: Option<String>,
    pub location: Option<String>,
    pub is_manual_entry: bool,
    pub device_info: Option<Value>,
    pub ip_address: Option<String>,
    pub geo_location: Option<Value>,
    pub status: EntryStatus,
    pub nsr: i64,
    pub record_hash: String,
    pub previous_record_hash: Option<String>,
    pub original_record_hash: String,
    pub hash_generated_at: DateTime<Utc>,
    pub digital_signature: Option<String>,
    pub signature_timestamp: Option<DateTime<Utc>>,
    pub signed_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Payload submitted for a new clock event, before any chain fields exist.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTimecardEntry {
    pub tenant_id: String,
    pub user_id: String,
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
    pub ip_address: Option<String>,
    pub geo_location: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NsrSequence {
    pub tenant_id: String,
    pub current_nsr: i64,
    pub last_updated: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DigitalSignatureKey {
    pub id: String,
    pub tenant_id: String,
    pub key_name: String,
    pub key_algorithm: String,
    pub public_key: String,
    pub is_active: bool,
    pub expires_at: Option<DateTime<Utc>>,
    pub revocation_reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComplianceReport {
    pub id: String,
    pub tenant_id: String,
    pub report_type: String,
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
    pub total_records: i64,
    pub total_employees: i64,
    pub total_hours: String,
    pub report_hash: String,
    pub report_content: Value,
    pub generated_by: String,
    pub is_submitted_to_authorities: bool,
    pub submission_date: Option<DateTime<Utc>>,
    pub submission_protocol: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimecardBackup {
    pub id: String,
    pub tenant_id: String,
    pub backup_date: NaiveDate,
    pub backup_path: String,
    pub file_size: i64,
    pub record_count: i64,
    pub backup_hash: String,
    pub is_verified: bool,
    pub verification_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}
