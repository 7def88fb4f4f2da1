//! Signing Key Management
//!
//! Per-tenant signing key metadata: lookup of the usable key at signing time,
//! plus provisioning and revocation for operators.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteExecutor, SqlitePool};
use tracing::info;
use uuid::Uuid;

use crate::database::models::DigitalSignatureKey;
use crate::error::LedgerError;

const KEY_COLUMNS: &str = "id, tenant_id, key_name, key_algorithm, public_key, is_active, \
     expires_at, revocation_reason, created_at";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum KeyStatus {
    Active,
    Expired,
    Revoked,
    Inactive,
}

impl KeyStatus {
    pub fn of(key: &DigitalSignatureKey, now: DateTime<Utc>) -> Self {
        if key.revocation_reason.is_some() {
            KeyStatus::Revoked
        } else if !key.is_active {
            KeyStatus::Inactive
        } else if key.expires_at.map_or(false, |expires| expires <= now) {
            KeyStatus::Expired
        } else {
            KeyStatus::Active
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            KeyStatus::Active => "ACTIVE",
            KeyStatus::Expired => "EXPIRED",
            KeyStatus::Revoked => "REVOKED",
            KeyStatus::Inactive => "INACTIVE",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyStatusReport {
    #[serde(flatten)]
    pub key: DigitalSignatureKey,
    pub status: KeyStatus,
}

#[derive(Debug, Clone)]
pub struct NewSigningKey {
    pub tenant_id: String,
    pub key_name: String,
    pub key_algorithm: String,
    pub public_key: String,
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Clone)]
pub struct KeyStore {
    pool: SqlitePool,
}

impl KeyStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Newest key that is active and unexpired at `now`, if any.
    pub async fn usable_key<'e, E>(
        executor: E,
        tenant_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<DigitalSignatureKey>, LedgerError>
    where
        E: SqliteExecutor<'e>,
    {
        let row = sqlx::query(&format!(
            r#"
            SELECT {} FROM digital_signature_keys
            WHERE tenant_id = ? AND is_active = 1 AND revocation_reason IS NULL
              AND (expires_at IS NULL OR expires_at > ?)
            ORDER BY created_at DESC
            LIMIT 1
            "#,
            KEY_COLUMNS
        ))
        .bind(tenant_id)
        .bind(now)
        .fetch_optional(executor)
        .await?;

        row.as_ref().map(key_from_row).transpose()
    }

    pub async fn register_key(
        &self,
        key: NewSigningKey,
    ) -> Result<DigitalSignatureKey, LedgerError> {
        if key.tenant_id.is_empty() || key.key_name.is_empty() || key.public_key.is_empty() {
            return Err(LedgerError::Validation(
                "tenant, key name and public key are required".to_string(),
            ));
        }

        let stored = DigitalSignatureKey {
            id: Uuid::new_v4().to_string(),
            tenant_id: key.tenant_id,
            key_name: key.key_name,
            key_algorithm: key.key_algorithm,
            public_key: key.public_key,
            is_active: true,
            expires_at: key.expires_at,
            revocation_reason: None,
            created_at: Utc::now(),
        };

        sqlx::query(&format!(
            "INSERT INTO digital_signature_keys ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
            KEY_COLUMNS
        ))
        .bind(&stored.id)
        .bind(&stored.tenant_id)
        .bind(&stored.key_name)
        .bind(&stored.key_algorithm)
        .bind(&stored.public_key)
        .bind(stored.is_active)
        .bind(stored.expires_at)
        .bind(&stored.revocation_reason)
        .bind(stored.created_at)
        .execute(&self.pool)
        .await?;

        info!(
            "Registered signing key {} ({}) for tenant {}",
            stored.key_name, stored.key_algorithm, stored.tenant_id
        );
        Ok(stored)
    }

    pub async fn revoke_key(
        &self,
        tenant_id: &str,
        key_id: &str,
        reason: &str,
    ) -> Result<(), LedgerError> {
        let result = sqlx::query(
            r#"
            UPDATE digital_signature_keys
            SET is_active = 0, revocation_reason = ?
            WHERE tenant_id = ? AND id = ?
            "#,
        )
        .bind(reason)
        .bind(tenant_id)
        .bind(key_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(LedgerError::NotFound(format!("Signing key {} not found", key_id)));
        }

        info!("Revoked signing key {} for tenant {}: {}", key_id, tenant_id, reason);
        Ok(())
    }

    pub async fn list_keys(&self, tenant_id: &str) -> Result<Vec<KeyStatusReport>, LedgerError> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM digital_signature_keys WHERE tenant_id = ? ORDER BY created_at DESC",
            KEY_COLUMNS
        ))
        .bind(tenant_id)
        .fetch_all(&self.pool)
        .await?;

        let now = Utc::now();
        rows.iter()
            .map(|row| {
                let key = key_from_row(row)?;
                let status = KeyStatus::of(&key, now);
                Ok(KeyStatusReport { key, status })
            })
            .collect()
    }
}

fn key_from_row(row: &SqliteRow) -> Result<DigitalSignatureKey, LedgerError> {
    Ok(DigitalSignatureKey {
        id: row.try_get("id")?,
        tenant_id: row.try_get("tenant_id")?,
        key_name: row.try_get("key_name")?,
        key_algorithm: row.try_get("key_algorithm")?,
        public_key: row.try_get("public_key")?,
        is_active: row.try_get("is_active")?,
        expires_at: row.try_get("expires_at")?,
        revocation_reason: row.try_get("revocation_reason")?,
        created_at: row.try_get("created_at")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::Database;
    use chrono::Duration;

    fn new_key(name: &str, expires_at: Option<DateTime<Utc>>) -> NewSigningKey {
        NewSigningKey {
            tenant_id: "tenant-a".to_string(),
            key_name: name.to_string(),
            key_algorithm: "RSA-2048".to_string(),
            public_key: format!("public-{}", name),
            expires_at,
        }
    }

    #[tokio::test]
    async fn test_usable_key_skips_expired_and_revoked() {
        let db = Database::new_in_memory().await.unwrap();
        let store = KeyStore::new(db.pool().clone());
        let now = Utc::now();

        assert!(KeyStore::usable_key(db.pool(), "tenant-a", now).await.unwrap().is_none());

        store
            .register_key(new_key("expired", Some(now - Duration::days(1))))
            .await
            .unwrap();
        assert!(KeyStore::usable_key(db.pool(), "tenant-a", now).await.unwrap().is_none());

        let current = store
            .register_key(new_key("current", Some(now + Duration::days(30))))
            .await
            .unwrap();
        let usable = KeyStore::usable_key(db.pool(), "tenant-a", now).await.unwrap().unwrap();
        assert_eq!(usable.id, current.id);
        assert_eq!(KeyStatus::of(&usable, now), KeyStatus::Active);

        store.revoke_key("tenant-a", &current.id, "compromised").await.unwrap();
        assert!(KeyStore::usable_key(db.pool(), "tenant-a", now).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_list_keys_reports_status() {
        let db = Database::new_in_memory().await.unwrap();
        let store = KeyStore::new(db.pool().clone());
        let now = Utc::now();

        store
            .register_key(new_key("old", Some(now - Duration::hours(1))))
            .await
            .unwrap();
        let revoked = store.register_key(new_key("lost", None)).await.unwrap();
        store.revoke_key("tenant-a", &revoked.id, "device lost").await.unwrap();
        store.register_key(new_key("live", None)).await.unwrap();

        let keys = store.list_keys("tenant-a").await.unwrap();
        let status_of = |name: &str| {
            keys.iter()
                .find(|k| k.key.key_name == name)
                .map(|k| k.status)
                .unwrap()
        };

        assert_eq!(keys.len(), 3);
        assert_eq!(status_of("old"), KeyStatus::Expired);
        assert_eq!(status_of("lost"), KeyStatus::Revoked);
        assert_eq!(status_of("live"), KeyStatus::Active);
    }

    #[tokio::test]
    async fn test_revoke_unknown_key() {
        let db = Database::new_in_memory().await.unwrap();
        let store = KeyStore::new(db.pool().clone());
        assert!(matches!(
            store.revoke_key("tenant-a", "missing", "n/a").await,
            Err(LedgerError::NotFound(_))
        ));
    }
}
