use chrono::{DateTime, Utc};
use secp256k1::{ecdsa::Signature, Message, PublicKey, Secp256k1, SecretKey};
use sha2::{Digest, Sha256};
use std::str::FromStr;
use std::sync::Arc;
use tracing::info;

use crate::config::{SigningConfig, SigningMode};
use crate::database::models::DigitalSignatureKey;
use crate::error::LedgerError;
use crate::ledger::chain::{iso_timestamp, sha256_hex};

/// Binds a payload to a tenant signing key.
///
/// Signatures are opaque strings of the form `<ALGORITHM>:<hex>`.
pub trait RecordSigner: Send + Sync {
    fn sign(
        &self,
        payload: &str,
        key: &DigitalSignatureKey,
        signed_at: DateTime<Utc>,
    ) -> Result<String, LedgerError>;

    fn verify(
        &self,
        payload: &str,
        signature: &str,
        key: &DigitalSignatureKey,
        signed_at: DateTime<Utc>,
    ) -> Result<bool, LedgerError>;
}

fn split_signature(signature: &str) -> Result<(&str, &str), LedgerError> {
    signature
        .split_once(':')
        .ok_or_else(|| LedgerError::Crypto(format!("Malformed signature: {}", signature)))
}

/// Placeholder signer: a SHA-256 over payload, public key material and signing
/// time, tagged with the key's algorithm. No private key is involved, so this
/// proves nothing to a third party.
#[derive(Debug, Clone, Default)]
pub struct SimulatedSigner;

impl SimulatedSigner {
    fn digest(payload: &str, key: &DigitalSignatureKey, signed_at: DateTime<Utc>) -> String {
        let material = format!(
            "{}:{}:{}",
            payload,
            key.public_key,
            iso_timestamp(signed_at)
        );
        sha256_hex(material.as_bytes())
    }
}

impl RecordSigner for SimulatedSigner {
    fn sign(
        &self,
        payload: &str,
        key: &DigitalSignatureKey,
        signed_at: DateTime<Utc>,
    ) -> Result<String, LedgerError> {
        Ok(format!(
            "{}:{}",
            key.key_algorithm,
            Self::digest(payload, key, signed_at)
        ))
    }

    fn verify(
        &self,
        payload: &str,
        signature: &str,
        key: &DigitalSignatureKey,
        signed_at: DateTime<Utc>,
    ) -> Result<bool, LedgerError> {
        let (algorithm, digest) = split_signature(signature)?;
        Ok(algorithm == key.key_algorithm && digest == Self::digest(payload, key, signed_at))
    }
}

pub const SECP256K1_ALGORITHM: &str = "ECDSA-SECP256K1";

/// ECDSA signer holding a secp256k1 secret key.
///
/// The signed message is the SHA-256 of `payload:signed_at`; it only signs for
/// key records whose public key matches its own secret.
pub struct Secp256k1Signer {
    secp: Secp256k1<secp256k1::All>,
    secret_key: SecretKey,
    public_key: PublicKey,
}

impl Secp256k1Signer {
    pub fn new(secret_key: SecretKey) -> Self {
        let secp = Secp256k1::new();
        let public_key = PublicKey::from_secret_key(&secp, &secret_key);
        Self {
            secp,
            secret_key,
            public_key,
        }
    }

    pub fn from_hex(secret_hex: &str) -> Result<Self, LedgerError> {
        let bytes = hex::decode(secret_hex.trim())
            .map_err(|e| LedgerError::Crypto(format!("Invalid secret key hex: {}", e)))?;
        let secret_key = SecretKey::from_slice(&bytes)
            .map_err(|e| LedgerError::Crypto(format!("Invalid secret key: {}", e)))?;
        Ok(Self::new(secret_key))
    }

    pub fn public_key_hex(&self) -> String {
        self.public_key.to_string()
    }

    fn message(payload: &str, signed_at: DateTime<Utc>) -> Result<Message, LedgerError> {
        let digest = Sha256::digest(format!("{}:{}", payload, iso_timestamp(signed_at)).as_bytes());
        Message::from_digest_slice(&digest)
            .map_err(|e| LedgerError::Crypto(format!("Invalid message hash: {}", e)))
    }

    fn key_public(key: &DigitalSignatureKey) -> Result<PublicKey, LedgerError> {
        PublicKey::from_str(&key.public_key).map_err(|e| {
            LedgerError::Crypto(format!("Invalid public key for {}: {}", key.key_name, e))
        })
    }
}

impl RecordSigner for Secp256k1Signer {
    fn sign(
        &self,
        payload: &str,
        key: &DigitalSignatureKey,
        signed_at: DateTime<Utc>,
    ) -> Result<String, LedgerError> {
        if Self::key_public(key)? != self.public_key {
            return Err(LedgerError::Crypto(format!(
                "Signing key {} does not match the configured secret",
                key.key_name
            )));
        }

        let message = Self::message(payload, signed_at)?;
        let signature = self.secp.sign_ecdsa(&message, &self.secret_key);
        Ok(format!(
            "{}:{}",
            SECP256K1_ALGORITHM,
            hex::encode(signature.serialize_compact())
        ))
    }

    fn verify(
        &self,
        payload: &str,
        signature: &str,
        key: &DigitalSignatureKey,
        signed_at: DateTime<Utc>,
    ) -> Result<bool, LedgerError> {
        let (algorithm, encoded) = split_signature(signature)?;
        if algorithm != SECP256K1_ALGORITHM {
            return Ok(false);
        }

        let bytes = hex::decode(encoded)
            .map_err(|e| LedgerError::Crypto(format!("Invalid signature hex: {}", e)))?;
        let signature = Signature::from_compact(&bytes)
            .map_err(|e| LedgerError::Crypto(format!("Invalid signature format: {}", e)))?;
        let message = Self::message(payload, signed_at)?;
        let public_key = Self::key_public(key)?;

        Ok(self.secp.verify_ecdsa(&message, &signature, &public_key).is_ok())
    }
}

/// Build the signer selected by configuration. The secp256k1 secret is read
/// as hex from `secret_key_path`.
pub fn signer_from_config(config: &SigningConfig) -> Result<Arc<dyn RecordSigner>, LedgerError> {
    match config.mode {
        SigningMode::Simulated => {
            info!("Using simulated record signer");
            Ok(Arc::new(SimulatedSigner))
        }
        SigningMode::Secp256k1 => {
            let path = config.secret_key_path.as_deref().ok_or_else(|| {
                LedgerError::Config("secp256k1 signing requires a secret key path".to_string())
            })?;
            let secret_hex = std::fs::read_to_string(path)
                .map_err(|e| LedgerError::Config(format!("Failed to read {}: {}", path, e)))?;
            let signer = Secp256k1Signer::from_hex(&secret_hex)?;
            info!("Using secp256k1 record signer ({})", signer.public_key_hex());
            Ok(Arc::new(signer))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn key(algorithm: &str, public_key: &str) -> DigitalSignatureKey {
        DigitalSignatureKey {
            id: "key-1".to_string(),
            tenant_id: "tenant-a".to_string(),
            key_name: "primary".to_string(),
            key_algorithm: algorithm.to_string(),
            public_key: public_key.to_string(),
            is_active: true,
            expires_at: None,
            revocation_reason: None,
            created_at: Utc::now(),
        }
    }

    fn signed_at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 9, 0, 0).unwrap()
    }

    #[test]
    fn test_simulated_signature_format() {
        let signer = SimulatedSigner;
        let key = key("RSA-2048", "-----BEGIN PUBLIC KEY-----abc");

        let signature = signer.sign("deadbeef", &key, signed_at()).unwrap();
        let (algorithm, digest) = signature.split_once(':').unwrap();
        assert_eq!(algorithm, "RSA-2048");
        assert_eq!(digest.len(), 64);

        assert!(signer.verify("deadbeef", &signature, &key, signed_at()).unwrap());
        assert!(!signer.verify("deadbeee", &signature, &key, signed_at()).unwrap());
    }

    #[test]
    fn test_secp256k1_sign_and_verify() {
        let signer = Secp256k1Signer::from_hex(&"11".repeat(32)).unwrap();
        let key = key(SECP256K1_ALGORITHM, &signer.public_key_hex());

        let signature = signer.sign("record-hash", &key, signed_at()).unwrap();
        assert!(signature.starts_with("ECDSA-SECP256K1:"));
        assert!(signer.verify("record-hash", &signature, &key, signed_at()).unwrap());
        assert!(!signer.verify("other-hash", &signature, &key, signed_at()).unwrap());
    }

    #[test]
    fn test_secp256k1_refuses_foreign_key() {
        let signer = Secp256k1Signer::from_hex(&"11".repeat(32)).unwrap();
        let other = Secp256k1Signer::from_hex(&"22".repeat(32)).unwrap();
        let key = key(SECP256K1_ALGORITHM, &other.public_key_hex());

        assert!(matches!(
            signer.sign("record-hash", &key, signed_at()),
            Err(LedgerError::Crypto(_))
        ));
    }

    #[test]
    fn test_rejects_malformed_secret() {
        assert!(Secp256k1Signer::from_hex("not-hex").is_err());
        assert!(Secp256k1Signer::from_hex(&"00".repeat(32)).is_err());
    }
}
