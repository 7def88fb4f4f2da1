use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::Path;

use crate::error::LedgerError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SigningMode {
    Simulated,
    Secp256k1,
}

impl std::str::FromStr for SigningMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "simulated" => Ok(SigningMode::Simulated),
            "secp256k1" => Ok(SigningMode::Secp256k1),
            _ => Err(format!("Unknown signing mode: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SigningConfig {
    pub mode: SigningMode,
    pub secret_key_path: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    pub server_host: String,
    pub server_port: u16,
    pub signing: SigningConfig,
    /// Rows fetched per page when walking a chain or building a report.
    pub page_size: i64,
    pub audit_log_max_limit: i64,
}

/// Optional TOML overlay; every field overrides the environment value when present.
#[derive(Debug, Default, Deserialize)]
struct FileOverlay {
    database_url: Option<String>,
    server_host: Option<String>,
    server_port: Option<u16>,
    page_size: Option<i64>,
    audit_log_max_limit: Option<i64>,
    signing: Option<SigningOverlay>,
}

#[derive(Debug, Default, Deserialize)]
struct SigningOverlay {
    mode: Option<SigningMode>,
    secret_key_path: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite://timecard_ledger.db".to_string(),
            server_host: "0.0.0.0".to_string(),
            server_port: 3000,
            signing: SigningConfig {
                mode: SigningMode::Simulated,
                secret_key_path: None,
            },
            page_size: 500,
            audit_log_max_limit: 200,
        }
    }
}

impl AppConfig {
    pub fn load() -> Result<Self, LedgerError> {
        let defaults = AppConfig::default();

        let database_url = env::var("DATABASE_URL").unwrap_or(defaults.database_url);

        let server_host = env::var("SERVER_HOST").unwrap_or(defaults.server_host);

        let server_port = match env::var("SERVER_PORT") {
            Ok(port) => port
                .parse()
                .map_err(|e| LedgerError::Config(format!("Invalid SERVER_PORT: {}", e)))?,
            Err(_) => defaults.server_port,
        };

        let mode = match env::var("SIGNING_MODE") {
            Ok(mode) => mode.parse().map_err(LedgerError::Config)?,
            Err(_) => defaults.signing.mode,
        };

        let secret_key_path = env::var("SIGNING_SECRET_KEY_PATH").ok();

        let page_size = match env::var("LEDGER_PAGE_SIZE") {
            Ok(size) => size
                .parse()
                .map_err(|e| LedgerError::Config(format!("Invalid LEDGER_PAGE_SIZE: {}", e)))?,
            Err(_) => defaults.page_size,
        };

        let audit_log_max_limit = match env::var("AUDIT_LOG_MAX_LIMIT") {
            Ok(limit) => limit.parse().map_err(|e| {
                LedgerError::Config(format!("Invalid AUDIT_LOG_MAX_LIMIT: {}", e))
            })?,
            Err(_) => defaults.audit_log_max_limit,
        };

        let mut config = AppConfig {
            database_url,
            server_host,
            server_port,
            signing: SigningConfig {
                mode,
                secret_key_path,
            },
            page_size,
            audit_log_max_limit,
        };

        if let Ok(path) = env::var("LEDGER_CONFIG") {
            config.apply_file(Path::new(&path))?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Overlay values from a TOML file on top of this configuration.
    pub fn apply_file(&mut self, path: &Path) -> Result<(), LedgerError> {
        let contents = fs::read_to_string(path)
            .map_err(|e| LedgerError::Config(format!("Failed to read {:?}: {}", path, e)))?;
        self.apply_toml(&contents)
            .map_err(|e| LedgerError::Config(format!("Failed to parse {:?}: {}", path, e)))
    }

    fn apply_toml(&mut self, contents: &str) -> Result<(), toml::de::Error> {
        let overlay: FileOverlay = toml::from_str(contents)?;

        if let Some(url) = overlay.database_url {
            self.database_url = url;
        }
        if let Some(host) = overlay.server_host {
            self.server_host = host;
        }
        if let Some(port) = overlay.server_port {
            self.server_port = port;
        }
        if let Some(size) = overlay.page_size {
            self.page_size = size;
        }
        if let Some(limit) = overlay.audit_log_max_limit {
            self.audit_log_max_limit = limit;
        }
        if let Some(signing) = overlay.signing {
            if let Some(mode) = signing.mode {
                self.signing.mode = mode;
            }
            if signing.secret_key_path.is_some() {
                self.signing.secret_key_path = signing.secret_key_path;
            }
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), LedgerError> {
        if self.page_size <= 0 {
            return Err(LedgerError::Config(format!(
                "page_size must be positive, got {}",
                self.page_size
            )));
        }

        if self.audit_log_max_limit <= 0 {
            return Err(LedgerError::Config(format!(
                "audit_log_max_limit must be positive, got {}",
                self.audit_log_max_limit
            )));
        }

        if self.signing.mode == SigningMode::Secp256k1 && self.signing.secret_key_path.is_none() {
            return Err(LedgerError::Config(
                "secp256k1 signing requires SIGNING_SECRET_KEY_PATH".to_string(),
            ));
        }

        Ok(())
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server_host, self.server_port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_toml_overlay() {
        let mut config = AppConfig::default();
        config
            .apply_toml(
                r#"
                server_port = 8080
                page_size = 50

                [signing]
                mode = "secp256k1"
                secret_key_path = "/etc/ledger/signing.key"
                "#,
            )
            .unwrap();

        assert_eq!(config.server_port, 8080);
        assert_eq!(config.page_size, 50);
        assert_eq!(config.signing.mode, SigningMode::Secp256k1);
        assert_eq!(config.database_url, "sqlite://timecard_ledger.db");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_secp256k1_requires_key_path() {
        let mut config = AppConfig::default();
        config.signing.mode = SigningMode::Secp256k1;
        assert!(matches!(config.validate(), Err(LedgerError::Config(_))));
    }

    #[test]
    fn test_signing_mode_parse() {
        assert_eq!("SIMULATED".parse::<SigningMode>(), Ok(SigningMode::Simulated));
        assert!("rsa".parse::<SigningMode>().is_err());
    }
}
