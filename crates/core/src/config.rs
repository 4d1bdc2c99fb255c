//! Configuration types shared across crates.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Tagging API configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Base URL of the tagging API (e.g., "https://api.example.com").
    #[serde(default = "default_api_url")]
    pub url: String,
    /// Basic auth username.
    #[serde(default)]
    pub username: String,
    /// Basic auth password.
    /// WARNING: Prefer the TRIPWIRE_API__PASSWORD env var over storing secrets in config files.
    #[serde(default)]
    pub password: String,
    /// HTTP client timeout in seconds.
    #[serde(default = "default_api_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_api_url() -> String {
    "http://127.0.0.1:8080".to_string()
}

fn default_api_timeout_secs() -> u64 {
    30
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            url: default_api_url(),
            username: String::new(),
            password: String::new(),
            timeout_secs: default_api_timeout_secs(),
        }
    }
}

impl ApiConfig {
    /// Get the HTTP client timeout as a Duration.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Beacon URL configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct BeaconConfig {
    /// Base URL embedded in documents. Falls back to the API URL when unset.
    pub base_url: Option<String>,
}

/// Storage backend configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StorageConfig {
    /// Remote storage service accepting chunked uploads.
    Http {
        /// Base URL of the storage service.
        endpoint: String,
        /// Access key sent in the `Authorization: AWS key:secret` header.
        #[serde(default)]
        access_key_id: String,
        /// Secret key sent in the `Authorization: AWS key:secret` header.
        #[serde(default)]
        secret_access_key: String,
    },
    /// Local filesystem storage.
    Filesystem {
        /// Root directory for storage.
        path: PathBuf,
        /// Store every kind directly under the root instead of per-kind subdirectories.
        #[serde(default)]
        flat: bool,
    },
    /// S3-compatible storage.
    S3 {
        /// Bucket name.
        bucket: String,
        /// Optional endpoint URL (for MinIO, etc.).
        endpoint: Option<String>,
        /// AWS region.
        region: Option<String>,
        /// Optional key prefix.
        prefix: Option<String>,
        /// AWS access key ID. Falls back to AWS_ACCESS_KEY_ID env var if not set.
        access_key_id: Option<String>,
        /// AWS secret access key. Falls back to AWS_SECRET_ACCESS_KEY env var if not set.
        secret_access_key: Option<String>,
        /// Force path-style URLs (required for MinIO). Defaults to false.
        #[serde(default)]
        force_path_style: bool,
    },
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self::Filesystem {
            path: PathBuf::from("./data/storage"),
            flat: false,
        }
    }
}

impl StorageConfig {
    /// Validate storage configuration invariants.
    pub fn validate(&self) -> Result<(), String> {
        match self {
            StorageConfig::Http { endpoint, .. } => {
                if endpoint.trim().is_empty() {
                    return Err("http storage requires a non-empty endpoint".to_string());
                }
                Ok(())
            }
            StorageConfig::S3 {
                access_key_id,
                secret_access_key,
                ..
            } => match (access_key_id.as_ref(), secret_access_key.as_ref()) {
                (Some(_), Some(_)) | (None, None) => Ok(()),
                _ => Err(
                    "s3 config requires both access_key_id and secret_access_key when either is set"
                        .to_string(),
                ),
            },
            StorageConfig::Filesystem { .. } => Ok(()),
        }
    }
}

/// Notification channel configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NotifyConfig {
    /// Server address as `host:port`.
    #[serde(default = "default_notify_address")]
    pub address: String,
    /// TLS server name presented during the handshake.
    #[serde(default = "default_server_name")]
    pub server_name: String,
    /// PEM bundle of trusted CA certificates.
    pub ca_cert_path: Option<PathBuf>,
    /// Handshake timeout in milliseconds.
    #[serde(default = "default_handshake_timeout_ms")]
    pub handshake_timeout_ms: u64,
}

fn default_notify_address() -> String {
    "127.0.0.1:4433".to_string()
}

fn default_server_name() -> String {
    "localhost".to_string()
}

fn default_handshake_timeout_ms() -> u64 {
    3000
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            address: default_notify_address(),
            server_name: default_server_name(),
            ca_cert_path: None,
            handshake_timeout_ms: default_handshake_timeout_ms(),
        }
    }
}

impl NotifyConfig {
    /// Get the handshake timeout as a Duration.
    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }
}

/// Identity reported with each tag.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct IdentityConfig {
    /// Username override. Resolved from the environment when unset.
    pub username: Option<String>,
    /// Correlation key attached to tags and registration.
    #[serde(default)]
    pub client_id: String,
}

/// Complete application configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub beacon: BeaconConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub notify: NotifyConfig,
    #[serde(default)]
    pub identity: IdentityConfig,
}

impl AppConfig {
    /// Base URL for beacons: the configured override, or the API URL.
    pub fn beacon_base(&self) -> &str {
        self.beacon
            .base_url
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or(&self.api.url)
    }

    /// Validate the whole configuration.
    pub fn validate(&self) -> crate::Result<()> {
        if self.api.url.trim().is_empty() {
            return Err(crate::Error::Config("api.url must not be empty".to_string()));
        }
        if self.notify.handshake_timeout_ms == 0 {
            return Err(crate::Error::Config(
                "notify.handshake_timeout_ms must be greater than zero".to_string(),
            ));
        }
        self.storage.validate().map_err(crate::Error::Config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_empty_document() {
        let config: AppConfig = toml::from_str("").unwrap();
        assert_eq!(config.api.url, "http://127.0.0.1:8080");
        assert_eq!(config.api.timeout(), Duration::from_secs(30));
        assert_eq!(config.notify.handshake_timeout(), Duration::from_secs(3));
        assert!(matches!(
            config.storage,
            StorageConfig::Filesystem { flat: false, .. }
        ));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_beacon_base_falls_back_to_api_url() {
        let mut config: AppConfig = toml::from_str(
            r#"
            [api]
            url = "https://api.example.com"
            "#,
        )
        .unwrap();
        assert_eq!(config.beacon_base(), "https://api.example.com");

        config.beacon.base_url = Some("https://b.example.com".to_string());
        assert_eq!(config.beacon_base(), "https://b.example.com");
    }

    #[test]
    fn test_storage_config_http_from_toml() {
        let config: AppConfig = toml::from_str(
            r#"
            [storage]
            type = "http"
            endpoint = "https://store.example.com"
            access_key_id = "key"
            secret_access_key = "secret"
            "#,
        )
        .unwrap();

        match &config.storage {
            StorageConfig::Http {
                endpoint,
                access_key_id,
                ..
            } => {
                assert_eq!(endpoint, "https://store.example.com");
                assert_eq!(access_key_id, "key");
            }
            _ => panic!("expected http config"),
        }
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_storage_config_http_rejects_empty_endpoint() {
        let config = StorageConfig::Http {
            endpoint: "  ".to_string(),
            access_key_id: String::new(),
            secret_access_key: String::new(),
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_storage_config_s3_validate_partial_credentials() {
        let invalid = StorageConfig::S3 {
            bucket: "bucket".to_string(),
            endpoint: None,
            region: None,
            prefix: None,
            access_key_id: Some("access-key".to_string()),
            secret_access_key: None,
            force_path_style: false,
        };
        assert!(invalid.validate().is_err());

        let valid = StorageConfig::S3 {
            bucket: "bucket".to_string(),
            endpoint: None,
            region: None,
            prefix: None,
            access_key_id: Some("access-key".to_string()),
            secret_access_key: Some("secret-key".to_string()),
            force_path_style: false,
        };
        assert!(valid.validate().is_ok());
    }

    #[test]
    fn test_storage_config_s3_force_path_style_defaults_to_false() {
        let json = r#"{"type":"s3","bucket":"test","endpoint":"https://s3.amazonaws.com"}"#;
        let config: StorageConfig = serde_json::from_str(json).unwrap();

        match config {
            StorageConfig::S3 {
                force_path_style, ..
            } => assert!(!force_path_style),
            _ => panic!("expected S3 config"),
        }
    }

    #[test]
    fn test_zero_handshake_timeout_rejected() {
        let mut config = AppConfig::default();
        config.notify.handshake_timeout_ms = 0;
        assert!(matches!(config.validate(), Err(crate::Error::Config(_))));
    }
}
