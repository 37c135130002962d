use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::PathBuf;

use crate::generate_service_cert::SignaturePolicy;
use crate::service_health::NodeRole;

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    #[serde(default = "default_node_role")]
    pub node_role: NodeRole,
    #[serde(default)]
    pub control: ControlConfig,
    #[serde(default)]
    pub storage_engine: StorageEngineConfig,
    #[serde(default)]
    pub certificate_authority: CertificateAuthorityConfig,
}

fn default_node_role() -> NodeRole {
    NodeRole::Bootstrap
}

#[derive(Debug, Deserialize, Clone)]
pub struct ControlConfig {
    #[serde(default = "default_ctl_path")]
    pub ctl_path: PathBuf,
    #[serde(default = "default_service_dir")]
    pub service_dir: PathBuf,
    #[serde(default = "default_status_timeout_secs")]
    pub status_timeout_secs: u64,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            ctl_path: default_ctl_path(),
            service_dir: default_service_dir(),
            status_timeout_secs: default_status_timeout_secs(),
        }
    }
}

fn default_ctl_path() -> PathBuf {
    PathBuf::from("/opt/nimbus/bin/nimbus-ctl")
}

fn default_service_dir() -> PathBuf {
    PathBuf::from("/opt/nimbus/service")
}

fn default_status_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageEngineConfig {
    #[serde(default = "default_storage_engine_data_dir")]
    pub data_dir: PathBuf,
}

impl Default for StorageEngineConfig {
    fn default() -> Self {
        Self {
            data_dir: default_storage_engine_data_dir(),
        }
    }
}

fn default_storage_engine_data_dir() -> PathBuf {
    PathBuf::from("/var/opt/nimbus/postgresql/data")
}

#[derive(Debug, Deserialize, Clone)]
pub struct CertificateAuthorityConfig {
    /// Deployed trust chains pin the historical certificate shape, so the
    /// shipped default stays `legacy-interop`; flip to `modern` only for
    /// fleets with no legacy consumers.
    #[serde(default = "default_signature_policy")]
    pub signature_policy: SignaturePolicy,
    #[serde(default = "default_cert_validity_days")]
    pub validity_days: u32,
}

impl Default for CertificateAuthorityConfig {
    fn default() -> Self {
        Self {
            signature_policy: default_signature_policy(),
            validity_days: default_cert_validity_days(),
        }
    }
}

fn default_signature_policy() -> SignaturePolicy {
    SignaturePolicy::LegacyInterop
}

fn default_cert_validity_days() -> u32 {
    3650 // 10 years
}

impl AppConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: &str) -> Result<Self> {
        let config_str =
            fs::read_to_string(path).context(format!("Failed to read config file: {}", path))?;

        let config: AppConfig =
            toml::from_str(&config_str).context("Failed to parse config file")?;

        Ok(config)
    }

    /// Load `config.toml` if present, otherwise fall back to defaults:
    /// a node with no config file runs with the packaged paths.
    pub fn load_or_default(path: &str) -> Result<Self> {
        if std::path::Path::new(path).exists() {
            Self::from_file(path)
        } else {
            Ok(Self::default())
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            node_role: default_node_role(),
            control: ControlConfig::default(),
            storage_engine: StorageEngineConfig::default(),
            certificate_authority: CertificateAuthorityConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_when_sections_missing() {
        let config: AppConfig = toml::from_str("").unwrap();
        assert_eq!(config.node_role, NodeRole::Bootstrap);
        assert_eq!(
            config.control.ctl_path,
            PathBuf::from("/opt/nimbus/bin/nimbus-ctl")
        );
        assert_eq!(config.control.status_timeout_secs, 30);
        assert_eq!(
            config.certificate_authority.signature_policy,
            SignaturePolicy::LegacyInterop
        );
        assert_eq!(config.certificate_authority.validity_days, 3650);
    }

    #[test]
    fn test_partial_file_overrides() {
        let config: AppConfig = toml::from_str(
            r#"
node_role = "follower"

[control]
ctl_path = "/usr/local/bin/nimbus-ctl"

[certificate_authority]
signature_policy = "modern"
"#,
        )
        .unwrap();
        assert_eq!(config.node_role, NodeRole::Follower);
        assert_eq!(
            config.control.ctl_path,
            PathBuf::from("/usr/local/bin/nimbus-ctl")
        );
        // Untouched fields keep their defaults.
        assert_eq!(
            config.control.service_dir,
            PathBuf::from("/opt/nimbus/service")
        );
        assert_eq!(
            config.certificate_authority.signature_policy,
            SignaturePolicy::Modern
        );
    }

    #[test]
    fn test_load_or_default_without_file() {
        let config = AppConfig::load_or_default("/definitely/not/here.toml").unwrap();
        assert_eq!(
            config.storage_engine.data_dir,
            PathBuf::from("/var/opt/nimbus/postgresql/data")
        );
    }
}
