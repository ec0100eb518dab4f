//! Operator configuration loaded from the environment

use std::fs;
use std::time::Duration;

use crate::error::{Error, Result};

/// Default metrics port
pub const DEFAULT_METRICS_PORT: u16 = 8080;

/// Default interval between drift checks of a Ready group
pub const DEFAULT_RESYNC_INTERVAL: Duration = Duration::from_secs(300);

/// Default Vault HTTP timeout
pub const DEFAULT_VAULT_TIMEOUT: Duration = Duration::from_secs(15);

/// Connection settings for the Vault server
#[derive(Clone)]
pub struct VaultConfig {
    /// Vault server URL (VAULT_ADDR)
    pub addr: String,
    /// Token sent as X-Vault-Token (VAULT_TOKEN)
    pub token: String,
    /// Enterprise namespace sent as X-Vault-Namespace (VAULT_NAMESPACE)
    pub namespace: Option<String>,
    /// HTTP timeout per request (VAULT_HTTP_TIMEOUT_SECS)
    pub timeout: Duration,
    /// PEM or DER CA bundle contents (read from VAULT_CACERT)
    pub ca_cert: Option<Vec<u8>>,
    /// Disable TLS verification (VAULT_SKIP_VERIFY)
    pub skip_verify: bool,
}

impl std::fmt::Debug for VaultConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VaultConfig")
            .field("addr", &self.addr)
            .field("namespace", &self.namespace)
            .field("timeout", &self.timeout)
            .field("ca_cert", &self.ca_cert.as_ref().map(|c| c.len()))
            .field("skip_verify", &self.skip_verify)
            .finish_non_exhaustive()
    }
}

impl VaultConfig {
    /// Load from process environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load using an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let addr = lookup("VAULT_ADDR")
            .filter(|v| !v.is_empty())
            .ok_or_else(|| Error::config("set VAULT_ADDR to the Vault server URL"))?;
        let token = lookup("VAULT_TOKEN")
            .filter(|v| !v.is_empty())
            .ok_or_else(|| Error::config("set VAULT_TOKEN for Vault authentication"))?;
        let namespace = lookup("VAULT_NAMESPACE").filter(|v| !v.is_empty());

        let timeout = match lookup("VAULT_HTTP_TIMEOUT_SECS") {
            Some(raw) => {
                let secs = raw.parse::<u64>().map_err(|e| {
                    Error::config(format!("Invalid VAULT_HTTP_TIMEOUT_SECS '{}': {}", raw, e))
                })?;
                if secs == 0 {
                    return Err(Error::config("VAULT_HTTP_TIMEOUT_SECS must be greater than 0"));
                }
                Duration::from_secs(secs)
            }
            None => DEFAULT_VAULT_TIMEOUT,
        };

        let ca_cert = lookup("VAULT_CACERT")
            .filter(|v| !v.is_empty())
            .map(|path| {
                fs::read(&path)
                    .map_err(|e| Error::config(format!("Failed to read VAULT_CACERT {}: {}", path, e)))
            })
            .transpose()?;

        let skip_verify = lookup("VAULT_SKIP_VERIFY")
            .map(|v| parse_bool(&v))
            .unwrap_or(false);

        Ok(Self {
            addr,
            token,
            namespace,
            timeout,
            ca_cert,
            skip_verify,
        })
    }
}

/// Top-level operator configuration
#[derive(Clone, Debug)]
pub struct OperatorConfig {
    pub metrics_port: u16,
    pub resync_interval: Duration,
    pub vault: VaultConfig,
}

impl OperatorConfig {
    /// Load from process environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load using an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let metrics_port = match lookup("METRICS_PORT") {
            Some(raw) => raw
                .parse::<u16>()
                .map_err(|e| Error::config(format!("Invalid METRICS_PORT '{}': {}", raw, e)))?,
            None => DEFAULT_METRICS_PORT,
        };

        let resync_interval = match lookup("RESYNC_INTERVAL_SECS") {
            Some(raw) => raw
                .parse::<u64>()
                .ok()
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs)
                .ok_or_else(|| Error::config(format!("Invalid RESYNC_INTERVAL_SECS '{}'", raw)))?,
            None => DEFAULT_RESYNC_INTERVAL,
        };

        let vault = VaultConfig::from_lookup(&lookup)?;

        Ok(Self {
            metrics_port,
            resync_interval,
            vault,
        })
    }
}

fn parse_bool(value: &str) -> bool {
    matches!(value.trim(), "1" | "true" | "TRUE" | "True" | "yes")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn lookup_from(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_vault_config_defaults() {
        let config = VaultConfig::from_lookup(lookup_from(&[
            ("VAULT_ADDR", "http://127.0.0.1:8200"),
            ("VAULT_TOKEN", "root"),
        ]))
        .unwrap();

        assert_eq!(config.addr, "http://127.0.0.1:8200");
        assert_eq!(config.namespace, None);
        assert_eq!(config.timeout, DEFAULT_VAULT_TIMEOUT);
        assert!(config.ca_cert.is_none());
        assert!(!config.skip_verify);
    }

    #[test]
    fn test_vault_config_requires_addr_and_token() {
        let err = VaultConfig::from_lookup(lookup_from(&[("VAULT_TOKEN", "root")])).unwrap_err();
        assert!(err.to_string().contains("VAULT_ADDR"));

        let err = VaultConfig::from_lookup(lookup_from(&[("VAULT_ADDR", "http://vault:8200")]))
            .unwrap_err();
        assert!(err.to_string().contains("VAULT_TOKEN"));
    }

    #[test]
    fn test_vault_config_rejects_zero_timeout() {
        let err = VaultConfig::from_lookup(lookup_from(&[
            ("VAULT_ADDR", "http://vault:8200"),
            ("VAULT_TOKEN", "root"),
            ("VAULT_HTTP_TIMEOUT_SECS", "0"),
        ]))
        .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_vault_config_reads_ca_bundle() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "-----BEGIN CERTIFICATE-----\ntest-ca\n-----END CERTIFICATE-----").unwrap();
        let path = file.path().to_string_lossy().to_string();

        let config = VaultConfig::from_lookup(lookup_from(&[
            ("VAULT_ADDR", "https://vault:8200"),
            ("VAULT_TOKEN", "root"),
            ("VAULT_CACERT", path.as_str()),
            ("VAULT_SKIP_VERIFY", "true"),
            ("VAULT_NAMESPACE", "team-a"),
        ]))
        .unwrap();

        let ca = String::from_utf8(config.ca_cert.unwrap()).unwrap();
        assert!(ca.contains("test-ca"));
        assert!(config.skip_verify);
        assert_eq!(config.namespace.as_deref(), Some("team-a"));
    }

    #[test]
    fn test_vault_config_missing_ca_bundle_fails() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.pem");

        let result = VaultConfig::from_lookup(lookup_from(&[
            ("VAULT_ADDR", "https://vault:8200"),
            ("VAULT_TOKEN", "root"),
            ("VAULT_CACERT", missing.to_str().unwrap()),
        ]));
        assert!(result.is_err());
    }

    #[test]
    fn test_operator_config_overrides() {
        let config = OperatorConfig::from_lookup(lookup_from(&[
            ("VAULT_ADDR", "http://vault:8200"),
            ("VAULT_TOKEN", "root"),
            ("METRICS_PORT", "9090"),
            ("RESYNC_INTERVAL_SECS", "30"),
        ]))
        .unwrap();

        assert_eq!(config.metrics_port, 9090);
        assert_eq!(config.resync_interval, Duration::from_secs(30));
    }

    #[test]
    fn test_operator_config_rejects_bad_port() {
        let result = OperatorConfig::from_lookup(lookup_from(&[
            ("VAULT_ADDR", "http://vault:8200"),
            ("VAULT_TOKEN", "root"),
            ("METRICS_PORT", "not-a-port"),
        ]));
        assert!(result.is_err());
    }
}
