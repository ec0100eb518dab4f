//! Vault logical API access
//!
//! The identity group reconciler only needs Vault's path-addressed
//! read/write/delete surface. This module defines that surface as the
//! [`Logical`] trait together with:
//! - [`VaultClient`], the HTTP implementation used by the operator
//! - [`MemoryLogical`], an in-memory identity store used in tests

mod client;
mod memory;

pub use client::VaultClient;
pub use memory::{MemoryLogical, RecordedRequest, RequestKind};

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Error messages Vault returns when the calling token's accessor is gone.
const EXPIRED_CREDENTIAL_MESSAGES: &[&str] = &["invalid accessor", "failed to find accessor entry"];

/// Failure of a single call against Vault
#[derive(Error, Debug, Clone, PartialEq)]
pub enum VaultError {
    /// The request never produced an HTTP response
    #[error("Vault request failed: {0}")]
    Transport(String),

    /// Vault answered with a non-success status
    #[error("Vault returned status {status}: {}", .errors.join("; "))]
    Api { status: u16, errors: Vec<String> },

    /// The response body could not be decoded
    #[error("Failed to decode Vault response: {0}")]
    Decode(String),
}

impl VaultError {
    /// Build an API error from a status code and a single message
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        VaultError::Api {
            status,
            errors: vec![message.into()],
        }
    }

    /// Whether the failure means the credential used for the call has expired.
    ///
    /// Reads that fail this way are not treated as remote state changes.
    pub fn is_expired_credential(&self) -> bool {
        match self {
            VaultError::Api { errors, .. } => errors.iter().any(|message| {
                EXPIRED_CREDENTIAL_MESSAGES
                    .iter()
                    .any(|needle| message.contains(needle))
            }),
            _ => false,
        }
    }
}

/// Vault response envelope
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
pub struct Secret {
    #[serde(default)]
    pub request_id: String,

    #[serde(default)]
    pub lease_id: String,

    #[serde(default)]
    pub lease_duration: u64,

    #[serde(default)]
    pub renewable: bool,

    #[serde(default)]
    pub data: Option<Map<String, Value>>,

    #[serde(default)]
    pub warnings: Option<Vec<String>>,
}

impl Secret {
    /// Create a response wrapping the given data
    pub fn with_data(data: Map<String, Value>) -> Self {
        Self {
            data: Some(data),
            ..Default::default()
        }
    }

    /// Whether the response carries any data
    pub fn has_payload(&self) -> bool {
        self.data.as_ref().is_some_and(|data| !data.is_empty())
    }

    /// Look up a string field in `data`
    pub fn data_str(&self, key: &str) -> Option<&str> {
        self.data.as_ref()?.get(key)?.as_str()
    }

    /// Decode `data` into a typed structure
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, VaultError> {
        let data = self.data.clone().unwrap_or_default();
        serde_json::from_value(Value::Object(data)).map_err(|e| VaultError::Decode(e.to_string()))
    }
}

/// Path-addressed read/write/delete access to Vault
#[async_trait]
pub trait Logical: Send + Sync {
    /// Read the value at `path`; `Ok(None)` when nothing is stored there
    async fn read(&self, path: &str) -> Result<Option<Secret>, VaultError>;

    /// Write `body` to `path`
    async fn write(&self, path: &str, body: Value) -> Result<Option<Secret>, VaultError>;

    /// Delete the value at `path`
    async fn delete(&self, path: &str) -> Result<Option<Secret>, VaultError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_expired_credential_classification() {
        let expired = VaultError::Api {
            status: 400,
            errors: vec!["1 error occurred:\n\t* invalid accessor custom_accessor\n".to_string()],
        };
        assert!(expired.is_expired_credential());

        let missing_entry = VaultError::api(403, "failed to find accessor entry for token");
        assert!(missing_entry.is_expired_credential());

        let denied = VaultError::api(403, "permission denied");
        assert!(!denied.is_expired_credential());

        let transport = VaultError::Transport("invalid accessor".to_string());
        assert!(!transport.is_expired_credential());
    }

    #[test]
    fn test_secret_parses_vault_envelope() {
        let secret: Secret = serde_json::from_value(json!({
            "request_id": "f0e1",
            "lease_id": "",
            "lease_duration": 0,
            "renewable": false,
            "data": {"id": "abc", "name": "g1"},
            "warnings": null,
        }))
        .unwrap();

        assert!(secret.has_payload());
        assert_eq!(secret.data_str("id"), Some("abc"));
        assert_eq!(secret.data_str("missing"), None);
    }

    #[test]
    fn test_secret_without_data_has_no_payload() {
        let secret: Secret = serde_json::from_value(json!({"data": null})).unwrap();
        assert!(!secret.has_payload());

        let empty = Secret::with_data(Map::new());
        assert!(!empty.has_payload());
    }

    #[test]
    fn test_api_error_display_joins_messages() {
        let err = VaultError::Api {
            status: 500,
            errors: vec!["first".to_string(), "second".to_string()],
        };
        assert_eq!(err.to_string(), "Vault returned status 500: first; second");
    }
}
