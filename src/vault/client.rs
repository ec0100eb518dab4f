//! HTTP implementation of the Vault logical API

use async_trait::async_trait;
use reqwest::{Client, Method, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use super::{Logical, Secret, VaultError};
use crate::config::VaultConfig;
use crate::error::{Error, Result};
use crate::metrics;

/// Vault client speaking the `/v1/` HTTP API
#[derive(Clone)]
pub struct VaultClient {
    config: VaultConfig,
    http: Client,
}

impl std::fmt::Debug for VaultClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VaultClient")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Body of a Vault error response
#[derive(Deserialize, Default)]
struct ErrorBody {
    #[serde(default)]
    errors: Vec<String>,
}

impl VaultClient {
    /// Build a client from connection settings
    pub fn new(config: VaultConfig) -> Result<Self> {
        let mut builder = Client::builder().timeout(config.timeout);
        if let Some(ca) = config.ca_cert.as_ref() {
            let cert = reqwest::Certificate::from_pem(ca)
                .or_else(|_| reqwest::Certificate::from_der(ca))
                .map_err(|e| Error::config(format!("Failed to parse VAULT_CACERT: {}", e)))?;
            builder = builder.add_root_certificate(cert);
        }
        if config.skip_verify {
            builder = builder.danger_accept_invalid_certs(true);
        }
        let http = builder
            .build()
            .map_err(|e| Error::config(format!("Failed to build Vault HTTP client: {}", e)))?;

        Ok(Self { config, http })
    }

    fn url(&self, path: &str) -> String {
        api_url(&self.config.addr, path)
    }

    async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> std::result::Result<Option<Secret>, VaultError> {
        let operation = method.as_str().to_lowercase();
        let result = self.send(method, path, body).await;
        let outcome = if result.is_ok() { "success" } else { "failure" };
        metrics::VAULT_REQUESTS
            .with_label_values(&[&operation, outcome])
            .inc();
        result
    }

    async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> std::result::Result<Option<Secret>, VaultError> {
        let is_read = method == Method::GET;
        debug!(method = %method, path = %path, "Sending Vault request");

        let mut builder = self
            .http
            .request(method, self.url(path))
            .header("X-Vault-Token", &self.config.token);
        if let Some(namespace) = &self.config.namespace {
            builder = builder.header("X-Vault-Namespace", namespace);
        }
        if let Some(payload) = body {
            builder = builder.json(&payload);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| VaultError::Transport(e.to_string()))?;
        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| VaultError::Transport(e.to_string()))?;

        interpret_response(status, &text, is_read)
    }
}

#[async_trait]
impl Logical for VaultClient {
    async fn read(&self, path: &str) -> std::result::Result<Option<Secret>, VaultError> {
        self.request(Method::GET, path, None).await
    }

    async fn write(&self, path: &str, body: Value) -> std::result::Result<Option<Secret>, VaultError> {
        self.request(Method::POST, path, Some(body)).await
    }

    async fn delete(&self, path: &str) -> std::result::Result<Option<Secret>, VaultError> {
        self.request(Method::DELETE, path, None).await
    }
}

/// Join the server address and a logical path under `/v1/`
fn api_url(addr: &str, path: &str) -> String {
    format!(
        "{}/v1/{}",
        addr.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

/// Map a status and body to the logical API result.
///
/// Reads of missing paths come back as `404` without error messages and are
/// reported as "nothing stored" rather than as an error.
fn interpret_response(
    status: StatusCode,
    body: &str,
    is_read: bool,
) -> std::result::Result<Option<Secret>, VaultError> {
    if status == StatusCode::NO_CONTENT {
        return Ok(None);
    }

    if status.is_success() {
        if body.trim().is_empty() {
            return Ok(None);
        }
        let secret: Secret =
            serde_json::from_str(body).map_err(|e| VaultError::Decode(format!("{}; body={}", e, body)))?;
        return Ok(Some(secret));
    }

    let parsed: ErrorBody = serde_json::from_str(body).unwrap_or_default();
    if status == StatusCode::NOT_FOUND && is_read && parsed.errors.is_empty() {
        return Ok(None);
    }

    let errors = if parsed.errors.is_empty() && !body.trim().is_empty() {
        vec![body.trim().to_string()]
    } else {
        parsed.errors
    };

    Err(VaultError::Api {
        status: status.as_u16(),
        errors,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_url_normalizes_slashes() {
        assert_eq!(
            api_url("https://vault:8200/", "/identity/group/id/abc"),
            "https://vault:8200/v1/identity/group/id/abc"
        );
        assert_eq!(
            api_url("http://127.0.0.1:8200", "identity/group"),
            "http://127.0.0.1:8200/v1/identity/group"
        );
    }

    #[test]
    fn test_success_body_is_decoded() {
        let body = r#"{"request_id":"r1","data":{"id":"abc","name":"g1"},"warnings":null}"#;
        let secret = interpret_response(StatusCode::OK, body, false).unwrap().unwrap();
        assert_eq!(secret.data_str("id"), Some("abc"));
    }

    #[test]
    fn test_no_content_is_empty() {
        assert_eq!(interpret_response(StatusCode::NO_CONTENT, "", false).unwrap(), None);
    }

    #[test]
    fn test_read_not_found_is_empty() {
        let body = r#"{"errors":[]}"#;
        assert_eq!(interpret_response(StatusCode::NOT_FOUND, body, true).unwrap(), None);
    }

    #[test]
    fn test_read_not_found_with_errors_is_error() {
        let err = interpret_response(StatusCode::NOT_FOUND, r#"{"errors":["no handler for route"]}"#, true)
            .unwrap_err();
        assert_eq!(err, VaultError::api(404, "no handler for route"));
    }

    #[test]
    fn test_write_not_found_is_error() {
        let err = interpret_response(StatusCode::NOT_FOUND, r#"{"errors":["no handler"]}"#, false)
            .unwrap_err();
        assert_eq!(
            err,
            VaultError::Api {
                status: 404,
                errors: vec!["no handler".to_string()],
            }
        );
    }

    #[test]
    fn test_error_messages_are_preserved() {
        let body = r#"{"errors":["1 error occurred:\n\t* invalid accessor custom_accessor\n\n"]}"#;
        let err = interpret_response(StatusCode::BAD_REQUEST, body, true).unwrap_err();
        assert!(err.is_expired_credential());
    }

    #[test]
    fn test_non_json_error_body_becomes_message() {
        let err = interpret_response(StatusCode::BAD_GATEWAY, "upstream down", true).unwrap_err();
        assert_eq!(err, VaultError::api(502, "upstream down"));
    }

    #[test]
    fn test_malformed_success_body_is_decode_error() {
        let err = interpret_response(StatusCode::OK, "not json", true).unwrap_err();
        assert!(matches!(err, VaultError::Decode(_)));
    }
}
