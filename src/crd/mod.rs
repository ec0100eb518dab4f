//! Custom Resource Definitions for the Vault Identity Operator

mod vault_identity_group;

pub use vault_identity_group::*;

use kube::CustomResourceExt;

use crate::error::Result;

/// Generate all CRD YAML manifests
pub fn generate_crds() -> Result<Vec<String>> {
    let crd = serde_yaml::to_string(&VaultIdentityGroup::crd())
        .map_err(|e| crate::error::Error::config(format!("Failed to render CRD: {}", e)))?;
    Ok(vec![crd])
}
