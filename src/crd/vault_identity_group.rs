//! VaultIdentityGroup Custom Resource Definition

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// VaultIdentityGroup resource specification
#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "vault.oso.sh",
    version = "v1alpha1",
    kind = "VaultIdentityGroup",
    plural = "vaultidentitygroups",
    singular = "vaultidentitygroup",
    shortname = "vig",
    namespaced,
    status = "VaultIdentityGroupStatus",
    printcolumn = r#"{"name": "Group", "type": "string", "jsonPath": ".spec.name"}"#,
    printcolumn = r#"{"name": "Type", "type": "string", "jsonPath": ".spec.type"}"#,
    printcolumn = r#"{"name": "Phase", "type": "string", "jsonPath": ".status.phase"}"#,
    printcolumn = r#"{"name": "ID", "type": "string", "jsonPath": ".status.id"}"#,
    printcolumn = r#"{"name": "Age", "type": "date", "jsonPath": ".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct VaultIdentityGroupSpec {
    /// Name of the group. Changing it replaces the group.
    pub name: String,

    /// Type of the group, internal or external. Changing it replaces the group.
    #[serde(default, rename = "type")]
    pub group_type: GroupType,

    /// Metadata to be associated with the group
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<BTreeMap<String, String>>,

    /// Policies to be tied to the group
    #[serde(skip_serializing_if = "Option::is_none")]
    pub policies: Option<Vec<String>>,

    /// Group IDs to be assigned as group members
    #[serde(skip_serializing_if = "Option::is_none")]
    pub member_group_ids: Option<Vec<String>>,

    /// Entity IDs to be assigned as group members
    #[serde(skip_serializing_if = "Option::is_none")]
    pub member_entity_ids: Option<Vec<String>>,
}

/// Vault identity group type
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum GroupType {
    /// Membership managed explicitly in Vault
    #[default]
    Internal,
    /// Membership derived from an auth method's group alias
    External,
}

impl GroupType {
    pub fn as_str(&self) -> &'static str {
        match self {
            GroupType::Internal => "internal",
            GroupType::External => "external",
        }
    }
}

impl fmt::Display for GroupType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Phase values reported in the status
pub mod phase {
    pub const PENDING: &str = "Pending";
    pub const READY: &str = "Ready";
    pub const DRIFTED: &str = "Drifted";
    pub const FAILED: &str = "Failed";
}

/// VaultIdentityGroup status
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct VaultIdentityGroupStatus {
    /// ID Vault assigned to the group
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// Current phase (Pending, Ready, Drifted, Failed)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phase: Option<String>,

    /// Human-readable message
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// Group name last observed in Vault
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Group type last observed in Vault
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub group_type: Option<GroupType>,

    /// Metadata last observed in Vault
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<BTreeMap<String, String>>,

    /// Member group IDs last observed in Vault
    #[serde(skip_serializing_if = "Option::is_none")]
    pub member_group_ids: Option<Vec<String>>,

    /// Member entity IDs last observed in Vault
    #[serde(skip_serializing_if = "Option::is_none")]
    pub member_entity_ids: Option<Vec<String>>,

    /// Last successful sync with Vault
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_sync_time: Option<DateTime<Utc>>,

    /// Observed generation
    #[serde(skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,

    /// Conditions
    #[serde(default)]
    pub conditions: Vec<Condition>,
}

/// Status condition
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    /// Condition type
    #[serde(rename = "type")]
    pub type_: String,

    /// Status (True, False, Unknown)
    pub status: String,

    /// Last transition time
    pub last_transition_time: DateTime<Utc>,

    /// Reason for the condition
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    /// Human-readable message
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}
