//! Status updates for VaultIdentityGroup resources

use std::collections::BTreeMap;

use chrono::Utc;
use kube::{
    api::{Patch, PatchParams},
    Api, Client, ResourceExt,
};
use serde_json::{json, Map, Value};

use super::identity_group::GroupState;
use crate::crd::{phase, VaultIdentityGroup, VaultIdentityGroupStatus};
use crate::error::Result;

/// Field manager used for status patches
const FIELD_MANAGER: &str = "vault-identity-operator";

/// Status body for a group in sync with Vault.
///
/// `previous` is the status being patched; metadata keys it holds that Vault
/// no longer reports are nulled so the merge patch removes them.
pub fn ready_status(
    state: &GroupState,
    previous: Option<&VaultIdentityGroupStatus>,
    generation: Option<i64>,
    message: &str,
) -> Value {
    let record = &state.record;
    let metadata = metadata_patch(
        record.metadata.as_ref(),
        previous.and_then(|status| status.metadata.as_ref()),
    );
    json!({
        "status": {
            "id": state.id,
            "phase": phase::READY,
            "message": message,
            "name": record.name,
            "type": record.kind,
            "metadata": metadata,
            "memberGroupIds": record.member_group_ids,
            "memberEntityIds": record.member_entity_ids,
            "lastSyncTime": Utc::now(),
            "observedGeneration": generation,
            "conditions": [{
                "type": "Ready",
                "status": "True",
                "lastTransitionTime": Utc::now(),
                "reason": "Synced",
                "message": message
            }]
        }
    })
}

/// Status body for a group that disappeared from Vault.
///
/// `id` is nulled so the next apply creates the group again.
pub fn drifted_status(generation: Option<i64>, message: &str) -> Value {
    json!({
        "status": {
            "id": null,
            "phase": phase::DRIFTED,
            "message": message,
            "observedGeneration": generation,
            "conditions": [{
                "type": "Ready",
                "status": "False",
                "lastTransitionTime": Utc::now(),
                "reason": "NotFoundInVault",
                "message": message
            }]
        }
    })
}

/// Status body for a failed apply.
///
/// When `state` carries an id it is recorded with the group's name and type,
/// so a group created before the failure stays tracked.
pub fn failed_status(
    generation: Option<i64>,
    reason: &str,
    message: &str,
    state: Option<&GroupState>,
) -> Value {
    let mut body = json!({
        "status": {
            "phase": phase::FAILED,
            "message": message,
            "observedGeneration": generation,
            "conditions": [{
                "type": "Ready",
                "status": "False",
                "lastTransitionTime": Utc::now(),
                "reason": reason,
                "message": message
            }]
        }
    });

    if let Some(state) = state {
        if let (Some(id), Some(status)) = (state.id.as_ref(), body["status"].as_object_mut()) {
            status.insert("id".to_string(), json!(id));
            status.insert("name".to_string(), json!(state.record.name));
            status.insert("type".to_string(), json!(state.record.kind));
        }
    }
    body
}

/// Status body while the first create is in flight
pub fn pending_status(generation: Option<i64>) -> Value {
    json!({
        "status": {
            "phase": phase::PENDING,
            "message": "Creating identity group in Vault",
            "observedGeneration": generation,
        }
    })
}

/// Observed metadata as a merge patch over `previous`
fn metadata_patch(
    observed: Option<&BTreeMap<String, String>>,
    previous: Option<&BTreeMap<String, String>>,
) -> Value {
    let Some(observed) = observed else {
        return Value::Null;
    };

    let mut patch: Map<String, Value> = observed
        .iter()
        .map(|(key, value)| (key.clone(), Value::String(value.clone())))
        .collect();
    for key in previous.into_iter().flat_map(|metadata| metadata.keys()) {
        patch.entry(key.clone()).or_insert(Value::Null);
    }
    Value::Object(patch)
}

/// Merge-patch the status subresource
pub async fn patch_status(group: &VaultIdentityGroup, client: &Client, namespace: &str, status: Value) -> Result<()> {
    let api: Api<VaultIdentityGroup> = Api::namespaced(client.clone(), namespace);
    api.patch_status(
        &group.name_any(),
        &PatchParams::apply(FIELD_MANAGER),
        &Patch::Merge(status),
    )
    .await?;
    Ok(())
}
