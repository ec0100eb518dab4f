//! Vault identity group reconciler
//!
//! Maps a desired [`GroupRecord`] onto Vault's identity group endpoints:
//! - `identity/group` to create
//! - `identity/group/id/:id` to read, update and delete
//! - `identity/group/name/:name` to probe for existence before an id is known
//!
//! Every operation takes the Vault client explicitly.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::crd::{GroupType, VaultIdentityGroupSpec, VaultIdentityGroupStatus};
use crate::error::{Error, Operation, Result};
use crate::vault::Logical;

/// Collection path for identity groups
pub const IDENTITY_GROUP_PATH: &str = "/identity/group";

/// Path addressing a group by id
pub fn id_path(id: &str) -> String {
    format!("{}/id/{}", IDENTITY_GROUP_PATH, id)
}

/// Path addressing a group by name. The name is percent-encoded as one segment.
pub fn name_path(name: &str) -> String {
    format!("{}/name/{}", IDENTITY_GROUP_PATH, urlencoding::encode(name))
}

/// Attributes of an identity group
#[derive(Clone, Debug, Default, PartialEq)]
pub struct GroupRecord {
    pub name: String,
    pub kind: GroupType,
    pub metadata: Option<BTreeMap<String, String>>,
    pub policies: Option<Vec<String>>,
    pub member_group_ids: Option<Vec<String>>,
    pub member_entity_ids: Option<Vec<String>>,
}

impl GroupRecord {
    pub fn new(name: impl Into<String>, kind: GroupType) -> Self {
        Self {
            name: name.into(),
            kind,
            ..Default::default()
        }
    }
}

impl From<&VaultIdentityGroupSpec> for GroupRecord {
    fn from(spec: &VaultIdentityGroupSpec) -> Self {
        Self {
            name: spec.name.clone(),
            kind: spec.group_type,
            metadata: spec.metadata.clone(),
            policies: spec.policies.clone(),
            member_group_ids: spec.member_group_ids.clone(),
            member_entity_ids: spec.member_entity_ids.clone(),
        }
    }
}

/// A group record together with the id Vault assigned to it
#[derive(Clone, Debug, Default, PartialEq)]
pub struct GroupState {
    /// `None` while the group is not tracked remotely
    pub id: Option<String>,
    pub record: GroupRecord,
}

impl GroupState {
    /// State for a group that has not been created yet
    pub fn untracked(record: GroupRecord) -> Self {
        Self { id: None, record }
    }

    /// State for a group Vault already knows under `id`
    pub fn tracked(id: impl Into<String>, record: GroupRecord) -> Self {
        Self {
            id: Some(id.into()),
            record,
        }
    }
}

/// What Vault last reported for a tracked group
#[derive(Clone, Debug, PartialEq)]
pub struct TrackedGroup {
    pub id: String,
    pub name: Option<String>,
    pub kind: Option<GroupType>,
}

impl TrackedGroup {
    /// Recover the tracked group from a resource status
    pub fn from_status(status: Option<&VaultIdentityGroupStatus>) -> Option<Self> {
        let status = status?;
        let id = status.id.as_deref().filter(|id| !id.is_empty())?;
        Some(Self {
            id: id.to_string(),
            name: status.name.clone(),
            kind: status.group_type,
        })
    }
}

/// Optional group fields, each sent only when set
#[derive(Debug, Default, PartialEq, Serialize)]
pub struct GroupFields<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<&'a BTreeMap<String, String>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub policies: Option<&'a [String]>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub member_group_ids: Option<&'a [String]>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub member_entity_ids: Option<&'a [String]>,
}

impl<'a> GroupFields<'a> {
    /// Collect the fields of `record` that are set.
    ///
    /// An empty collection counts as unset.
    pub fn from_record(record: &'a GroupRecord) -> Self {
        Self {
            metadata: record.metadata.as_ref().filter(|m| !m.is_empty()),
            policies: set_list(&record.policies),
            member_group_ids: set_list(&record.member_group_ids),
            member_entity_ids: set_list(&record.member_entity_ids),
        }
    }
}

fn set_list(list: &Option<Vec<String>>) -> Option<&[String]> {
    list.as_deref().filter(|items| !items.is_empty())
}

/// Body of a create request
#[derive(Debug, Serialize)]
pub struct CreateGroupRequest<'a> {
    pub name: &'a str,

    #[serde(rename = "type")]
    pub kind: GroupType,

    #[serde(flatten)]
    pub fields: GroupFields<'a>,
}

impl<'a> CreateGroupRequest<'a> {
    pub fn from_record(record: &'a GroupRecord) -> Self {
        Self {
            name: &record.name,
            kind: record.kind,
            fields: GroupFields::from_record(record),
        }
    }
}

/// Fields refreshed from a read. Policies are owned by the desired state.
#[derive(Debug, Default, Deserialize)]
struct ObservedGroup {
    #[serde(default)]
    name: Option<String>,

    #[serde(default, rename = "type")]
    kind: Option<GroupType>,

    #[serde(default)]
    metadata: Option<BTreeMap<String, String>>,

    #[serde(default)]
    member_entity_ids: Option<Vec<String>>,

    #[serde(default)]
    member_group_ids: Option<Vec<String>>,
}

impl ObservedGroup {
    fn apply_to(self, record: &mut GroupRecord) {
        if let Some(name) = self.name {
            record.name = name;
        }
        if let Some(kind) = self.kind {
            record.kind = kind;
        }
        record.metadata = self.metadata;
        record.member_entity_ids = self.member_entity_ids;
        record.member_group_ids = self.member_group_ids;
    }
}

/// Result of reading a tracked group
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReadOutcome {
    /// Observed fields were refreshed from Vault
    Refreshed,
    /// The group no longer exists; the tracked id was cleared
    Gone,
    /// The credential expired; nothing was changed
    Skipped,
}

/// Validate a desired group record
pub fn validate(record: &GroupRecord) -> Result<()> {
    if record.name.trim().is_empty() {
        return Err(Error::validation("Group name must not be empty"));
    }

    if record.name.contains('/') {
        return Err(Error::validation(format!(
            "Invalid group name '{}': must not contain '/'",
            record.name
        )));
    }

    if let Some(metadata) = &record.metadata {
        if metadata.keys().any(|key| key.is_empty()) {
            return Err(Error::validation("Metadata keys must not be empty"));
        }
    }

    for (field, ids) in [
        ("memberGroupIds", &record.member_group_ids),
        ("memberEntityIds", &record.member_entity_ids),
    ] {
        if ids.iter().flatten().any(|id| id.trim().is_empty()) {
            return Err(Error::validation(format!("{} must not contain empty IDs", field)));
        }
    }

    if record.kind == GroupType::External
        && record.member_entity_ids.as_ref().is_some_and(|ids| !ids.is_empty())
    {
        return Err(Error::validation(
            "External groups cannot have member entities; membership comes from group aliases",
        ));
    }

    Ok(())
}

/// Whether an immutable attribute changed, forcing delete and re-create
pub fn requires_replacement(desired: &GroupRecord, tracked: &TrackedGroup) -> bool {
    let name_changed = tracked.name.as_deref().is_some_and(|name| name != desired.name);
    let kind_changed = tracked.kind.is_some_and(|kind| kind != desired.kind);
    name_changed || kind_changed
}

/// Create the group and refresh `state` from Vault. Returns the new id.
pub async fn create<C>(client: &C, state: &mut GroupState) -> Result<String>
where
    C: Logical + ?Sized,
{
    let name = state.record.name.clone();
    let body = serde_json::to_value(CreateGroupRequest::from_record(&state.record))?;

    debug!(name = %name, "Writing identity group");
    let response = client
        .write(IDENTITY_GROUP_PATH, body)
        .await
        .map_err(|source| Error::RemoteWrite {
            operation: Operation::Create,
            key: name.clone(),
            source,
        })?;
    info!(name = %name, "Wrote identity group");

    let returned = response
        .as_ref()
        .and_then(|secret| secret.data_str("id"))
        .filter(|id| !id.is_empty())
        .map(str::to_string);

    // Vault answers a create of an existing name as an update, without an id
    let id = match returned {
        Some(id) => id,
        None => {
            debug!(name = %name, "Create response carried no id, looking group up by name");
            lookup_by_name(client, &name)
                .await?
                .ok_or_else(|| Error::malformed(IDENTITY_GROUP_PATH, "response did not contain a group id"))?
        }
    };

    state.id = Some(id.clone());
    read(client, state).await?;
    Ok(id)
}

/// Send the set optional fields to Vault, then refresh `state`
pub async fn update<C>(client: &C, state: &mut GroupState) -> Result<ReadOutcome>
where
    C: Logical + ?Sized,
{
    let id = state
        .id
        .clone()
        .ok_or_else(|| Error::validation("Cannot update an identity group without an id"))?;
    let path = id_path(&id);
    let body = serde_json::to_value(GroupFields::from_record(&state.record))?;

    debug!(id = %id, "Updating identity group");
    client
        .write(&path, body)
        .await
        .map_err(|source| Error::RemoteWrite {
            operation: Operation::Update,
            key: id.clone(),
            source,
        })?;
    info!(id = %id, "Updated identity group");

    read(client, state).await
}

/// Refresh `state` from Vault
pub async fn read<C>(client: &C, state: &mut GroupState) -> Result<ReadOutcome>
where
    C: Logical + ?Sized,
{
    let Some(id) = state.id.clone() else {
        return Ok(ReadOutcome::Gone);
    };
    let path = id_path(&id);

    debug!(id = %id, path = %path, "Reading identity group");
    let response = match client.read(&path).await {
        Ok(response) => response,
        Err(e) if e.is_expired_credential() => {
            warn!(id = %id, error = %e, "Credential expired while reading identity group, leaving state unchanged");
            return Ok(ReadOutcome::Skipped);
        }
        Err(source) => {
            return Err(Error::RemoteRead {
                operation: Operation::Read,
                key: id,
                source,
            })
        }
    };

    let Some(secret) = response.filter(|secret| secret.has_payload()) else {
        warn!(id = %id, "Identity group not found, removing from state");
        state.id = None;
        return Ok(ReadOutcome::Gone);
    };

    let observed: ObservedGroup = secret
        .decode()
        .map_err(|e| Error::malformed(path.clone(), e.to_string()))?;
    observed.apply_to(&mut state.record);
    debug!(id = %id, "Read identity group");

    Ok(ReadOutcome::Refreshed)
}

/// Delete the group with the given id
pub async fn delete<C>(client: &C, id: &str) -> Result<()>
where
    C: Logical + ?Sized,
{
    debug!(id = %id, "Deleting identity group");
    client
        .delete(&id_path(id))
        .await
        .map_err(|source| Error::RemoteDelete {
            key: id.to_string(),
            source,
        })?;
    info!(id = %id, "Deleted identity group");
    Ok(())
}

/// Check whether the group exists, by id or by `fallback_name` when no id is known
pub async fn exists<C>(client: &C, id: &str, fallback_name: &str) -> Result<bool>
where
    C: Logical + ?Sized,
{
    let (key, path) = if id.is_empty() {
        (fallback_name, name_path(fallback_name))
    } else {
        (id, id_path(id))
    };

    debug!(key = %key, "Checking if identity group exists");
    let response = client
        .read(&path)
        .await
        .map_err(|source| Error::RemoteRead {
            operation: Operation::Exists,
            key: key.to_string(),
            source,
        })?;

    Ok(response.is_some_and(|secret| secret.has_payload()))
}

/// Find the id of the group stored under `name`
pub async fn lookup_by_name<C>(client: &C, name: &str) -> Result<Option<String>>
where
    C: Logical + ?Sized,
{
    let path = name_path(name);

    debug!(name = %name, "Looking up identity group by name");
    let response = client
        .read(&path)
        .await
        .map_err(|source| Error::RemoteRead {
            operation: Operation::Lookup,
            key: name.to_string(),
            source,
        })?;

    let Some(secret) = response.filter(|secret| secret.has_payload()) else {
        return Ok(None);
    };

    secret
        .data_str("id")
        .filter(|id| !id.is_empty())
        .map(|id| Some(id.to_string()))
        .ok_or_else(|| Error::malformed(path, "group payload did not contain an id"))
}

/// Action taken by [`sync`]
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SyncAction {
    Created,
    /// An existing group with the desired name was taken over and updated
    Adopted,
    Replaced { previous_id: String },
    Updated,
    Refreshed,
}

impl SyncAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncAction::Created => "created",
            SyncAction::Adopted => "adopted",
            SyncAction::Replaced { .. } => "replaced",
            SyncAction::Updated => "updated",
            SyncAction::Refreshed => "refreshed",
        }
    }
}

/// Result of a [`sync`] pass
#[derive(Clone, Debug, PartialEq)]
pub struct SyncReport {
    pub action: SyncAction,
    pub outcome: ReadOutcome,
}

/// Bring Vault in line with the desired record in `state` in a single pass.
///
/// - name or type changed: delete the tracked group, then continue untracked
/// - untracked and a group with the name exists: adopt its id, then update
/// - untracked otherwise: create
/// - `spec_changed`: update
/// - otherwise: read, which detects remote deletion
///
/// `state.id` holds any id assigned before a failure, so callers can keep
/// tracking a group whose follow-up request failed.
pub async fn sync<C>(
    client: &C,
    state: &mut GroupState,
    tracked: Option<TrackedGroup>,
    spec_changed: bool,
) -> Result<SyncReport>
where
    C: Logical + ?Sized,
{
    state.id = None;
    let mut replaced = None;

    if let Some(tracked) = tracked {
        if requires_replacement(&state.record, &tracked) {
            info!(
                id = %tracked.id,
                name = %state.record.name,
                "Immutable identity group attributes changed, replacing group"
            );
            delete(client, &tracked.id).await?;
            replaced = Some(tracked.id);
        } else {
            state.id = Some(tracked.id);
        }
    }

    if state.id.is_none() {
        if let Some(id) = lookup_by_name(client, &state.record.name).await? {
            warn!(
                id = %id,
                name = %state.record.name,
                "Identity group with this name already exists in Vault, adopting it"
            );
            state.id = Some(id);
            let outcome = update(client, state).await?;
            let action = match replaced {
                Some(previous_id) => SyncAction::Replaced { previous_id },
                None => SyncAction::Adopted,
            };
            return Ok(SyncReport { action, outcome });
        }

        let id = create(client, state).await?;
        debug!(id = %id, "Identity group created");
        let outcome = if state.id.is_some() {
            ReadOutcome::Refreshed
        } else {
            ReadOutcome::Gone
        };
        let action = match replaced {
            Some(previous_id) => SyncAction::Replaced { previous_id },
            None => SyncAction::Created,
        };
        return Ok(SyncReport { action, outcome });
    }

    if spec_changed {
        let outcome = update(client, state).await?;
        return Ok(SyncReport {
            action: SyncAction::Updated,
            outcome,
        });
    }

    let outcome = read(client, state).await?;
    Ok(SyncReport {
        action: SyncAction::Refreshed,
        outcome,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record() -> GroupRecord {
        GroupRecord::new("g1", GroupType::Internal)
    }

    #[test]
    fn test_paths() {
        assert_eq!(id_path("abc"), "/identity/group/id/abc");
        assert_eq!(name_path("g1"), "/identity/group/name/g1");
    }

    #[test]
    fn test_name_path_encodes_reserved_characters() {
        assert_eq!(name_path("ops team?x#1"), "/identity/group/name/ops%20team%3Fx%231");
    }

    #[test]
    fn test_create_request_omits_unset_fields() {
        let record = record();
        let body = serde_json::to_value(CreateGroupRequest::from_record(&record)).unwrap();
        assert_eq!(body, json!({"name": "g1", "type": "internal"}));
    }

    #[test]
    fn test_create_request_includes_set_fields() {
        let mut record = record();
        record.policies = Some(vec!["p1".to_string()]);
        record.metadata = Some(BTreeMap::from([("team".to_string(), "a".to_string())]));

        let body = serde_json::to_value(CreateGroupRequest::from_record(&record)).unwrap();
        assert_eq!(
            body,
            json!({"name": "g1", "type": "internal", "policies": ["p1"], "metadata": {"team": "a"}})
        );
    }

    #[test]
    fn test_update_fields_treat_empty_collections_as_unset() {
        let mut record = record();
        record.policies = Some(vec![]);
        record.metadata = Some(BTreeMap::new());
        record.member_group_ids = Some(vec!["g-2".to_string()]);

        let body = serde_json::to_value(GroupFields::from_record(&record)).unwrap();
        assert_eq!(body, json!({"member_group_ids": ["g-2"]}));
    }

    #[test]
    fn test_validate_rejects_bad_names() {
        assert!(validate(&record()).is_ok());
        assert!(validate(&GroupRecord::new("", GroupType::Internal)).is_err());
        assert!(validate(&GroupRecord::new("a/b", GroupType::Internal)).is_err());
    }

    #[test]
    fn test_validate_rejects_empty_member_ids() {
        let mut record = record();
        record.member_entity_ids = Some(vec!["e-1".to_string(), " ".to_string()]);
        let err = validate(&record).unwrap_err();
        assert!(err.to_string().contains("memberEntityIds"));
    }

    #[test]
    fn test_validate_rejects_external_member_entities() {
        let mut record = GroupRecord::new("ext", GroupType::External);
        record.member_entity_ids = Some(vec!["e-1".to_string()]);
        assert!(validate(&record).is_err());

        record.member_entity_ids = None;
        record.member_group_ids = Some(vec!["g-1".to_string()]);
        assert!(validate(&record).is_ok());
    }

    #[test]
    fn test_requires_replacement_on_name_or_type_change() {
        let tracked = TrackedGroup {
            id: "abc".to_string(),
            name: Some("g1".to_string()),
            kind: Some(GroupType::Internal),
        };

        assert!(!requires_replacement(&record(), &tracked));
        assert!(requires_replacement(&GroupRecord::new("g2", GroupType::Internal), &tracked));
        assert!(requires_replacement(&GroupRecord::new("g1", GroupType::External), &tracked));
    }

    #[test]
    fn test_requires_replacement_ignores_unknown_observed_values() {
        let tracked = TrackedGroup {
            id: "abc".to_string(),
            name: None,
            kind: None,
        };
        assert!(!requires_replacement(&GroupRecord::new("other", GroupType::External), &tracked));
    }

    #[test]
    fn test_tracked_group_from_status() {
        assert!(TrackedGroup::from_status(None).is_none());

        let mut status = VaultIdentityGroupStatus::default();
        assert!(TrackedGroup::from_status(Some(&status)).is_none());

        status.id = Some(String::new());
        assert!(TrackedGroup::from_status(Some(&status)).is_none());

        status.id = Some("abc".to_string());
        status.name = Some("g1".to_string());
        let tracked = TrackedGroup::from_status(Some(&status)).unwrap();
        assert_eq!(tracked.id, "abc");
        assert_eq!(tracked.name.as_deref(), Some("g1"));
        assert_eq!(tracked.kind, None);
    }
}
