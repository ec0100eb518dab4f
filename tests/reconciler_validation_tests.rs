//! Integration tests for reconciler validation logic
//!
//! These tests verify that VaultIdentityGroup resources are converted into
//! group records, validated, and compared against their tracked status
//! correctly.

use std::collections::BTreeMap;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use vault_identity_operator::crd::{
    GroupType, VaultIdentityGroup, VaultIdentityGroupSpec, VaultIdentityGroupStatus,
};
use vault_identity_operator::reconcilers::identity_group::{
    requires_replacement, validate, GroupRecord, TrackedGroup,
};

// ============================================================================
// Test Helpers
// ============================================================================

fn default_metadata(name: &str) -> ObjectMeta {
    ObjectMeta {
        name: Some(name.to_string()),
        namespace: Some("default".to_string()),
        generation: Some(1),
        ..Default::default()
    }
}

fn valid_group_spec() -> VaultIdentityGroupSpec {
    VaultIdentityGroupSpec {
        name: "platform-admins".to_string(),
        group_type: GroupType::Internal,
        metadata: Some(BTreeMap::from([("team".to_string(), "platform".to_string())])),
        policies: Some(vec!["admin".to_string(), "default".to_string()]),
        member_group_ids: None,
        member_entity_ids: Some(vec!["entity-1".to_string()]),
    }
}

fn create_group(spec: VaultIdentityGroupSpec) -> VaultIdentityGroup {
    VaultIdentityGroup {
        metadata: default_metadata("test-group"),
        spec,
        status: None,
    }
}

fn validate_resource(group: &VaultIdentityGroup) -> vault_identity_operator::Result<()> {
    validate(&GroupRecord::from(&group.spec))
}

// ============================================================================
// Conversion Tests
// ============================================================================

#[test]
fn spec_converts_to_group_record() {
    let group = create_group(valid_group_spec());
    let record = GroupRecord::from(&group.spec);

    assert_eq!(record.name, "platform-admins");
    assert_eq!(record.kind, GroupType::Internal);
    assert_eq!(record.policies.as_ref().map(Vec::len), Some(2));
    assert_eq!(record.member_entity_ids, Some(vec!["entity-1".to_string()]));
    assert!(record.member_group_ids.is_none());
}

// ============================================================================
// Validation Tests
// ============================================================================

#[test]
fn group_valid_spec_passes_validation() {
    let group = create_group(valid_group_spec());
    let result = validate_resource(&group);
    if let Err(e) = &result {
        panic!("Validation failed unexpectedly: {:?}", e);
    }
    assert!(result.is_ok());
}

#[test]
fn group_empty_name_fails_validation() {
    let mut spec = valid_group_spec();
    spec.name = "  ".to_string();

    let result = validate_resource(&create_group(spec));

    assert!(result.is_err());
    assert!(result.unwrap_err().to_string().contains("name"));
}

#[test]
fn group_name_with_slash_fails_validation() {
    let mut spec = valid_group_spec();
    spec.name = "team/admins".to_string();

    let result = validate_resource(&create_group(spec));

    assert!(result.is_err());
    assert!(result.unwrap_err().to_string().contains("team/admins"));
}

#[test]
fn group_empty_metadata_key_fails_validation() {
    let mut spec = valid_group_spec();
    spec.metadata = Some(BTreeMap::from([(String::new(), "value".to_string())]));

    let result = validate_resource(&create_group(spec));

    assert!(result.is_err());
    assert!(result
        .unwrap_err()
        .to_string()
        .to_lowercase()
        .contains("metadata"));
}

#[test]
fn group_empty_member_group_id_fails_validation() {
    let mut spec = valid_group_spec();
    spec.member_group_ids = Some(vec![String::new()]);

    let result = validate_resource(&create_group(spec));

    assert!(result.is_err());
    assert!(result.unwrap_err().to_string().contains("memberGroupIds"));
}

#[test]
fn external_group_with_member_entities_fails_validation() {
    let mut spec = valid_group_spec();
    spec.group_type = GroupType::External;

    let result = validate_resource(&create_group(spec));

    assert!(result.is_err());
    assert!(result.unwrap_err().to_string().contains("External"));
}

#[test]
fn external_group_without_members_passes_validation() {
    let mut spec = valid_group_spec();
    spec.group_type = GroupType::External;
    spec.member_entity_ids = None;

    assert!(validate_resource(&create_group(spec)).is_ok());
}

#[test]
fn group_without_optional_fields_passes_validation() {
    let spec = VaultIdentityGroupSpec {
        name: "minimal".to_string(),
        group_type: GroupType::default(),
        metadata: None,
        policies: None,
        member_group_ids: None,
        member_entity_ids: None,
    };

    assert!(validate_resource(&create_group(spec)).is_ok());
}

// ============================================================================
// Replacement Tests
// ============================================================================

fn tracked_status(id: &str, name: &str, group_type: GroupType) -> VaultIdentityGroupStatus {
    VaultIdentityGroupStatus {
        id: Some(id.to_string()),
        name: Some(name.to_string()),
        group_type: Some(group_type),
        observed_generation: Some(1),
        ..Default::default()
    }
}

#[test]
fn unchanged_name_and_type_do_not_replace() {
    let mut group = create_group(valid_group_spec());
    group.status = Some(tracked_status("abc", "platform-admins", GroupType::Internal));

    let tracked = TrackedGroup::from_status(group.status.as_ref()).unwrap();
    assert!(!requires_replacement(&GroupRecord::from(&group.spec), &tracked));
}

#[test]
fn renamed_group_requires_replacement() {
    let mut group = create_group(valid_group_spec());
    group.status = Some(tracked_status("abc", "old-name", GroupType::Internal));

    let tracked = TrackedGroup::from_status(group.status.as_ref()).unwrap();
    assert!(requires_replacement(&GroupRecord::from(&group.spec), &tracked));
}

#[test]
fn retyped_group_requires_replacement() {
    let mut spec = valid_group_spec();
    spec.group_type = GroupType::External;
    spec.member_entity_ids = None;
    let mut group = create_group(spec);
    group.status = Some(tracked_status("abc", "platform-admins", GroupType::Internal));

    let tracked = TrackedGroup::from_status(group.status.as_ref()).unwrap();
    assert!(requires_replacement(&GroupRecord::from(&group.spec), &tracked));
}

#[test]
fn drifted_status_without_id_is_untracked() {
    let mut group = create_group(valid_group_spec());
    group.status = Some(VaultIdentityGroupStatus {
        phase: Some("Drifted".to_string()),
        ..Default::default()
    });

    assert!(TrackedGroup::from_status(group.status.as_ref()).is_none());
}
