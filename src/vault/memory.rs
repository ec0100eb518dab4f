//! In-memory stand-in for Vault's identity group endpoints
//!
//! Emulates `identity/group`, `identity/group/id/:id` and
//! `identity/group/name/:name` closely enough to drive the reconciler:
//! server-side id assignment, partial updates, list fields that read back as
//! empty arrays, and idempotent deletes. A create naming an existing group
//! updates it and answers without an id. Every request is recorded and
//! failures can be queued per request kind or per path.

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use serde_json::{json, Map, Value};

use super::{Logical, Secret, VaultError};

const GROUP_COLLECTION: &str = "identity/group";
const ID_PREFIX: &str = "identity/group/id/";
const NAME_PREFIX: &str = "identity/group/name/";

/// Fields a write may set on a group
const MUTABLE_FIELDS: &[&str] = &["metadata", "policies", "member_group_ids", "member_entity_ids"];

/// Kind of logical request
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RequestKind {
    Read,
    Write,
    Delete,
}

/// A request observed by the store
#[derive(Clone, Debug, PartialEq)]
pub struct RecordedRequest {
    pub kind: RequestKind,
    pub path: String,
    pub body: Option<Value>,
}

struct Failure {
    kind: RequestKind,
    path: Option<String>,
    error: VaultError,
}

#[derive(Default)]
struct State {
    groups: BTreeMap<String, Map<String, Value>>,
    next_ids: VecDeque<String>,
    counter: u64,
    failures: Vec<Failure>,
    discard_creates: bool,
    requests: Vec<RecordedRequest>,
}

/// In-memory identity group store
#[derive(Default)]
pub struct MemoryLogical {
    state: Mutex<State>,
}

impl MemoryLogical {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Use `id` for the next group created
    pub fn assign_next_id(&self, id: impl Into<String>) {
        self.lock().next_ids.push_back(id.into());
    }

    /// Fail the next request of `kind` with `error`
    pub fn fail_next(&self, kind: RequestKind, error: VaultError) {
        self.lock().failures.push(Failure {
            kind,
            path: None,
            error,
        });
    }

    /// Fail the next request of `kind` to `path` with `error`
    pub fn fail_path(&self, kind: RequestKind, path: impl Into<String>, error: VaultError) {
        self.lock().failures.push(Failure {
            kind,
            path: Some(normalize(&path.into()).to_string()),
            error,
        });
    }

    /// Accept creates without storing the group or answering an id
    pub fn discard_creates(&self) {
        self.lock().discard_creates = true;
    }

    /// Place a group directly in the store
    pub fn insert_group(&self, id: impl Into<String>, data: Value) {
        let id = id.into();
        let mut fields = match data {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        fields.insert("id".to_string(), Value::String(id.clone()));
        self.lock().groups.insert(id, fields);
    }

    /// Remove a group behind the reconciler's back
    pub fn remove_group(&self, id: &str) -> bool {
        self.lock().groups.remove(id).is_some()
    }

    /// Stored fields of a group
    pub fn group(&self, id: &str) -> Option<Map<String, Value>> {
        self.lock().groups.get(id).cloned()
    }

    /// Number of stored groups
    pub fn len(&self) -> usize {
        self.lock().groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All requests seen so far
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.lock().requests.clone()
    }

    /// Paths of requests of one kind
    pub fn paths(&self, kind: RequestKind) -> Vec<String> {
        self.lock()
            .requests
            .iter()
            .filter(|r| r.kind == kind)
            .map(|r| r.path.clone())
            .collect()
    }

    pub fn clear_requests(&self) {
        self.lock().requests.clear();
    }
}

impl State {
    fn record(&mut self, kind: RequestKind, path: &str, body: Option<&Value>) -> Result<(), VaultError> {
        self.requests.push(RecordedRequest {
            kind,
            path: path.to_string(),
            body: body.cloned(),
        });
        let target = normalize(path);
        let matching = self.failures.iter().position(|failure| {
            failure.kind == kind && failure.path.as_deref().map_or(true, |p| p == target)
        });
        match matching {
            Some(index) => Err(self.failures.remove(index).error),
            None => Ok(()),
        }
    }

    fn next_id(&mut self) -> String {
        self.next_ids.pop_front().unwrap_or_else(|| {
            self.counter += 1;
            format!("group-{:04}", self.counter)
        })
    }

    fn id_for_name(&self, name: &str) -> Option<String> {
        self.groups
            .iter()
            .find(|(_, fields)| fields.get("name").and_then(Value::as_str) == Some(name))
            .map(|(id, _)| id.clone())
    }

    fn create(&mut self, body: &Value) -> Result<Option<Secret>, VaultError> {
        let name = body
            .get("name")
            .and_then(Value::as_str)
            .filter(|name| !name.is_empty())
            .ok_or_else(|| VaultError::api(400, "missing name"))?
            .to_string();
        let kind = body.get("type").and_then(Value::as_str).unwrap_or("internal");
        if kind != "internal" && kind != "external" {
            return Err(VaultError::api(400, format!("invalid type {:?}", kind)));
        }

        if self.discard_creates {
            return Ok(None);
        }

        if let Some(existing) = self.id_for_name(&name) {
            if let Some(fields) = self.groups.get_mut(&existing) {
                merge_fields(fields, body);
            }
            return Ok(None);
        }

        let id = self.next_id();
        let mut fields = Map::new();
        fields.insert("id".to_string(), Value::String(id.clone()));
        fields.insert("name".to_string(), Value::String(name.clone()));
        fields.insert("type".to_string(), Value::String(kind.to_string()));
        merge_fields(&mut fields, body);
        self.groups.insert(id.clone(), fields);

        let mut data = Map::new();
        data.insert("id".to_string(), Value::String(id));
        data.insert("name".to_string(), Value::String(name));
        Ok(Some(Secret::with_data(data)))
    }
}

fn merge_fields(fields: &mut Map<String, Value>, body: &Value) {
    for key in MUTABLE_FIELDS {
        if let Some(value) = body.get(*key) {
            fields.insert((*key).to_string(), value.clone());
        }
    }
}

/// Shape a stored group the way Vault reads it back
fn read_view(fields: &Map<String, Value>) -> Secret {
    let mut data = fields.clone();
    data.entry("metadata").or_insert(Value::Null);
    data.entry("policies").or_insert(Value::Null);
    data.entry("member_entity_ids").or_insert_with(|| json!([]));
    data.entry("member_group_ids").or_insert_with(|| json!([]));
    data.entry("parent_group_ids").or_insert_with(|| json!([]));
    Secret::with_data(data)
}

fn normalize(path: &str) -> &str {
    path.trim_matches('/')
}

#[async_trait]
impl Logical for MemoryLogical {
    async fn read(&self, path: &str) -> Result<Option<Secret>, VaultError> {
        let mut state = self.lock();
        state.record(RequestKind::Read, path, None)?;

        let path = normalize(path);
        if let Some(id) = path.strip_prefix(ID_PREFIX) {
            return Ok(state.groups.get(id).map(read_view));
        }
        if let Some(encoded) = path.strip_prefix(NAME_PREFIX) {
            let name = urlencoding::decode(encoded)
                .map_err(|e| VaultError::api(400, format!("invalid group name: {}", e)))?;
            let found = state.id_for_name(&name);
            return Ok(found.and_then(|id| state.groups.get(&id).map(read_view)));
        }
        Err(VaultError::api(405, format!("unsupported path {:?}", path)))
    }

    async fn write(&self, path: &str, body: Value) -> Result<Option<Secret>, VaultError> {
        let mut state = self.lock();
        state.record(RequestKind::Write, path, Some(&body))?;

        let path = normalize(path);
        if path == GROUP_COLLECTION {
            return state.create(&body);
        }
        if let Some(id) = path.strip_prefix(ID_PREFIX) {
            let fields = state
                .groups
                .get_mut(id)
                .ok_or_else(|| VaultError::api(400, "group not found"))?;
            merge_fields(fields, &body);
            return Ok(None);
        }
        Err(VaultError::api(405, format!("unsupported path {:?}", path)))
    }

    async fn delete(&self, path: &str) -> Result<Option<Secret>, VaultError> {
        let mut state = self.lock();
        state.record(RequestKind::Delete, path, None)?;

        let path = normalize(path);
        if let Some(id) = path.strip_prefix(ID_PREFIX) {
            state.groups.remove(id);
            return Ok(None);
        }
        Err(VaultError::api(405, format!("unsupported path {:?}", path)))
    }
}
