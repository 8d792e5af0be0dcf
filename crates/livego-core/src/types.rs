//! Core wire types for the LiveGo client

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Component state as held by the server
pub type State = Map<String, Value>;

/// Props passed at mount time
pub type Props = Map<String, Value>;

/// Component metadata carried inside a snapshot
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Memo {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub method: String,
    #[serde(default)]
    pub children: Vec<String>,
    #[serde(default)]
    pub data: Map<String, Value>,
}

/// Server-authoritative state, metadata and checksum for one component instance.
///
/// The checksum is opaque to the client; it travels back to the server
/// untouched on every update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub state: State,
    pub memo: Memo,
    pub checksum: String,
}

impl Snapshot {
    pub fn id(&self) -> &str {
        &self.memo.id
    }

    pub fn name(&self) -> &str {
        &self.memo.name
    }
}

/// One client-to-server mutation intent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "camelCase")]
pub enum Delta {
    CallMethod { method: String, params: Vec<Value> },
    SyncInput { field: String, value: Value },
}

/// Caller-side intent accepted by `LiveComponent::batch`
#[derive(Debug, Clone, PartialEq)]
pub enum Intent {
    Call { method: String, params: Vec<Value> },
    Set { field: String, value: Value },
}

impl Intent {
    pub fn call(method: impl Into<String>, params: Vec<Value>) -> Self {
        Intent::Call {
            method: method.into(),
            params,
        }
    }

    pub fn set(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Intent::Set {
            field: field.into(),
            value: value.into(),
        }
    }
}

impl From<Intent> for Delta {
    fn from(intent: Intent) -> Self {
        match intent {
            Intent::Call { method, params } => Delta::CallMethod { method, params },
            Intent::Set { field, value } => Delta::SyncInput { field, value },
        }
    }
}

/// Side-channel instructions accompanying one update response.
///
/// Effects describe only the update that produced them and are never
/// accumulated across updates.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Effects {
    #[serde(default)]
    pub dirty: BTreeSet<String>,
    #[serde(default)]
    pub dispatches: Vec<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redirect: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub html: Option<String>,
}

impl Effects {
    pub fn is_empty(&self) -> bool {
        self.dirty.is_empty()
            && self.dispatches.is_empty()
            && self.redirect.is_none()
            && self.html.is_none()
    }
}

/// Body sent to the mount endpoint
#[derive(Debug, Clone, Serialize)]
pub struct MountRequest<'a> {
    pub component: &'a str,
    pub props: &'a Props,
}

/// Body returned by the mount endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MountResponse {
    pub snapshot: Snapshot,
}

/// Body sent to the update endpoint
#[derive(Debug, Clone, Serialize)]
pub struct UpdateRequest<'a> {
    pub snapshot: &'a Snapshot,
    pub updates: &'a [Delta],
}

/// Body returned by the update endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateResponse {
    pub snapshot: Snapshot,
    #[serde(default)]
    pub effects: Effects,
}

/// A decoded server-pushed event
#[derive(Debug, Clone, PartialEq)]
pub struct StreamEvent {
    pub event_type: String,
    pub data: Value,
    pub id: Option<String>,
}
