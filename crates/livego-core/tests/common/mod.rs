//! Shared test doubles for integration tests

#![allow(dead_code)]

use std::time::Duration;

use livego_core::{
    ClientConfig, Delta, Effects, ErrorPayload, LiveError, LiveResult, Memo, MountResponse, Props,
    Snapshot, Transport, UpdateResponse,
};
use parking_lot::Mutex;
use serde_json::{json, Map, Value};
use tracing_subscriber::EnvFilter;

/// Route library logs through the test harness's captured output.
///
/// Honors `RUST_LOG`; defaults to `debug` for the library.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("livego_core=debug")),
        )
        .try_init();
}

/// One transport call as seen by the fake server
#[derive(Debug, Clone, PartialEq)]
pub enum Recorded {
    Mount {
        endpoint: String,
        component: String,
        props: Props,
    },
    Update {
        endpoint: String,
        checksum: String,
        deltas: Vec<Delta>,
    },
}

/// In-memory stand-in for a LiveGo server.
///
/// - `SyncInput` sets the field
/// - `increment [n]` adds `n` (default 1) to `count`
/// - `reset` replaces the whole state with `{ "count": 0 }`
/// - `reject` fails the round trip with a `VALIDATION` payload
/// - `malformed` fails with a protocol error
/// - `delayed [ms, value]` sleeps, then sets `value`
/// - any other method is recorded in `calls`
#[derive(Default)]
pub struct FakeServer {
    pub calls: Mutex<Vec<Recorded>>,
    pub mount_error: Mutex<Option<ErrorPayload>>,
    version: Mutex<u64>,
}

impl FakeServer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_mount(payload: ErrorPayload) -> Self {
        let server = Self::default();
        *server.mount_error.lock() = Some(payload);
        server
    }

    pub fn recorded(&self) -> Vec<Recorded> {
        self.calls.lock().clone()
    }

    pub fn update_batches(&self) -> Vec<Vec<Delta>> {
        self.calls
            .lock()
            .iter()
            .filter_map(|call| match call {
                Recorded::Update { deltas, .. } => Some(deltas.clone()),
                Recorded::Mount { .. } => None,
            })
            .collect()
    }

    fn next_checksum(&self) -> String {
        let mut version = self.version.lock();
        *version += 1;
        format!("v{}", *version)
    }
}

impl Transport for FakeServer {
    async fn mount(
        &self,
        config: &ClientConfig,
        component: &str,
        props: &Props,
    ) -> LiveResult<MountResponse> {
        self.calls.lock().push(Recorded::Mount {
            endpoint: config.endpoint.clone(),
            component: component.to_string(),
            props: props.clone(),
        });
        if let Some(payload) = self.mount_error.lock().clone() {
            return Err(LiveError::Transport(payload));
        }

        let mut state = props.clone();
        state.entry("count").or_insert(json!(0));
        Ok(MountResponse {
            snapshot: Snapshot {
                state,
                memo: Memo {
                    id: format!("{component}-1"),
                    name: component.to_string(),
                    path: "/".to_string(),
                    method: "GET".to_string(),
                    children: vec![],
                    data: Map::new(),
                },
                checksum: self.next_checksum(),
            },
        })
    }

    async fn update(
        &self,
        config: &ClientConfig,
        snapshot: &Snapshot,
        deltas: &[Delta],
    ) -> LiveResult<UpdateResponse> {
        self.calls.lock().push(Recorded::Update {
            endpoint: config.endpoint.clone(),
            checksum: snapshot.checksum.clone(),
            deltas: deltas.to_vec(),
        });

        let mut state = snapshot.state.clone();
        let mut effects = Effects::default();
        for delta in deltas {
            match delta {
                Delta::SyncInput { field, value } => {
                    state.insert(field.clone(), value.clone());
                    effects.dirty.insert(field.clone());
                }
                Delta::CallMethod { method, params } => match method.as_str() {
                    "increment" => {
                        let step = params.first().and_then(Value::as_i64).unwrap_or(1);
                        let count = state.get("count").and_then(Value::as_i64).unwrap_or(0);
                        state.insert("count".to_string(), json!(count + step));
                        effects.dirty.insert("count".to_string());
                    }
                    "reset" => {
                        state = Map::new();
                        state.insert("count".to_string(), json!(0));
                        effects.dirty.insert("count".to_string());
                    }
                    "reject" => {
                        return Err(LiveError::Transport(ErrorPayload::new(
                            "VALIDATION",
                            "rejected by server",
                            422,
                        )));
                    }
                    "malformed" => {
                        return Err(LiveError::Protocol("missing snapshot".to_string()));
                    }
                    "delayed" => {
                        let ms = params.first().and_then(Value::as_u64).unwrap_or(0);
                        tokio::time::sleep(Duration::from_millis(ms)).await;
                        let value = params.get(1).cloned().unwrap_or(Value::Null);
                        state.insert("value".to_string(), value);
                    }
                    other => {
                        let mut dispatch = Map::new();
                        dispatch.insert("called".to_string(), json!(other));
                        effects.dispatches.push(dispatch);
                    }
                },
            }
        }

        Ok(UpdateResponse {
            snapshot: Snapshot {
                state,
                memo: snapshot.memo.clone(),
                checksum: self.next_checksum(),
            },
            effects,
        })
    }
}

/// Build props from a JSON object literal
pub fn props(value: Value) -> Props {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}
