//! Snapshot sync engine - the primary entry point for LiveGo components
//!
//! A [`LiveComponent`] owns exactly one live [`Snapshot`] for a mounted
//! component instance. User actions become ordered [`Delta`] batches; each
//! batch is one transport round trip. A successful response replaces the
//! snapshot wholesale and then notifies subscribers with the new state and
//! the effects of that update. A failed round trip leaves the snapshot alone
//! and notifies nobody.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │  LiveComponent                                                  │
//! │  ├── snapshot: Option<Arc<Snapshot>>   (None until mounted)     │
//! │  ├── subscribers: Subscribers<(state, effects)>                 │
//! │  └── transport: Arc<T: Transport>                               │
//! │                                                                 │
//! │  call / set / batch ──► send_updates(deltas)                    │
//! │     └── transport.update ──► replace snapshot ──► notify        │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Overlapping round trips on the same instance are not serialized:
//! whichever response arrives last becomes the current snapshot. Callers
//! that need strict ordering must await each call before issuing the next.
//!
//! # Example
//!
//! ```ignore
//! use livego_core::{HttpTransport, Intent, LiveClient, MountOptions};
//! use serde_json::json;
//!
//! let client = LiveClient::new(HttpTransport::new("http://localhost:8080")?);
//! let counter = client.mount("counter", Default::default(), MountOptions::default()).await?;
//!
//! counter.subscribe(|state, effects| println!("{state:?} dirty={:?}", effects.dirty));
//! counter.call("increment", vec![json!(1)]).await?;
//! counter.batch(vec![Intent::set("step", 5), Intent::call("increment", vec![])]).await?;
//! ```

use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::config::ClientConfig;
use crate::error::{LiveError, LiveResult, MountError};
use crate::stream::StreamTarget;
use crate::subscribers::{Subscribers, Unsubscribe};
use crate::transport::Transport;
use crate::types::{Delta, Effects, Intent, Memo, Props, Snapshot, State, UpdateResponse};

/// Callback invoked after every accepted update
pub type StateCallback = dyn Fn(&State, &Effects) + Send + Sync;

/// Per-mount options
#[derive(Debug, Clone, Default)]
pub struct MountOptions {
    /// Overrides the client's configuration for this instance
    pub config: Option<ClientConfig>,
}

impl MountOptions {
    pub fn with_config(config: ClientConfig) -> Self {
        Self {
            config: Some(config),
        }
    }
}

/// Factory for component instances sharing one transport and configuration
pub struct LiveClient<T: Transport> {
    transport: Arc<T>,
    config: ClientConfig,
}

impl<T: Transport> Clone for LiveClient<T> {
    fn clone(&self) -> Self {
        Self {
            transport: self.transport.clone(),
            config: self.config.clone(),
        }
    }
}

impl<T: Transport> LiveClient<T> {
    /// Create a client using the process-wide default configuration.
    pub fn new(transport: T) -> Self {
        Self::with_config(transport, ClientConfig::global())
    }

    pub fn with_config(transport: T, config: ClientConfig) -> Self {
        Self {
            transport: Arc::new(transport),
            config,
        }
    }

    pub fn transport(&self) -> &Arc<T> {
        &self.transport
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Create an unmounted instance of `name`.
    pub fn component(&self, name: impl Into<String>) -> LiveComponent<T> {
        LiveComponent::new(name, self.transport.clone(), self.config.clone())
    }

    /// Mount `name` and return the bound instance.
    ///
    /// On failure no instance is produced and the transport's error is
    /// returned unchanged.
    pub async fn mount(
        &self,
        name: impl Into<String>,
        props: Props,
        options: MountOptions,
    ) -> Result<LiveComponent<T>, MountError> {
        let component = self.component(name);
        component.mount(props, options).await?;
        Ok(component)
    }
}

/// One mounted (or mountable) server component instance
pub struct LiveComponent<T: Transport> {
    name: String,
    transport: Arc<T>,
    config: RwLock<ClientConfig>,
    snapshot: RwLock<Option<Arc<Snapshot>>>,
    subscribers: Subscribers<StateCallback>,
    last_error: Mutex<Option<LiveError>>,
}

impl<T: Transport> LiveComponent<T> {
    /// Create an unmounted instance. Nothing is sent until [`mount`](Self::mount).
    pub fn new(name: impl Into<String>, transport: Arc<T>, config: ClientConfig) -> Self {
        Self {
            name: name.into(),
            transport,
            config: RwLock::new(config),
            snapshot: RwLock::new(None),
            subscribers: Subscribers::new(),
            last_error: Mutex::new(None),
        }
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Lifecycle
    // ═══════════════════════════════════════════════════════════════════════

    /// Request the initial snapshot from the server.
    ///
    /// A failed mount leaves the instance as it was: an unmounted instance
    /// stays unmounted.
    pub async fn mount(&self, props: Props, options: MountOptions) -> Result<(), MountError> {
        let config = match options.config {
            Some(config) => config,
            None => self.config.read().clone(),
        };

        match self.transport.mount(&config, &self.name, &props).await {
            Ok(response) => {
                info!(
                    component = %self.name,
                    id = %response.snapshot.memo.id,
                    "Mounted component"
                );
                *self.config.write() = config;
                *self.snapshot.write() = Some(Arc::new(response.snapshot));
                self.last_error.lock().take();
                Ok(())
            }
            Err(e) => {
                warn!(component = %self.name, error = %e, "Mount failed");
                self.record_error(e.clone());
                Err(e)
            }
        }
    }

    pub fn is_mounted(&self) -> bool {
        self.snapshot.read().is_some()
    }

    /// Tear the instance down: drop all subscribers and the snapshot.
    ///
    /// Later call/set/batch fail with [`LiveError::NotMounted`] without
    /// contacting the transport.
    pub fn destroy(&self) {
        self.clear_subscribers();
        if self.snapshot.write().take().is_some() {
            debug!(component = %self.name, "Destroyed component");
        }
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Updates
    // ═══════════════════════════════════════════════════════════════════════

    /// Call a server-side method.
    pub async fn call(&self, method: impl Into<String>, params: Vec<Value>) -> LiveResult<Effects> {
        self.send_updates(vec![Delta::CallMethod {
            method: method.into(),
            params,
        }])
        .await
    }

    /// Sync one field to the server.
    pub async fn set(&self, field: impl Into<String>, value: impl Into<Value>) -> LiveResult<Effects> {
        self.send_updates(vec![Delta::SyncInput {
            field: field.into(),
            value: value.into(),
        }])
        .await
    }

    /// Send a heterogeneous sequence of intents in one round trip, in order.
    pub async fn batch(&self, intents: impl IntoIterator<Item = Intent>) -> LiveResult<Effects> {
        let deltas: Vec<Delta> = intents.into_iter().map(Delta::from).collect();
        self.send_updates(deltas).await
    }

    /// Send an ordered delta batch and adopt the response.
    ///
    /// An empty batch requires a mounted instance but issues no request.
    pub async fn send_updates(&self, deltas: Vec<Delta>) -> LiveResult<Effects> {
        let Some(current) = self.snapshot() else {
            self.record_error(LiveError::NotMounted);
            return Err(LiveError::NotMounted);
        };
        if deltas.is_empty() {
            return Ok(Effects::default());
        }

        let config = self.config.read().clone();
        debug!(component = %self.name, deltas = deltas.len(), "Sending updates");

        match self.transport.update(&config, &current, &deltas).await {
            Ok(UpdateResponse { snapshot, effects }) => {
                let snapshot = Arc::new(snapshot);
                let adopted = {
                    let mut slot = self.snapshot.write();
                    let mounted = slot.is_some();
                    if mounted {
                        *slot = Some(snapshot.clone());
                    }
                    mounted
                };
                if !adopted {
                    debug!(component = %self.name, "Dropping response for destroyed component");
                    self.record_error(LiveError::NotMounted);
                    return Err(LiveError::NotMounted);
                }
                self.last_error.lock().take();

                let failed = self
                    .subscribers
                    .dispatch(|callback| callback(&snapshot.state, &effects));
                if failed > 0 {
                    warn!(component = %self.name, failed, "Subscribers panicked during notify");
                }
                Ok(effects)
            }
            Err(e) => {
                warn!(component = %self.name, error = %e, "Update failed; snapshot unchanged");
                self.record_error(e.clone());
                Err(e)
            }
        }
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Subscribers
    // ═══════════════════════════════════════════════════════════════════════

    /// Register a callback for `(state, effects)` after each accepted update.
    pub fn subscribe<F>(&self, callback: F) -> Unsubscribe
    where
        F: Fn(&State, &Effects) + Send + Sync + 'static,
    {
        self.subscribers.subscribe(Arc::new(callback))
    }

    pub fn clear_subscribers(&self) {
        self.subscribers.clear();
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Reads
    // ═══════════════════════════════════════════════════════════════════════

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Server-assigned instance id, once mounted.
    pub fn id(&self) -> Option<String> {
        self.snapshot.read().as_ref().map(|s| s.memo.id.clone())
    }

    pub fn state(&self) -> Option<State> {
        self.snapshot.read().as_ref().map(|s| s.state.clone())
    }

    pub fn memo(&self) -> Option<Memo> {
        self.snapshot.read().as_ref().map(|s| s.memo.clone())
    }

    pub fn checksum(&self) -> Option<String> {
        self.snapshot.read().as_ref().map(|s| s.checksum.clone())
    }

    pub fn snapshot(&self) -> Option<Arc<Snapshot>> {
        self.snapshot.read().clone()
    }

    /// Configuration used for this instance's round trips.
    pub fn config(&self) -> ClientConfig {
        self.config.read().clone()
    }

    /// The most recent failure observed by this instance, cleared by the
    /// next successful round trip.
    pub fn last_error(&self) -> Option<LiveError> {
        self.last_error.lock().clone()
    }

    /// Address of this instance's push channel.
    pub fn stream_target(&self, signature: impl Into<String>) -> LiveResult<StreamTarget> {
        let id = self.id().ok_or(LiveError::NotMounted)?;
        Ok(StreamTarget::new(id, signature))
    }

    fn record_error(&self, error: LiveError) {
        *self.last_error.lock() = Some(error);
    }
}
