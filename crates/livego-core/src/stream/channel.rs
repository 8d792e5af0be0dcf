//! Resilient push-event channel for one component instance
//!
//! The `StreamChannel` owns at most one background task per connection
//! lifetime. The task performs the handshake, delivers frames, and on
//! failure runs the backoff state machine:
//!
//! ```text
//! Disconnected ──connect()──► Connecting ──open──► Open
//!                                 ▲                 │ error / end of stream
//!                                 │                 ▼
//!                           Reconnecting ◄──retry── Error ──exhausted──► Disconnected
//! ```
//!
//! Frames are decoded as JSON and dispatched first to the global handler
//! (if any), then to the subscribers of the frame's event type in
//! registration order. Malformed frames are logged and dropped; they do not
//! count as connection errors.
//!
//! # Example
//!
//! ```ignore
//! let source = HttpPushSource::new(&transport, config.clone());
//! let channel = StreamChannel::from_config(
//!     source,
//!     component.stream_target(signature)?,
//!     &config.stream,
//!     ChannelHooks::new().on_error(|e| eprintln!("stream error: {e}")),
//! );
//!
//! channel.on("chat", |data| println!("chat: {data}"));
//! channel.connect();
//! ```

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use futures::StreamExt;
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::backoff::ReconnectPolicy;
use super::events::{ChannelHooks, ChannelState};
use super::source::{PushSource, StreamTarget};
use super::sse::RawFrame;
use crate::config::StreamConfig;
use crate::error::LiveError;
use crate::subscribers::{invoke_guarded, SubscriberId, Subscribers, Unsubscribe};
use crate::types::StreamEvent;

/// Callback for one event type; receives the decoded payload
pub type EventCallback = dyn Fn(&Value) + Send + Sync;

/// Global handler; receives every decoded event regardless of type
pub type EventHandler = dyn Fn(&StreamEvent) + Send + Sync;

/// Connection bookkeeping, guarded by one lock
struct Connection {
    state: ChannelState,
    /// Reconnects scheduled since the last successful open
    attempts: u32,
    /// Bumped by every connect/disconnect so stale tasks can tell they lost
    generation: u64,
    task: Option<JoinHandle<()>>,
    was_open: bool,
}

struct Shared<S> {
    source: S,
    target: StreamTarget,
    policy: ReconnectPolicy,
    hooks: ChannelHooks,
    connection: Mutex<Connection>,
    listeners: Mutex<HashMap<String, Subscribers<EventCallback>>>,
    handler: RwLock<Option<Arc<EventHandler>>>,
}

/// Push channel addressed by `(component id, signature)`
pub struct StreamChannel<S: PushSource> {
    shared: Arc<Shared<S>>,
}

impl<S: PushSource> StreamChannel<S> {
    pub fn new(source: S, target: StreamTarget, policy: ReconnectPolicy, hooks: ChannelHooks) -> Self {
        Self {
            shared: Arc::new(Shared {
                source,
                target,
                policy,
                hooks,
                connection: Mutex::new(Connection {
                    state: ChannelState::Disconnected,
                    attempts: 0,
                    generation: 0,
                    task: None,
                    was_open: false,
                }),
                listeners: Mutex::new(HashMap::new()),
                handler: RwLock::new(None),
            }),
        }
    }

    pub fn from_config(
        source: S,
        target: StreamTarget,
        config: &StreamConfig,
        hooks: ChannelHooks,
    ) -> Self {
        Self::new(source, target, config.reconnect_policy(), hooks)
    }

    pub fn target(&self) -> &StreamTarget {
        &self.shared.target
    }

    pub fn policy(&self) -> &ReconnectPolicy {
        &self.shared.policy
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Connection lifecycle
    // ═══════════════════════════════════════════════════════════════════════

    /// Open the push connection.
    ///
    /// No-op while a connection task exists. Outside a tokio runtime it
    /// logs a warning and the channel stays disconnected.
    pub fn connect(&self) {
        let mut connection = self.shared.connection.lock();
        if connection.task.is_some() {
            debug!(stream = %self.shared.target, "Push channel already connected");
            return;
        }
        let Ok(runtime) = Handle::try_current() else {
            warn!(stream = %self.shared.target, "No tokio runtime; push channel not started");
            return;
        };

        connection.generation += 1;
        connection.attempts = 0;
        connection.was_open = false;
        connection.state = ChannelState::Connecting;
        let generation = connection.generation;

        info!(stream = %self.shared.target, "Connecting push channel");
        let shared = self.shared.clone();
        connection.task = Some(runtime.spawn(async move {
            Shared::run(shared, generation).await;
        }));
    }

    /// Close the connection, cancel any pending reconnect and drop every
    /// type subscriber.
    ///
    /// Fires the disconnect hook once if a connection had been open.
    pub fn disconnect(&self) {
        let (task, was_open) = {
            let mut connection = self.shared.connection.lock();
            connection.generation += 1;
            connection.state = ChannelState::Disconnected;
            let was_open = std::mem::take(&mut connection.was_open);
            (connection.task.take(), was_open)
        };

        self.shared.listeners.lock().clear();

        if let Some(task) = task {
            task.abort();
            info!(stream = %self.shared.target, "Push channel disconnected");
            if was_open {
                self.shared.fire_disconnect();
            }
        }
    }

    /// True while a connection exists and is open.
    pub fn is_connected(&self) -> bool {
        let connection = self.shared.connection.lock();
        connection.task.is_some() && connection.state == ChannelState::Open
    }

    pub fn state(&self) -> ChannelState {
        self.shared.connection.lock().state
    }

    /// Reconnects scheduled since the last successful open.
    pub fn attempts(&self) -> u32 {
        self.shared.connection.lock().attempts
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Subscribers
    // ═══════════════════════════════════════════════════════════════════════

    /// Subscribe to one event type.
    ///
    /// The returned handle removes exactly this callback; removing the last
    /// callback for a type frees the type's slot.
    pub fn on<F>(&self, event_type: impl Into<String>, callback: F) -> Unsubscribe
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        let event_type = event_type.into();
        let id = self
            .shared
            .listeners
            .lock()
            .entry(event_type.clone())
            .or_default()
            .insert(Arc::new(callback));

        let shared: Weak<Shared<S>> = Arc::downgrade(&self.shared);
        Unsubscribe::new(id, move || {
            if let Some(shared) = shared.upgrade() {
                shared.remove_listener(&event_type, id);
            }
        })
    }

    /// Remove one callback, or every callback for the type when `id` is `None`.
    pub fn off(&self, event_type: &str, id: Option<SubscriberId>) {
        match id {
            Some(id) => self.shared.remove_listener(event_type, id),
            None => {
                self.shared.listeners.lock().remove(event_type);
            }
        }
    }

    /// Install the global handler, replacing any previous one.
    pub fn on_any<F>(&self, handler: F)
    where
        F: Fn(&StreamEvent) + Send + Sync + 'static,
    {
        *self.shared.handler.write() = Some(Arc::new(handler));
    }

    pub fn clear_event_handler(&self) {
        self.shared.handler.write().take();
    }

    pub fn subscriber_count(&self, event_type: &str) -> usize {
        self.shared
            .listeners
            .lock()
            .get(event_type)
            .map(|subs| subs.len())
            .unwrap_or(0)
    }

    /// Event types that currently have at least one subscriber.
    pub fn event_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.shared.listeners.lock().keys().cloned().collect();
        types.sort();
        types
    }
}

impl<S: PushSource> Drop for StreamChannel<S> {
    fn drop(&mut self) {
        if let Some(task) = self.shared.connection.lock().task.take() {
            task.abort();
        }
    }
}

impl<S: PushSource> Shared<S> {
    /// Connection task: handshake, deliver frames, back off, repeat.
    async fn run(shared: Arc<Self>, generation: u64) {
        loop {
            if !shared.transition(generation, ChannelState::Connecting) {
                return;
            }

            let failure = match shared.source.open(&shared.target).await {
                Ok(mut frames) => {
                    if !shared.mark_open(generation) {
                        return;
                    }
                    loop {
                        match frames.next().await {
                            Some(Ok(frame)) => shared.dispatch_frame(frame),
                            Some(Err(e)) => break e,
                            None => break LiveError::Connection("stream closed by server".to_string()),
                        }
                    }
                }
                Err(e) => e,
            };

            let Some(delay) = shared.handle_failure(generation, &failure) else {
                return;
            };
            tokio::time::sleep(delay).await;
        }
    }

    /// Move to `state` if this task still owns the connection.
    fn transition(&self, generation: u64, state: ChannelState) -> bool {
        let mut connection = self.connection.lock();
        if connection.generation != generation {
            return false;
        }
        connection.state = state;
        true
    }

    fn mark_open(&self, generation: u64) -> bool {
        {
            let mut connection = self.connection.lock();
            if connection.generation != generation {
                return false;
            }
            connection.state = ChannelState::Open;
            connection.attempts = 0;
            connection.was_open = true;
        }
        info!(stream = %self.target, "Push channel open");
        if let Some(hook) = &self.hooks.on_connect {
            invoke_guarded(|| hook());
        }
        true
    }

    /// Report a failure and decide whether to reconnect.
    ///
    /// Returns the backoff delay, or `None` when the channel is finished.
    fn handle_failure(&self, generation: u64, error: &LiveError) -> Option<std::time::Duration> {
        if !self.transition(generation, ChannelState::Error) {
            return None;
        }
        warn!(stream = %self.target, error = %error, "Push channel error");
        if let Some(hook) = &self.hooks.on_error {
            invoke_guarded(|| hook(error));
        }

        let mut connection = self.connection.lock();
        if connection.generation != generation {
            return None;
        }

        if self.policy.should_retry(connection.attempts) {
            let delay = self.policy.delay_for(connection.attempts);
            connection.attempts += 1;
            connection.state = ChannelState::Reconnecting;
            info!(
                stream = %self.target,
                attempt = connection.attempts,
                delay_ms = delay.as_millis() as u64,
                "Scheduling push channel reconnect"
            );
            return Some(delay);
        }

        warn!(
            stream = %self.target,
            attempts = connection.attempts,
            "Push channel giving up; call connect() to resume"
        );
        connection.state = ChannelState::Disconnected;
        // Releasing our own handle detaches this task; it ends right after.
        connection.task.take();
        let was_open = std::mem::take(&mut connection.was_open);
        drop(connection);

        if was_open {
            self.fire_disconnect();
        }
        None
    }

    fn fire_disconnect(&self) {
        if let Some(hook) = &self.hooks.on_disconnect {
            invoke_guarded(|| hook());
        }
    }

    fn dispatch_frame(&self, frame: RawFrame) {
        let event_type = frame.event_type().to_string();
        let data = match serde_json::from_str::<Value>(&frame.data) {
            Ok(data) => data,
            Err(e) => {
                let error = LiveError::StreamParse(e.to_string());
                warn!(stream = %self.target, %event_type, error = %error, "Dropping malformed frame");
                return;
            }
        };
        let event = StreamEvent {
            event_type,
            data,
            id: frame.id,
        };

        let handler = self.handler.read().clone();
        if let Some(handler) = handler {
            invoke_guarded(|| handler(&event));
        }

        let subscribers = self.listeners.lock().get(&event.event_type).cloned();
        match subscribers {
            Some(subscribers) => {
                subscribers.dispatch(|callback| callback(&event.data));
            }
            None => debug!(stream = %self.target, event_type = %event.event_type, "No subscribers for event"),
        }
    }

    fn remove_listener(&self, event_type: &str, id: SubscriberId) {
        let mut listeners = self.listeners.lock();
        if let Some(subscribers) = listeners.get(event_type) {
            subscribers.remove(id);
            if subscribers.is_empty() {
                listeners.remove(event_type);
            }
        }
    }
}
