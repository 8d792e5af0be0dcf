//! Push channel state and lifecycle hooks
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │  ChannelState                                                   │
//! │  ├── Disconnected: initial, after disconnect() or exhaustion    │
//! │  ├── Connecting: handshake in flight                            │
//! │  ├── Open: frames are being delivered                           │
//! │  ├── Error: the connection failed                               │
//! │  └── Reconnecting: waiting out the backoff delay                │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

use std::fmt;
use std::sync::Arc;

use crate::error::LiveError;

/// Connection state of a push channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChannelState {
    #[default]
    Disconnected,
    Connecting,
    Open,
    Error,
    Reconnecting,
}

impl fmt::Display for ChannelState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelState::Disconnected => write!(f, "Disconnected"),
            ChannelState::Connecting => write!(f, "Connecting"),
            ChannelState::Open => write!(f, "Open"),
            ChannelState::Error => write!(f, "Error"),
            ChannelState::Reconnecting => write!(f, "Reconnecting"),
        }
    }
}

pub type LifecycleHook = dyn Fn() + Send + Sync;
pub type ErrorHook = dyn Fn(&LiveError) + Send + Sync;

/// Callbacks fired on channel lifecycle transitions
#[derive(Clone, Default)]
pub struct ChannelHooks {
    pub(crate) on_connect: Option<Arc<LifecycleHook>>,
    pub(crate) on_disconnect: Option<Arc<LifecycleHook>>,
    pub(crate) on_error: Option<Arc<ErrorHook>>,
}

impl ChannelHooks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fired once each time a connection opens.
    pub fn on_connect(mut self, hook: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_connect = Some(Arc::new(hook));
        self
    }

    /// Fired when an open channel is closed by `disconnect()` or gives up.
    pub fn on_disconnect(mut self, hook: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_disconnect = Some(Arc::new(hook));
        self
    }

    /// Fired for every connection failure, before any reconnect is scheduled.
    pub fn on_error(mut self, hook: impl Fn(&LiveError) + Send + Sync + 'static) -> Self {
        self.on_error = Some(Arc::new(hook));
        self
    }
}

impl fmt::Debug for ChannelHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelHooks")
            .field("on_connect", &self.on_connect.is_some())
            .field("on_disconnect", &self.on_disconnect.is_some())
            .field("on_error", &self.on_error.is_some())
            .finish()
    }
}
