//! LiveGo Client Core Library
//!
//! Client-side reflector for server-rendered LiveGo components.
//!
//! ## Overview
//!
//! Authoritative component state lives on the server. The client holds a
//! cached snapshot, renders from it, and forwards user interactions as
//! ordered deltas. Independently, a push channel streams server-originated
//! events with automatic reconnection.
//!
//! - **Sync engine** ([`LiveComponent`]): one live snapshot per mounted
//!   instance, replaced wholesale on every accepted response
//! - **Push channel** ([`StreamChannel`]): reconnect/backoff state machine
//!   with per-event-type subscribers
//! - **Subscribers** ([`Subscribers`]): ordered callback registry that
//!   tolerates removal during dispatch
//!
//! ## Quick Start
//!
//! ```ignore
//! use livego_core::{HttpTransport, LiveClient, MountOptions};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = LiveClient::new(HttpTransport::new("http://localhost:8080")?);
//!     let counter = client
//!         .mount("counter", Default::default(), MountOptions::default())
//!         .await?;
//!
//!     counter.subscribe(|state, _effects| println!("count = {}", state["count"]));
//!     counter.call("increment", vec![json!(1)]).await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod engine;
pub mod error;
pub mod stream;
pub mod subscribers;
pub mod transport;
pub mod types;

// Re-exports
pub use config::{ClientConfig, Credentials, StreamConfig};
pub use engine::{LiveClient, LiveComponent, MountOptions, StateCallback};
pub use error::{ErrorPayload, LiveError, LiveResult, MountError};
pub use stream::{
    ChannelHooks, ChannelState, HttpPushSource, PushSource, RawFrame, ReconnectPolicy,
    StreamChannel, StreamTarget,
};
pub use subscribers::{SubscriberId, Subscribers, Unsubscribe};
pub use transport::{HttpTransport, Transport};
pub use types::*;
