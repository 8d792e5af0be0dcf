//! Server-push event channel
//!
//! Independent of the request/response update cycle, a component may open a
//! long-lived push connection that streams server-originated events. The
//! channel reconnects with exponential backoff and demultiplexes frames to
//! per-event-type subscribers. It never touches the engine's snapshot.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │  StreamChannel<S: PushSource>                                   │
//! │  ├── connection task (one per connect())                        │
//! │  │   └── S::open ──► FrameStream ──► dispatch_frame             │
//! │  ├── ReconnectPolicy (base · 2^attempt, max attempts)           │
//! │  ├── listeners: event type ──► Subscribers<Fn(&Value)>          │
//! │  └── handler: optional global Fn(&StreamEvent)                  │
//! │                                                                 │
//! │  HttpPushSource                                                 │
//! │  └── GET <endpoint>/livego/stream ──► SseDecoder ──► RawFrame   │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

pub mod backoff;
pub mod channel;
pub mod events;
pub mod source;
pub mod sse;

pub use backoff::ReconnectPolicy;
pub use channel::{EventCallback, EventHandler, StreamChannel};
pub use events::{ChannelHooks, ChannelState, ErrorHook, LifecycleHook};
pub use source::{FrameStream, HttpPushSource, PushSource, StreamTarget};
pub use sse::{RawFrame, SseDecoder, DEFAULT_EVENT_TYPE, MAX_LINE_LENGTH};
