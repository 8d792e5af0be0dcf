//! Request/response transport used by the sync engine
//!
//! The engine only depends on the [`Transport`] trait. [`HttpTransport`] is
//! the production implementation; tests substitute recording doubles.

mod http;

use std::future::Future;

use crate::config::ClientConfig;
use crate::error::LiveResult;
use crate::types::{Delta, MountResponse, Props, Snapshot, UpdateResponse};

pub use http::HttpTransport;

/// Performs mount and update round trips against the server.
///
/// Failures are reported as [`LiveError::Transport`](crate::LiveError::Transport)
/// carrying the server's structured payload, or
/// [`LiveError::Protocol`](crate::LiveError::Protocol) when a success
/// response does not have the expected shape.
pub trait Transport: Send + Sync + 'static {
    fn mount(
        &self,
        config: &ClientConfig,
        component: &str,
        props: &Props,
    ) -> impl Future<Output = LiveResult<MountResponse>> + Send;

    fn update(
        &self,
        config: &ClientConfig,
        snapshot: &Snapshot,
        deltas: &[Delta],
    ) -> impl Future<Output = LiveResult<UpdateResponse>> + Send;
}
