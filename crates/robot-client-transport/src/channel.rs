//! Traits for the RPC channel primitive.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::broadcast;

use crate::protocol::{Notification, RemoteCall};

/// Event pushed by an open channel.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    /// Asynchronous push message from the robot.
    Notification(Notification),
    /// The channel closed.
    Close,
    /// Transport-level error; the channel stays open.
    Error(String),
}

/// Channel error.
#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("Endpoint unreachable: {0}")]
    Unreachable(String),
    #[error("Channel closed")]
    Closed,
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Remote call error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RemoteCallError {
    #[error("{path} failed: {message}")]
    Rejected { path: &'static str, message: String },
    #[error("Channel closed")]
    Closed,
}

/// An open RPC channel to a robot.
#[async_trait]
pub trait RpcChannel: Send + Sync {
    /// Subscribe to channel events.
    ///
    /// Dropping the receiver removes the subscription.
    fn events(&self) -> broadcast::Receiver<ChannelEvent>;

    /// Session the robot already had when the channel opened.
    fn session_snapshot(&self) -> Option<Value>;

    /// Whether the channel runs its own ping/pong liveness monitoring.
    fn is_monitoring(&self) -> bool;

    /// Invoke a remote procedure.
    async fn call(&self, call: RemoteCall) -> Result<Value, RemoteCallError>;

    /// Close the channel.
    async fn close(&self);
}

/// Opens RPC channels by endpoint address.
#[async_trait]
pub trait ChannelOpener: Send + Sync {
    /// Open a channel to `endpoint`.
    async fn open(&self, endpoint: &str) -> Result<Arc<dyn RpcChannel>, ChannelError>;
}
