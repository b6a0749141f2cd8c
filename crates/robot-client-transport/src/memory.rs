//! In-memory loopback channel.

use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex, PoisonError,
        atomic::{AtomicBool, Ordering},
    },
};

use async_trait::async_trait;
use serde_json::{Value, json};
use tokio::sync::{Notify, broadcast};

use crate::{
    channel::{ChannelError, ChannelEvent, ChannelOpener, RemoteCallError, RpcChannel},
    protocol::{Notification, RemoteCall},
};

/// Loopback channel driven from the local process.
///
/// Records every remote call, answers with scripted outcomes, and lets the
/// owner push notifications, errors and closes as if they came from a robot.
/// Useful for tests and replay tools. Nothing leaves the process.
pub struct MemoryChannel {
    events: broadcast::Sender<ChannelEvent>,
    snapshot: Mutex<Option<Value>>,
    monitoring: AtomicBool,
    closed: AtomicBool,
    calls: Mutex<Vec<RemoteCall>>,
    failures: Mutex<HashMap<&'static str, String>>,
    gates: Mutex<HashMap<&'static str, Arc<Notify>>>,
}

impl MemoryChannel {
    /// Create a new loopback channel.
    #[must_use]
    pub fn new() -> Arc<Self> {
        let (events, _) = broadcast::channel(256);
        Arc::new(Self {
            events,
            snapshot: Mutex::new(None),
            monitoring: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            calls: Mutex::new(Vec::new()),
            failures: Mutex::new(HashMap::new()),
            gates: Mutex::new(HashMap::new()),
        })
    }

    /// Set the session the robot reports at connect time.
    pub fn set_session_snapshot(&self, snapshot: Option<Value>) {
        *lock(&self.snapshot) = snapshot;
    }

    /// Set whether the channel claims to monitor its own liveness.
    pub fn set_monitoring(&self, monitoring: bool) {
        self.monitoring.store(monitoring, Ordering::Relaxed);
    }

    /// Make every call to `path` reject with `message`.
    pub fn fail(&self, path: &'static str, message: impl Into<String>) {
        lock(&self.failures).insert(path, message.into());
    }

    /// Hold calls to `path` until the returned handle is notified once per call.
    #[must_use]
    pub fn gate(&self, path: &'static str) -> Arc<Notify> {
        Arc::clone(
            lock(&self.gates)
                .entry(path)
                .or_insert_with(|| Arc::new(Notify::new())),
        )
    }

    /// Push a notification to subscribers.
    pub fn notify(&self, notification: Notification) {
        let _ = self.events.send(ChannelEvent::Notification(notification));
    }

    /// Push a transport error to subscribers.
    pub fn raise_error(&self, message: impl Into<String>) {
        let _ = self.events.send(ChannelEvent::Error(message.into()));
    }

    /// Simulate the robot dropping the connection.
    pub fn drop_connection(&self) {
        self.closed.store(true, Ordering::Relaxed);
        let _ = self.events.send(ChannelEvent::Close);
    }

    /// Calls received so far, in order.
    #[must_use]
    pub fn calls(&self) -> Vec<RemoteCall> {
        lock(&self.calls).clone()
    }

    /// Paths of calls received so far, in order.
    #[must_use]
    pub fn call_paths(&self) -> Vec<&'static str> {
        lock(&self.calls).iter().map(RemoteCall::path).collect()
    }

    /// Number of live event subscriptions.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.events.receiver_count()
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Relaxed)
    }

    fn reopen(&self) {
        self.closed.store(false, Ordering::Relaxed);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[async_trait]
impl RpcChannel for MemoryChannel {
    fn events(&self) -> broadcast::Receiver<ChannelEvent> {
        self.events.subscribe()
    }

    fn session_snapshot(&self) -> Option<Value> {
        lock(&self.snapshot).clone()
    }

    fn is_monitoring(&self) -> bool {
        self.monitoring.load(Ordering::Relaxed)
    }

    async fn call(&self, call: RemoteCall) -> Result<Value, RemoteCallError> {
        let path = call.path();
        tracing::debug!(path, "loopback call");
        lock(&self.calls).push(call.clone());

        let gate = lock(&self.gates).get(path).cloned();
        if let Some(gate) = gate {
            gate.notified().await;
        }

        if self.is_closed() {
            return Err(RemoteCallError::Closed);
        }
        if let Some(message) = lock(&self.failures).get(path).cloned() {
            return Err(RemoteCallError::Rejected { path, message });
        }

        Ok(match call {
            RemoteCall::CreateSession { name, .. } => json!({ "name": name }),
            _ => Value::Null,
        })
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::Relaxed);
        let _ = self.events.send(ChannelEvent::Close);
    }
}

/// Opener that hands out registered loopback channels by endpoint.
#[derive(Default)]
pub struct MemoryOpener {
    channels: Mutex<HashMap<String, Arc<MemoryChannel>>>,
    opened: Mutex<Vec<String>>,
}

impl MemoryOpener {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `channel` for connections to `endpoint`.
    pub fn register(&self, endpoint: impl Into<String>, channel: Arc<MemoryChannel>) {
        lock(&self.channels).insert(endpoint.into(), channel);
    }

    /// Endpoints opened so far, in order.
    #[must_use]
    pub fn opened(&self) -> Vec<String> {
        lock(&self.opened).clone()
    }
}

#[async_trait]
impl ChannelOpener for MemoryOpener {
    async fn open(&self, endpoint: &str) -> Result<Arc<dyn RpcChannel>, ChannelError> {
        let channel = lock(&self.channels)
            .get(endpoint)
            .cloned()
            .ok_or_else(|| ChannelError::Unreachable(endpoint.to_string()))?;

        lock(&self.opened).push(endpoint.to_string());
        channel.reopen();
        Ok(channel)
    }
}
