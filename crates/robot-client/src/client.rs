//! Connection lifecycle and notification routing.

use std::{
    sync::{Arc, Weak},
    time::{SystemTime, UNIX_EPOCH},
};

use robot_client_core::{
    ClientConfig, Emitter, ErrorKind, Mount, Response, ResponseError, RobotDirectory, Session,
    SessionState, Slot, StateQuery,
};
use robot_client_session::{
    ReconcileError, RunTimer, SessionMirror, SessionPayload,
    reconcile::{full_update, run_state},
};
use robot_client_transport::{
    ChannelError, ChannelEvent, ChannelOpener, Notification, RemoteCall, RemoteCallError,
    RemoteHandle, RpcChannel, SESSION_TOPIC,
};
use serde_json::Value;
use tokio::sync::{Mutex, broadcast};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Session client error.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("Robot \"{0}\" not found")]
    NotFound(String),
    #[error("Not connected to a robot")]
    NotConnected,
    #[error("No pipette on {0} mount")]
    UnknownMount(Mount),
    #[error("No labware in slot {0}")]
    UnknownSlot(Slot),
    #[error("No protocol file selected")]
    NoProtocolFile,
    #[error(transparent)]
    Channel(#[from] ChannelError),
    #[error(transparent)]
    RemoteCall(#[from] RemoteCallError),
    #[error(transparent)]
    Reconcile(#[from] ReconcileError),
}

impl ClientError {
    /// Category reported to the UI.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::NotConnected => ErrorKind::NotConnected,
            Self::UnknownMount(_) | Self::UnknownSlot(_) | Self::NoProtocolFile => ErrorKind::Lookup,
            Self::Channel(_) => ErrorKind::Channel,
            Self::RemoteCall(_) => ErrorKind::RemoteCall,
            Self::Reconcile(_) => ErrorKind::Reconciliation,
        }
    }
}

impl From<ClientError> for ResponseError {
    fn from(error: ClientError) -> Self {
        Self::new(error.kind(), error.to_string())
    }
}

/// The live channel plus the listener feeding it into the client.
struct Connection {
    generation: u64,
    robot: String,
    endpoint: String,
    channel: Arc<dyn RpcChannel>,
    listener: CancellationToken,
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.listener.cancel();
    }
}

/// Mutable client state, guarded by one lock.
pub(crate) struct ClientState {
    connection: Option<Connection>,
    mirror: Option<SessionMirror>,
    pub(crate) timer: RunTimer,
    pub(crate) fresh_upload: bool,
    generation: u64,
}

impl ClientState {
    /// Drop the connection and everything tied to it.
    ///
    /// The listener is cancelled here; closing the returned channel is left
    /// to the caller so it can happen outside the lock.
    fn teardown(&mut self) -> Option<Connection> {
        self.timer.stop();
        self.mirror = None;
        self.fresh_upload = false;
        let connection = self.connection.take()?;
        connection.listener.cancel();
        Some(connection)
    }

    pub(crate) fn is_live(&self, generation: u64) -> bool {
        self.connection
            .as_ref()
            .is_some_and(|c| c.generation == generation)
    }
}

/// Connection captured when a handler starts.
pub(crate) struct Link {
    pub(crate) generation: u64,
    channel: Arc<dyn RpcChannel>,
}

impl Link {
    pub(crate) async fn call(&self, call: RemoteCall) -> Result<Value, ClientError> {
        let path = call.path();
        tracing::debug!(generation = self.generation, path, "remote call");
        Ok(self.channel.call(call).await?)
    }
}

struct Inner {
    id: Uuid,
    config: ClientConfig,
    opener: Arc<dyn ChannelOpener>,
    directory: Arc<dyn RobotDirectory>,
    query: Arc<dyn StateQuery>,
    emitter: Arc<dyn Emitter>,
    state: Mutex<ClientState>,
}

/// Client owning one robot connection and the mirror of its session.
///
/// Cheap to clone; clones share the same connection.
#[derive(Clone)]
pub struct SessionClient {
    inner: Arc<Inner>,
}

impl SessionClient {
    /// Create a disconnected client.
    #[must_use]
    pub fn new(
        config: ClientConfig,
        opener: Arc<dyn ChannelOpener>,
        directory: Arc<dyn RobotDirectory>,
        query: Arc<dyn StateQuery>,
        emitter: Arc<dyn Emitter>,
    ) -> Self {
        let timer = RunTimer::new(config.run_tick_interval(), Arc::clone(&emitter));
        Self {
            inner: Arc::new(Inner {
                id: Uuid::new_v4(),
                config,
                opener,
                directory,
                query,
                emitter,
                state: Mutex::new(ClientState {
                    connection: None,
                    mirror: None,
                    timer,
                    fresh_upload: false,
                    generation: 0,
                }),
            }),
        }
    }

    /// Instance identifier, recorded on log lines.
    #[must_use]
    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    #[must_use]
    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    pub(crate) fn query(&self) -> &dyn StateQuery {
        self.inner.query.as_ref()
    }

    pub(crate) async fn lock(&self) -> tokio::sync::MutexGuard<'_, ClientState> {
        self.inner.state.lock().await
    }

    pub(crate) fn emit(&self, response: Response) {
        self.inner.emitter.emit(response);
    }

    /// Whether a connection is open.
    pub async fn is_connected(&self) -> bool {
        self.lock().await.connection.is_some()
    }

    /// Name of the connected robot.
    pub async fn connected_robot(&self) -> Option<String> {
        self.lock()
            .await
            .connection
            .as_ref()
            .map(|c| c.robot.clone())
    }

    /// Copy of the mirrored session.
    pub async fn session(&self) -> Option<Session> {
        self.lock()
            .await
            .mirror
            .as_ref()
            .map(|m| m.session().clone())
    }

    /// Whether the run timer is ticking.
    pub async fn run_timer_active(&self) -> bool {
        self.lock().await.timer.is_running()
    }

    /// Connect to the robot called `name`.
    ///
    /// An unknown name is reported without touching the current connection.
    /// Otherwise any open connection is torn down, and its disconnect
    /// reported, before the new one opens.
    pub async fn connect(&self, name: &str) {
        let target = self
            .inner
            .directory
            .list_connectable()
            .into_iter()
            .find(|r| r.name == name);

        let Some(target) = target else {
            tracing::warn!(client = %self.id(), robot = name, "connect target not found");
            self.emit(Response::Connect {
                error: Some(ClientError::NotFound(name.to_string()).into()),
                poll_health: false,
            });
            return;
        };

        let previous = self.lock().await.teardown();
        if let Some(previous) = previous {
            tracing::info!(robot = %previous.robot, "closing previous connection");
            previous.channel.close().await;
            self.emit(Response::Disconnect);
        }

        let endpoint = target.endpoint();
        let channel = match self.inner.opener.open(&endpoint).await {
            Ok(channel) => channel,
            Err(e) => {
                tracing::warn!(client = %self.id(), %endpoint, "connect failed: {e}");
                self.emit(Response::Connect {
                    error: Some(ClientError::from(e).into()),
                    poll_health: false,
                });
                return;
            }
        };

        let mut state = self.lock().await;
        // a concurrent connect may have won the race while we were opening
        let stale = state.teardown();
        if stale.is_some() {
            self.emit(Response::Disconnect);
        }
        state.generation += 1;
        let generation = state.generation;

        let listener = CancellationToken::new();
        tokio::spawn(listen(
            Arc::downgrade(&self.inner),
            generation,
            channel.events(),
            listener.clone(),
        ));

        state.connection = Some(Connection {
            generation,
            robot: target.name.clone(),
            endpoint: endpoint.clone(),
            channel: Arc::clone(&channel),
            listener,
        });
        state.mirror = Some(SessionMirror::new());
        tracing::info!(client = %self.id(), robot = %target.name, %endpoint, generation, "connected");

        if let Some(snapshot) = channel.session_snapshot() {
            let session_state = self.apply_session(&mut state, snapshot);
            if session_state.is_some_and(SessionState::shows_run_view) {
                self.emit(Response::Navigate {
                    path: self.inner.config.run_view_path.clone(),
                });
            }
        }

        // only poll health if the channel is not monitoring itself
        self.emit(Response::Connect {
            error: None,
            poll_health: !channel.is_monitoring(),
        });
        drop(state);

        if let Some(stale) = stale {
            stale.channel.close().await;
        }
    }

    /// Close the connection, if any. Safe to call when disconnected.
    pub async fn disconnect(&self) {
        let previous = self.lock().await.teardown();
        if let Some(previous) = previous {
            tracing::info!(
                client = %self.id(),
                robot = %previous.robot,
                endpoint = %previous.endpoint,
                "disconnecting"
            );
            previous.channel.close().await;
        }
        self.emit(Response::Disconnect);
    }

    /// Tear down without emitting anything; for process shutdown.
    pub async fn shutdown(&self) {
        let previous = self.lock().await.teardown();
        if let Some(previous) = previous {
            previous.channel.close().await;
        }
    }

    async fn handle_unexpected_close(&self, generation: u64) {
        let mut state = self.lock().await;
        if !state.is_live(generation) {
            return;
        }
        if let Some(previous) = state.teardown() {
            tracing::warn!(client = %self.id(), robot = %previous.robot, "channel closed unexpectedly");
        }
        self.emit(Response::UnexpectedDisconnect);
    }

    async fn route_notification(&self, generation: u64, notification: Notification) {
        let Notification { topic, payload } = notification;
        tracing::debug!(%topic, %payload, "notification");

        if topic != SESSION_TOPIC {
            tracing::warn!(%topic, "notification was unhandled");
            return;
        }

        let mut state = self.lock().await;
        if !state.is_live(generation) {
            tracing::debug!(generation, "dropping notification for closed connection");
            return;
        }
        self.apply_session(&mut state, payload);
    }

    /// Reconcile a session payload into the mirror and emit the result.
    ///
    /// Returns the run state the payload carried.
    fn apply_session(&self, state: &mut ClientState, payload: Value) -> Option<SessionState> {
        let (session_state, _) = run_state(&payload);
        state.timer.sync(session_state == Some(SessionState::Running));

        match SessionPayload::classify(payload) {
            SessionPayload::Light(update) => {
                if let Some(mirror) = state.mirror.as_mut() {
                    mirror.apply_light(&update);
                }
                self.emit(Response::SessionUpdate {
                    update,
                    client_time_ms: now_ms(),
                });
            }
            SessionPayload::Full(raw) => {
                let fresh_upload = std::mem::take(&mut state.fresh_upload);
                match full_update(raw) {
                    Ok(update) => {
                        if let Some(mirror) = state.mirror.as_mut() {
                            mirror.apply_full(update.clone());
                        }
                        self.emit(Response::Session {
                            error: None,
                            update: Some(update),
                            fresh_upload,
                        });
                    }
                    Err(e) => {
                        tracing::warn!(client = %self.id(), "session reconciliation failed: {e}");
                        self.emit(Response::Session {
                            error: Some(ClientError::from(e).into()),
                            update: None,
                            fresh_upload,
                        });
                    }
                }
            }
        }

        session_state
    }

    /// Capture the live connection.
    pub(crate) async fn link(&self) -> Result<Link, ClientError> {
        self.lock()
            .await
            .connection
            .as_ref()
            .map(|c| Link {
                generation: c.generation,
                channel: Arc::clone(&c.channel),
            })
            .ok_or(ClientError::NotConnected)
    }

    /// Remote handle of the mirrored pipette on `mount`.
    pub(crate) async fn pipette(&self, mount: Mount) -> Result<RemoteHandle, ClientError> {
        self.lock()
            .await
            .mirror
            .as_ref()
            .and_then(|m| m.pipette_handle(mount))
            .ok_or(ClientError::UnknownMount(mount))
    }

    /// Remote handle of the mirrored labware in `slot`.
    pub(crate) async fn labware(&self, slot: &Slot) -> Result<RemoteHandle, ClientError> {
        self.lock()
            .await
            .mirror
            .as_ref()
            .and_then(|m| m.labware_handle(slot))
            .ok_or_else(|| ClientError::UnknownSlot(slot.clone()))
    }
}

async fn listen(
    client: Weak<Inner>,
    generation: u64,
    mut events: broadcast::Receiver<ChannelEvent>,
    cancel: CancellationToken,
) {
    loop {
        let event = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            event = events.recv() => event,
        };
        let Some(inner) = client.upgrade() else {
            break;
        };
        let client = SessionClient { inner };

        match event {
            Ok(ChannelEvent::Notification(notification)) => {
                client.route_notification(generation, notification).await;
            }
            Ok(ChannelEvent::Error(message)) => {
                tracing::error!(client = %client.id(), generation, "channel error: {message}");
            }
            Ok(ChannelEvent::Close) | Err(broadcast::error::RecvError::Closed) => {
                client.handle_unexpected_close(generation).await;
                break;
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!(generation, skipped, "listener lagged behind channel events");
            }
        }
    }
}

fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| i64::try_from(d.as_millis()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}
