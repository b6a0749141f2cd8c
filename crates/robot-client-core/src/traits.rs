//! Traits for the collaborators the session client talks to.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{PoisonError, RwLock};

use serde::{Deserialize, Serialize};

use crate::Response;

/// Sink for every outward-facing response.
pub trait Emitter: Send + Sync {
    /// Deliver a response to the UI layer.
    fn emit(&self, response: Response);
}

impl<F> Emitter for F
where
    F: Fn(Response) + Send + Sync,
{
    fn emit(&self, response: Response) {
        self(response);
    }
}

/// A robot that can currently be connected to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RobotTarget {
    pub name: String,
    pub ip: String,
    pub port: u16,
}

impl RobotTarget {
    #[must_use]
    pub fn new(name: impl Into<String>, ip: impl Into<String>, port: u16) -> Self {
        Self {
            name: name.into(),
            ip: ip.into(),
            port,
        }
    }

    /// RPC endpoint address for this robot.
    #[must_use]
    pub fn endpoint(&self) -> String {
        format!("ws://{}:{}", self.ip, self.port)
    }
}

/// Source of reachable robots, used to resolve connect targets by name.
pub trait RobotDirectory: Send + Sync {
    /// List the robots that can be connected to right now.
    fn list_connectable(&self) -> Vec<RobotTarget>;
}

impl RobotDirectory for Vec<RobotTarget> {
    fn list_connectable(&self) -> Vec<RobotTarget> {
        self.clone()
    }
}

/// Protocol file currently selected for upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolFile {
    pub name: String,
    pub is_binary: bool,
}

/// Read-only view of UI state the client needs but does not own.
pub trait StateQuery: Send + Sync {
    /// The protocol file the user picked, if any.
    fn protocol_file(&self) -> Option<ProtocolFile>;

    /// Number of tip racks the user has not confirmed yet.
    fn unconfirmed_tipracks(&self) -> usize;
}

/// `StateQuery` backed by plain values.
///
/// Useful for tests and headless tools that have no UI store.
#[derive(Debug, Default)]
pub struct StaticQuery {
    protocol_file: RwLock<Option<ProtocolFile>>,
    unconfirmed_tipracks: AtomicUsize,
}

impl StaticQuery {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_protocol_file(&self, file: ProtocolFile) {
        *self
            .protocol_file
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(file);
    }

    pub fn set_unconfirmed_tipracks(&self, count: usize) {
        self.unconfirmed_tipracks.store(count, Ordering::Relaxed);
    }
}

impl StateQuery for StaticQuery {
    fn protocol_file(&self) -> Option<ProtocolFile> {
        self.protocol_file
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn unconfirmed_tipracks(&self) -> usize {
        self.unconfirmed_tipracks.load(Ordering::Relaxed)
    }
}
