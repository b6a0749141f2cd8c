//! Action and response vocabulary exchanged with the UI layer.

use serde::{Deserialize, Serialize};

use crate::model::{Axis, LightUpdate, Mount, SessionUpdate, Slot};

/// User-issued command handled by the session client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Action {
    /// Connect to a known robot by name.
    Connect { name: String },
    Disconnect,
    /// Create a new remote session from protocol contents.
    UploadProtocol { contents: String },
    PickupAndHome { mount: Mount, slot: Slot },
    DropTipAndHome { mount: Mount, slot: Slot },
    /// Tip probe confirmed; home the pipette.
    ConfirmProbed { mount: Mount },
    ConfirmTiprack { mount: Mount, slot: Slot },
    MoveToFront { mount: Mount },
    ProbeTip { mount: Mount },
    MoveTo { mount: Mount, slot: Slot },
    Jog {
        mount: Mount,
        axis: Axis,
        direction: f64,
        step: f64,
    },
    UpdateOffset { mount: Mount, slot: Slot },
    ReturnTip { mount: Mount },
    Run,
    Pause,
    Resume,
    Cancel,
    RefreshSession,
    /// An unrelated robot-server request completed.
    ServerSuccess { path: String, robot: String },
}

impl Action {
    /// Short name for logging.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Connect { .. } => "connect",
            Self::Disconnect => "disconnect",
            Self::UploadProtocol { .. } => "upload_protocol",
            Self::PickupAndHome { .. } => "pickup_and_home",
            Self::DropTipAndHome { .. } => "drop_tip_and_home",
            Self::ConfirmProbed { .. } => "confirm_probed",
            Self::ConfirmTiprack { .. } => "confirm_tiprack",
            Self::MoveToFront { .. } => "move_to_front",
            Self::ProbeTip { .. } => "probe_tip",
            Self::MoveTo { .. } => "move_to",
            Self::Jog { .. } => "jog",
            Self::UpdateOffset { .. } => "update_offset",
            Self::ReturnTip { .. } => "return_tip",
            Self::Run => "run",
            Self::Pause => "pause",
            Self::Resume => "resume",
            Self::Cancel => "cancel",
            Self::RefreshSession => "refresh_session",
            Self::ServerSuccess { .. } => "server_success",
        }
    }
}

/// Category of a failure reported in a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Connect target is not among the reachable robots.
    NotFound,
    /// No live connection to issue the call on.
    NotConnected,
    /// A mount, slot or protocol file the action needs is missing.
    Lookup,
    /// The channel could not be opened.
    Channel,
    /// The robot rejected a remote call.
    RemoteCall,
    /// A full session snapshot could not be rebuilt.
    Reconciliation,
}

/// Error carried by a failure response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("{message}")]
pub struct ResponseError {
    pub kind: ErrorKind,
    pub message: String,
}

impl ResponseError {
    #[must_use]
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// Outward event consumed by the UI/store layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Response {
    #[serde(rename = "CONNECT_RESPONSE")]
    Connect {
        error: Option<ResponseError>,
        /// True when the channel does not monitor its own liveness.
        poll_health: bool,
    },
    #[serde(rename = "DISCONNECT_RESPONSE")]
    Disconnect,
    UnexpectedDisconnect,
    /// Result of a full session reconstruction.
    #[serde(rename = "SESSION_RESPONSE")]
    Session {
        error: Option<ResponseError>,
        update: Option<SessionUpdate>,
        fresh_upload: bool,
    },
    /// Result of a light session update.
    SessionUpdate {
        update: LightUpdate,
        client_time_ms: i64,
    },
    #[serde(rename = "PICKUP_AND_HOME_RESPONSE")]
    PickupAndHome { error: Option<ResponseError> },
    #[serde(rename = "DROP_TIP_AND_HOME_RESPONSE")]
    DropTipAndHome { error: Option<ResponseError> },
    #[serde(rename = "CONFIRM_TIPRACK_RESPONSE")]
    ConfirmTiprack {
        error: Option<ResponseError>,
        /// The tip stays on the pipette because no drop was needed.
        tip_on: bool,
    },
    #[serde(rename = "MOVE_TO_FRONT_RESPONSE")]
    MoveToFront { error: Option<ResponseError> },
    #[serde(rename = "PROBE_TIP_RESPONSE")]
    ProbeTip { error: Option<ResponseError> },
    #[serde(rename = "MOVE_TO_RESPONSE")]
    MoveTo { error: Option<ResponseError> },
    #[serde(rename = "JOG_RESPONSE")]
    Jog { error: Option<ResponseError> },
    #[serde(rename = "UPDATE_OFFSET_RESPONSE")]
    UpdateOffset { error: Option<ResponseError> },
    #[serde(rename = "RETURN_TIP_RESPONSE")]
    ReturnTip { error: Option<ResponseError> },
    #[serde(rename = "RUN_RESPONSE")]
    Run { error: Option<ResponseError> },
    #[serde(rename = "PAUSE_RESPONSE")]
    Pause { error: Option<ResponseError> },
    #[serde(rename = "RESUME_RESPONSE")]
    Resume { error: Option<ResponseError> },
    #[serde(rename = "CANCEL_RESPONSE")]
    Cancel { error: Option<ResponseError> },
    /// One second of run time elapsed.
    TickRunTime,
    /// Side effect asking the UI to show a route.
    Navigate { path: String },
}

impl Response {
    /// Error carried by this response, if any.
    #[must_use]
    pub const fn error(&self) -> Option<&ResponseError> {
        match self {
            Self::Connect { error, .. }
            | Self::Session { error, .. }
            | Self::PickupAndHome { error }
            | Self::DropTipAndHome { error }
            | Self::ConfirmTiprack { error, .. }
            | Self::MoveToFront { error }
            | Self::ProbeTip { error }
            | Self::MoveTo { error }
            | Self::Jog { error }
            | Self::UpdateOffset { error }
            | Self::ReturnTip { error }
            | Self::Run { error }
            | Self::Pause { error }
            | Self::Resume { error }
            | Self::Cancel { error } => error.as_ref(),
            Self::Disconnect
            | Self::UnexpectedDisconnect
            | Self::SessionUpdate { .. }
            | Self::TickRunTime
            | Self::Navigate { .. } => None,
        }
    }
}
