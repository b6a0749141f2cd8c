//! Remote call vocabulary and the payload shapes the robot pushes.

use std::collections::HashMap;

use robot_client_core::{Axis, CommandId, Mount, RemoteId, SessionState, Slot};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

/// Topic of session state notifications.
pub const SESSION_TOPIC: &str = "session";

/// Push message from the robot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub topic: String,
    #[serde(default)]
    pub payload: Value,
}

impl Notification {
    #[must_use]
    pub fn new(topic: impl Into<String>, payload: Value) -> Self {
        Self {
            topic: topic.into(),
            payload,
        }
    }

    /// Create a session topic notification.
    #[must_use]
    pub fn session(payload: Value) -> Self {
        Self::new(SESSION_TOPIC, payload)
    }
}

/// Reference to a remote object, passed as a call argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteHandle {
    #[serde(rename = "_id")]
    pub id: RemoteId,
}

impl RemoteHandle {
    #[must_use]
    pub const fn new(id: RemoteId) -> Self {
        Self { id }
    }
}

/// A procedure exposed by the robot's remote object tree.
#[derive(Debug, Clone, PartialEq)]
pub enum RemoteCall {
    /// Create a session from protocol contents.
    CreateSession {
        name: String,
        contents: String,
        is_binary: bool,
    },
    MoveToFront { pipette: RemoteHandle },
    Home { pipette: RemoteHandle },
    UpdateContainerOffset {
        labware: RemoteHandle,
        pipette: RemoteHandle,
    },
    PickUpTip {
        pipette: RemoteHandle,
        labware: RemoteHandle,
    },
    DropTip {
        pipette: RemoteHandle,
        labware: RemoteHandle,
    },
    MoveTo {
        pipette: RemoteHandle,
        labware: RemoteHandle,
    },
    TipProbe { pipette: RemoteHandle },
    ReturnTip { pipette: RemoteHandle },
    Jog {
        pipette: RemoteHandle,
        distance: f64,
        axis: Axis,
    },
    Run,
    Pause,
    Resume,
    Stop,
    Refresh,
}

impl RemoteCall {
    /// Dotted path of the procedure in the remote object tree.
    #[must_use]
    pub const fn path(&self) -> &'static str {
        match self {
            Self::CreateSession { .. } => "session_manager.create",
            Self::MoveToFront { .. } => "calibration_manager.move_to_front",
            Self::Home { .. } => "calibration_manager.home",
            Self::UpdateContainerOffset { .. } => "calibration_manager.update_container_offset",
            Self::PickUpTip { .. } => "calibration_manager.pick_up_tip",
            Self::DropTip { .. } => "calibration_manager.drop_tip",
            Self::MoveTo { .. } => "calibration_manager.move_to",
            Self::TipProbe { .. } => "calibration_manager.tip_probe",
            Self::ReturnTip { .. } => "calibration_manager.return_tip",
            Self::Jog { .. } => "calibration_manager.jog",
            Self::Run => "session_manager.session.run",
            Self::Pause => "session_manager.session.pause",
            Self::Resume => "session_manager.session.resume",
            Self::Stop => "session_manager.session.stop",
            Self::Refresh => "session_manager.session.refresh",
        }
    }

    /// Positional arguments of the call.
    #[must_use]
    pub fn args(&self) -> Vec<Value> {
        match self {
            Self::CreateSession {
                name,
                contents,
                is_binary,
            } => vec![json!(name), json!(contents), json!(is_binary)],
            Self::MoveToFront { pipette }
            | Self::Home { pipette }
            | Self::TipProbe { pipette }
            | Self::ReturnTip { pipette } => vec![json!(pipette)],
            Self::UpdateContainerOffset { labware, pipette } => {
                vec![json!(labware), json!(pipette)]
            }
            Self::PickUpTip { pipette, labware }
            | Self::DropTip { pipette, labware }
            | Self::MoveTo { pipette, labware } => vec![json!(pipette), json!(labware)],
            Self::Jog {
                pipette,
                distance,
                axis,
            } => vec![json!(pipette), json!(distance), json!(axis.as_str())],
            Self::Run | Self::Pause | Self::Resume | Self::Stop | Self::Refresh => Vec::new(),
        }
    }
}

/// Full session snapshot as serialized by the robot.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ApiSession {
    pub state: Option<SessionState>,
    #[serde(rename = "startTime")]
    pub start_time: Option<i64>,
    pub name: Option<String>,
    pub commands: Option<Vec<ApiCommand>>,
    /// Handled-at timestamps keyed by command id.
    #[serde(default)]
    pub command_log: HashMap<CommandId, Option<i64>>,
    pub instruments: Option<Vec<ApiInstrument>>,
    pub containers: Option<Vec<ApiContainer>>,
    pub modules: Option<Vec<ApiModule>>,
    pub protocol_text: Option<String>,
    pub metadata: Option<Map<String, Value>>,
    pub api_level: Option<u8>,
}

/// Node of the remote command tree.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiCommand {
    pub id: CommandId,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub children: Vec<ApiCommand>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiInstrument {
    #[serde(rename = "_id")]
    pub id: RemoteId,
    pub mount: Mount,
    pub name: String,
    pub channels: u32,
}

/// Instrument as referenced from a container that it interacts with.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiInstrumentRef {
    pub mount: Mount,
    pub channels: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiContainer {
    #[serde(rename = "_id")]
    pub id: RemoteId,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub slot: Slot,
    #[serde(default)]
    pub position: Option<Value>,
    #[serde(default)]
    pub is_legacy: bool,
    #[serde(default)]
    pub instruments: Vec<ApiInstrumentRef>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiModule {
    #[serde(rename = "_id")]
    pub id: RemoteId,
    pub name: String,
    pub slot: Slot,
}
