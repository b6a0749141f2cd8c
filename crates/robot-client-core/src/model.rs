//! Locally mirrored robot session model.

use std::{collections::HashMap, fmt};

use serde::{Deserialize, Serialize};

/// Identifier of a protocol command in the remote command tree.
pub type CommandId = u64;

/// Identity of a remote object (pipette, labware) as assigned by the robot.
pub type RemoteId = u64;

/// Execution state of the remote session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    /// Protocol loaded and simulated, not yet started.
    Loaded,
    /// Protocol is executing.
    Running,
    /// Execution paused by the user or the protocol.
    Paused,
    /// Execution cancelled.
    Stopped,
    /// Execution completed.
    Finished,
    /// Execution failed.
    Error,
    /// Any state this client does not know about.
    #[serde(other)]
    Unknown,
}

impl SessionState {
    /// Whether a connect that finds the session in this state should
    /// take the user straight to the run view.
    #[must_use]
    pub const fn shows_run_view(self) -> bool {
        matches!(self, Self::Running | Self::Paused | Self::Finished)
    }
}

/// Pipette attachment point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mount {
    Left,
    Right,
}

impl Mount {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Left => "left",
            Self::Right => "right",
        }
    }
}

impl fmt::Display for Mount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Jog axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Axis {
    X,
    Y,
    Z,
}

impl Axis {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::X => "x",
            Self::Y => "y",
            Self::Z => "z",
        }
    }
}

/// Named deck position.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Slot(String);

impl Slot {
    #[must_use]
    pub fn new(slot: impl Into<String>) -> Self {
        Self(slot.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Slot {
    fn from(slot: &str) -> Self {
        Self::new(slot)
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One node of the protocol command tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandNode {
    pub id: CommandId,
    pub description: String,
    /// Unix epoch milliseconds at which the robot handled this command.
    pub handled_at: Option<i64>,
    pub children: Vec<CommandId>,
}

/// Most recently executed command, as carried by a light update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LastCommand {
    pub id: CommandId,
    pub handled_at: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pipette {
    pub id: RemoteId,
    pub mount: Mount,
    pub name: String,
    pub channels: u32,
    /// Maximum volume in microliters, derived from `name`.
    pub volume: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Labware {
    pub id: RemoteId,
    pub name: String,
    pub slot: Slot,
    pub position: Option<serde_json::Value>,
    #[serde(rename = "type")]
    pub kind: String,
    pub is_tiprack: bool,
    pub is_legacy: bool,
    /// Mount of the pipette that calibrates this tip rack.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub calibrator_mount: Option<Mount>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Module {
    pub id: RemoteId,
    pub name: String,
    pub slot: Slot,
}

/// Protocol metadata restricted to the fields the UI knows how to show.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    #[serde(rename = "protocol-name", skip_serializing_if = "Option::is_none")]
    pub protocol_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

/// Incremental update: run state plus the last handled command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LightUpdate {
    pub state: Option<SessionState>,
    pub start_time: Option<i64>,
    pub last_command: Option<LastCommand>,
}

/// Complete reconstruction produced from a full session snapshot.
///
/// Sections left as `None` were absent from the snapshot and keep whatever
/// the mirror held before.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionUpdate {
    pub state: Option<SessionState>,
    pub start_time: Option<i64>,
    pub protocol_commands: Option<Vec<CommandId>>,
    pub protocol_commands_by_id: Option<HashMap<CommandId, CommandNode>>,
    pub pipettes_by_mount: Option<HashMap<Mount, Pipette>>,
    pub labware_by_slot: Option<HashMap<Slot, Labware>>,
    pub modules_by_slot: Option<HashMap<Slot, Module>>,
    pub protocol_text: Option<String>,
    pub name: Option<String>,
    pub metadata: Option<Metadata>,
    pub api_level: u8,
}

/// Local mirror of the remote execution session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub state: Option<SessionState>,
    pub start_time: Option<i64>,
    pub last_command: Option<LastCommand>,
    pub protocol_commands: Vec<CommandId>,
    pub protocol_commands_by_id: HashMap<CommandId, CommandNode>,
    pub pipettes_by_mount: HashMap<Mount, Pipette>,
    pub labware_by_slot: HashMap<Slot, Labware>,
    pub modules_by_slot: HashMap<Slot, Module>,
    pub metadata: Metadata,
    pub protocol_text: Option<String>,
    pub name: Option<String>,
    pub api_level: u8,
}

impl Default for Session {
    fn default() -> Self {
        Self {
            state: None,
            start_time: None,
            last_command: None,
            protocol_commands: Vec::new(),
            protocol_commands_by_id: HashMap::new(),
            pipettes_by_mount: HashMap::new(),
            labware_by_slot: HashMap::new(),
            modules_by_slot: HashMap::new(),
            metadata: Metadata::default(),
            protocol_text: None,
            name: None,
            api_level: 1,
        }
    }
}
