//! Turning raw session payloads into mirror updates.
//!
//! A payload carrying a `lastCommand` key (even a null one) is a light
//! update. Anything else is a full snapshot that is rebuilt off to the side
//! and only handed out once every section has been reconstructed.

use std::collections::HashMap;

use robot_client_core::{
    CommandId, CommandNode, LastCommand, Labware, LightUpdate, Metadata, Module, Mount, Pipette,
    SessionState, SessionUpdate,
};
use robot_client_transport::protocol::{
    ApiCommand, ApiContainer, ApiInstrument, ApiInstrumentRef, ApiModule, ApiSession,
};
use serde_json::{Map, Value};
use thiserror::Error;

const LAST_COMMAND_KEY: &str = "lastCommand";
const TIPRACK_MARKER: &str = "tiprack";

/// Reconciliation error.
#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("Malformed session payload: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("No volume in pipette name: {0}")]
    MissingVolume(String),
    #[error("Duplicate command id: {0}")]
    DuplicateCommand(CommandId),
}

/// A session payload, classified by shape.
#[derive(Debug, Clone)]
pub enum SessionPayload {
    /// Run state plus the last handled command.
    Light(LightUpdate),
    /// Complete snapshot, not yet reconstructed.
    Full(Value),
}

impl SessionPayload {
    /// Classify a raw payload.
    #[must_use]
    pub fn classify(payload: Value) -> Self {
        if payload.get(LAST_COMMAND_KEY).is_some() {
            Self::Light(light_update(&payload))
        } else {
            Self::Full(payload)
        }
    }
}

/// Read `state` and `startTime` without validating the rest of the payload.
#[must_use]
pub fn run_state(payload: &Value) -> (Option<SessionState>, Option<i64>) {
    let state = payload
        .get("state")
        .and_then(|s| serde_json::from_value(s.clone()).ok());
    let start_time = payload.get("startTime").and_then(Value::as_i64);
    (state, start_time)
}

fn light_update(payload: &Value) -> LightUpdate {
    let (state, start_time) = run_state(payload);
    let last_command = match payload.get(LAST_COMMAND_KEY) {
        None | Some(Value::Null) => None,
        Some(raw) => match serde_json::from_value::<LastCommand>(raw.clone()) {
            Ok(last) => Some(last),
            Err(e) => {
                tracing::warn!("Ignoring malformed lastCommand: {e}");
                None
            }
        },
    };

    LightUpdate {
        state,
        start_time,
        last_command,
    }
}

/// Deserialize and rebuild a full snapshot.
///
/// # Errors
/// Returns error if the payload does not have the snapshot shape or any
/// section cannot be reconstructed.
pub fn full_update(payload: Value) -> Result<SessionUpdate, ReconcileError> {
    let session: ApiSession = serde_json::from_value(payload)?;
    rebuild(&session)
}

/// Rebuild every section present in a snapshot.
///
/// # Errors
/// Returns error on a pipette name without a volume or a repeated command id.
pub fn rebuild(session: &ApiSession) -> Result<SessionUpdate, ReconcileError> {
    let mut update = SessionUpdate {
        state: session.state,
        start_time: session.start_time,
        api_level: match session.api_level {
            Some(level) if level > 0 => level,
            _ => 1,
        },
        ..SessionUpdate::default()
    };

    if let Some(commands) = &session.commands {
        let (roots, by_id) = rebuild_commands(commands, &session.command_log)?;
        update.protocol_commands = Some(roots);
        update.protocol_commands_by_id = Some(by_id);
    }

    if let Some(instruments) = &session.instruments {
        update.pipettes_by_mount = Some(
            instruments
                .iter()
                .map(|i| pipette(i).map(|p| (p.mount, p)))
                .collect::<Result<_, _>>()?,
        );
    }

    if let Some(containers) = &session.containers {
        update.labware_by_slot = Some(
            containers
                .iter()
                .map(|c| (c.slot.clone(), labware(c)))
                .collect(),
        );
    }

    if let Some(modules) = &session.modules {
        update.modules_by_slot = Some(
            modules
                .iter()
                .map(|m| (m.slot.clone(), module(m)))
                .collect(),
        );
    }

    update.protocol_text = session.protocol_text.clone().filter(|t| !t.is_empty());
    update.name = session.name.clone().filter(|n| !n.is_empty());
    update.metadata = session.metadata.as_ref().map(normalize_metadata);

    Ok(update)
}

/// Flatten the command tree with an explicit stack.
fn rebuild_commands(
    commands: &[ApiCommand],
    command_log: &HashMap<CommandId, Option<i64>>,
) -> Result<(Vec<CommandId>, HashMap<CommandId, CommandNode>), ReconcileError> {
    let roots: Vec<CommandId> = commands.iter().map(|c| c.id).collect();
    let mut by_id = HashMap::new();
    let mut stack: Vec<&ApiCommand> = commands.iter().rev().collect();

    while let Some(command) = stack.pop() {
        let node = CommandNode {
            id: command.id,
            description: command.description.clone(),
            handled_at: command_log.get(&command.id).copied().flatten(),
            children: command.children.iter().map(|c| c.id).collect(),
        };
        if by_id.insert(command.id, node).is_some() {
            return Err(ReconcileError::DuplicateCommand(command.id));
        }
        stack.extend(command.children.iter().rev());
    }

    Ok((roots, by_id))
}

fn pipette(instrument: &ApiInstrument) -> Result<Pipette, ReconcileError> {
    let volume = pipette_volume(&instrument.name)
        .ok_or_else(|| ReconcileError::MissingVolume(instrument.name.clone()))?;

    Ok(Pipette {
        id: instrument.id,
        mount: instrument.mount,
        name: instrument.name.clone(),
        channels: instrument.channels,
        volume,
    })
}

fn labware(container: &ApiContainer) -> Labware {
    let is_tiprack = is_tiprack(&container.kind);
    let calibrator_mount = if is_tiprack {
        calibrator_mount(&container.instruments)
    } else {
        None
    };

    Labware {
        id: container.id,
        name: container.name.clone(),
        slot: container.slot.clone(),
        position: container.position.clone(),
        kind: container.kind.clone(),
        is_tiprack,
        is_legacy: container.is_legacy,
        calibrator_mount,
    }
}

fn module(module: &ApiModule) -> Module {
    Module {
        id: module.id,
        name: module.name.clone(),
        slot: module.slot.clone(),
    }
}

/// Volume encoded in a pipette model name: its first run of digits.
///
/// `p300_single_v1` is a 300 uL pipette.
#[must_use]
pub fn pipette_volume(name: &str) -> Option<u32> {
    let digits: String = name
        .chars()
        .skip_while(|c| !c.is_ascii_digit())
        .take_while(char::is_ascii_digit)
        .collect();
    digits.parse().ok()
}

/// Whether a labware type names a tip rack.
#[must_use]
pub fn is_tiprack(kind: &str) -> bool {
    kind.to_ascii_lowercase().contains(TIPRACK_MARKER)
}

/// Pick the pipette that calibrates a shared tip rack.
///
/// Single-channel pipettes are preferred; otherwise the first one wins.
#[must_use]
pub fn calibrator_mount(instruments: &[ApiInstrumentRef]) -> Option<Mount> {
    instruments
        .iter()
        .find(|i| i.channels == 1)
        .or_else(|| instruments.first())
        .map(|i| i.mount)
}

/// Keep only the metadata fields the UI shows, whatever case the keys use.
#[must_use]
pub fn normalize_metadata(raw: &Map<String, Value>) -> Metadata {
    let mut metadata = Metadata::default();

    for (key, value) in raw {
        let normalized = kebab_case(key);
        let field = match normalized.as_str() {
            "protocol-name" => &mut metadata.protocol_name,
            "description" => &mut metadata.description,
            "author" => &mut metadata.author,
            "source" => &mut metadata.source,
            _ => continue,
        };
        match value.as_str() {
            Some(text) => *field = Some(text.to_string()),
            None => tracing::debug!(key = %key, "Dropping non-text metadata value"),
        }
    }

    metadata
}

fn kebab_case(key: &str) -> String {
    let mut out = String::with_capacity(key.len() + 4);
    let mut boundary = false;
    let mut after_lower = false;

    for c in key.chars() {
        if !c.is_alphanumeric() {
            boundary = true;
            after_lower = false;
            continue;
        }
        if c.is_uppercase() && after_lower {
            boundary = true;
        }
        if boundary && !out.is_empty() {
            out.push('-');
        }
        boundary = false;
        out.extend(c.to_lowercase());
        after_lower = c.is_lowercase() || c.is_ascii_digit();
    }

    out
}
