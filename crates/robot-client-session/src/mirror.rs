//! Local copy of the remote session.

use robot_client_core::{LightUpdate, Mount, Session, SessionState, SessionUpdate, Slot};
use robot_client_transport::RemoteHandle;

/// Mirror of the robot's current session.
///
/// Light updates patch it in place; full updates replace every section they
/// carry in one step.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionMirror {
    session: Session,
}

impl SessionMirror {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub const fn session(&self) -> &Session {
        &self.session
    }

    #[must_use]
    pub const fn state(&self) -> Option<SessionState> {
        self.session.state
    }

    /// Merge a light update.
    ///
    /// Only the command named by `last_command` gets a new `handled_at`.
    pub fn apply_light(&mut self, update: &LightUpdate) {
        self.session.state = update.state;
        self.session.start_time = update.start_time;
        self.session.last_command = update.last_command;

        if let Some(last) = update.last_command {
            match self.session.protocol_commands_by_id.get_mut(&last.id) {
                Some(node) => node.handled_at = last.handled_at,
                None => tracing::debug!(command = last.id, "lastCommand not in command tree"),
            }
        }
    }

    /// Install a fully reconstructed update.
    pub fn apply_full(&mut self, update: SessionUpdate) {
        let session = &mut self.session;
        session.state = update.state;
        session.start_time = update.start_time;
        session.api_level = update.api_level;

        if let (Some(roots), Some(by_id)) = (update.protocol_commands, update.protocol_commands_by_id)
        {
            session.protocol_commands = roots;
            session.protocol_commands_by_id = by_id;
            session.last_command = None;
        }
        if let Some(pipettes) = update.pipettes_by_mount {
            session.pipettes_by_mount = pipettes;
        }
        if let Some(labware) = update.labware_by_slot {
            session.labware_by_slot = labware;
        }
        if let Some(modules) = update.modules_by_slot {
            session.modules_by_slot = modules;
        }
        if let Some(metadata) = update.metadata {
            session.metadata = metadata;
        }
        if update.protocol_text.is_some() {
            session.protocol_text = update.protocol_text;
        }
        if update.name.is_some() {
            session.name = update.name;
        }
    }

    /// Remote handle of the pipette on `mount`.
    #[must_use]
    pub fn pipette_handle(&self, mount: Mount) -> Option<RemoteHandle> {
        self.session
            .pipettes_by_mount
            .get(&mount)
            .map(|p| RemoteHandle::new(p.id))
    }

    /// Remote handle of the labware in `slot`.
    #[must_use]
    pub fn labware_handle(&self, slot: &Slot) -> Option<RemoteHandle> {
        self.session
            .labware_by_slot
            .get(slot)
            .map(|l| RemoteHandle::new(l.id))
    }
}
