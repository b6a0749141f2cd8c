//! Core abstractions for the robot session client.
//!
//! This crate provides the fundamental building blocks:
//! - `Session` and friends - the locally mirrored robot session model
//! - `Action` / `Response` - the kind-tagged in-process vocabulary
//! - `ResponseStore` - Broadcast + history for outward responses
//! - `ClientConfig` - Tunables for the session client
//! - Collaborator traits (`Emitter`, `RobotDirectory`, `StateQuery`)

pub mod config;
pub mod event;
pub mod model;
pub mod msg_store;
pub mod traits;

pub use config::ClientConfig;
pub use event::{Action, ErrorKind, Response, ResponseError};
pub use model::{
    Axis, CommandId, CommandNode, LastCommand, Labware, LightUpdate, Metadata, Module, Mount,
    Pipette, RemoteId, Session, SessionState, SessionUpdate, Slot,
};
pub use msg_store::ResponseStore;
pub use traits::{Emitter, ProtocolFile, RobotDirectory, RobotTarget, StateQuery, StaticQuery};
