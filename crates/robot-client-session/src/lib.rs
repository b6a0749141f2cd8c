//! Session mirror for the robot session client.
//!
//! Provides:
//! - `reconcile` - Light/full payload handling and full reconstruction
//! - `SessionMirror` - The local copy of the remote session
//! - `RunTimer` - Tick stream active while a protocol runs

pub mod mirror;
pub mod reconcile;
pub mod timer;

pub use mirror::SessionMirror;
pub use reconcile::{ReconcileError, SessionPayload};
pub use timer::RunTimer;
