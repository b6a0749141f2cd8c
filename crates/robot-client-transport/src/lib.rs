//! RPC channel boundary for the robot session client.
//!
//! Provides:
//! - `RpcChannel` / `ChannelOpener` traits the client consumes
//! - Typed remote calls and remote payload shapes
//! - In-memory loopback channel (feature: memory)

pub mod channel;
pub mod protocol;

#[cfg(feature = "memory")]
pub mod memory;

pub use channel::{ChannelError, ChannelEvent, ChannelOpener, RemoteCallError, RpcChannel};
pub use protocol::{Notification, RemoteCall, RemoteHandle, SESSION_TOPIC};

#[cfg(feature = "memory")]
pub use memory::{MemoryChannel, MemoryOpener};
