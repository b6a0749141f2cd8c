//! Robot session client.
//!
//! Owns one RPC connection to a robot, mirrors its execution session and
//! turns user actions plus pushed notifications into `Response` events.
//!
//! Provides:
//! - `SessionClient` - Connection lifecycle and notification routing
//! - Action dispatch (`SessionClient::dispatch` / `SessionClient::handle`)

pub mod client;
mod dispatch;

#[cfg(test)]
mod tests;

pub use client::{ClientError, SessionClient};
pub use robot_client_core as core;
pub use robot_client_session as session;
pub use robot_client_transport as transport;
