//! Session client configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{Slot, msg_store::DEFAULT_HISTORY};

/// Tunables for a session client instance.
///
/// Every field has a default, so an empty JSON object is a valid config.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Period of the run timer tick, in milliseconds.
    pub run_tick_interval_ms: u64,

    /// Route shown when connecting to a robot that is mid-run.
    pub run_view_path: String,

    /// Route prefix for the labware confirmation view.
    pub calibrate_labware_path: String,

    /// Number of responses kept by a `ResponseStore`.
    pub response_history: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            run_tick_interval_ms: 1000,
            run_view_path: "/run".to_string(),
            calibrate_labware_path: "/calibrate/labware".to_string(),
            response_history: DEFAULT_HISTORY,
        }
    }
}

impl ClientConfig {
    /// Parse a config from JSON.
    ///
    /// # Errors
    /// Returns error if the JSON is malformed.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Set the run timer period.
    #[must_use]
    pub fn with_run_tick_interval(mut self, interval: Duration) -> Self {
        self.run_tick_interval_ms = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Set the run view route.
    #[must_use]
    pub fn with_run_view_path(mut self, path: impl Into<String>) -> Self {
        self.run_view_path = path.into();
        self
    }

    /// Run timer period.
    #[must_use]
    pub const fn run_tick_interval(&self) -> Duration {
        Duration::from_millis(self.run_tick_interval_ms)
    }

    /// Route of the confirmation view for labware in `slot`.
    #[must_use]
    pub fn labware_confirm_path(&self, slot: &Slot) -> String {
        format!("{}/{slot}/confirm", self.calibrate_labware_path)
    }
}
