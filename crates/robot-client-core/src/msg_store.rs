//! Broadcast + history store for outward responses.

use std::{
    collections::VecDeque,
    sync::{PoisonError, RwLock},
};

use futures::StreamExt;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;

use crate::{Emitter, Response};

/// Default number of responses kept for late subscribers.
pub const DEFAULT_HISTORY: usize = 1024;

/// Response store with broadcast and history support.
///
/// A UI that attaches late receives the history first, then switches
/// seamlessly to live responses.
pub struct ResponseStore {
    history: RwLock<VecDeque<Response>>,
    capacity: usize,
    sender: broadcast::Sender<Response>,
}

impl Default for ResponseStore {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY)
    }
}

impl ResponseStore {
    /// Create a store that keeps at most `capacity` responses of history.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(16));
        Self {
            history: RwLock::new(VecDeque::with_capacity(capacity.min(64))),
            capacity,
            sender,
        }
    }

    /// Push a response to both live listeners and history.
    pub fn push(&self, response: Response) {
        let _ = self.sender.send(response.clone()); // live listeners

        let mut history = self.history.write().unwrap_or_else(PoisonError::into_inner);
        while history.len() >= self.capacity.max(1) {
            history.pop_front();
        }
        history.push_back(response);
    }

    /// Get a receiver for live responses.
    #[must_use]
    pub fn get_receiver(&self) -> broadcast::Receiver<Response> {
        self.sender.subscribe()
    }

    /// Get a snapshot of the history.
    #[must_use]
    pub fn get_history(&self) -> Vec<Response> {
        self.history
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }

    /// Drop all recorded history.
    pub fn clear(&self) {
        self.history
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// Stream that yields history first, then live responses.
    #[must_use]
    pub fn history_plus_stream(&self) -> futures::stream::BoxStream<'static, Response> {
        let (history, rx) = (self.get_history(), self.get_receiver());

        let hist = futures::stream::iter(history);
        let live = BroadcastStream::new(rx).filter_map(|res| async move {
            match res {
                Ok(response) => Some(response),
                Err(e) => {
                    tracing::warn!("response subscriber lagged: {e}");
                    None
                }
            }
        });

        Box::pin(hist.chain(live))
    }
}

impl Emitter for ResponseStore {
    fn emit(&self, response: Response) {
        self.push(response);
    }
}
