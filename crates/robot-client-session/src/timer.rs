//! Run timer emitting one tick per period while a protocol runs.

use std::{sync::Arc, time::Duration};

use robot_client_core::{Emitter, Response};
use tokio::{
    task::JoinHandle,
    time::{self, Instant, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;

struct Ticker {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

/// Periodic `TickRunTime` emitter.
///
/// At most one tick stream exists per timer. Starting a running timer and
/// stopping a stopped one are both no-ops.
pub struct RunTimer {
    period: Duration,
    emitter: Arc<dyn Emitter>,
    ticker: Option<Ticker>,
}

impl RunTimer {
    /// Create a stopped timer.
    #[must_use]
    pub fn new(period: Duration, emitter: Arc<dyn Emitter>) -> Self {
        Self {
            period,
            emitter,
            ticker: None,
        }
    }

    /// Start ticking unless already running. Must be called within a tokio runtime.
    ///
    /// Returns `true` if a new tick stream was started.
    pub fn start(&mut self) -> bool {
        if self.ticker.is_some() {
            return false;
        }

        let cancel = CancellationToken::new();
        let task = tokio::spawn(tick_loop(
            self.period,
            Arc::clone(&self.emitter),
            cancel.clone(),
        ));
        self.ticker = Some(Ticker { cancel, task });
        tracing::debug!(period_ms = self.period.as_millis(), "run timer started");
        true
    }

    /// Stop ticking.
    ///
    /// Returns `true` if a tick stream was running.
    pub fn stop(&mut self) -> bool {
        let Some(ticker) = self.ticker.take() else {
            return false;
        };
        ticker.cancel.cancel();
        ticker.task.abort();
        tracing::debug!("run timer stopped");
        true
    }

    #[must_use]
    pub const fn is_running(&self) -> bool {
        self.ticker.is_some()
    }

    /// Start when `running`, stop otherwise.
    pub fn sync(&mut self, running: bool) {
        if running {
            self.start();
        } else {
            self.stop();
        }
    }
}

impl Drop for RunTimer {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn tick_loop(period: Duration, emitter: Arc<dyn Emitter>, cancel: CancellationToken) {
    let mut ticks = time::interval_at(Instant::now() + period, period);
    ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            _ = ticks.tick() => emitter.emit(Response::TickRunTime),
        }
    }
}
