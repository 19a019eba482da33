use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = false;

use crate::log_info;

/// A cancellable ticking timer that reports elapsed milliseconds once per
/// tick interval.
///
/// Elapsed time is computed from a monotonic anchor captured at `start`, not
/// from the number of ticks delivered, so delayed tick delivery (e.g. the
/// host backgrounding the process) catches up to wall clock instead of
/// drifting. Reported values are strictly increasing and never duplicated.
///
/// The main six-minute timer and the stop-request countdown are two
/// independent instances of this type.
pub struct TestClock {
    handle: Option<JoinHandle<()>>,
    cancel: Option<CancellationToken>,
}

impl TestClock {
    pub fn new() -> Self {
        Self {
            handle: None,
            cancel: None,
        }
    }

    /// Spawn the ticker task. Any previous run of this instance is cancelled
    /// first; resuming is only possible by calling `start` again.
    pub fn start<F>(&mut self, tick_interval: Duration, on_tick: F)
    where
        F: FnMut(u64) + Send + 'static,
    {
        self.stop();

        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let handle = tokio::spawn(clock_loop(tick_interval, token, on_tick));

        self.handle = Some(handle);
        self.cancel = Some(cancel);
    }

    /// Cancel the ticker task. No tick callback runs after this returns.
    pub fn stop(&mut self) {
        if let Some(token) = self.cancel.take() {
            token.cancel();
        }
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().map(|h| !h.is_finished()).unwrap_or(false)
    }
}

impl Default for TestClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for TestClock {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn clock_loop<F>(tick_interval: Duration, cancel: CancellationToken, mut on_tick: F)
where
    F: FnMut(u64) + Send + 'static,
{
    let anchor = Instant::now();
    let mut ticker = tokio::time::interval(tick_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    // The first interval tick completes immediately; swallow it so the first
    // reported elapsed value is one full interval in.
    ticker.tick().await;

    let mut last_reported_ms: u64 = 0;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let elapsed_ms = anchor.elapsed().as_millis() as u64;
                if elapsed_ms <= last_reported_ms {
                    continue;
                }
                last_reported_ms = elapsed_ms;
                on_tick(elapsed_ms);
            }
            _ = cancel.cancelled() => {
                log_info!("clock loop shutting down after {last_reported_ms}ms");
                break;
            }
        }
    }
}
