use std::time::Duration;

use anyhow::{Context, Result};
use rand::Rng;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::config::LinkConfig;
use crate::models::DeviceKind;
use crate::{log_info, log_warn};

use super::transport::{LinkSnapshot, LinkStatus, LinkUpdate, TransportCommand, TransportEvent};

const BACKOFF_JITTER_MS: u64 = 250;

/// User- or engine-initiated control of one link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkCommand {
    Connect,
    Disconnect,
    /// Always allowed; cancels any pending automatic attempt, resets the
    /// attempt counter and issues a fresh connect.
    ForceReconnect,
}

/// Handle over one device's connection worker. The worker owns the link
/// state exclusively; everything else only observes published snapshots.
pub struct SensorLinkManager {
    device: DeviceKind,
    control_tx: UnboundedSender<LinkCommand>,
    handle: Option<JoinHandle<()>>,
    cancel: CancellationToken,
}

impl SensorLinkManager {
    /// Spawn the worker for `device`. Transport events arrive on `events`,
    /// commands go out on `commands`, status changes and samples are reported
    /// on `updates`.
    pub fn spawn(
        device: DeviceKind,
        config: LinkConfig,
        commands: UnboundedSender<TransportCommand>,
        events: UnboundedReceiver<TransportEvent>,
        updates: UnboundedSender<LinkUpdate>,
    ) -> Self {
        let cancel = CancellationToken::new();
        let (control_tx, control_rx) = tokio::sync::mpsc::unbounded_channel();

        let handle = tokio::spawn(link_loop(
            device,
            config,
            control_rx,
            events,
            commands,
            updates,
            cancel.clone(),
        ));

        Self {
            device,
            control_tx,
            handle: Some(handle),
            cancel,
        }
    }

    pub fn device(&self) -> DeviceKind {
        self.device
    }

    pub fn connect(&self) {
        let _ = self.control_tx.send(LinkCommand::Connect);
    }

    pub fn disconnect(&self) {
        let _ = self.control_tx.send(LinkCommand::Disconnect);
    }

    pub fn force_reconnect(&self) {
        let _ = self.control_tx.send(LinkCommand::ForceReconnect);
    }

    /// Cancel the worker and wait for it to exit.
    pub async fn shutdown(&mut self) -> Result<()> {
        self.cancel.cancel();
        if let Some(handle) = self.handle.take() {
            handle
                .await
                .with_context(|| format!("{} link worker failed to join", self.device.as_str()))?;
        }
        Ok(())
    }
}

struct LinkLoopState {
    snapshot: LinkSnapshot,
    /// Deadline of the pending automatic retry, if one is scheduled.
    retry_at: Option<Instant>,
}

impl LinkLoopState {
    fn publish(&self, updates: &UnboundedSender<LinkUpdate>) {
        let _ = updates.send(LinkUpdate::Status(self.snapshot.clone()));
    }
}

async fn link_loop(
    device: DeviceKind,
    config: LinkConfig,
    mut control: UnboundedReceiver<LinkCommand>,
    mut events: UnboundedReceiver<TransportEvent>,
    commands: UnboundedSender<TransportCommand>,
    updates: UnboundedSender<LinkUpdate>,
    cancel: CancellationToken,
) {
    let mut state = LinkLoopState {
        snapshot: LinkSnapshot::new(device),
        retry_at: None,
    };

    loop {
        let retry_at = state.retry_at;
        let retry_timer = async move {
            match retry_at {
                Some(at) => tokio::time::sleep_until(at).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            _ = cancel.cancelled() => {
                log_info!("{} link worker shutting down", device.as_str());
                break;
            }
            _ = retry_timer => {
                state.retry_at = None;
                state.snapshot.status = LinkStatus::Connecting;
                state.snapshot.message = format!(
                    "reconnecting (attempt {}/{})",
                    state.snapshot.auto_attempts, config.max_auto_reconnect_attempts
                );
                let _ = commands.send(TransportCommand::Connect { device });
                state.publish(&updates);
            }
            Some(cmd) = control.recv() => {
                handle_command(device, cmd, &mut state, &commands);
                state.publish(&updates);
            }
            Some(event) = events.recv() => {
                handle_event(device, event, &config, &mut state, &updates);
            }
        }
    }
}

fn handle_command(
    device: DeviceKind,
    cmd: LinkCommand,
    state: &mut LinkLoopState,
    commands: &UnboundedSender<TransportCommand>,
) {
    match cmd {
        LinkCommand::Connect => {
            state.retry_at = None;
            state.snapshot.auto_attempts = 0;
            state.snapshot.reconnect_in_progress = false;
            state.snapshot.status = LinkStatus::Connecting;
            state.snapshot.message = "connecting".to_string();
            let _ = commands.send(TransportCommand::Connect { device });
        }
        LinkCommand::Disconnect => {
            state.retry_at = None;
            state.snapshot.auto_attempts = 0;
            state.snapshot.reconnect_in_progress = false;
            state.snapshot.status = LinkStatus::Disconnected;
            state.snapshot.message = "disconnected".to_string();
            let _ = commands.send(TransportCommand::Disconnect { device });
        }
        LinkCommand::ForceReconnect => {
            // Manual override: drop any scheduled automatic attempt and start
            // fresh, regardless of retry exhaustion or fatal status.
            log_info!("{} manual reconnect requested", device.as_str());
            state.retry_at = None;
            state.snapshot.auto_attempts = 0;
            state.snapshot.reconnect_in_progress = true;
            state.snapshot.status = LinkStatus::Connecting;
            state.snapshot.message = "reconnecting (manual)".to_string();
            let _ = commands.send(TransportCommand::Connect { device });
        }
    }
}

fn handle_event(
    device: DeviceKind,
    event: TransportEvent,
    config: &LinkConfig,
    state: &mut LinkLoopState,
    updates: &UnboundedSender<LinkUpdate>,
) {
    match event {
        TransportEvent::Connected => {
            log_info!("{} connected", device.as_str());
            state.retry_at = None;
            state.snapshot.auto_attempts = 0;
            state.snapshot.reconnect_in_progress = false;
            state.snapshot.status = LinkStatus::Connected;
            state.snapshot.message = "connected".to_string();
            state.publish(updates);
        }
        TransportEvent::Sample { sample, timestamp } => {
            // Samples bypass link state entirely; the engine's phase machine
            // decides whether they are accepted.
            let _ = updates.send(LinkUpdate::Sample {
                device,
                sample,
                timestamp,
            });
        }
        TransportEvent::ConnectFailed { reason } | TransportEvent::LinkLost { reason } => {
            schedule_retry(device, &reason, config, state);
            state.publish(updates);
        }
        TransportEvent::RadioDisabled => {
            log_warn!("{} bluetooth radio disabled; waiting for user action", device.as_str());
            state.retry_at = None;
            state.snapshot.reconnect_in_progress = false;
            state.snapshot.status = LinkStatus::ErrorFatal;
            state.snapshot.message = "bluetooth is disabled on this device".to_string();
            state.publish(updates);
        }
    }
}

fn schedule_retry(device: DeviceKind, reason: &str, config: &LinkConfig, state: &mut LinkLoopState) {
    if state.snapshot.auto_attempts >= config.max_auto_reconnect_attempts {
        log_warn!(
            "{} link lost ({reason}); automatic retries exhausted after {} attempts",
            device.as_str(),
            state.snapshot.auto_attempts
        );
        state.retry_at = None;
        state.snapshot.reconnect_in_progress = false;
        state.snapshot.status = LinkStatus::ErrorRetryable;
        state.snapshot.message = format!("link lost ({reason}); reconnect manually");
        return;
    }

    state.snapshot.auto_attempts += 1;
    let delay = backoff_delay(config, state.snapshot.auto_attempts);
    log_warn!(
        "{} link lost ({reason}); retry {}/{} in {}ms",
        device.as_str(),
        state.snapshot.auto_attempts,
        config.max_auto_reconnect_attempts,
        delay.as_millis()
    );

    state.retry_at = Some(Instant::now() + delay);
    state.snapshot.reconnect_in_progress = true;
    state.snapshot.status = LinkStatus::ErrorRetryable;
    state.snapshot.message = format!(
        "link lost ({reason}); retrying {}/{}",
        state.snapshot.auto_attempts, config.max_auto_reconnect_attempts
    );
}

/// Exponential backoff with a small jitter, capped at the configured maximum.
fn backoff_delay(config: &LinkConfig, attempt: u32) -> Duration {
    let exp = attempt.saturating_sub(1).min(16);
    let base = config
        .backoff_base_ms
        .saturating_mul(1u64 << exp)
        .min(config.backoff_cap_ms);
    let jitter = rand::thread_rng().gen_range(0..BACKOFF_JITTER_MS);
    Duration::from_millis(base + jitter)
}
