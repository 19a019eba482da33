use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::{broadcast, watch, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::clock::TestClock;
use crate::config::EngineConfig;
use crate::link::{LinkUpdate, SensorLinkManager, TransportCommand, TransportEvent};
use crate::models::{DeviceKind, FinishReason, PreparationData, SensorSample, TestPhase};
use crate::utils::format::format_elapsed;

use super::events::EngineEvent;
use super::snapshot::EngineSnapshot;
use super::state::EngineState;

const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Time-driven inputs queued into the engine's serialized drain task.
#[derive(Debug, Clone, Copy)]
enum EngineInput {
    Tick { elapsed_ms: u64 },
    CountdownTick { generation: u64, elapsed_ms: u64 },
}

struct EngineShared {
    config: EngineConfig,
    state: Mutex<EngineState>,
    clock: Mutex<TestClock>,
    countdown: Mutex<TestClock>,
    snapshot_tx: watch::Sender<EngineSnapshot>,
    events_tx: broadcast::Sender<EngineEvent>,
}

/// The test execution engine. Owns the lifecycle state machine, consumes
/// clock ticks and sensor samples through one serialized entry point, and
/// publishes an immutable snapshot on every state-changing event.
///
/// Cheap to clone; all clones share the same engine.
#[derive(Clone)]
pub struct TestEngine {
    shared: Arc<EngineShared>,
    input_tx: UnboundedSender<EngineInput>,
    oximeter: Arc<Mutex<SensorLinkManager>>,
    accelerometer: Arc<Mutex<SensorLinkManager>>,
    drain: Arc<Mutex<Option<JoinHandle<()>>>>,
    cancel: CancellationToken,
}

impl TestEngine {
    /// Wire the engine to a Bluetooth transport collaborator: commands flow
    /// out on `commands`, per-device events arrive on the two receivers.
    pub fn new(
        config: EngineConfig,
        commands: UnboundedSender<TransportCommand>,
        oximeter_events: UnboundedReceiver<TransportEvent>,
        accelerometer_events: UnboundedReceiver<TransportEvent>,
    ) -> Self {
        let (input_tx, input_rx) = mpsc::unbounded_channel();
        let (updates_tx, updates_rx) = mpsc::unbounded_channel();

        let oximeter = SensorLinkManager::spawn(
            DeviceKind::Oximeter,
            config.link,
            commands.clone(),
            oximeter_events,
            updates_tx.clone(),
        );
        let accelerometer = SensorLinkManager::spawn(
            DeviceKind::Accelerometer,
            config.link,
            commands,
            accelerometer_events,
            updates_tx,
        );

        let state = EngineState::new();
        let (snapshot_tx, _) = watch::channel(EngineSnapshot::from_state(&state));
        let (events_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        let shared = Arc::new(EngineShared {
            config,
            state: Mutex::new(state),
            clock: Mutex::new(TestClock::new()),
            countdown: Mutex::new(TestClock::new()),
            snapshot_tx,
            events_tx,
        });

        let cancel = CancellationToken::new();
        let drain = tokio::spawn(drain_loop(
            shared.clone(),
            input_rx,
            updates_rx,
            cancel.clone(),
        ));

        Self {
            shared,
            input_tx,
            oximeter: Arc::new(Mutex::new(oximeter)),
            accelerometer: Arc::new(Mutex::new(accelerometer)),
            drain: Arc::new(Mutex::new(Some(drain))),
            cancel,
        }
    }

    /// Observable state snapshot; a new value is published on every
    /// state-changing event.
    pub fn subscribe(&self) -> watch::Receiver<EngineSnapshot> {
        self.shared.snapshot_tx.subscribe()
    }

    /// One-shot events: alarms, restart requests, test completion.
    pub fn events(&self) -> broadcast::Receiver<EngineEvent> {
        self.shared.events_tx.subscribe()
    }

    pub async fn snapshot(&self) -> EngineSnapshot {
        let state = self.shared.state.lock().await;
        EngineSnapshot::from_state(&state)
    }

    /// Load preparation data for the next attempt. Valid while configuring
    /// or after a finished test; a running test is never disturbed.
    /// Malformed thresholds are rejected here so `start` never sees them.
    pub async fn initialize(&self, prep: PreparationData) -> Result<()> {
        let mut state = self.shared.state.lock().await;
        match state.phase {
            TestPhase::Running | TestPhase::StoppingCountdown => {
                warn!("initialize ignored while a test is in progress");
                return Ok(());
            }
            TestPhase::Configuring | TestPhase::Finished => {}
        }

        prep.thresholds.validate()?;

        state.reset_run_data();
        state.phase = TestPhase::Configuring;
        info!(
            "initialized test for patient {} ({})",
            prep.patient_id, prep.patient_name
        );
        state.prep = Some(prep);
        self.shared.publish(&state);
        Ok(())
    }

    /// Begin the walk: `Configuring -> Running`, main clock started, both
    /// links asked to connect. Called while a test is already running it only
    /// surfaces a restart request for the operator to confirm.
    pub async fn start(&self) -> Result<()> {
        {
            let mut state = self.shared.state.lock().await;
            match state.phase {
                TestPhase::Running | TestPhase::StoppingCountdown => {
                    warn!("start requested mid-test; surfacing restart request");
                    let _ = self.shared.events_tx.send(EngineEvent::RestartRequested);
                    return Ok(());
                }
                TestPhase::Finished => {
                    warn!("start ignored after finish; initialize a new attempt first");
                    return Ok(());
                }
                TestPhase::Configuring => {}
            }

            state.begin_session()?;
            self.shared.publish(&state);
        }

        let tx = self.input_tx.clone();
        self.shared.clock.lock().await.start(
            Duration::from_millis(self.shared.config.tick_interval_ms),
            move |elapsed_ms| {
                let _ = tx.send(EngineInput::Tick { elapsed_ms });
            },
        );

        self.oximeter.lock().await.connect();
        self.accelerometer.lock().await.connect();

        info!("test started");
        Ok(())
    }

    /// The confirmed teardown for a surfaced restart request: back to
    /// `Configuring` with preparation data retained and all attempt data
    /// discarded.
    pub async fn confirm_restart(&self) {
        {
            let mut state = self.shared.state.lock().await;
            if state.phase == TestPhase::Configuring {
                debug!("restart confirmation with nothing to tear down");
                return;
            }
            state.reset_run_data();
            state.phase = TestPhase::Configuring;
            self.shared.publish(&state);
        }

        self.shared.clock.lock().await.stop();
        self.shared.countdown.lock().await.stop();
        info!("test torn down; back to configuring");
    }

    /// Begin the stop countdown instead of finalizing immediately, so the
    /// operator can still cancel.
    pub async fn request_stop(&self) {
        let generation;
        {
            let mut state = self.shared.state.lock().await;
            if state.phase != TestPhase::Running {
                warn!("stop request ignored in phase {:?}", state.phase);
                return;
            }
            state.phase = TestPhase::StoppingCountdown;
            state.countdown_generation += 1;
            generation = state.countdown_generation;
            state.countdown_remaining_ms = Some(self.shared.config.stop_countdown_ms);
            self.shared.publish(&state);
        }

        let tx = self.input_tx.clone();
        self.shared.countdown.lock().await.start(
            Duration::from_millis(self.shared.config.tick_interval_ms),
            move |elapsed_ms| {
                let _ = tx.send(EngineInput::CountdownTick {
                    generation,
                    elapsed_ms,
                });
            },
        );
        info!(
            "stop requested; finalizing in {}ms unless cancelled",
            self.shared.config.stop_countdown_ms
        );
    }

    /// Abort the stop countdown and resume running. The countdown task is
    /// cancelled before this returns, and its generation is retired so a tick
    /// already in flight can never finalize the test.
    pub async fn cancel_stop(&self) {
        self.shared.countdown.lock().await.stop();

        let mut state = self.shared.state.lock().await;
        if state.phase != TestPhase::StoppingCountdown {
            warn!("cancel ignored in phase {:?}", state.phase);
            return;
        }
        state.countdown_generation += 1;
        state.countdown_remaining_ms = None;
        state.phase = TestPhase::Running;
        self.shared.publish(&state);
        info!("stop cancelled; test continues");
    }

    /// Record a stop event with the concurrent vitals.
    pub async fn add_stop(&self) {
        let mut state = self.shared.state.lock().await;
        if state.phase != TestPhase::Running {
            warn!("stop record ignored in phase {:?}", state.phase);
            return;
        }
        let record = state.add_stop();
        info!(
            "stop {} recorded at {} (spo2 {}, hr {})",
            record.sequence_number,
            format_elapsed(record.elapsed_ms),
            record.spo2,
            record.heart_rate
        );
        self.shared.publish(&state);
    }

    /// Remove the newest stop record. Reported, not fatal, when none exist.
    pub async fn delete_last_stop(&self) {
        let mut state = self.shared.state.lock().await;
        if !matches!(state.phase, TestPhase::Running | TestPhase::Finished) {
            warn!("stop deletion ignored in phase {:?}", state.phase);
            return;
        }
        match state.delete_last_stop() {
            Some(record) => {
                info!("stop {} deleted", record.sequence_number);
                self.shared.publish(&state);
            }
            None => warn!("no stop records to delete"),
        }
    }

    pub async fn connect_device(&self, device: DeviceKind) {
        self.manager(device).lock().await.connect();
    }

    pub async fn disconnect_device(&self, device: DeviceKind) {
        self.manager(device).lock().await.disconnect();
    }

    /// Manual reconnect, always allowed regardless of the link's retry state.
    pub async fn force_reconnect(&self, device: DeviceKind) {
        self.manager(device).lock().await.force_reconnect();
    }

    /// Cancel every concurrent producer: the main clock, the countdown, both
    /// link workers and the input drain. Used when the test screen goes away.
    pub async fn shutdown(&self) -> Result<()> {
        self.cancel.cancel();
        self.shared.clock.lock().await.stop();
        self.shared.countdown.lock().await.stop();
        self.oximeter.lock().await.shutdown().await?;
        self.accelerometer.lock().await.shutdown().await?;
        if let Some(handle) = self.drain.lock().await.take() {
            let _ = handle.await;
        }
        info!("engine shut down");
        Ok(())
    }

    fn manager(&self, device: DeviceKind) -> &Arc<Mutex<SensorLinkManager>> {
        match device {
            DeviceKind::Oximeter => &self.oximeter,
            DeviceKind::Accelerometer => &self.accelerometer,
        }
    }
}

async fn drain_loop(
    shared: Arc<EngineShared>,
    mut inputs: UnboundedReceiver<EngineInput>,
    mut updates: UnboundedReceiver<LinkUpdate>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            Some(input) = inputs.recv() => shared.handle_input(input).await,
            Some(update) = updates.recv() => shared.handle_link_update(update).await,
            else => break,
        }
    }
    debug!("engine input drain stopped");
}

impl EngineShared {
    fn publish(&self, state: &EngineState) {
        self.snapshot_tx.send_replace(EngineSnapshot::from_state(state));
    }

    async fn handle_input(&self, input: EngineInput) {
        match input {
            EngineInput::Tick { elapsed_ms } => self.on_tick(elapsed_ms).await,
            EngineInput::CountdownTick {
                generation,
                elapsed_ms,
            } => self.on_countdown_tick(generation, elapsed_ms).await,
        }
    }

    async fn handle_link_update(&self, update: LinkUpdate) {
        match update {
            LinkUpdate::Status(snapshot) => {
                let mut state = self.state.lock().await;
                let device = snapshot.device;
                *state.link_mut(device) = snapshot;
                self.publish(&state);
            }
            LinkUpdate::Sample {
                device,
                sample,
                timestamp,
            } => self.on_sample(device, sample, timestamp).await,
        }
    }

    async fn on_tick(&self, elapsed_ms: u64) {
        let mut finished = None;
        {
            let mut state = self.state.lock().await;
            if !matches!(
                state.phase,
                TestPhase::Running | TestPhase::StoppingCountdown
            ) {
                debug!(
                    "dropping stale tick at {elapsed_ms}ms in phase {:?}",
                    state.phase
                );
                return;
            }

            state.elapsed_ms = elapsed_ms.min(self.config.test_duration_ms);
            state.record_minutes_through(elapsed_ms);

            // Only a running test auto-finishes at the boundary; during a stop
            // countdown the expiry decides.
            if state.phase == TestPhase::Running && elapsed_ms >= self.config.test_duration_ms {
                finished = Some(state.finalize(FinishReason::CompletedNormally));
            }
            self.publish(&state);
        }

        if let Some(summary) = finished {
            self.finish(FinishReason::CompletedNormally, summary).await;
        }
    }

    async fn on_countdown_tick(&self, generation: u64, elapsed_ms: u64) {
        let mut finished = None;
        {
            let mut state = self.state.lock().await;
            if state.phase != TestPhase::StoppingCountdown
                || generation != state.countdown_generation
            {
                debug!("dropping stale countdown tick (generation {generation})");
                return;
            }

            let remaining = self.config.stop_countdown_ms.saturating_sub(elapsed_ms);
            state.countdown_remaining_ms = Some(remaining);
            if remaining == 0 {
                finished = Some(state.finalize(FinishReason::StoppedEarly));
            }
            self.publish(&state);
        }

        if let Some(summary) = finished {
            self.finish(FinishReason::StoppedEarly, summary).await;
        }
    }

    async fn on_sample(&self, device: DeviceKind, sample: SensorSample, timestamp: DateTime<Utc>) {
        let mut transitions = Vec::new();
        let mut offset_ms = 0;
        {
            let mut state = self.state.lock().await;
            if state.phase != TestPhase::Running {
                debug!(
                    "dropping {} sample in phase {:?}",
                    device.as_str(),
                    state.phase
                );
                return;
            }
            let started_at = match state.session.as_ref() {
                Some(session) => session.started_at,
                None => return,
            };

            let offset = (timestamp - started_at).num_milliseconds();
            if offset < 0 {
                warn!(
                    "dropping {} sample timestamped before test start",
                    device.as_str()
                );
                return;
            }
            offset_ms = offset as u64;

            match sample {
                SensorSample::Oximetry { spo2, pulse_bpm } => {
                    transitions = state.apply_oximetry(offset_ms, spo2, pulse_bpm, &self.config);
                }
                SensorSample::StepCount { total } => state.apply_step_count(total),
            }
            self.publish(&state);
        }

        for transition in transitions {
            warn!(
                "{:?} alarm {:?} at {} (value {})",
                transition.vital,
                transition.level,
                format_elapsed(offset_ms),
                transition.value
            );
            let _ = self.events_tx.send(EngineEvent::AlarmRaised {
                vital: transition.vital,
                level: transition.level,
                value: transition.value,
                elapsed_ms: offset_ms,
            });
        }
    }

    /// Post-finalize teardown of the time producers. Links stay connected:
    /// reconnection policy is independent of test phase.
    async fn finish(&self, reason: FinishReason, summary: crate::models::TestSummary) {
        self.clock.lock().await.stop();
        self.countdown.lock().await.stop();
        info!("test finalized: {}", reason.as_str());
        let _ = self.events_tx.send(EngineEvent::TestFinished { reason, summary });
    }
}
