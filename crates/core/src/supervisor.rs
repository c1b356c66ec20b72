use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError};

use crate::fleet::domain::camera::CameraId;
use crate::fleet::domain::fleet_source::{CameraStatus, FleetSource};
use crate::fleet::domain::worker_state::{WorkerEvent, WorkerState};
use crate::fleet::fleet_manager::FleetManager;
use crate::recognition::face_registry::{FaceRegistry, LoadOutcome};

pub const DEFAULT_TICK: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorCommand {
    RefreshRegistry,
    Reconcile,
    Shutdown,
}

/// Single control loop: drives fleet reconciliation and registry refresh
/// on their own intervals, relays worker status to the fleet source and
/// obeys operator commands.
pub struct Supervisor {
    registry: Arc<FaceRegistry>,
    fleet: FleetManager,
    fleet_source: Arc<dyn FleetSource>,
    events: Receiver<WorkerEvent>,
    commands: Receiver<SupervisorCommand>,
    tick: Duration,
    fleet_interval: Duration,
    last_reconcile: Option<Instant>,
}

impl Supervisor {
    pub fn new(
        registry: Arc<FaceRegistry>,
        fleet: FleetManager,
        fleet_source: Arc<dyn FleetSource>,
        events: Receiver<WorkerEvent>,
        commands: Receiver<SupervisorCommand>,
        fleet_interval: Duration,
    ) -> Self {
        Self {
            registry,
            fleet,
            fleet_source,
            events,
            commands,
            tick: DEFAULT_TICK,
            fleet_interval,
            last_reconcile: None,
        }
    }

    pub fn with_tick(mut self, tick: Duration) -> Self {
        self.tick = tick;
        self
    }

    pub fn fleet(&self) -> &FleetManager {
        &self.fleet
    }

    /// Runs until a `Shutdown` command arrives, then stops every worker.
    ///
    /// A closed command channel only means no more commands; the loop keeps
    /// ticking.
    pub fn run(mut self) {
        log::info!(
            "Supervisor running (fleet every {:?}, tick {:?})",
            self.fleet_interval,
            self.tick
        );
        while self.next_command() {
            self.step(Instant::now());
        }
        self.drain_events();
        self.fleet.shutdown();
        self.drain_events();
        log::info!("Supervisor stopped");
    }

    /// Waits up to one tick for an operator command. False on shutdown.
    fn next_command(&mut self) -> bool {
        match self.commands.recv_timeout(self.tick) {
            Ok(SupervisorCommand::Shutdown) => return false,
            Ok(SupervisorCommand::RefreshRegistry) => {
                log::info!("Manual registry refresh requested");
                self.registry.request_refresh();
            }
            Ok(SupervisorCommand::Reconcile) => {
                log::info!("Manual reconciliation requested");
                self.last_reconcile = None;
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => {
                log::info!("Command channel closed; running until terminated");
                self.commands = crossbeam_channel::never();
            }
        }
        true
    }

    /// One pass of timer work: registry refresh, reconciliation with a
    /// status heartbeat, then worker events.
    pub fn step(&mut self, now: Instant) {
        if self.registry.needs_refresh(now) {
            match self.registry.load() {
                LoadOutcome::Primary(n) => log::debug!("Registry refreshed ({n} records)"),
                LoadOutcome::Degraded(n) => {
                    log::warn!("Registry running on degraded source ({n} records)")
                }
                LoadOutcome::Retained(e) => log::warn!("Registry refresh failed: {e}"),
                LoadOutcome::Rejected(m) => log::error!("Registry refresh rejected: {m}"),
            }
        }

        let due = self
            .last_reconcile
            .map_or(true, |last| now.saturating_duration_since(last) >= self.fleet_interval);
        if due {
            self.last_reconcile = Some(now);
            self.fleet.reconcile();
            for camera_id in self.fleet.streaming_camera_ids() {
                self.report(&camera_id, CameraStatus::Active);
            }
        }

        self.drain_events();
    }

    fn drain_events(&mut self) {
        while let Ok(event) = self.events.try_recv() {
            match event {
                WorkerEvent::StateChanged {
                    camera_id,
                    state: WorkerState::Streaming,
                } => self.report(&camera_id, CameraStatus::Active),
                WorkerEvent::StateChanged { .. } => {}
                WorkerEvent::StartFailed { camera_id, reason } => {
                    log::warn!("[{camera_id}] could not start: {reason}");
                }
                WorkerEvent::Stopped { camera_id, reason } => {
                    log::info!("[{camera_id}] worker stopped ({reason:?})");
                    self.report(&camera_id, CameraStatus::Inactive);
                }
            }
        }
    }

    fn report(&self, camera_id: &CameraId, status: CameraStatus) {
        if let Err(e) = self
            .fleet_source
            .report_status(camera_id, status, chrono::Utc::now())
        {
            log::debug!("[{camera_id}] status update failed: {e}");
        }
    }
}
