use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::Sender;

use crate::fleet::camera_stream_worker::{CameraStreamWorker, WorkerSettings};
use crate::fleet::domain::camera::{CameraDescriptor, CameraId};
use crate::fleet::domain::fleet_source::FleetSource;
use crate::fleet::domain::worker_state::{WorkerEvent, WorkerState};
use crate::pipeline::frame_pipeline::FramePipeline;
use crate::pipeline::pipeline_logger::LogPipelineLogger;
use crate::video::domain::frame_source::FrameSourceFactory;

/// What one reconciliation pass changed.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ReconcileReport {
    pub added: Vec<CameraId>,
    pub removed: Vec<CameraId>,
    /// Workers found STOPPED on their own and discarded.
    pub reaped: Vec<CameraId>,
    /// Roster cameras not started because an old worker is still stopping.
    pub deferred: Vec<CameraId>,
    pub failed_start: Vec<CameraId>,
    /// Set when the roster fetch failed; the last good roster was used.
    pub failed_fetch: Option<String>,
}

impl ReconcileReport {
    pub fn is_noop(&self) -> bool {
        self.added.is_empty()
            && self.removed.is_empty()
            && self.reaped.is_empty()
            && self.failed_start.is_empty()
            && self.failed_fetch.is_none()
    }
}

/// Keeps exactly one worker per roster camera.
///
/// Only the supervisor mutates the live set. Workers that miss the stop
/// deadline are parked until they reach STOPPED, and their camera is not
/// restarted before then.
pub struct FleetManager {
    source: Arc<dyn FleetSource>,
    frame_sources: Arc<dyn FrameSourceFactory>,
    pipeline: FramePipeline,
    settings: WorkerSettings,
    stop_timeout: Duration,
    events: Sender<WorkerEvent>,
    workers: BTreeMap<CameraId, CameraStreamWorker>,
    stopping: Vec<CameraStreamWorker>,
    last_roster: Option<Vec<CameraDescriptor>>,
}

impl FleetManager {
    pub fn new(
        source: Arc<dyn FleetSource>,
        frame_sources: Arc<dyn FrameSourceFactory>,
        pipeline: FramePipeline,
        settings: WorkerSettings,
        stop_timeout: Duration,
        events: Sender<WorkerEvent>,
    ) -> Self {
        Self {
            source,
            frame_sources,
            pipeline,
            settings,
            stop_timeout,
            events,
            workers: BTreeMap::new(),
            stopping: Vec::new(),
            last_roster: None,
        }
    }

    /// Converges the live worker set on the current roster.
    ///
    /// When the fetch fails the last good roster stands in, so running
    /// workers are kept and cameras whose worker died are restarted.
    pub fn reconcile(&mut self) -> ReconcileReport {
        let mut report = ReconcileReport {
            reaped: self.reap_stopped(),
            ..Default::default()
        };

        let roster = match self.source.fetch_roster() {
            Ok(roster) => {
                let roster = dedupe(roster);
                self.last_roster = Some(roster.clone());
                roster
            }
            Err(e) => {
                log::warn!(
                    "Camera roster unavailable, keeping {} workers: {e}",
                    self.workers.len()
                );
                report.failed_fetch = Some(e.to_string());
                match &self.last_roster {
                    Some(roster) => roster.clone(),
                    None => return report,
                }
            }
        };

        let wanted: BTreeSet<&CameraId> = roster.iter().map(|c| &c.camera_id).collect();
        let to_remove: Vec<CameraId> = self
            .workers
            .keys()
            .filter(|id| !wanted.contains(id))
            .cloned()
            .collect();
        for id in to_remove {
            if let Some(worker) = self.workers.remove(&id) {
                self.stop_worker(worker);
                report.removed.push(id);
            }
        }

        for camera in roster {
            if self.workers.contains_key(&camera.camera_id) {
                continue;
            }
            if self
                .stopping
                .iter()
                .any(|w| w.camera_id() == &camera.camera_id)
            {
                report.deferred.push(camera.camera_id);
                continue;
            }
            let id = camera.camera_id.clone();
            match self.spawn(camera) {
                Ok(worker) => {
                    self.workers.insert(id.clone(), worker);
                    report.added.push(id);
                }
                Err(e) => {
                    log::error!("[{id}] failed to spawn worker: {e}");
                    report.failed_start.push(id);
                }
            }
        }

        if !report.is_noop() {
            log::info!(
                "Reconciled fleet: +{} -{} reaped {} ({} live)",
                report.added.len(),
                report.removed.len(),
                report.reaped.len(),
                self.workers.len()
            );
        }
        report
    }

    pub fn live_camera_ids(&self) -> Vec<CameraId> {
        self.workers.keys().cloned().collect()
    }

    pub fn state_of(&self, camera_id: &CameraId) -> Option<WorkerState> {
        self.workers.get(camera_id).map(|w| w.state())
    }

    /// Cameras whose worker is currently STREAMING.
    pub fn streaming_camera_ids(&self) -> Vec<CameraId> {
        self.workers
            .iter()
            .filter(|(_, w)| w.state() == WorkerState::Streaming)
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// Stops every worker, waiting up to the stop timeout for each.
    pub fn shutdown(&mut self) {
        let mut workers: Vec<CameraStreamWorker> =
            std::mem::take(&mut self.workers).into_values().collect();
        workers.append(&mut self.stopping);
        log::info!("Stopping {} camera workers", workers.len());
        // Signal all first so they wind down in parallel.
        for worker in &workers {
            worker.cancel();
        }
        for worker in workers {
            self.stop_worker(worker);
        }
    }

    fn spawn(&self, camera: CameraDescriptor) -> std::io::Result<CameraStreamWorker> {
        let source = self.frame_sources.create(&camera);
        let logger = Box::new(LogPipelineLogger::new(camera.camera_id.as_str()));
        CameraStreamWorker::start(
            camera,
            source,
            self.pipeline.clone(),
            self.settings,
            self.events.clone(),
            logger,
        )
    }

    fn stop_worker(&mut self, worker: CameraStreamWorker) {
        if worker.stop(self.stop_timeout) {
            log::info!("[{}] worker stopped", worker.camera_id());
        } else {
            log::warn!(
                "[{}] worker did not stop within {:?}; parking it",
                worker.camera_id(),
                self.stop_timeout
            );
            self.stopping.push(worker);
        }
    }

    /// Drops workers that reached STOPPED on their own, plus parked workers
    /// that have finished stopping.
    fn reap_stopped(&mut self) -> Vec<CameraId> {
        self.stopping.retain(|w| !w.stop(Duration::ZERO));

        let dead: Vec<CameraId> = self
            .workers
            .iter()
            .filter(|(_, w)| w.state() == WorkerState::Stopped)
            .map(|(id, _)| id.clone())
            .collect();
        for id in &dead {
            if let Some(worker) = self.workers.remove(id) {
                worker.stop(Duration::ZERO);
                log::info!("[{id}] reaped stopped worker");
            }
        }
        dead
    }
}

impl Drop for FleetManager {
    fn drop(&mut self) {
        if !self.workers.is_empty() || !self.stopping.is_empty() {
            self.shutdown();
        }
    }
}

/// Keeps the first descriptor for each camera id.
fn dedupe(roster: Vec<CameraDescriptor>) -> Vec<CameraDescriptor> {
    let mut seen = BTreeSet::new();
    roster
        .into_iter()
        .filter(|camera| {
            let fresh = seen.insert(camera.camera_id.clone());
            if !fresh {
                log::warn!("Duplicate camera {} in roster ignored", camera.camera_id);
            }
            fresh
        })
        .collect()
}
