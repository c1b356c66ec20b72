use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};

use crate::fleet::domain::camera::{CameraDescriptor, CameraId};
use crate::fleet::domain::worker_state::{StopReason, WorkerEvent, WorkerState, WorkerStatus};
use crate::pipeline::frame_pipeline::FramePipeline;
use crate::pipeline::pipeline_logger::PipelineLogger;
use crate::shared::config::SurveillanceConfig;
use crate::video::domain::frame_sample::FrameSample;
use crate::video::domain::frame_source::{CaptureError, FrameSource};

const FRAME_CHANNEL_CAPACITY: usize = 4;
/// Longest uninterrupted sleep while backing off, so a stop request is
/// noticed promptly.
const CANCEL_POLL: Duration = Duration::from_millis(50);

/// Per-worker tunables taken from [`SurveillanceConfig`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerSettings {
    pub sampling_stride: u64,
    pub frame_timeout: Duration,
    pub recovery_backoff: Duration,
    pub max_consecutive_failures: u32,
}

impl From<&SurveillanceConfig> for WorkerSettings {
    fn from(config: &SurveillanceConfig) -> Self {
        Self {
            sampling_stride: config.sampling_stride.max(1),
            frame_timeout: config.frame_timeout(),
            recovery_backoff: config.recovery_backoff(),
            max_consecutive_failures: config.max_consecutive_failures,
        }
    }
}

/// Owns one camera's capture loop on a dedicated thread.
///
/// Lifecycle: STARTING → STREAMING ⇄ RECOVERING → STOPPED. A separate
/// capture thread owns the [`FrameSource`] and forwards frames over a
/// bounded channel, which lets the worker bound every acquisition with a
/// timeout. The capture thread reconnects a stream that ends and releases
/// every successful open exactly once.
pub struct CameraStreamWorker {
    camera: CameraDescriptor,
    status: Arc<WorkerStatus>,
    cancelled: Arc<AtomicBool>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl CameraStreamWorker {
    pub fn start(
        camera: CameraDescriptor,
        source: Box<dyn FrameSource>,
        pipeline: FramePipeline,
        settings: WorkerSettings,
        events: Sender<WorkerEvent>,
        logger: Box<dyn PipelineLogger>,
    ) -> std::io::Result<Self> {
        let status = Arc::new(WorkerStatus::new());
        let cancelled = Arc::new(AtomicBool::new(false));

        let run = WorkerRun {
            camera: camera.clone(),
            pipeline,
            settings,
            events,
            logger,
            status: Arc::clone(&status),
            cancelled: Arc::clone(&cancelled),
        };
        let handle = std::thread::Builder::new()
            .name(format!("camera-{}", camera.camera_id))
            .spawn(move || run.run(source))?;

        Ok(Self {
            camera,
            status,
            cancelled,
            handle: Mutex::new(Some(handle)),
        })
    }

    pub fn camera(&self) -> &CameraDescriptor {
        &self.camera
    }

    pub fn camera_id(&self) -> &CameraId {
        &self.camera.camera_id
    }

    pub fn state(&self) -> WorkerState {
        self.status.get()
    }

    /// Requests a cooperative stop without waiting.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Requests a cooperative stop and waits up to `timeout` for STOPPED.
    ///
    /// Returns true once the worker is STOPPED. Calling it again after that
    /// does nothing.
    pub fn stop(&self, timeout: Duration) -> bool {
        self.cancel();
        if !self.status.wait_stopped(timeout) {
            return false;
        }
        let handle = self
            .handle
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                log::error!("[{}] worker thread panicked", self.camera.camera_id);
            }
        }
        true
    }
}

impl Drop for CameraStreamWorker {
    fn drop(&mut self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }
}

/// State moved into the worker thread.
struct WorkerRun {
    camera: CameraDescriptor,
    pipeline: FramePipeline,
    settings: WorkerSettings,
    events: Sender<WorkerEvent>,
    logger: Box<dyn PipelineLogger>,
    status: Arc<WorkerStatus>,
    cancelled: Arc<AtomicBool>,
}

impl WorkerRun {
    fn run(mut self, mut source: Box<dyn FrameSource>) {
        let id = self.camera.camera_id.clone();
        log::info!("[{id}] starting {} ({})", self.camera.label(), self.camera.stream_address);

        if let Err(e) = source.open() {
            source.release();
            log::error!("[{id}] failed to open stream: {e}");
            self.emit(WorkerEvent::StartFailed {
                camera_id: id.clone(),
                reason: e.to_string(),
            });
            self.finish(StopReason::StartFailed(e.to_string()));
            return;
        }

        let (frame_tx, frame_rx) = crossbeam_channel::bounded(FRAME_CHANNEL_CAPACITY);
        let (released_tx, released_rx) = crossbeam_channel::bounded::<()>(1);
        let capture = match spawn_capture(
            source,
            id.clone(),
            frame_tx,
            released_tx,
            Arc::clone(&self.cancelled),
            self.settings.recovery_backoff,
        ) {
            Ok(handle) => handle,
            Err(e) => {
                log::error!("[{id}] failed to spawn capture thread: {e}");
                self.emit(WorkerEvent::StartFailed {
                    camera_id: id.clone(),
                    reason: e.to_string(),
                });
                self.finish(StopReason::StartFailed(e.to_string()));
                return;
            }
        };

        self.set_state(WorkerState::Streaming);
        let reason = self.stream(&frame_rx);

        // Unblock the capture thread and wait for it to release the source.
        self.cancelled.store(true, Ordering::SeqCst);
        drop(frame_rx);
        let wait = self.settings.frame_timeout + CANCEL_POLL;
        if released_rx.recv_timeout(wait).is_ok() {
            let _ = capture.join();
        } else {
            log::warn!("[{id}] capture thread still blocked after {wait:?}; detaching");
        }

        self.finish(reason);
    }

    /// STREAMING/RECOVERING loop. Returns why streaming ended.
    fn stream(&mut self, frames: &Receiver<Result<FrameSample, CaptureError>>) -> StopReason {
        let id = self.camera.camera_id.clone();
        let stride = self.settings.sampling_stride;
        let mut frame_count: u64 = 0;
        let mut consecutive_failures: u32 = 0;

        loop {
            if self.cancelled.load(Ordering::SeqCst) {
                return StopReason::Requested;
            }

            let failure = match frames.recv_timeout(self.settings.frame_timeout) {
                Ok(Ok(sample)) => {
                    if consecutive_failures > 0 {
                        log::info!("[{id}] stream recovered after {consecutive_failures} failures");
                        consecutive_failures = 0;
                        self.set_state(WorkerState::Streaming);
                    }
                    frame_count += 1;
                    let sampled = frame_count % stride == 0;
                    self.logger.frame(sampled);
                    if sampled {
                        let report = self.pipeline.process(&self.camera, &sample, self.logger.as_mut());
                        if report.alerts > 0 {
                            log::info!("[{id}] frame {frame_count}: {} alert(s)", report.alerts);
                        }
                    }
                    continue;
                }
                Ok(Err(e)) => e.to_string(),
                Err(RecvTimeoutError::Timeout) => {
                    CaptureError::Timeout(self.settings.frame_timeout).to_string()
                }
                Err(RecvTimeoutError::Disconnected) => CaptureError::Closed.to_string(),
            };

            consecutive_failures += 1;
            log::warn!(
                "[{id}] frame acquisition failed ({consecutive_failures}/{}): {failure}",
                self.settings.max_consecutive_failures
            );
            if consecutive_failures > self.settings.max_consecutive_failures {
                log::error!("[{id}] too many consecutive failures, stopping");
                return StopReason::TooManyFailures(consecutive_failures);
            }
            self.set_state(WorkerState::Recovering);
            if !self.backoff() {
                return StopReason::Requested;
            }
        }
    }

    /// Sleeps for the recovery backoff; false if cancelled meanwhile.
    fn backoff(&self) -> bool {
        sleep_unless_cancelled(self.settings.recovery_backoff, &self.cancelled)
    }

    fn set_state(&self, state: WorkerState) {
        if self.status.transition(state) {
            log::debug!("[{}] -> {state}", self.camera.camera_id);
            self.emit(WorkerEvent::StateChanged {
                camera_id: self.camera.camera_id.clone(),
                state,
            });
        }
    }

    fn finish(&mut self, reason: StopReason) {
        self.logger.summary();
        log::info!("[{}] stopped: {reason:?}", self.camera.camera_id);
        self.set_state(WorkerState::Stopped);
        self.emit(WorkerEvent::Stopped {
            camera_id: self.camera.camera_id.clone(),
            reason,
        });
    }

    fn emit(&self, event: WorkerEvent) {
        // Supervisor gone means shutdown; nothing to report to.
        let _ = self.events.send(event);
    }
}

/// Reads frames until cancelled or the worker hangs up, then releases the
/// source and signals `released`.
///
/// A stream that ends (dropped connection, closed socket) is released and
/// reopened after `backoff`; each end and each failed reopen is forwarded so
/// it counts against the worker's failure budget.
fn spawn_capture(
    mut source: Box<dyn FrameSource>,
    camera_id: CameraId,
    frame_tx: Sender<Result<FrameSample, CaptureError>>,
    released: Sender<()>,
    cancelled: Arc<AtomicBool>,
    backoff: Duration,
) -> std::io::Result<JoinHandle<()>> {
    std::thread::Builder::new()
        .name(format!("capture-{camera_id}"))
        .spawn(move || {
            let mut is_open = true;
            while !cancelled.load(Ordering::SeqCst) {
                if !is_open {
                    if !sleep_unless_cancelled(backoff, &cancelled) {
                        break;
                    }
                    match source.open() {
                        Ok(()) => {
                            log::info!("[{camera_id}] stream reopened");
                            is_open = true;
                        }
                        Err(e) => {
                            source.release();
                            if frame_tx.send(Err(e)).is_err() {
                                break;
                            }
                            continue;
                        }
                    }
                }

                let result = source
                    .read()
                    .map(|frame| FrameSample::capture(frame, camera_id.clone()));
                let ended = matches!(
                    result,
                    Err(CaptureError::EndOfStream) | Err(CaptureError::Closed)
                );
                if ended {
                    log::warn!("[{camera_id}] stream ended; reconnecting");
                    source.release();
                    is_open = false;
                }
                if frame_tx.send(result).is_err() {
                    break;
                }
            }
            if is_open {
                source.release();
            }
            let _ = released.send(());
        })
}

/// Sleeps for `duration` in short slices; false if cancelled meanwhile.
fn sleep_unless_cancelled(duration: Duration, cancelled: &AtomicBool) -> bool {
    let deadline = Instant::now() + duration;
    loop {
        if cancelled.load(Ordering::SeqCst) {
            return false;
        }
        let now = Instant::now();
        if now >= deadline {
            return true;
        }
        std::thread::sleep((deadline - now).min(CANCEL_POLL));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::alerting::alert_dispatcher::AlertDispatcher;
    use crate::alerting::infrastructure::log_alert_sink::LogAlertSink;
    use crate::pipeline::pipeline_logger::NullPipelineLogger;
    use crate::recognition::domain::embedding::DistanceMetric;
    use crate::recognition::identity_matcher::IdentityMatcher;
    use crate::test_support::{
        registry_with, AfterScript, FixedPersonDetector, RedChannelEmbedder, ScriptedFrameSource,
        SourceCounters, WholeCropLocator,
    };

    fn settings(stride: u64, max_failures: u32) -> WorkerSettings {
        WorkerSettings {
            sampling_stride: stride,
            frame_timeout: Duration::from_millis(500),
            recovery_backoff: Duration::from_millis(5),
            max_consecutive_failures: max_failures,
        }
    }

    fn pipeline(detector: Arc<FixedPersonDetector>, sink: Arc<LogAlertSink>) -> FramePipeline {
        let matcher = IdentityMatcher::new(
            Arc::new(WholeCropLocator),
            Arc::new(RedChannelEmbedder),
            registry_with(&[("A", &[0.0, 0.0])]),
            0.45,
            DistanceMetric::Euclidean,
        )
        .unwrap();
        FramePipeline::new(
            detector,
            Arc::new(matcher),
            Arc::new(AlertDispatcher::new(sink, Duration::from_secs(10))),
        )
    }

    struct Harness {
        worker: CameraStreamWorker,
        events: Receiver<WorkerEvent>,
        counters: Arc<SourceCounters>,
        detector: Arc<FixedPersonDetector>,
        sink: Arc<LogAlertSink>,
    }

    fn start(source: ScriptedFrameSource, counters: Arc<SourceCounters>, settings: WorkerSettings) -> Harness {
        let (tx, rx) = crossbeam_channel::unbounded();
        let detector = Arc::new(FixedPersonDetector::new(0.9));
        let sink = Arc::new(LogAlertSink::new());
        let worker = CameraStreamWorker::start(
            CameraDescriptor::new("cam1", "Gate", "North", "rtsp://cam1"),
            Box::new(source),
            pipeline(Arc::clone(&detector), Arc::clone(&sink)),
            settings,
            tx,
            Box::new(NullPipelineLogger),
        )
        .unwrap();
        Harness {
            worker,
            events: rx,
            counters,
            detector,
            sink,
        }
    }

    fn drain(events: &Receiver<WorkerEvent>) -> Vec<WorkerEvent> {
        events.try_iter().collect()
    }

    #[test]
    fn test_open_failure_stops_and_reports() {
        let counters = Arc::new(SourceCounters::default());
        let h = start(
            ScriptedFrameSource::failing_open(Arc::clone(&counters)),
            Arc::clone(&counters),
            settings(1, 3),
        );
        assert!(h.worker.stop(Duration::from_secs(5)));
        assert_eq!(h.worker.state(), WorkerState::Stopped);

        let events = drain(&h.events);
        assert!(events
            .iter()
            .any(|e| matches!(e, WorkerEvent::StartFailed { .. })));
        assert!(events.iter().any(|e| matches!(
            e,
            WorkerEvent::Stopped {
                reason: StopReason::StartFailed(_),
                ..
            }
        )));
        assert!(!events.iter().any(|e| matches!(
            e,
            WorkerEvent::StateChanged {
                state: WorkerState::Streaming,
                ..
            }
        )));
        assert_eq!(h.counters.releases.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_only_every_nth_frame_is_processed() {
        let counters = Arc::new(SourceCounters::default());
        let script = (0..9).map(|_| Ok(90)).collect();
        let h = start(
            ScriptedFrameSource::new(script, AfterScript::EndOfStream, Arc::clone(&counters)),
            Arc::clone(&counters),
            settings(3, 0),
        );
        assert!(h.worker.status.wait_stopped(Duration::from_secs(5)));
        assert_eq!(h.detector.calls.load(Ordering::SeqCst), 3);
        assert_eq!(
            h.counters.releases.load(Ordering::SeqCst),
            h.counters.opens.load(Ordering::SeqCst)
        );
    }

    #[test]
    fn test_repeated_failures_go_through_recovering_to_stopped() {
        let counters = Arc::new(SourceCounters::default());
        let h = start(
            ScriptedFrameSource::new(vec![Ok(90)], AfterScript::Fail, Arc::clone(&counters)),
            Arc::clone(&counters),
            settings(1, 2),
        );
        assert!(h.worker.status.wait_stopped(Duration::from_secs(5)));

        let events = drain(&h.events);
        let states: Vec<WorkerState> = events
            .iter()
            .filter_map(|e| match e {
                WorkerEvent::StateChanged { state, .. } => Some(*state),
                _ => None,
            })
            .collect();
        assert_eq!(
            states,
            vec![WorkerState::Streaming, WorkerState::Recovering, WorkerState::Stopped]
        );
        assert!(events.iter().any(|e| matches!(
            e,
            WorkerEvent::Stopped {
                reason: StopReason::TooManyFailures(3),
                ..
            }
        )));
        assert_eq!(h.counters.releases.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_transient_failure_recovers_to_streaming() {
        let counters = Arc::new(SourceCounters::default());
        let h = start(
            ScriptedFrameSource::new(
                vec![Ok(90), Err(()), Ok(90)],
                AfterScript::Stream,
                Arc::clone(&counters),
            ),
            Arc::clone(&counters),
            settings(1, 2),
        );
        let deadline = Instant::now() + Duration::from_secs(5);
        while h.counters.reads.load(Ordering::SeqCst) < 10 && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(h.worker.state(), WorkerState::Streaming);
        assert!(h.worker.stop(Duration::from_secs(5)));

        let states: Vec<WorkerState> = drain(&h.events)
            .into_iter()
            .filter_map(|e| match e {
                WorkerEvent::StateChanged { state, .. } => Some(state),
                _ => None,
            })
            .collect();
        assert_eq!(
            states,
            vec![
                WorkerState::Streaming,
                WorkerState::Recovering,
                WorkerState::Streaming,
                WorkerState::Stopped
            ]
        );
    }

    fn states(events: &[WorkerEvent]) -> Vec<WorkerState> {
        events
            .iter()
            .filter_map(|e| match e {
                WorkerEvent::StateChanged { state, .. } => Some(*state),
                _ => None,
            })
            .collect()
    }

    fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        false
    }

    #[test]
    fn test_dropped_stream_is_reopened_and_resumes() {
        let counters = Arc::new(SourceCounters::default());
        let h = start(
            ScriptedFrameSource::new(
                vec![Ok(90), Ok(90)],
                AfterScript::DropOnce,
                Arc::clone(&counters),
            ),
            Arc::clone(&counters),
            settings(1, 3),
        );
        assert!(wait_until(|| h.detector.calls.load(Ordering::SeqCst) >= 6));
        assert_eq!(h.worker.state(), WorkerState::Streaming);
        assert_eq!(h.counters.opens.load(Ordering::SeqCst), 2);

        assert!(h.worker.stop(Duration::from_secs(5)));
        assert_eq!(
            states(&drain(&h.events)),
            vec![
                WorkerState::Streaming,
                WorkerState::Recovering,
                WorkerState::Streaming,
                WorkerState::Stopped
            ]
        );
        assert_eq!(h.counters.releases.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_stalled_source_times_out_and_stops_without_waiting_for_it() {
        let counters = Arc::new(SourceCounters::default());
        let started = Instant::now();
        let h = start(
            ScriptedFrameSource::new(
                vec![Ok(90)],
                AfterScript::Stall(Duration::from_secs(2)),
                Arc::clone(&counters),
            ),
            Arc::clone(&counters),
            WorkerSettings {
                sampling_stride: 1,
                frame_timeout: Duration::from_millis(100),
                recovery_backoff: Duration::from_millis(5),
                max_consecutive_failures: 1,
            },
        );
        assert!(h.worker.status.wait_stopped(Duration::from_secs(5)));
        assert!(started.elapsed() < Duration::from_millis(1500));

        let events = drain(&h.events);
        assert_eq!(
            states(&events),
            vec![WorkerState::Streaming, WorkerState::Recovering, WorkerState::Stopped]
        );
        assert!(events.iter().any(|e| matches!(
            e,
            WorkerEvent::Stopped {
                reason: StopReason::TooManyFailures(2),
                ..
            }
        )));

        // The detached capture thread releases once its read returns.
        assert!(wait_until(|| h.counters.releases.load(Ordering::SeqCst) == 1));
    }

    #[test]
    fn test_stop_during_recovery_backoff_is_prompt() {
        let counters = Arc::new(SourceCounters::default());
        let h = start(
            ScriptedFrameSource::new(vec![Ok(90), Err(())], AfterScript::Stream, Arc::clone(&counters)),
            Arc::clone(&counters),
            WorkerSettings {
                sampling_stride: 1,
                frame_timeout: Duration::from_millis(500),
                recovery_backoff: Duration::from_secs(10),
                max_consecutive_failures: 3,
            },
        );
        assert!(wait_until(|| h.worker.state() == WorkerState::Recovering));

        let stop_requested = Instant::now();
        assert!(h.worker.stop(Duration::from_secs(5)));
        assert!(stop_requested.elapsed() < Duration::from_secs(1));

        assert!(drain(&h.events).iter().any(|e| matches!(
            e,
            WorkerEvent::Stopped {
                reason: StopReason::Requested,
                ..
            }
        )));
        assert_eq!(h.counters.opens.load(Ordering::SeqCst), 1);
        assert_eq!(h.counters.releases.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_stop_is_idempotent_and_releases_once() {
        let counters = Arc::new(SourceCounters::default());
        let h = start(
            ScriptedFrameSource::new(Vec::new(), AfterScript::Stream, Arc::clone(&counters)),
            Arc::clone(&counters),
            settings(1, 3),
        );
        assert!(h.worker.stop(Duration::from_secs(5)));
        let events_after_first = drain(&h.events).len();
        assert!(h.worker.stop(Duration::from_secs(5)));
        assert!(h.worker.stop(Duration::from_millis(1)));

        assert_eq!(h.worker.state(), WorkerState::Stopped);
        assert!(events_after_first > 0);
        assert!(drain(&h.events).is_empty());
        assert_eq!(h.counters.releases.load(Ordering::SeqCst), 1);
        assert_eq!(h.counters.opens.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_matching_stream_alerts_once_within_cooldown() {
        let counters = Arc::new(SourceCounters::default());
        let script = (0..6).map(|_| Ok(30)).collect();
        let h = start(
            ScriptedFrameSource::new(script, AfterScript::EndOfStream, Arc::clone(&counters)),
            Arc::clone(&counters),
            settings(1, 0),
        );
        assert!(h.worker.status.wait_stopped(Duration::from_secs(5)));
        assert_eq!(h.detector.calls.load(Ordering::SeqCst), 6);
        assert_eq!(h.sink.len(), 1);
    }

    #[test]
    fn test_settings_from_config() {
        let config = SurveillanceConfig::default();
        let s = WorkerSettings::from(&config);
        assert_eq!(s.sampling_stride, 3);
        assert_eq!(s.max_consecutive_failures, 5);
        assert_eq!(s.frame_timeout, Duration::from_millis(5000));
    }
}
