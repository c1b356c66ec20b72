use std::sync::Arc;
use std::time::Instant;

use crate::alerting::alert_dispatcher::{AlertDispatcher, DispatchOutcome};
use crate::alerting::domain::alert_event::AlertEvent;
use crate::detection::domain::detection_candidate::DetectionCandidate;
use crate::detection::domain::person_detector::PersonDetector;
use crate::fleet::domain::camera::CameraDescriptor;
use crate::pipeline::pipeline_logger::PipelineLogger;
use crate::recognition::domain::match_result::MatchResult;
use crate::recognition::identity_matcher::IdentityMatcher;
use crate::video::domain::frame_sample::FrameSample;

/// What one sampled frame produced.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameReport {
    pub persons: usize,
    pub matches: usize,
    pub alerts: usize,
}

/// detect → match → dispatch for one sampled frame.
///
/// Cheap to clone; every worker gets its own handle to the shared models,
/// registry and dispatcher.
#[derive(Clone)]
pub struct FramePipeline {
    detector: Arc<dyn PersonDetector>,
    matcher: Arc<IdentityMatcher>,
    dispatcher: Arc<AlertDispatcher>,
}

impl FramePipeline {
    pub fn new(
        detector: Arc<dyn PersonDetector>,
        matcher: Arc<IdentityMatcher>,
        dispatcher: Arc<AlertDispatcher>,
    ) -> Self {
        Self {
            detector,
            matcher,
            dispatcher,
        }
    }

    pub fn dispatcher(&self) -> &Arc<AlertDispatcher> {
        &self.dispatcher
    }

    /// Runs the sampled frame through detection and matching.
    ///
    /// Model errors skip the frame (or the one candidate) and are logged.
    pub fn process(
        &self,
        camera: &CameraDescriptor,
        sample: &FrameSample,
        logger: &mut dyn PipelineLogger,
    ) -> FrameReport {
        let mut report = FrameReport::default();

        let t0 = Instant::now();
        let candidates = match self.detector.detect(&sample.frame) {
            Ok(c) => c,
            Err(e) => {
                log::warn!("[{}] detection failed, skipping frame: {e}", camera.camera_id);
                logger.count("detect_errors");
                return report;
            }
        };
        logger.timing("detect", t0.elapsed().as_secs_f64() * 1000.0);
        logger.metric("persons", candidates.len() as f64);
        report.persons = candidates.len();

        for candidate in &candidates {
            let t_match = Instant::now();
            let result = match self.matcher.match_person(&candidate.crop) {
                Ok(Some(result)) => result,
                Ok(None) => continue,
                Err(e) => {
                    log::warn!("[{}] matching failed: {e}", camera.camera_id);
                    logger.count("match_errors");
                    continue;
                }
            };
            logger.timing("match", t_match.elapsed().as_secs_f64() * 1000.0);
            if !result.is_match() {
                log::debug!(
                    "[{}] nearest distance {:.3} above threshold",
                    camera.camera_id,
                    result.distance
                );
                continue;
            }
            report.matches += 1;
            logger.count("matches");

            let Some(event) = build_event(camera, sample, candidate, result) else {
                continue;
            };
            let t_dispatch = Instant::now();
            let outcome = self.dispatcher.dispatch(&event, sample.captured_at);
            logger.timing("dispatch", t_dispatch.elapsed().as_secs_f64() * 1000.0);
            match outcome {
                DispatchOutcome::Emitted => {
                    report.alerts += 1;
                    logger.count("alerts");
                }
                DispatchOutcome::Suppressed => logger.count("suppressed"),
                DispatchOutcome::DeliveryFailed => logger.count("delivery_failures"),
            }
        }

        report
    }
}

fn build_event(
    camera: &CameraDescriptor,
    sample: &FrameSample,
    candidate: &DetectionCandidate,
    result: MatchResult,
) -> Option<AlertEvent> {
    let identity_id = result.identity_id?;
    Some(AlertEvent {
        camera_id: camera.camera_id.clone(),
        camera_name: camera.display_name.clone(),
        camera_location: camera.location.clone(),
        identity_id,
        display_name: result.display_name.unwrap_or_default(),
        similarity: result.similarity,
        distance: result.distance,
        detection_confidence: candidate.confidence,
        bounding_box: candidate.bbox,
        timestamp: sample.wall_time,
        query: Some(result.query),
    })
}
