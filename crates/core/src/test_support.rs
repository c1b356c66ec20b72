//! Fakes shared by the worker, fleet and supervisor tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::detection::domain::detection_candidate::{CropPolicy, DetectionCandidate};
use crate::detection::domain::face_locator::FaceLocator;
use crate::detection::domain::person_detector::PersonDetector;
use crate::fleet::domain::camera::{CameraDescriptor, CameraId};
use crate::fleet::domain::fleet_source::{CameraStatus, FleetSource};
use crate::recognition::domain::embedding::Embedding;
use crate::recognition::domain::face_embedder::FaceEmbedder;
use crate::recognition::domain::identity::{IdentityId, IdentityRecord};
use crate::recognition::domain::registry_source::RegistrySource;
use crate::recognition::face_registry::FaceRegistry;
use crate::shared::bounding_box::BoundingBox;
use crate::shared::frame::Frame;
use crate::shared::source_error::SourceError;
use crate::video::domain::frame_source::{CaptureError, FrameSource, FrameSourceFactory};

pub type BoxError = Box<dyn std::error::Error>;

/// 100x100 frame whose every red byte is `red`.
pub fn solid_frame(red: u8) -> Frame {
    let mut data = vec![0u8; 100 * 100 * 3];
    for px in data.chunks_exact_mut(3) {
        px[0] = red;
    }
    Frame::new(data, 100, 100, 3, 0)
}

struct StaticRegistrySource(Vec<IdentityRecord>);

impl RegistrySource for StaticRegistrySource {
    fn fetch(&self) -> Result<Vec<IdentityRecord>, SourceError> {
        Ok(self.0.clone())
    }

    fn name(&self) -> &str {
        "static"
    }
}

/// Loaded 2-d registry; each entry's id doubles as its display name.
pub fn registry_with(entries: &[(&str, &[f32])]) -> Arc<FaceRegistry> {
    let records = entries
        .iter()
        .map(|(id, values)| {
            IdentityRecord::new(IdentityId::new(*id), *id, Embedding::new(values.to_vec()))
        })
        .collect();
    let registry = FaceRegistry::new(
        Arc::new(StaticRegistrySource(records)),
        2,
        Duration::from_secs(30),
    );
    registry.load();
    Arc::new(registry)
}

/// One person covering the whole frame.
pub struct FixedPersonDetector {
    confidence: f64,
    pub calls: AtomicUsize,
}

impl FixedPersonDetector {
    pub fn new(confidence: f64) -> Self {
        Self {
            confidence,
            calls: AtomicUsize::new(0),
        }
    }
}

impl PersonDetector for FixedPersonDetector {
    fn detect(&self, frame: &Frame) -> Result<Vec<DetectionCandidate>, BoxError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let bbox = BoundingBox::new(0, 0, frame.width() as i32, frame.height() as i32);
        Ok(
            DetectionCandidate::from_frame(frame, bbox, self.confidence, &CropPolicy::new(50, 50))
                .into_iter()
                .collect(),
        )
    }
}

pub struct FailingDetector;

impl PersonDetector for FailingDetector {
    fn detect(&self, _frame: &Frame) -> Result<Vec<DetectionCandidate>, BoxError> {
        Err("model crashed".into())
    }
}

pub struct WholeCropLocator;

impl FaceLocator for WholeCropLocator {
    fn locate(&self, image: &Frame) -> Result<Option<BoundingBox>, BoxError> {
        Ok(Some(BoundingBox::new(
            0,
            0,
            image.width() as i32,
            image.height() as i32,
        )))
    }
}

/// Embeds a face as `[red / 100, 0]` using its first pixel.
pub struct RedChannelEmbedder;

impl FaceEmbedder for RedChannelEmbedder {
    fn dimension(&self) -> usize {
        2
    }

    fn embed(&self, face: &Frame) -> Result<Embedding, BoxError> {
        Ok(Embedding::new(vec![face.data()[0] as f32 / 100.0, 0.0]))
    }
}

/// What a scripted source does once its scripted reads are used up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AfterScript {
    /// Keep yielding frames.
    Stream,
    /// Fail every read.
    Fail,
    EndOfStream,
    /// End the stream once, then keep yielding frames after a reopen.
    DropOnce,
    /// Block each read for this long, then fail it.
    Stall(Duration),
}

#[derive(Default)]
pub struct SourceCounters {
    pub opens: AtomicUsize,
    pub reads: AtomicUsize,
    pub releases: AtomicUsize,
}

pub struct ScriptedFrameSource {
    open_fails: bool,
    script: VecDeque<Result<u8, ()>>,
    after: AfterScript,
    counters: Arc<SourceCounters>,
    released: bool,
}

impl ScriptedFrameSource {
    /// `script` entries: `Ok(red)` yields a frame, `Err(())` a read failure.
    pub fn new(script: Vec<Result<u8, ()>>, after: AfterScript, counters: Arc<SourceCounters>) -> Self {
        Self {
            open_fails: false,
            script: script.into(),
            after,
            counters,
            released: false,
        }
    }

    pub fn failing_open(counters: Arc<SourceCounters>) -> Self {
        Self {
            open_fails: true,
            ..Self::new(Vec::new(), AfterScript::Fail, counters)
        }
    }
}

impl FrameSource for ScriptedFrameSource {
    fn open(&mut self) -> Result<(), CaptureError> {
        self.counters.opens.fetch_add(1, Ordering::SeqCst);
        self.released = false;
        if self.open_fails {
            return Err(CaptureError::Open {
                address: "scripted".into(),
                reason: "device busy".into(),
            });
        }
        Ok(())
    }

    fn read(&mut self) -> Result<Frame, CaptureError> {
        self.counters.reads.fetch_add(1, Ordering::SeqCst);
        std::thread::sleep(Duration::from_millis(1));
        match self.script.pop_front() {
            Some(Ok(red)) => Ok(solid_frame(red)),
            Some(Err(())) => Err(CaptureError::Read("scripted failure".into())),
            None => match self.after {
                AfterScript::Stream => Ok(solid_frame(200)),
                AfterScript::Fail => Err(CaptureError::Read("scripted failure".into())),
                AfterScript::EndOfStream => Err(CaptureError::EndOfStream),
                AfterScript::DropOnce => {
                    self.after = AfterScript::Stream;
                    Err(CaptureError::EndOfStream)
                }
                AfterScript::Stall(duration) => {
                    std::thread::sleep(duration);
                    Err(CaptureError::Read("stalled read gave up".into()))
                }
            },
        }
    }

    fn release(&mut self) {
        if !self.released {
            self.released = true;
            self.counters.releases.fetch_add(1, Ordering::SeqCst);
        }
    }
}

/// Hands out streaming sources, except for cameras listed in `failing_open`.
#[derive(Default)]
pub struct FakeSourceFactory {
    pub counters: Arc<SourceCounters>,
    pub failing_open: Vec<String>,
    pub created: Mutex<Vec<CameraId>>,
}

impl FrameSourceFactory for FakeSourceFactory {
    fn create(&self, camera: &CameraDescriptor) -> Box<dyn FrameSource> {
        self.created.lock().unwrap().push(camera.camera_id.clone());
        let counters = Arc::clone(&self.counters);
        if self.failing_open.iter().any(|id| id == camera.camera_id.as_str()) {
            Box::new(ScriptedFrameSource::failing_open(counters))
        } else {
            Box::new(ScriptedFrameSource::new(Vec::new(), AfterScript::Stream, counters))
        }
    }
}

pub fn cameras(ids: &[&str]) -> Vec<CameraDescriptor> {
    ids.iter()
        .map(|id| CameraDescriptor::new(*id, id.to_uppercase(), "", format!("rtsp://{id}")))
        .collect()
}

/// Serves scripted rosters, repeating the last one.
pub struct ScriptedFleetSource {
    rosters: Mutex<VecDeque<Result<Vec<CameraDescriptor>, String>>>,
    pub reports: Mutex<Vec<(CameraId, CameraStatus)>>,
}

impl ScriptedFleetSource {
    pub fn new(rosters: Vec<Result<Vec<CameraDescriptor>, String>>) -> Self {
        Self {
            rosters: Mutex::new(rosters.into()),
            reports: Mutex::new(Vec::new()),
        }
    }

    pub fn reported(&self, id: &str, status: CameraStatus) -> bool {
        self.reports
            .lock()
            .unwrap()
            .iter()
            .any(|(c, s)| c.as_str() == id && *s == status)
    }
}

impl FleetSource for ScriptedFleetSource {
    fn fetch_roster(&self) -> Result<Vec<CameraDescriptor>, SourceError> {
        let mut rosters = self.rosters.lock().unwrap();
        let next = if rosters.len() > 1 {
            rosters.pop_front().unwrap()
        } else {
            rosters[0].clone()
        };
        next.map_err(SourceError::Unavailable)
    }

    fn report_status(
        &self,
        camera_id: &CameraId,
        status: CameraStatus,
        _at: DateTime<Utc>,
    ) -> Result<(), SourceError> {
        self.reports.lock().unwrap().push((camera_id.clone(), status));
        Ok(())
    }
}
