use std::time::Duration;

use crate::fleet::domain::camera::CameraDescriptor;
use crate::shared::frame::Frame;
use crate::video::domain::frame_source::{CaptureError, FrameSource, FrameSourceFactory};

/// Decodes a live camera stream via ffmpeg-next (libavformat + libavcodec).
///
/// Network streams are opened over TCP with a socket timeout so a dead
/// camera surfaces as a read error. A purely numeric address names a local
/// capture device (`/dev/videoN`).
pub struct FfmpegStreamSource {
    address: String,
    timeout: Duration,
    state: Option<DecodeState>,
    frame_index: usize,
}

struct DecodeState {
    input: ffmpeg_next::format::context::Input,
    decoder: ffmpeg_next::decoder::Video,
    scaler: ffmpeg_next::software::scaling::Context,
    stream_index: usize,
    width: u32,
    height: u32,
}

// Safety: FfmpegStreamSource is only used from a single thread at a time.
// The raw pointers inside ffmpeg types are not shared across threads.
unsafe impl Send for FfmpegStreamSource {}

impl FfmpegStreamSource {
    pub fn new(address: impl Into<String>, timeout: Duration) -> Self {
        Self {
            address: address.into(),
            timeout,
            state: None,
            frame_index: 0,
        }
    }

    fn open_error(&self, reason: impl ToString) -> CaptureError {
        CaptureError::Open {
            address: self.address.clone(),
            reason: reason.to_string(),
        }
    }

    fn open_input(&self) -> Result<ffmpeg_next::format::context::Input, CaptureError> {
        let input = match local_device_path(&self.address) {
            Some(device) => {
                ffmpeg_next::format::input(&device).map_err(|e| self.open_error(e))?
            }
            None => {
                let mut options = ffmpeg_next::Dictionary::new();
                if self.address.starts_with("rtsp://") {
                    options.set("rtsp_transport", "tcp");
                }
                // Microseconds, applied to socket reads.
                let micros = self.timeout.as_micros().to_string();
                options.set("timeout", &micros);
                options.set("rw_timeout", &micros);
                ffmpeg_next::format::input_with_dictionary(&self.address, options)
                    .map_err(|e| self.open_error(e))?
            }
        };
        Ok(input)
    }
}

impl FrameSource for FfmpegStreamSource {
    fn open(&mut self) -> Result<(), CaptureError> {
        ffmpeg_next::init().map_err(|e| self.open_error(e))?;

        let input = self.open_input()?;
        let stream = input
            .streams()
            .best(ffmpeg_next::media::Type::Video)
            .ok_or_else(|| self.open_error("no video stream found"))?;
        let stream_index = stream.index();
        let codec_ctx = ffmpeg_next::codec::context::Context::from_parameters(stream.parameters())
            .map_err(|e| self.open_error(e))?;
        let decoder = codec_ctx.decoder().video().map_err(|e| self.open_error(e))?;

        let width = decoder.width();
        let height = decoder.height();
        let scaler = ffmpeg_next::software::scaling::Context::get(
            decoder.format(),
            width,
            height,
            ffmpeg_next::format::Pixel::RGB24,
            width,
            height,
            ffmpeg_next::software::scaling::Flags::BILINEAR,
        )
        .map_err(|e| self.open_error(e))?;

        log::info!("Opened stream {} ({width}x{height})", self.address);
        self.state = Some(DecodeState {
            input,
            decoder,
            scaler,
            stream_index,
            width,
            height,
        });
        self.frame_index = 0;
        Ok(())
    }

    fn read(&mut self) -> Result<Frame, CaptureError> {
        let state = self.state.as_mut().ok_or(CaptureError::Closed)?;
        let frame = state.next_frame(self.frame_index)?;
        self.frame_index += 1;
        Ok(frame)
    }

    fn release(&mut self) {
        if self.state.take().is_some() {
            log::debug!("Released stream {}", self.address);
        }
    }
}

impl DecodeState {
    fn try_receive(&mut self, index: usize) -> Result<Option<Frame>, CaptureError> {
        let mut decoded = ffmpeg_next::util::frame::video::Video::empty();
        if self.decoder.receive_frame(&mut decoded).is_err() {
            return Ok(None);
        }
        let mut rgb_frame = ffmpeg_next::util::frame::video::Video::empty();
        self.scaler
            .run(&decoded, &mut rgb_frame)
            .map_err(|e| CaptureError::Read(e.to_string()))?;
        let pixels = extract_rgb_pixels(&rgb_frame, self.width, self.height);
        Ok(Some(Frame::new(pixels, self.width, self.height, 3, index)))
    }

    fn next_frame(&mut self, index: usize) -> Result<Frame, CaptureError> {
        if let Some(frame) = self.try_receive(index)? {
            return Ok(frame);
        }
        loop {
            let mut packet = ffmpeg_next::Packet::empty();
            packet.read(&mut self.input).map_err(read_error)?;
            if packet.stream() != self.stream_index {
                continue;
            }
            if self.decoder.send_packet(&packet).is_err() {
                continue;
            }
            if let Some(frame) = self.try_receive(index)? {
                return Ok(frame);
            }
        }
    }
}

/// Demuxer EOF ends the stream; any other error (socket timeout, EIO) is a
/// read failure.
fn read_error(e: ffmpeg_next::Error) -> CaptureError {
    match e {
        ffmpeg_next::Error::Eof => CaptureError::EndOfStream,
        other => CaptureError::Read(other.to_string()),
    }
}

/// "0" -> "/dev/video0"; anything non-numeric is a URL or file path.
fn local_device_path(address: &str) -> Option<String> {
    let trimmed = address.trim();
    if !trimmed.is_empty() && trimmed.chars().all(|c| c.is_ascii_digit()) {
        Some(format!("/dev/video{trimmed}"))
    } else {
        None
    }
}

/// Copies pixel data from an ffmpeg frame into a contiguous RGB buffer,
/// dropping per-row stride padding.
fn extract_rgb_pixels(
    rgb_frame: &ffmpeg_next::util::frame::video::Video,
    width: u32,
    height: u32,
) -> Vec<u8> {
    let stride = rgb_frame.stride(0);
    let data = rgb_frame.data(0);
    let w = width as usize;
    let h = height as usize;

    let mut pixels = Vec::with_capacity(w * h * 3);
    for row in 0..h {
        let row_start = row * stride;
        pixels.extend_from_slice(&data[row_start..row_start + w * 3]);
    }
    pixels
}

/// Creates an [`FfmpegStreamSource`] per camera stream address.
pub struct FfmpegSourceFactory {
    timeout: Duration,
}

impl FfmpegSourceFactory {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl FrameSourceFactory for FfmpegSourceFactory {
    fn create(&self, camera: &CameraDescriptor) -> Box<dyn FrameSource> {
        Box::new(FfmpegStreamSource::new(
            camera.stream_address.clone(),
            self.timeout,
        ))
    }
}
