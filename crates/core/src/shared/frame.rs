use ndarray::ArrayView3;

use crate::shared::bounding_box::BoundingBox;

/// A single decoded camera frame: contiguous RGB bytes in row-major order.
///
/// Format conversion happens at I/O boundaries only; the domain layer
/// treats pixel data as opaque.
#[derive(Clone, Debug)]
pub struct Frame {
    data: Vec<u8>,
    width: u32,
    height: u32,
    channels: u8,
    index: usize,
}

impl Frame {
    pub fn new(data: Vec<u8>, width: u32, height: u32, channels: u8, index: usize) -> Self {
        debug_assert_eq!(
            data.len(),
            (width as usize) * (height as usize) * (channels as usize),
            "data length must equal width * height * channels"
        );
        Self {
            data,
            width,
            height,
            channels,
            index,
        }
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn channels(&self) -> u8 {
        self.channels
    }

    pub fn index(&self) -> usize {
        self.index
    }

    /// Copies the pixels inside `bbox` into a new frame.
    ///
    /// The box is clamped to the frame first; an empty intersection yields
    /// a zero-sized frame.
    pub fn crop(&self, bbox: &BoundingBox) -> Frame {
        let b = bbox.clamp_to(self.width, self.height);
        let w = b.width() as usize;
        let h = b.height() as usize;
        let c = self.channels as usize;
        let stride = self.width as usize * c;

        let mut data = Vec::with_capacity(w * h * c);
        for row in b.y1 as usize..b.y1 as usize + h {
            let start = row * stride + b.x1 as usize * c;
            data.extend_from_slice(&self.data[start..start + w * c]);
        }
        Frame::new(data, w as u32, h as u32, self.channels, self.index)
    }

    pub fn as_ndarray(&self) -> ArrayView3<'_, u8> {
        ArrayView3::from_shape(self.shape(), &self.data)
            .expect("Frame data length must match dimensions")
    }

    fn shape(&self) -> (usize, usize, usize) {
        (
            self.height as usize,
            self.width as usize,
            self.channels as usize,
        )
    }
}
