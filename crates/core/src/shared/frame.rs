use std::time::Instant;

use ndarray::ArrayView3;

use crate::shared::bounding_box::BoundingBox;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("frame buffer holds {actual} bytes but {width}x{height}x{channels} needs {expected}")]
pub struct FrameSizeError {
    pub actual: usize,
    pub expected: usize,
    pub width: u32,
    pub height: u32,
    pub channels: u8,
}

/// A single captured frame: contiguous RGB bytes in row-major order.
///
/// Frames move between pipeline stages by value; a stage that needs to keep
/// a frame after handing it on must clone it.
#[derive(Clone, Debug)]
pub struct Frame {
    data: Vec<u8>,
    width: u32,
    height: u32,
    channels: u8,
    index: usize,
    captured_at: Instant,
}

impl Frame {
    /// Builds a frame from a buffer known to match its dimensions.
    ///
    /// Use [`Frame::try_new`] for buffers coming from devices.
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
            captured_at: Instant::now(),
        }
    }

    /// Builds a frame, rejecting a buffer whose length does not match
    /// `width * height * channels`.
    pub fn try_new(
        data: Vec<u8>,
        width: u32,
        height: u32,
        channels: u8,
        index: usize,
    ) -> Result<Self, FrameSizeError> {
        check_size(data.len(), width, height, channels)?;
        Ok(Self::new(data, width, height, channels, index))
    }

    /// Checks that the buffer still matches the frame's dimensions.
    pub fn validate(&self) -> Result<(), FrameSizeError> {
        check_size(self.data.len(), self.width, self.height, self.channels)
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
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

    pub fn captured_at(&self) -> Instant {
        self.captured_at
    }

    /// Re-stamps the frame with its position in the capture sequence.
    pub fn with_index(mut self, index: usize) -> Self {
        self.index = index;
        self
    }

    pub fn as_ndarray(&self) -> ArrayView3<'_, u8> {
        ArrayView3::from_shape(self.shape(), &self.data)
            .expect("Frame data length must match dimensions")
    }

    /// Copies the pixels under `bbox` into a new frame.
    ///
    /// The box is clamped to the frame first; returns `None` when nothing
    /// of it lies inside the frame or the buffer is too short for it.
    pub fn crop(&self, bbox: &BoundingBox) -> Option<Frame> {
        let clamped = bbox.clamp_to(self.width, self.height)?;
        let channels = self.channels as usize;
        let fw = self.width as usize;
        let (x, y) = (clamped.x as usize, clamped.y as usize);
        let (w, h) = (clamped.width as usize, clamped.height as usize);

        let mut data = Vec::with_capacity(w * h * channels);
        for row in y..y + h {
            let start = (row * fw + x) * channels;
            data.extend_from_slice(self.data.get(start..start + w * channels)?);
        }

        Some(Frame {
            data,
            width: w as u32,
            height: h as u32,
            channels: self.channels,
            index: self.index,
            captured_at: self.captured_at,
        })
    }

    fn shape(&self) -> (usize, usize, usize) {
        (
            self.height as usize,
            self.width as usize,
            self.channels as usize,
        )
    }
}

fn check_size(actual: usize, width: u32, height: u32, channels: u8) -> Result<(), FrameSizeError> {
    let expected = (width as usize) * (height as usize) * (channels as usize);
    if actual != expected {
        return Err(FrameSizeError {
            actual,
            expected,
            width,
            height,
            channels,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gradient_frame(width: u32, height: u32) -> Frame {
        // Each pixel's R channel holds its column, G its row.
        let mut data = Vec::with_capacity((width * height * 3) as usize);
        for row in 0..height {
            for col in 0..width {
                data.extend_from_slice(&[col as u8, row as u8, 0]);
            }
        }
        Frame::new(data, width, height, 3, 0)
    }

    #[test]
    fn test_construction_and_accessors() {
        let data = vec![0u8; 12]; // 2x2x3
        let frame = Frame::new(data.clone(), 2, 2, 3, 5);
        assert_eq!(frame.width(), 2);
        assert_eq!(frame.height(), 2);
        assert_eq!(frame.channels(), 3);
        assert_eq!(frame.index(), 5);
        assert_eq!(frame.data(), &data[..]);
    }

    #[test]
    fn test_clone_is_independent() {
        let frame = Frame::new(vec![100u8; 12], 2, 2, 3, 0);
        let mut cloned = frame.clone();
        cloned.data_mut()[0] = 0;
        assert_eq!(frame.data()[0], 100);
        assert_eq!(cloned.data()[0], 0);
    }

    #[test]
    #[should_panic(expected = "data length must equal width * height * channels")]
    fn test_mismatched_data_length_panics_in_debug() {
        Frame::new(vec![0u8; 10], 2, 2, 3, 0);
    }

    #[test]
    fn test_try_new_rejects_wrong_length() {
        let err = Frame::try_new(vec![0u8; 10], 2, 2, 3, 0).unwrap_err();
        assert_eq!(err.actual, 10);
        assert_eq!(err.expected, 12);
        assert!(Frame::try_new(vec![0u8; 12], 2, 2, 3, 0).is_ok());
    }

    #[test]
    fn test_validate_and_crop_on_short_buffer() {
        let mut frame = gradient_frame(10, 10);
        frame.data.truncate(150);
        assert!(frame.validate().is_err());
        // Rows past the end of the buffer are not readable.
        assert!(frame.crop(&BoundingBox::new(0, 8, 4, 2)).is_none());
        assert!(frame.crop(&BoundingBox::new(0, 0, 4, 2)).is_some());
    }

    #[test]
    fn test_with_index_keeps_timestamp() {
        let frame = Frame::new(vec![0u8; 3], 1, 1, 3, 0);
        let stamped = frame.captured_at();
        let frame = frame.with_index(42);
        assert_eq!(frame.index(), 42);
        assert_eq!(frame.captured_at(), stamped);
    }

    #[test]
    fn test_as_ndarray_pixel_access() {
        let frame = gradient_frame(4, 3);
        let arr = frame.as_ndarray();
        assert_eq!(arr.shape(), &[3, 4, 3]);
        assert_eq!(arr[[2, 1, 0]], 1); // column
        assert_eq!(arr[[2, 1, 1]], 2); // row
    }

    #[test]
    fn test_crop_copies_region() {
        let frame = gradient_frame(10, 10);
        let crop = frame.crop(&BoundingBox::new(2, 3, 4, 5)).unwrap();
        assert_eq!(crop.width(), 4);
        assert_eq!(crop.height(), 5);
        let arr = crop.as_ndarray();
        assert_eq!(arr[[0, 0, 0]], 2);
        assert_eq!(arr[[0, 0, 1]], 3);
        assert_eq!(arr[[4, 3, 0]], 5);
        assert_eq!(arr[[4, 3, 1]], 7);
    }

    #[test]
    fn test_crop_clamps_to_frame() {
        let frame = gradient_frame(10, 10);
        let crop = frame.crop(&BoundingBox::new(-5, 8, 8, 8)).unwrap();
        assert_eq!(crop.width(), 3);
        assert_eq!(crop.height(), 2);
        assert_eq!(crop.as_ndarray()[[0, 0, 1]], 8);
    }

    #[test]
    fn test_crop_outside_frame_is_none() {
        let frame = gradient_frame(10, 10);
        assert!(frame.crop(&BoundingBox::new(20, 20, 5, 5)).is_none());
    }
}
