use std::sync::Once;

use nokhwa::pixel_format::RgbFormat;
use nokhwa::utils::{
    ApiBackend, CameraFormat, CameraIndex, FrameFormat, RequestedFormat, RequestedFormatType,
    Resolution,
};
use nokhwa::{nokhwa_initialize, query, Camera};

use crate::capture::domain::capture_device::CaptureDevice;
use crate::shared::constants::{CAPTURE_FPS, CAPTURE_HEIGHT, CAPTURE_WIDTH};
use crate::shared::frame::Frame;

static INIT: Once = Once::new();

/// Webcam capture through `nokhwa`.
///
/// `open` only checks that the camera exists. The stream itself is opened by
/// the first `read`, so the `!Send` camera handle is created, used and
/// dropped on the capture worker's thread.
///
/// Requests the closest format to 640x480 @ 24 fps; the driver may pick
/// something else, and frames carry whatever resolution it delivers.
pub struct NokhwaCamera {
    index: u32,
    opened: bool,
    camera: Option<Camera>,
    frames_read: usize,
}

// Safety: `camera` is only `Some` between the first `read` and `release`.
// The capture worker makes both calls on its own thread (release runs on
// that thread even when the loop panics), so the handle never crosses
// threads. The struct moves between threads only while `camera` is `None`.
unsafe impl Send for NokhwaCamera {}

impl NokhwaCamera {
    pub fn new(index: u32) -> Self {
        Self {
            index,
            opened: false,
            camera: None,
            frames_read: 0,
        }
    }

    fn open_stream(&self) -> Result<Camera, Box<dyn std::error::Error>> {
        let requested = RequestedFormat::new::<RgbFormat>(RequestedFormatType::Closest(
            CameraFormat::new(
                Resolution::new(CAPTURE_WIDTH, CAPTURE_HEIGHT),
                FrameFormat::MJPEG,
                CAPTURE_FPS,
            ),
        ));
        let mut camera = Camera::new(CameraIndex::Index(self.index), requested)?;
        camera.open_stream()?;
        log::info!(
            "Opened camera {} at {:?}",
            self.index,
            camera.camera_format()
        );
        Ok(camera)
    }
}

impl CaptureDevice for NokhwaCamera {
    fn open(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        // Asks for camera permission on macOS; a no-op elsewhere.
        INIT.call_once(|| {
            nokhwa_initialize(|granted| log::debug!("Camera access granted: {granted}"));
        });

        let wanted = CameraIndex::Index(self.index);
        let cameras = query(ApiBackend::Auto)?;
        if !cameras.iter().any(|info| info.index() == &wanted) {
            return Err(format!(
                "Camera {} not found ({} camera(s) available)",
                self.index,
                cameras.len()
            )
            .into());
        }
        self.opened = true;
        Ok(())
    }

    fn read(&mut self) -> Result<Frame, Box<dyn std::error::Error>> {
        if !self.opened {
            return Err("Camera is not open".into());
        }
        if self.camera.is_none() {
            self.camera = Some(self.open_stream()?);
        }
        let camera = self.camera.as_mut().ok_or("Camera is not open")?;
        let img = camera.frame()?.decode_image::<RgbFormat>()?;
        let (width, height) = img.dimensions();
        let frame = Frame::try_new(img.into_raw(), width, height, 3, self.frames_read)?;
        self.frames_read += 1;
        Ok(frame)
    }

    fn release(&mut self) {
        self.opened = false;
        if let Some(mut camera) = self.camera.take() {
            if let Err(e) = camera.stop_stream() {
                log::warn!("Failed to stop camera {}: {e}", self.index);
            }
        }
    }
}
