use std::time::Duration;

use crate::capture::domain::capture_device::CaptureDevice;
use crate::pipeline::frame_queue::FrameSender;
use crate::pipeline::worker::{spawn_worker, WorkerHandle};
use crate::shared::cancellation::CancellationToken;

/// Starts the capture loop on an already opened device.
///
/// Each iteration reads one frame, offers it to the queue and pauses for
/// `interval`. Read errors and frames whose buffer does not match their
/// dimensions skip the iteration. The device is released on the
/// worker thread when the loop ends, panics included, and is handed back
/// through the returned handle.
pub fn spawn_capture_worker(
    device: Box<dyn CaptureDevice>,
    frames: FrameSender,
    token: CancellationToken,
    interval: Duration,
) -> WorkerHandle<Box<dyn CaptureDevice>> {
    spawn_worker("capture", device, move |device| {
        let mut device = ReleaseOnExit(device.as_mut());
        let mut next_index = 0usize;
        while !token.is_cancelled() {
            match device.0.read() {
                Ok(frame) => match frame.validate() {
                    Ok(()) => {
                        // The receiving end drops frames it has no room for.
                        frames.offer(frame.with_index(next_index));
                        next_index += 1;
                    }
                    Err(e) => log::warn!("Discarding malformed frame: {e}"),
                },
                Err(e) => log::debug!("Capture read failed, retrying: {e}"),
            }
            if token.wait(interval) {
                break;
            }
        }
        log::info!(
            "Capture stopped after {next_index} frames ({} dropped)",
            frames.stats().dropped()
        );
    })
}

struct ReleaseOnExit<'a>(&'a mut dyn CaptureDevice);

impl Drop for ReleaseOnExit<'_> {
    fn drop(&mut self) {
        self.0.release();
    }
}
