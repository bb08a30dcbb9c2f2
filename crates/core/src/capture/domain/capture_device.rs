use crate::shared::frame::Frame;

/// Source of live frames, typically a camera.
///
/// A device is acquired with `open` when a session starts, read repeatedly
/// by the capture worker, and released when the session stops. Implementations
/// should tolerate `release` on a device that was never opened.
pub trait CaptureDevice: Send {
    /// Acquires the device. Failure prevents the session from starting.
    fn open(&mut self) -> Result<(), Box<dyn std::error::Error>>;

    /// Grabs the next frame. Errors are treated as transient: the caller
    /// skips the cycle and tries again.
    fn read(&mut self) -> Result<Frame, Box<dyn std::error::Error>>;

    fn release(&mut self);
}
