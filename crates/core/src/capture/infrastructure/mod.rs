pub mod image_sequence_device;
#[cfg(feature = "webcam")]
pub mod nokhwa_camera;
