use std::fs;
use std::path::{Path, PathBuf};

use crate::capture::domain::capture_device::CaptureDevice;
use crate::shared::constants::IMAGE_EXTENSIONS;
use crate::shared::frame::Frame;

/// Replays a directory of still images as if they came from a camera.
///
/// Images are read in file-name order and the sequence loops forever.
/// Each image is decoded on demand with the `image` crate, so a broken
/// file surfaces as a transient read error rather than failing `open`.
pub struct ImageSequenceDevice {
    dir: PathBuf,
    size: Option<(u32, u32)>,
    paths: Vec<PathBuf>,
    cursor: usize,
    frames_read: usize,
    opened: bool,
}

impl ImageSequenceDevice {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            size: None,
            paths: Vec::new(),
            cursor: 0,
            frames_read: 0,
            opened: false,
        }
    }

    /// Resizes every frame to `width` x `height`, like a camera configured
    /// for a fixed resolution.
    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.size = Some((width, height));
        self
    }

    fn decode(&self, path: &Path) -> Result<Frame, Box<dyn std::error::Error>> {
        let img = image::open(path)?.into_rgb8();
        let img = match self.size {
            Some((w, h)) if img.dimensions() != (w, h) => {
                image::imageops::resize(&img, w, h, image::imageops::FilterType::Triangle)
            }
            _ => img,
        };
        let (width, height) = img.dimensions();
        Ok(Frame::try_new(img.into_raw(), width, height, 3, self.frames_read)?)
    }
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| IMAGE_EXTENSIONS.contains(&e.to_lowercase().as_str()))
        .unwrap_or(false)
}

impl CaptureDevice for ImageSequenceDevice {
    fn open(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        let mut paths: Vec<PathBuf> = fs::read_dir(&self.dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.is_file() && is_image(p))
            .collect();
        if paths.is_empty() {
            return Err(format!("No images found in {}", self.dir.display()).into());
        }
        paths.sort();

        log::info!(
            "Replaying {} images from {}",
            paths.len(),
            self.dir.display()
        );
        self.paths = paths;
        self.cursor = 0;
        self.opened = true;
        Ok(())
    }

    fn read(&mut self) -> Result<Frame, Box<dyn std::error::Error>> {
        if !self.opened {
            return Err("Image sequence device is not open".into());
        }
        let path = self.paths[self.cursor].clone();
        self.cursor = (self.cursor + 1) % self.paths.len();

        let frame = self.decode(&path)?;
        self.frames_read += 1;
        Ok(frame)
    }

    fn release(&mut self) {
        self.opened = false;
        self.paths.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_image(dir: &Path, name: &str, width: u32, height: u32, shade: u8) {
        let img = image::RgbImage::from_pixel(width, height, image::Rgb([shade, shade, shade]));
        img.save(dir.join(name)).unwrap();
    }

    #[test]
    fn test_open_fails_on_missing_dir() {
        let tmp = TempDir::new().unwrap();
        let mut device = ImageSequenceDevice::new(tmp.path().join("nope"));
        assert!(device.open().is_err());
    }

    #[test]
    fn test_open_fails_without_images() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("notes.txt"), "hi").unwrap();
        let mut device = ImageSequenceDevice::new(tmp.path());
        assert!(device.open().is_err());
    }

    #[test]
    fn test_read_before_open_is_error() {
        let tmp = TempDir::new().unwrap();
        let mut device = ImageSequenceDevice::new(tmp.path());
        assert!(device.read().is_err());
    }

    #[test]
    fn test_reads_in_name_order_and_loops() {
        let tmp = TempDir::new().unwrap();
        write_image(tmp.path(), "b.png", 4, 4, 200);
        write_image(tmp.path(), "a.png", 4, 4, 10);

        let mut device = ImageSequenceDevice::new(tmp.path());
        device.open().unwrap();

        let shades: Vec<u8> = (0..3).map(|_| device.read().unwrap().data()[0]).collect();
        assert_eq!(shades, vec![10, 200, 10]);
    }

    #[test]
    fn test_frames_are_indexed_sequentially() {
        let tmp = TempDir::new().unwrap();
        write_image(tmp.path(), "a.png", 4, 4, 10);

        let mut device = ImageSequenceDevice::new(tmp.path());
        device.open().unwrap();
        assert_eq!(device.read().unwrap().index(), 0);
        assert_eq!(device.read().unwrap().index(), 1);
    }

    #[test]
    fn test_resizes_to_requested_size() {
        let tmp = TempDir::new().unwrap();
        write_image(tmp.path(), "a.png", 8, 6, 10);

        let mut device = ImageSequenceDevice::new(tmp.path()).with_size(4, 3);
        device.open().unwrap();
        let frame = device.read().unwrap();
        assert_eq!((frame.width(), frame.height()), (4, 3));
    }

    #[test]
    fn test_release_makes_reads_fail() {
        let tmp = TempDir::new().unwrap();
        write_image(tmp.path(), "a.png", 4, 4, 10);

        let mut device = ImageSequenceDevice::new(tmp.path());
        device.open().unwrap();
        device.release();
        assert!(device.read().is_err());
    }
}
