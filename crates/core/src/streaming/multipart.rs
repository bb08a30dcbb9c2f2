use image::codecs::jpeg::JpegEncoder;
use image::ExtendedColorType;

use crate::shared::frame::Frame;

/// Multipart boundary separating stream chunks.
pub const BOUNDARY: &str = "frame";

/// `Content-Type` header value for a response carrying the chunk stream.
pub const STREAM_CONTENT_TYPE: &str = "multipart/x-mixed-replace; boundary=frame";

/// Encodes `frame` as one self-delimited stream chunk:
/// `--frame\r\nContent-Type: image/jpeg\r\n\r\n<jpeg>\r\n`.
pub fn encode_chunk(frame: &Frame, quality: u8) -> Result<Vec<u8>, Box<dyn std::error::Error>> {
    let jpeg = encode_jpeg(frame, quality)?;
    let header = format!("--{BOUNDARY}\r\nContent-Type: image/jpeg\r\n\r\n");

    let mut chunk = Vec::with_capacity(header.len() + jpeg.len() + 2);
    chunk.extend_from_slice(header.as_bytes());
    chunk.extend_from_slice(&jpeg);
    chunk.extend_from_slice(b"\r\n");
    Ok(chunk)
}

fn encode_jpeg(frame: &Frame, quality: u8) -> Result<Vec<u8>, Box<dyn std::error::Error>> {
    let color = match frame.channels() {
        1 => ExtendedColorType::L8,
        3 => ExtendedColorType::Rgb8,
        n => return Err(format!("Cannot JPEG-encode {n}-channel frame").into()),
    };
    let mut jpeg = Vec::new();
    JpegEncoder::new_with_quality(&mut jpeg, quality.clamp(1, 100)).encode(
        frame.data(),
        frame.width(),
        frame.height(),
        color,
    )?;
    Ok(jpeg)
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &[u8] = b"--frame\r\nContent-Type: image/jpeg\r\n\r\n";

    #[test]
    fn test_chunk_framing() {
        let frame = Frame::new(vec![128u8; 16 * 8 * 3], 16, 8, 3, 0);
        let chunk = encode_chunk(&frame, 80).unwrap();

        assert!(chunk.starts_with(HEADER));
        assert!(chunk.ends_with(b"\r\n"));
        let jpeg = &chunk[HEADER.len()..chunk.len() - 2];
        // JPEG SOI and EOI markers.
        assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);
        assert_eq!(&jpeg[jpeg.len() - 2..], &[0xFF, 0xD9]);
    }

    #[test]
    fn test_payload_decodes_to_frame_size() {
        let frame = Frame::new(vec![40u8; 32 * 24 * 3], 32, 24, 3, 0);
        let chunk = encode_chunk(&frame, 90).unwrap();
        let jpeg = &chunk[HEADER.len()..chunk.len() - 2];

        let decoded = image::load_from_memory(jpeg).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (32, 24));
    }

    #[test]
    fn test_rejects_rgba() {
        let frame = Frame::new(vec![0u8; 4 * 4 * 4], 4, 4, 4, 0);
        assert!(encode_chunk(&frame, 80).is_err());
    }
}
