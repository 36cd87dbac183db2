//! multipart/x-mixed-replace framing for MJPEG

use bytes::{BufMut, Bytes, BytesMut};

pub const BOUNDARY: &str = "frame";

/// Value of the response `Content-Type` header
pub fn content_type() -> String {
    format!("multipart/x-mixed-replace; boundary={BOUNDARY}")
}

/// Wrap one JPEG as a multipart part:
/// `--frame`, the part header, a blank line, the payload, then CRLF.
pub fn frame_part(jpeg: &[u8]) -> Bytes {
    let header = format!("--{BOUNDARY}\r\nContent-Type: image/jpeg\r\n\r\n");
    let mut part = BytesMut::with_capacity(header.len() + jpeg.len() + 2);
    part.put_slice(header.as_bytes());
    part.put_slice(jpeg);
    part.put_slice(b"\r\n");
    part.freeze()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_part_layout() {
        let part = frame_part(&[0xFF, 0xD8, 0xFF, 0xD9]);
        let expected: &[u8] = b"--frame\r\nContent-Type: image/jpeg\r\n\r\n\xFF\xD8\xFF\xD9\r\n";
        assert_eq!(&part[..], expected);
    }

    #[test]
    fn test_content_type() {
        assert_eq!(content_type(), "multipart/x-mixed-replace; boundary=frame");
    }
}
