//! Captured frame representation

use bytes::Bytes;
use std::sync::Arc;
use std::time::Instant;

use crate::error::{CaptureError, CaptureResult};

/// Bytes per RGBA8 pixel
pub const RGBA_BYTES_PER_PIXEL: usize = 4;

/// An opaque drawable image
///
/// Cloning is cheap and keeps pointing at the same image, so consumers can
/// tell whether two frames are the very same source with [`Frame::ptr_eq`].
#[derive(Debug, Clone)]
pub struct Frame {
    inner: Arc<FrameInner>,
}

#[derive(Debug)]
struct FrameInner {
    width: u32,
    height: u32,
    pixels: Bytes,
}

impl Frame {
    /// Wrap tightly packed RGBA8 pixels
    pub fn from_rgba(width: u32, height: u32, pixels: impl Into<Bytes>) -> CaptureResult<Self> {
        let pixels = pixels.into();
        let expected = width as usize * height as usize * RGBA_BYTES_PER_PIXEL;

        if width == 0 || height == 0 {
            return Err(CaptureError::InvalidConfiguration {
                message: format!("frame size {}x{} is empty", width, height),
            });
        }

        if pixels.len() != expected {
            return Err(CaptureError::InvalidConfiguration {
                message: format!(
                    "frame data: expected {} bytes, got {}",
                    expected,
                    pixels.len()
                ),
            });
        }

        Ok(Self {
            inner: Arc::new(FrameInner {
                width,
                height,
                pixels,
            }),
        })
    }

    /// Single-colour frame
    pub fn solid(width: u32, height: u32, rgba: [u8; 4]) -> CaptureResult<Self> {
        let pixels: Vec<u8> = rgba
            .iter()
            .copied()
            .cycle()
            .take(width as usize * height as usize * RGBA_BYTES_PER_PIXEL)
            .collect();
        Self::from_rgba(width, height, pixels)
    }

    pub fn width(&self) -> u32 {
        self.inner.width
    }

    pub fn height(&self) -> u32 {
        self.inner.height
    }

    pub fn pixels(&self) -> &Bytes {
        &self.inner.pixels
    }

    /// RGBA value at `(x, y)`, `None` when out of bounds
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.inner.width || y >= self.inner.height {
            return None;
        }
        let offset = (y as usize * self.inner.width as usize + x as usize) * RGBA_BYTES_PER_PIXEL;
        let px = &self.inner.pixels[offset..offset + RGBA_BYTES_PER_PIXEL];
        Some([px[0], px[1], px[2], px[3]])
    }

    /// Whether both handles refer to the same underlying image
    pub fn ptr_eq(&self, other: &Frame) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

/// One captured frame as delivered to `frameCaptured` subscribers
///
/// Only valid for the duration of a dispatch; clone it to keep it.
#[derive(Debug, Clone)]
pub struct FrameEvent {
    pub frame: Frame,
    pub timestamp: Instant,
    /// Per-session tick sequence, starting at 1
    pub sequence: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_rgba_checks_length() {
        let err = Frame::from_rgba(2, 2, vec![0u8; 15]).unwrap_err();
        assert_eq!(
            err,
            CaptureError::InvalidConfiguration {
                message: "frame data: expected 16 bytes, got 15".to_string()
            }
        );
        assert!(Frame::from_rgba(0, 4, Vec::<u8>::new()).is_err());
    }

    #[test]
    fn test_clone_shares_identity() {
        let frame = Frame::solid(3, 2, [10, 20, 30, 255]).unwrap();
        let copy = frame.clone();
        let other = Frame::solid(3, 2, [10, 20, 30, 255]).unwrap();

        assert!(frame.ptr_eq(&copy));
        assert!(!frame.ptr_eq(&other));
        assert_eq!(frame.pixel(2, 1), Some([10, 20, 30, 255]));
        assert_eq!(frame.pixel(3, 0), None);
    }
}
