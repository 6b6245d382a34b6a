//! Decoded frames: timestamp + RGBA bitmap
//!
//! **Why**: The unit of exchange between readers, caches and consumers.
//! Consumers (viewport, annotation layer, exporters) expect 32bpp RGBA with
//! premultiplied alpha, so every backend converts to that layout once at decode time.
//!
//! **Used by**: Cache (working zone store), PreBuffer, readers, export
//!
//! # Ownership
//!
//! `VideoFrame` holds its bitmap behind an `Arc`. Handing `current()` to a
//! consumer clones the handle, not the pixels. The pixels are released when
//! the last handle is dropped (cache cleared and consumer done).

use std::sync::Arc;

use image::RgbaImage;

use super::info::Size;

/// Frame decoding errors
#[derive(Debug, Clone, PartialEq)]
pub enum FrameError {
    Io(String),
    Image(String),
    UnsupportedFormat(String),
    InvalidBuffer(String),
    NoSource,
}

impl std::fmt::Display for FrameError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FrameError::Io(e) => write!(f, "IO error: {}", e),
            FrameError::Image(e) => write!(f, "Image error: {}", e),
            FrameError::UnsupportedFormat(e) => write!(f, "Unsupported format: {}", e),
            FrameError::InvalidBuffer(e) => write!(f, "Invalid pixel buffer: {}", e),
            FrameError::NoSource => write!(f, "No source opened"),
        }
    }
}

impl std::error::Error for FrameError {}

impl From<std::io::Error> for FrameError {
    fn from(e: std::io::Error) -> Self {
        FrameError::Io(e.to_string())
    }
}

impl From<image::ImageError> for FrameError {
    fn from(e: image::ImageError) -> Self {
        match e {
            image::ImageError::Unsupported(u) => FrameError::UnsupportedFormat(u.to_string()),
            image::ImageError::IoError(io) => FrameError::Io(io.to_string()),
            other => FrameError::Image(other.to_string()),
        }
    }
}

/// 32bpp RGBA bitmap, premultiplied alpha, rows tightly packed.
#[derive(Debug, Clone, PartialEq)]
pub struct Bitmap {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
}

impl Bitmap {
    /// Transparent black bitmap.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            pixels: vec![0u8; width as usize * height as usize * 4],
        }
    }

    /// Wrap an already premultiplied RGBA buffer.
    pub fn from_premultiplied(width: u32, height: u32, pixels: Vec<u8>) -> Result<Self, FrameError> {
        let expected = width as usize * height as usize * 4;
        if pixels.len() != expected {
            return Err(FrameError::InvalidBuffer(format!(
                "{}x{} needs {} bytes, got {}",
                width,
                height,
                expected,
                pixels.len()
            )));
        }
        Ok(Self { width, height, pixels })
    }

    /// Convert a straight-alpha image (as produced by the `image` crate).
    pub fn from_straight(img: RgbaImage) -> Self {
        let (width, height) = img.dimensions();
        let mut pixels = img.into_raw();
        for px in pixels.chunks_exact_mut(4) {
            let a = px[3] as u32;
            if a == 255 {
                continue;
            }
            px[0] = ((px[0] as u32 * a + 127) / 255) as u8;
            px[1] = ((px[1] as u32 * a + 127) / 255) as u8;
            px[2] = ((px[2] as u32 * a + 127) / 255) as u8;
        }
        Self { width, height, pixels }
    }

    /// Back to straight alpha, for encoders.
    pub fn to_straight(&self) -> RgbaImage {
        let mut pixels = self.pixels.clone();
        for px in pixels.chunks_exact_mut(4) {
            let a = px[3] as u32;
            if a == 255 || a == 0 {
                continue;
            }
            px[0] = ((px[0] as u32 * 255 + a / 2) / a).min(255) as u8;
            px[1] = ((px[1] as u32 * 255 + a / 2) / a).min(255) as u8;
            px[2] = ((px[2] as u32 * 255 + a / 2) / a).min(255) as u8;
        }
        // Length checked at construction.
        RgbaImage::from_raw(self.width, self.height, pixels)
            .unwrap_or_else(|| RgbaImage::new(self.width, self.height))
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn size(&self) -> Size {
        Size::new(self.width, self.height)
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    /// Pixel at (x, y) as premultiplied RGBA.
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let idx = (y as usize * self.width as usize + x as usize) * 4;
        let px = &self.pixels[idx..idx + 4];
        Some([px[0], px[1], px[2], px[3]])
    }

    /// Memory size in bytes
    pub fn mem(&self) -> usize {
        self.pixels.len()
    }
}

/// Timestamped frame. Cheap to clone: the bitmap is shared.
#[derive(Debug, Clone)]
pub struct VideoFrame {
    timestamp: i64,
    image: Arc<Bitmap>,
}

impl VideoFrame {
    pub fn new(timestamp: i64, image: Bitmap) -> Self {
        Self {
            timestamp,
            image: Arc::new(image),
        }
    }

    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }

    pub fn image(&self) -> &Bitmap {
        &self.image
    }

    /// Shared handle on the bitmap, for consumers that outlive the frame.
    pub fn image_handle(&self) -> Arc<Bitmap> {
        Arc::clone(&self.image)
    }

    pub fn mem(&self) -> usize {
        self.image.mem()
    }
}
