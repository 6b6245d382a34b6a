//! Image file loader
//!
//! Unified interface for reading still images (PNG, JPEG, TIFF, TGA, BMP)
//! through the `image` crate, with the per-reader image adjustments applied
//! at decode time: aspect ratio correction, rotation and decoding size.
//! Output is always a premultiplied RGBA `Bitmap`.

use image::imageops::{self, FilterType};
use image::{ImageReader, RgbaImage};
use log::debug;
use std::path::Path;

use super::frame::{Bitmap, FrameError};
use super::info::Size;
use super::options::ImageRotation;

/// Extensions the loader can decode.
pub const IMAGE_EXTS: &[&str] = &["png", "jpg", "jpeg", "tif", "tiff", "tga", "bmp"];

/// Check if a path has a decodable image extension.
pub fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|s| s.to_str())
        .map(|s| IMAGE_EXTS.contains(&s.to_lowercase().as_str()))
        .unwrap_or(false)
}

/// Transforms applied after decoding, in order: aspect, rotation, decoding size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DecodeParams {
    /// Target size before rotation. `None` keeps the stored size.
    pub aspect_size: Option<Size>,
    pub rotation: ImageRotation,
    /// Final size after rotation. `None` keeps the reference size.
    pub decoding_size: Option<Size>,
}

/// Image loader
pub struct Loader;

impl Loader {
    /// Read image dimensions without decoding pixels.
    pub fn header(path: &Path) -> Result<Size, FrameError> {
        debug!("Reading image header: {}", path.display());

        let reader = ImageReader::open(path)?.with_guessed_format()?;
        let (width, height) = reader.into_dimensions()?;
        Ok(Size::new(width, height))
    }

    /// Load image file into a premultiplied bitmap.
    pub fn load(path: &Path, params: &DecodeParams) -> Result<Bitmap, FrameError> {
        debug!("Loading image: {}", path.display());

        let img = image::open(path)?.to_rgba8();
        Ok(Bitmap::from_straight(Self::transform(img, params)))
    }

    /// Load a downscaled preview that fits inside `max_size`.
    pub fn thumbnail(path: &Path, max_size: Size) -> Result<Bitmap, FrameError> {
        let img = image::open(path)?.to_rgba8();
        let size = Size::new(img.width(), img.height()).fit_within(max_size);
        if size.is_empty() {
            return Err(FrameError::Image(format!("Empty image: {}", path.display())));
        }
        let thumb = imageops::thumbnail(&img, size.width, size.height);
        Ok(Bitmap::from_straight(thumb))
    }

    /// Apply aspect, rotation and decoding size to a straight-alpha image.
    pub fn transform(mut img: RgbaImage, params: &DecodeParams) -> RgbaImage {
        if let Some(aspect) = params.aspect_size.filter(|s| !s.is_empty()) {
            if aspect.width != img.width() || aspect.height != img.height() {
                img = imageops::resize(&img, aspect.width, aspect.height, FilterType::Triangle);
            }
        }

        img = match params.rotation {
            ImageRotation::Rotate0 => img,
            ImageRotation::Rotate90 => imageops::rotate90(&img),
            ImageRotation::Rotate180 => imageops::rotate180(&img),
            ImageRotation::Rotate270 => imageops::rotate270(&img),
        };

        if let Some(target) = params.decoding_size.filter(|s| !s.is_empty()) {
            if target.width != img.width() || target.height != img.height() {
                img = imageops::resize(&img, target.width, target.height, FilterType::Triangle);
            }
        }

        img
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gradient(width: u32, height: u32) -> RgbaImage {
        RgbaImage::from_fn(width, height, |x, y| image::Rgba([x as u8, y as u8, 0, 255]))
    }

    #[test]
    fn test_extension_detection() {
        assert!(is_image(Path::new("shot.0001.PNG")));
        assert!(is_image(Path::new("a.jpeg")));
        assert!(!is_image(Path::new("movie.avi")));
        assert!(!is_image(Path::new("noext")));
    }

    #[test]
    fn test_rotation_swaps_dimensions() {
        let params = DecodeParams {
            rotation: ImageRotation::Rotate90,
            ..Default::default()
        };
        let out = Loader::transform(gradient(40, 10), &params);
        assert_eq!(out.dimensions(), (10, 40));
    }

    #[test]
    fn test_aspect_then_decoding_size() {
        let params = DecodeParams {
            aspect_size: Some(Size::new(80, 10)),
            rotation: ImageRotation::Rotate0,
            decoding_size: Some(Size::new(40, 5)),
        };
        let out = Loader::transform(gradient(40, 10), &params);
        assert_eq!(out.dimensions(), (40, 5));
    }

    #[test]
    fn test_round_trip_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("frame.png");
        gradient(16, 8).save(&path).unwrap();

        assert_eq!(Loader::header(&path).unwrap(), Size::new(16, 8));
        let bmp = Loader::load(&path, &DecodeParams::default()).unwrap();
        assert_eq!(bmp.size(), Size::new(16, 8));
        assert_eq!(bmp.pixel(3, 2), Some([3, 2, 0, 255]));

        let thumb = Loader::thumbnail(&path, Size::new(8, 8)).unwrap();
        assert_eq!(thumb.size(), Size::new(8, 4));
    }

    #[test]
    fn test_load_missing_file() {
        let result = Loader::load(Path::new("/nonexistent/path/test.png"), &DecodeParams::default());
        assert!(result.is_err());
    }
}
