//! Concrete reader backends
//!
//! - `image_sequence`: still images and numbered sequences, always caching
//! - `generator`: synthetic frames from `.vgen` descriptors, all decoding modes

pub mod generator;
pub mod image_sequence;

pub use generator::{FrameGenerator, GeneratorParams, GeneratorSource, VGEN_EXTENSION, render_frame};
pub use image_sequence::{ImageSequenceReader, SequenceSource};

use crate::core::reader::VideoReader;
use crate::core::registry::VideoTypeManager;
use crate::entities::loader::IMAGE_EXTS;

pub const IMAGE_SEQUENCE_READER: &str = "image-sequence";
pub const GENERATOR_READER: &str = "generator";

fn new_image_sequence_reader() -> Box<dyn VideoReader> {
    Box::new(ImageSequenceReader::new())
}

fn new_frame_generator() -> Box<dyn VideoReader> {
    Box::new(FrameGenerator::new())
}

/// Register every built-in backend. No wildcard reader is installed.
pub fn register_defaults(manager: &mut VideoTypeManager) {
    for ext in IMAGE_EXTS {
        manager.register(ext, IMAGE_SEQUENCE_READER, new_image_sequence_reader);
    }
    manager.register(VGEN_EXTENSION, GENERATOR_READER, new_frame_generator);
}
