//! Utility functions
//!
//! **Used by**: image sequence reader, CLI

pub mod sequences;

pub use sequences::{SequenceParts, detect_sequence, split_sequence_path};
