use clap::{Parser, ValueEnum};
use std::path::PathBuf;

use crate::entities::{VideoDecodingMode, VideoSection, VideoInfo};

// Build version with backend info
const VERSION_INFO: &str = const_format::concatcp!(
    env!("CARGO_PKG_VERSION"), "\n",
    "Readers: image sequences (png, jpg, tiff, tga, bmp), generator (vgen)\n",
    "Target:  ", std::env::consts::ARCH, "-", std::env::consts::OS
);

/// Decoding mode requested on the command line
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum ModeArg {
    OnDemand,
    PreBuffer,
    Cache,
}

impl From<ModeArg> for VideoDecodingMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::OnDemand => VideoDecodingMode::OnDemand,
            ModeArg::PreBuffer => VideoDecodingMode::PreBuffering,
            ModeArg::Cache => VideoDecodingMode::Caching,
        }
    }
}

/// Probe, play through and export video sources
#[derive(Parser, Debug)]
#[command(author, version = VERSION_INFO, about, long_about = None)]
pub struct Args {
    /// Media file to open (image, first frame of a sequence, .vgen descriptor)
    #[arg(value_name = "FILE")]
    pub file_path: Option<PathBuf>,

    /// Open the most recently modified supported file matching a glob
    #[arg(long = "latest", value_name = "GLOB", conflicts_with = "file_path")]
    pub latest: Option<String>,

    /// Working zone start timestamp
    #[arg(long = "start", value_name = "TS")]
    pub zone_start: Option<i64>,

    /// Working zone end timestamp
    #[arg(long = "end", value_name = "TS")]
    pub zone_end: Option<i64>,

    /// Decoding mode, for readers that support several
    #[arg(short = 'm', long = "mode", value_enum)]
    pub mode: Option<ModeArg>,

    /// Timestamp interval between exported frames (0 = every frame)
    #[arg(short = 'i', long = "interval", value_name = "TS", default_value_t = 0)]
    pub interval: i64,

    /// Export the working zone as PNG files into this directory
    #[arg(short = 'e', long = "export", value_name = "DIR")]
    pub export_dir: Option<PathBuf>,

    /// File name prefix of exported frames (default: input file stem)
    #[arg(long = "stem", value_name = "NAME")]
    pub stem: Option<String>,

    /// Print a summary with N thumbnails (default: from settings)
    #[arg(short = 't', long = "thumbs", value_name = "N")]
    pub thumbs: Option<Option<usize>>,

    /// Enable debug logging to file (default: vidcache.log)
    #[arg(short = 'l', long = "log", value_name = "LOG_FILE")]
    pub log_file: Option<Option<PathBuf>>,

    /// Increase logging verbosity (default: warn, -v: info, -vv: debug, -vvv+: trace)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    pub verbosity: u8,

    /// Custom configuration directory (overrides default platform paths)
    #[arg(short = 'c', long = "config-dir", value_name = "DIR")]
    pub config_dir: Option<PathBuf>,

    /// Cache memory budget, percent of available memory (overrides settings)
    #[arg(long = "mem", value_name = "PERCENT")]
    pub mem_percent: Option<f64>,

    /// Worker threads override (overrides settings)
    #[arg(long = "workers", value_name = "N")]
    pub workers: Option<usize>,
}

impl Args {
    /// Requested working zone, defaulting each bound to the full timeline.
    pub fn zone(&self, info: &VideoInfo) -> VideoSection {
        let full = info.full_section();
        VideoSection::new(
            self.zone_start.unwrap_or(full.start),
            self.zone_end.unwrap_or(full.end),
        )
    }
}
