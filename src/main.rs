use vidcache::cli::Args;
use vidcache::config::{self, Settings};
use vidcache::core::cache_man::CacheManager;
use vidcache::core::event_bus::downcast_event;
use vidcache::core::export::save_frames_cancellable;
use vidcache::core::reader::{VideoReader, enumerate_frames};
use vidcache::core::registry::{VideoLoadAsked, VideoTypeManager};
use vidcache::core::workers::{Inline, Workers};
use vidcache::entities::{VideoDecodingMode, WorkerPool};
use vidcache::readers::{FrameGenerator, GENERATOR_READER, IMAGE_SEQUENCE_READER, ImageSequenceReader};

use anyhow::{Context, Result, anyhow, bail};
use clap::Parser;
use log::{debug, info, warn};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::time::{Duration, Instant};

/// Application-wide services, built once.
struct Engine {
    settings: Settings,
    registry: VideoTypeManager,
    cache_manager: Arc<CacheManager>,
    workers: Arc<dyn WorkerPool>,
}

fn init_logging(args: &Args, path_config: &config::PathConfig) -> Result<()> {
    // 0 (default) = warn, 1 (-v) = info, 2 (-vv) = debug, 3+ (-vvv) = trace
    let log_level = match args.verbosity {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };

    if let Some(log_path_opt) = &args.log_file {
        let log_path = log_path_opt
            .as_ref()
            .cloned()
            .unwrap_or_else(|| config::config_file(config::LOG_FILE, path_config));

        let file = std::fs::File::create(&log_path)
            .with_context(|| format!("Failed to create log file: {}", log_path.display()))?;

        // File logging is at least Debug
        env_logger::Builder::new()
            .filter_level(log_level.max(log::LevelFilter::Debug))
            .format_timestamp_millis()
            .target(env_logger::Target::Pipe(Box::new(file)))
            .init();

        info!("Logging to file: {} (level: {:?})", log_path.display(), log_level);
    } else {
        // Console logging, RUST_LOG wins if set
        let default_level = match args.verbosity {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        };

        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
            .format_timestamp_millis()
            .init();
    }
    Ok(())
}

fn load_settings(args: &Args, path_config: &config::PathConfig) -> Settings {
    let mut settings = Settings::load_or_default(path_config).unwrap_or_else(|e| {
        warn!("{:#}, using defaults", e);
        Settings::default()
    });
    if let Some(percent) = args.mem_percent {
        settings.cache_memory_percent = percent;
    }
    if let Some(workers) = args.workers {
        settings.workers_override = workers;
    }
    settings
}

impl Engine {
    fn new(settings: Settings) -> Result<Self> {
        let cache_manager = Arc::new(CacheManager::from_settings(&settings));
        let workers = Workers::from_override(settings.workers_override).context("Failed to start worker threads")?;
        info!("Worker pool: {} threads", workers.num_threads());

        Ok(Self {
            settings,
            registry: VideoTypeManager::with_default_readers(),
            cache_manager,
            workers: Arc::new(workers),
        })
    }

    /// Reader for `path`. Built-in backends are configured from settings,
    /// other registrations come straight from their factory.
    fn reader_for(&self, path: &Path) -> Option<Box<dyn VideoReader>> {
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or_default();
        let reader: Box<dyn VideoReader> = match self.registry.reader_name(ext) {
            Some(IMAGE_SEQUENCE_READER) => Box::new(
                ImageSequenceReader::with_manager(Arc::clone(&self.cache_manager))
                    .with_frame_rate(self.settings.image_sequence_fps),
            ),
            Some(GENERATOR_READER) => {
                Box::new(FrameGenerator::new().with_prebuffer_capacity(self.settings.prebuffer_capacity))
            }
            _ => return self.registry.get_reader_for(path),
        };
        Some(reader)
    }

    fn run(&self, path: &Path, args: &Args) -> Result<()> {
        let mut reader = self
            .reader_for(path)
            .ok_or_else(|| anyhow!("No reader for {}", path.display()))?;

        let result = reader.open(path);
        if !result.is_success() {
            bail!("Cannot open {}: {}", path.display(), result);
        }

        print_info(reader.as_ref());

        if let Some(count) = args.thumbs {
            let count = count.unwrap_or(self.settings.thumbnails);
            let summary = reader.extract_summary(path, count, self.settings.thumbnail_max_size);
            println!(
                "Summary:   {} thumbnails, {} ms, companion kva: {}",
                summary.thumbs.len(),
                summary.duration_ms,
                summary.has_kva
            );
        }

        if let Some(mode) = args.mode {
            let mode = VideoDecodingMode::from(mode);
            if !reader.set_decoding_mode(mode, Arc::clone(&self.workers)) {
                warn!("{:?} not supported by this reader, staying in {:?}", mode, reader.decoding_mode());
            }
        }

        // Batch use: populate on this thread so the zone is complete before reading.
        // Pre-buffering keeps the pool it was switched in with.
        let zone = args.zone(reader.info());
        let budget = self.cache_manager.zone_budget();
        debug!("Working zone {} with {} MB budget", zone, budget / 1024 / 1024);
        reader.update_working_zone(zone, false, budget, &Inline);
        println!("Zone:      {}", reader.working_zone());

        if let Some(dir) = &args.export_dir {
            let stem = args
                .stem
                .clone()
                .or_else(|| path.file_stem().map(|s| s.to_string_lossy().into_owned()))
                .unwrap_or_else(|| "frame".to_string());
            let report = save_frames_cancellable(reader.as_mut(), args.interval, dir, &stem, &AtomicBool::new(false));
            println!("Export:    {} ({} files in {})", report.result, report.written.len(), dir.display());
            if report.result != vidcache::entities::SaveResult::Success {
                bail!("Export failed: {}", report.result);
            }
        } else if reader.decoding_mode() == VideoDecodingMode::PreBuffering {
            play_through(reader.as_mut());
        } else {
            let frames = enumerate_frames(reader.as_mut(), args.interval)?.count();
            println!("Frames:    {} readable in zone", frames);
        }

        let (usage, limit) = self.cache_manager.mem();
        debug!(
            "Cache memory: {} / {} MB ({:.0}%)",
            usage / 1024 / 1024,
            limit / 1024 / 1024,
            self.cache_manager.mem_usage_fraction() * 100.0
        );
        reader.close();
        Ok(())
    }
}

fn print_info(reader: &dyn VideoReader) {
    let info = reader.info();
    println!("File:      {}", info.file_path.display());
    println!("Size:      {}x{}", info.reference_size.width, info.reference_size.height);
    println!(
        "Timeline:  {} frames, {}..{} ({} per frame)",
        info.frame_count(),
        info.first_timestamp,
        info.last_timestamp,
        info.average_timestamps_per_frame
    );
    println!("Rate:      {:.3} fps, {:.0} ms", 1000.0 / info.frame_interval_ms.max(f64::EPSILON), info.duration_ms());
    println!("Mode:      {:?}", reader.decoding_mode());
    println!("Flags:     {:?}", reader.flags());
}

/// Real-time play loop over the working zone, counting drops.
fn play_through(reader: &mut dyn VideoReader) {
    let interval = Duration::from_secs_f64(reader.info().frame_interval_ms.max(1.0) / 1000.0);
    reader.before_playloop();

    let started = Instant::now();
    let mut shown = 0usize;
    let mut dropped = 0usize;
    let mut next_tick = Instant::now();
    loop {
        let moved = reader.move_next(0, false);
        if reader.drops() > 0 {
            dropped += 1;
        } else {
            shown += 1;
        }
        if !moved && reader.drops() == 0 {
            break;
        }
        next_tick += interval;
        std::thread::sleep(next_tick.saturating_duration_since(Instant::now()));
    }
    reader.reset_drops();

    println!(
        "Playback:  {} frames shown, {} ticks dropped in {:.2}s",
        shown,
        dropped,
        started.elapsed().as_secs_f64()
    );
}

fn main() -> Result<()> {
    let args = Args::parse();

    let path_config = config::PathConfig::from_env_and_cli(args.config_dir.clone());
    if let Err(e) = config::ensure_dirs(&path_config) {
        eprintln!("Warning: Failed to create application directories: {:#}", e);
    }
    init_logging(&args, &path_config)?;

    info!("vidcache {} starting", env!("CARGO_PKG_VERSION"));
    debug!("Command-line args: {:?}", args);
    info!(
        "Config path: {}",
        config::config_file(config::SETTINGS_FILE, &path_config).display()
    );

    let engine = Engine::new(load_settings(&args, &path_config))?;

    let path = match (&args.file_path, &args.latest) {
        (Some(path), _) => path.clone(),
        (None, Some(pattern)) => engine
            .registry
            .get_most_recent_supported_video(pattern)
            .ok_or_else(|| anyhow!("No supported file matches {}", pattern))?,
        (None, None) => {
            use clap::CommandFactory;
            let _ = Args::command().print_help();
            println!();
            return Ok(());
        }
    };

    engine.registry.events().subscribe::<VideoLoadAsked, _>(|request| {
        info!("Load asked: {} (target {})", request.path.display(), request.target);
    });
    engine.registry.load_video(&path, 0);

    for event in engine.registry.events().poll() {
        if let Some(request) = downcast_event::<VideoLoadAsked>(&event) {
            engine.run(&request.path, &args)?;
        }
    }
    Ok(())
}
