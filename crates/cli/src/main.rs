mod args;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::Parser;
use time::format_description::well_known::Rfc3339;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;
use trim_engine::time::{format_timestamp, tl_to_seconds};
use trim_engine::{
    CacheEntry, CacheWriter, CommitOptions, EngineConfig, FfmpegMediaBackend, PlaybackState,
    PreviewLoop, TrimSession, probe_asset,
};

use crate::args::{Args, CliCommand};

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbosity);

    let config = load_config(&args)?;
    debug!(cache_dir = ?config.cache_dir, strategy = ?config.strategy, "configuration loaded");
    let backend = FfmpegMediaBackend::new(
        config
            .ffmpeg_tools()
            .context("ffmpeg and ffprobe are required")?,
    );

    match args.command {
        CliCommand::Probe { file } => probe(&backend, &file),
        CliCommand::Trim {
            file,
            start,
            end,
            strategy,
            overwrite,
        } => {
            let writer = open_cache(&backend, config)?;
            let mut options = CommitOptions {
                overwrite,
                ..CommitOptions::default()
            };
            if let Some(strategy) = strategy {
                options = options.with_strategy(strategy.into());
            }
            trim(&backend, &writer, &file, (start, end), options)
        }
        CliCommand::List => {
            let writer = open_cache(&backend, config)?;
            let entries = writer.list();
            if entries.is_empty() {
                println!("cache is empty: {}", writer.root().display());
            }
            for entry in &entries {
                print_entry(entry);
            }
            Ok(())
        }
        CliCommand::Prune => {
            let writer = open_cache(&backend, config)?;
            let dropped = writer.prune().context("prune cache index")?;
            println!("pruned {} entr{}", dropped.len(), plural_y(dropped.len()));
            Ok(())
        }
        CliCommand::Remove { id } => {
            let writer = open_cache(&backend, config)?;
            let removed = writer
                .remove(id)
                .with_context(|| format!("remove cache entry {id}"))?;
            println!("removed {} ({})", removed.id, removed.path.display());
            Ok(())
        }
        CliCommand::Label { id, label } => {
            let writer = open_cache(&backend, config)?;
            let entry = writer
                .set_label(id, label)
                .with_context(|| format!("label cache entry {id}"))?;
            print_entry(&entry);
            Ok(())
        }
        CliCommand::Preview {
            file,
            start,
            end,
            seconds,
            fps,
        } => preview(&backend, &file, (start, end), seconds, fps),
    }
}

fn init_logging(verbosity: u8) {
    let default_level = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn load_config(args: &Args) -> Result<EngineConfig> {
    let path: Option<PathBuf> = args.config.clone().or_else(EngineConfig::default_path);
    let mut config = match &path {
        Some(path) => EngineConfig::load(path)
            .with_context(|| format!("load config {}", path.display()))?,
        None => EngineConfig::default(),
    };
    if let Some(cache_dir) = &args.cache_dir {
        config.cache_dir = cache_dir.clone();
    }
    Ok(config)
}

fn open_cache(
    backend: &FfmpegMediaBackend,
    config: EngineConfig,
) -> Result<CacheWriter<FfmpegMediaBackend>> {
    let cache_dir = config.cache_dir.clone();
    CacheWriter::open(Arc::new(backend.clone()), config)
        .with_context(|| format!("open cache {}", cache_dir.display()))
}

fn probe(backend: &FfmpegMediaBackend, file: &Path) -> Result<()> {
    let asset = probe_asset(backend, file).with_context(|| format!("probe {}", file.display()))?;

    println!("path:        {}", asset.path.display());
    println!(
        "duration:    {} ({:.3}s)",
        format_timestamp(asset.duration_tl),
        tl_to_seconds(asset.duration_tl)
    );
    if let Some(declared) = asset
        .declared_duration_tl
        .filter(|declared| *declared != asset.duration_tl)
    {
        println!("declared:    {}", format_timestamp(declared));
    }
    println!(
        "container:   {}",
        asset.container.as_deref().unwrap_or("unknown")
    );
    match &asset.video {
        Some(video) => println!(
            "video:       {} {}x{} @ {}",
            video.codec_name.as_deref().unwrap_or("?"),
            video.width,
            video.height,
            video
                .frame_rate
                .map(|rate| format!("{}/{} fps", rate.num, rate.den))
                .unwrap_or_else(|| "unknown rate".to_string())
        ),
        None => println!("video:       none"),
    }
    match &asset.audio {
        Some(audio) => println!(
            "audio:       {} {} Hz, {} ch",
            audio.codec_name.as_deref().unwrap_or("?"),
            audio.sample_rate,
            audio.channels
        ),
        None => println!("audio:       none"),
    }
    println!("granularity: {} us", asset.granularity_tl);
    Ok(())
}

fn trim(
    backend: &FfmpegMediaBackend,
    writer: &CacheWriter<FfmpegMediaBackend>,
    file: &Path,
    (start_tl, end_tl): (i64, i64),
    options: CommitOptions,
) -> Result<()> {
    if end_tl <= start_tl {
        bail!(
            "end {} must be after start {}",
            format_timestamp(end_tl),
            format_timestamp(start_tl)
        );
    }
    let mut session = TrimSession::new();
    session
        .load_path(backend, file)
        .with_context(|| format!("load {}", file.display()))?;
    session.set_start(start_tl)?;
    session.set_end(end_tl)?;
    if let Some(selection) = session.current_selection() {
        if (selection.start_tl, selection.end_tl) != (start_tl, end_tl) {
            info!(
                start_tl = selection.start_tl,
                end_tl = selection.end_tl,
                "selection clamped to asset bounds"
            );
        }
    }

    let entry = writer.commit(&session, options)?;
    print_entry(&entry);
    Ok(())
}

fn preview(
    backend: &FfmpegMediaBackend,
    file: &Path,
    (start, end): (Option<i64>, Option<i64>),
    seconds: f64,
    fps: f64,
) -> Result<()> {
    if !(fps > 0.0 && seconds >= 0.0) {
        bail!("--fps must be positive and --seconds non-negative");
    }
    let mut session = TrimSession::new();
    session
        .load_path(backend, file)
        .with_context(|| format!("load {}", file.display()))?;
    if let Some(start) = start {
        session.set_start(start)?;
    }
    if let Some(end) = end {
        session.set_end(end)?;
    }
    match session.current_selection() {
        Some(selection) => println!(
            "looping [{} .. {})",
            format_timestamp(selection.start_tl),
            format_timestamp(selection.end_tl)
        ),
        None => println!("no selection; playing to the end"),
    }

    let mut controller = PreviewLoop::new();
    controller.play(&session)?;
    let step = Duration::from_secs_f64(1.0 / fps);
    let ticks = (seconds * fps).round() as u64;
    for _ in 0..ticks {
        let position = controller.tick(&session, step);
        println!(
            "{}{}",
            format_timestamp(position.position_tl),
            if position.wrapped { "  (loop)" } else { "" }
        );
        if position.state == PlaybackState::Ended {
            println!("ended");
            break;
        }
    }
    Ok(())
}

fn print_entry(entry: &CacheEntry) {
    let created = entry
        .created_at
        .format(&Rfc3339)
        .unwrap_or_else(|_| entry.created_at.to_string());
    println!(
        "{}  {}  [{} .. {})  {:.3}s  {:?}  {}",
        entry.id,
        created,
        format_timestamp(entry.start_tl),
        format_timestamp(entry.end_tl),
        tl_to_seconds(entry.duration_tl),
        entry.mode,
        entry.path.display()
    );
    if let Some(label) = &entry.label {
        println!("    \"{label}\"");
    }
    println!("    from {}", entry.source.display());
}

fn plural_y(count: usize) -> &'static str {
    if count == 1 { "y" } else { "ies" }
}
