use std::{
    fs::File,
    io::BufReader,
    path::{Path, PathBuf},
};

use anyhow::Context as _;
use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "mabataki", version)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List the built-in emotion presets.
    Presets,
    /// Print the frame plan for a pattern without encoding anything.
    Schedule(ScheduleArgs),
    /// Render a blinking APNG from two or three eye images.
    Export(ExportArgs),
}

#[derive(Parser, Debug)]
struct ScheduleArgs {
    #[command(flatten)]
    pattern: PatternArgs,

    #[command(flatten)]
    timing: TimingArgs,

    /// Dump the full frame sequence as JSON instead of a summary.
    #[arg(long)]
    json: bool,
}

#[derive(Parser, Debug)]
struct ExportArgs {
    /// Open-eye image (fixes the output dimensions).
    #[arg(long)]
    open: PathBuf,

    /// Half-open image; without it the closed image stands in (two-image mode).
    #[arg(long)]
    half: Option<PathBuf>,

    /// Closed-eye image.
    #[arg(long)]
    closed: PathBuf,

    #[command(flatten)]
    pattern: PatternArgs,

    #[command(flatten)]
    timing: TimingArgs,

    /// Image quality, 1..=100.
    #[arg(long, default_value_t = 85)]
    quality: u32,

    /// Compression level, 1..=10.
    #[arg(long, default_value_t = 5)]
    compression: u32,

    /// Size budget in MB; encoding retries with smaller palettes to meet it.
    #[arg(long, default_value_t = mabataki::DEFAULT_TARGET_SIZE_MB)]
    target_size_mb: f64,

    #[arg(long, default_value_t = mabataki::DEFAULT_MAX_ATTEMPTS)]
    max_attempts: u32,

    /// Encode on the calling thread instead of a worker thread.
    #[arg(long)]
    inline: bool,

    /// Output APNG path.
    #[arg(long)]
    out: PathBuf,
}

#[derive(Parser, Debug)]
struct PatternArgs {
    /// Built-in preset id (see `mabataki presets`).
    #[arg(long, conflicts_with = "pattern")]
    preset: Option<String>,

    /// Pattern JSON file: {"steps": [{"blink_count": 1, ...}]}.
    #[arg(long)]
    pattern: Option<PathBuf>,
}

#[derive(Parser, Debug)]
struct TimingArgs {
    /// Frames per second.
    #[arg(long, default_value_t = 24)]
    fps: u32,

    /// Animation length in seconds.
    #[arg(long, default_value_t = 10.0)]
    length: f64,
}

#[derive(serde::Deserialize)]
struct PatternFile {
    steps: Vec<mabataki::StepSpec>,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_target(false).init();

    let cli = Cli::parse();
    match cli.cmd {
        Command::Presets => cmd_presets(),
        Command::Schedule(args) => cmd_schedule(args),
        Command::Export(args) => cmd_export(args),
    }
}

fn load_pattern(args: &PatternArgs) -> anyhow::Result<mabataki::LoopPattern> {
    if let Some(path) = &args.pattern {
        return read_pattern_json(path);
    }

    let id = args.preset.as_deref().unwrap_or(mabataki::DEFAULT_PRESET_ID);
    let preset = mabataki::find_preset(id).with_context(|| {
        let known: Vec<&str> = mabataki::presets().iter().map(|p| p.id).collect();
        format!("unknown preset '{id}' (known: {})", known.join(", "))
    })?;
    Ok(preset.pattern()?)
}

fn read_pattern_json(path: &Path) -> anyhow::Result<mabataki::LoopPattern> {
    let f = File::open(path).with_context(|| format!("open pattern '{}'", path.display()))?;
    let r = BufReader::new(f);
    let file: PatternFile = serde_json::from_reader(r).with_context(|| "parse pattern JSON")?;
    Ok(mabataki::LoopPattern::from_specs(&file.steps)?)
}

fn cmd_presets() -> anyhow::Result<()> {
    for preset in mabataki::presets() {
        println!(
            "{:<10} {:<10} {:?}: {} ({} steps)",
            preset.id,
            preset.name,
            preset.category,
            preset.description,
            preset.steps.len()
        );
    }
    Ok(())
}

fn cmd_schedule(args: ScheduleArgs) -> anyhow::Result<()> {
    let pattern = load_pattern(&args.pattern)?;
    let settings = mabataki::BlinkSettings {
        fps: args.timing.fps,
        animation_length: args.timing.length,
    };
    settings.validate()?;

    let frames = mabataki::pattern_frames(&pattern, &settings);
    if args.json {
        serde_json::to_writer_pretty(std::io::stdout().lock(), &frames)?;
        println!();
        return Ok(());
    }

    let total_ms: f64 = frames.iter().map(|f| f.duration_ms).sum();
    let count_of = |state: mabataki::EyeState| frames.iter().filter(|f| f.state == state).count();
    println!("frames:      {}", frames.len());
    println!("rendered:    {:.2}s", total_ms / 1000.0);
    println!("requested:   {:.2}s", settings.animation_length);
    println!("open:        {}", count_of(mabataki::EyeState::Open));
    println!("half:        {}", count_of(mabataki::EyeState::Half));
    println!("closed:      {}", count_of(mabataki::EyeState::Closed));
    Ok(())
}

fn cmd_export(args: ExportArgs) -> anyhow::Result<()> {
    let pattern = load_pattern(&args.pattern)?;
    let settings = mabataki::BlinkSettings {
        fps: args.timing.fps,
        animation_length: args.timing.length,
    };

    let images = mabataki::BlinkImages::from_paths(
        &args.open,
        args.half.as_deref(),
        &args.closed,
    )?;

    let context = if args.inline {
        mabataki::ContextKind::Inline
    } else {
        mabataki::ContextKind::detect()
    };
    let options = mabataki::ExportOptions {
        quality: args.quality,
        compression_level: args.compression,
        target_size_mb: args.target_size_mb,
        max_attempts: args.max_attempts,
        context,
    };

    let mut last_reported = -1.0f64;
    let result = mabataki::export_animation(
        &images,
        &pattern,
        &settings,
        &options,
        &mut |value, message| {
            // Stderr progress, throttled to whole-percent steps.
            if value - last_reported >= 1.0 {
                last_reported = value;
                match message {
                    Some(note) => eprintln!("[{value:>3.0}%] {note}"),
                    None => eprintln!("[{value:>3.0}%]"),
                }
            }
        },
    )?;

    if let Some(parent) = args.out.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create output dir '{}'", parent.display()))?;
    }
    std::fs::write(&args.out, &result.outcome.bytes)
        .with_context(|| format!("write apng '{}'", args.out.display()))?;

    eprintln!(
        "wrote {} ({:.2}MB, {} frames, {} colors, {} attempt(s))",
        args.out.display(),
        result.outcome.size_mb,
        result.frame_count,
        result.outcome.color_count,
        result.outcome.attempts
    );
    if result.oversize {
        eprintln!(
            "note: the best result exceeds the {:.1}MB target; shorten the animation, \
             lower the fps, or reduce the image size to shrink it further",
            options.target_size_mb
        );
    }
    Ok(())
}
