use std::path::PathBuf;

use anyhow::Context as _;
use clap::{Parser, ValueEnum};
use tracing::Level;
use turbsim::{
    LevelBlend, NoiseMode, PngSequenceWriter, ResizeTarget, Simulator, TurbulenceConfig,
    load_source,
};

/// Generate turbulence-distorted frame sequences from a still image.
#[derive(Parser, Debug)]
#[command(name = "turbsim", version)]
struct Cli {
    /// JSON config file; flags below override its values.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Source image.
    #[arg(long)]
    input: Option<PathBuf>,

    /// Directory receiving `frame_VVVVV_FFFF.png` files.
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Displacement in pixels per unit of noise.
    #[arg(long)]
    strength: Option<f64>,

    /// Maximum blur sigma.
    #[arg(long)]
    max_sigma: Option<f64>,

    /// Spatial noise frequency per pixel.
    #[arg(long)]
    spatial_scale: Option<f64>,

    /// Temporal frequency multiplier.
    #[arg(long)]
    temporal_scale: Option<f64>,

    /// fBm octaves.
    #[arg(long)]
    octaves: Option<usize>,

    /// Number of blur-stack levels.
    #[arg(long)]
    levels: Option<usize>,

    /// Frames per video.
    #[arg(long)]
    frames: Option<usize>,

    /// Number of videos.
    #[arg(long)]
    videos: Option<usize>,

    #[arg(long, value_enum)]
    mode: Option<ModeChoice>,

    #[arg(long, value_enum)]
    blend: Option<BlendChoice>,

    /// Keep the source resolution.
    #[arg(long, conflicts_with_all = ["width", "height"])]
    no_resize: bool,

    /// Resize width.
    #[arg(long)]
    width: Option<u32>,

    /// Resize height.
    #[arg(long)]
    height: Option<u32>,

    /// Seed for reproducible runs.
    #[arg(long)]
    seed: Option<u64>,

    /// Worker threads (default: one per core).
    #[arg(long)]
    threads: Option<usize>,

    /// Print the effective config as JSON and exit.
    #[arg(long)]
    print_config: bool,

    /// More logging (-v debug, -vv trace).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ModeChoice {
    Fast,
    Accurate,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum BlendChoice {
    Hard,
    Linear,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let level = match cli.verbose {
        0 => Level::INFO,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .init();

    let config = build_config(&cli)?;
    if cli.print_config {
        println!("{}", serde_json::to_string_pretty(&config)?);
        return Ok(());
    }

    let simulator = Simulator::new(&config).context("invalid configuration")?;
    let source = load_source(&config.input, config.resize)?;
    let mut sink = PngSequenceWriter::create(&config.output_dir)?;
    let summary = simulator.run(&source, &mut sink)?;

    tracing::info!(
        "took {:.2}s to generate {} videos with {} frames each; resolution {}x{} in '{}'",
        summary.elapsed.as_secs_f64(),
        summary.videos,
        summary.frames_per_video,
        summary.width,
        summary.height,
        sink.dir().display()
    );
    Ok(())
}

fn build_config(cli: &Cli) -> anyhow::Result<TurbulenceConfig> {
    let mut config = match &cli.config {
        Some(path) => TurbulenceConfig::from_json_file(path)
            .with_context(|| format!("load config '{}'", path.display()))?,
        None => TurbulenceConfig::default(),
    };

    if let Some(v) = &cli.input {
        config.input = v.clone();
    }
    if let Some(v) = &cli.output_dir {
        config.output_dir = v.clone();
    }
    if let Some(v) = cli.strength {
        config.turbulence_strength = v;
    }
    if let Some(v) = cli.max_sigma {
        config.max_blur_sigma = v;
    }
    if let Some(v) = cli.spatial_scale {
        config.spatial_scale = v;
    }
    if let Some(v) = cli.temporal_scale {
        config.temporal_scale = v;
    }
    if let Some(v) = cli.octaves {
        config.octaves = v;
    }
    if let Some(v) = cli.levels {
        config.blur_levels = v;
    }
    if let Some(v) = cli.frames {
        config.frames_per_video = v;
    }
    if let Some(v) = cli.videos {
        config.num_videos = v;
    }
    if let Some(m) = cli.mode {
        config.mode = match m {
            ModeChoice::Fast => NoiseMode::Fast,
            ModeChoice::Accurate => NoiseMode::Accurate,
        };
    }
    if let Some(b) = cli.blend {
        config.blend = match b {
            BlendChoice::Hard => LevelBlend::Hard,
            BlendChoice::Linear => LevelBlend::Linear,
        };
    }
    if cli.no_resize {
        config.resize = None;
    } else if cli.width.is_some() || cli.height.is_some() {
        let current = config.resize.unwrap_or(ResizeTarget {
            width: 512,
            height: 512,
        });
        config.resize = Some(ResizeTarget {
            width: cli.width.unwrap_or(current.width),
            height: cli.height.unwrap_or(current.height),
        });
    }
    if cli.seed.is_some() {
        config.seed = cli.seed;
    }
    if cli.threads.is_some() {
        config.threads = cli.threads;
    }
    Ok(config)
}
