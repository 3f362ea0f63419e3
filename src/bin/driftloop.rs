use std::{
    fs::File,
    io::BufReader,
    path::{Path, PathBuf},
};

use anyhow::Context as _;
use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "driftloop", version)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Render one composited frame of the loop as a PNG.
    Frame(FrameArgs),
    /// Export the looping animation as an MP4 (requires `ffmpeg` on PATH).
    Render(RenderArgs),
}

#[derive(Parser, Debug)]
struct FrameArgs {
    /// Input scene JSON.
    #[arg(long = "in")]
    in_path: PathBuf,

    /// Loop progress in [0, 1).
    #[arg(long, default_value_t = 0.0)]
    progress: f64,

    /// Output PNG path.
    #[arg(long)]
    out: PathBuf,
}

#[derive(Parser, Debug)]
struct RenderArgs {
    /// Input scene JSON.
    #[arg(long = "in")]
    in_path: PathBuf,

    /// Output MP4 path.
    #[arg(long)]
    out: PathBuf,

    /// Output frames per second.
    #[arg(long, default_value_t = 30)]
    fps: u32,

    /// Clip length in seconds.
    #[arg(long, default_value_t = 4.0)]
    duration: f64,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    match cli.cmd {
        Command::Frame(args) => cmd_frame(args),
        Command::Render(args) => cmd_render(args),
    }
}

fn load_engine(scene_path: &Path) -> anyhow::Result<driftloop::Engine> {
    let f = File::open(scene_path)
        .with_context(|| format!("open scene '{}'", scene_path.display()))?;
    let scene = driftloop::Scene::from_json_reader(BufReader::new(f))?;

    let source_path = scene_path
        .parent()
        .unwrap_or_else(|| Path::new("."))
        .join(&scene.source);
    let bytes = std::fs::read(&source_path)
        .with_context(|| format!("read source image '{}'", source_path.display()))?;
    let raster = driftloop::decode_source(&bytes)?;

    Ok(scene.into_engine(raster)?)
}

fn cmd_frame(args: FrameArgs) -> anyhow::Result<()> {
    let engine = load_engine(&args.in_path)?;
    let frame = driftloop::composite_frame(
        engine.original(),
        engine.keyframes(),
        args.progress,
        &engine.config().playback,
    );

    let img = image::RgbaImage::from_raw(frame.width, frame.height, frame.data)
        .context("assemble output image")?;
    img.save(&args.out)
        .with_context(|| format!("write PNG '{}'", args.out.display()))?;
    println!("wrote {}", args.out.display());
    Ok(())
}

fn cmd_render(args: RenderArgs) -> anyhow::Result<()> {
    let mut engine = load_engine(&args.in_path)?;
    let mut sink = driftloop::FfmpegSink::to_path(&args.out);
    let blob = engine.export(&mut sink, args.fps, args.duration)?;
    println!("wrote {} ({} bytes)", args.out.display(), blob.len());
    Ok(())
}
