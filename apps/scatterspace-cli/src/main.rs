use clap::{Parser, Subcommand};
use glam::{Mat4, Vec3};
use scatterspace_brush::{BrushConfig, BrushProcessor, FlatSurface, PlacementMode, Stroke, SurfaceQuery};
use scatterspace_common::{Camera, LodBand, PresetCatalogue, ScatterPreset};
use scatterspace_render::{LodSorter, RenderBuffer};
use scatterspace_stream::{Stream, StreamConfig, StreamRegistry, Streamer};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "scatterspace-cli", about = "CLI tool for scatterspace operations")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print engine version and crate info
    Info,
    /// Paint a demo field, stream it, and print LOD bucket stats
    Demo {
        /// Cache directory (defaults to a temp dir)
        #[arg(long)]
        cache_dir: Option<PathBuf>,
        /// Number of brush strokes to paint
        #[arg(short, long, default_value = "5")]
        strokes: usize,
        /// Brush diameter in world units
        #[arg(short, long, default_value = "20.0")]
        diameter: f32,
    },
    /// Decode a tile cache file and print its contents
    Inspect {
        /// Path to a .scattercache file
        file: PathBuf,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    match cli.command {
        Commands::Info => {
            println!("scatterspace-cli v{}", env!("CARGO_PKG_VERSION"));
            println!("common:  {}", scatterspace_common::crate_info());
            println!("persist: {}", scatterspace_persist::crate_info());
            println!("stream:  {}", scatterspace_stream::crate_info());
            println!("brush:   {}", scatterspace_brush::crate_info());
            println!("render:  {}", scatterspace_render::crate_info());
        }
        Commands::Demo {
            cache_dir,
            strokes,
            diameter,
        } => run_demo(cache_dir, strokes, diameter)?,
        Commands::Inspect { file } => inspect(&file)?,
    }

    Ok(())
}

fn run_demo(cache_dir: Option<PathBuf>, strokes: usize, diameter: f32) -> anyhow::Result<()> {
    let temp;
    let cache_dir = match cache_dir {
        Some(dir) => dir,
        None => {
            temp = tempfile::tempdir()?;
            temp.path().to_path_buf()
        }
    };

    let presets = PresetCatalogue::new(vec![ScatterPreset::new(
        "fern",
        vec![LodBand::new(50.0, 1.0), LodBand::new(200.0, 0.5)],
    )]);
    let stream = Arc::new(Stream::new(
        StreamConfig {
            name: "demo".into(),
            cache_dir: cache_dir.clone(),
            ..StreamConfig::default()
        },
        presets,
    ));

    let mut registry = StreamRegistry::new();
    registry.register(stream.clone());

    let surface: Arc<dyn SurfaceQuery> = Arc::new(FlatSurface::new(0.0, "ground"));
    let brush = BrushProcessor::spawn(
        stream.clone(),
        BrushConfig {
            spacing: 2.0,
            diameter,
            ..BrushConfig::default()
        },
        surface,
    );

    println!("Painting {strokes} strokes of diameter {diameter} ...");
    for i in 0..strokes {
        brush.enqueue_stroke(Stroke {
            position: Vec3::new(i as f32 * diameter * 0.6, 0.0, 0.0),
            normal: Vec3::Y,
            diameter,
            mode: PlacementMode::Replace,
            preset_index: 0,
        });
    }
    // Close the queue and wait for every stroke to apply.
    brush.shut_down();

    let mut streamer = Streamer::new(stream.config.load_worker_count);
    let mut sorter = LodSorter::new();

    let near = Camera::at(Vec3::new(0.0, 30.0, 0.0));
    for _ in 0..3 {
        streamer.tick(&stream, Some(&near), Mat4::IDENTITY);
    }
    let buffer = sorter.sort_blocking(&stream, &near);
    print_buffer("camera near origin", &stream, &buffer);

    let far = Camera::at(Vec3::new(150.0, 30.0, 0.0));
    for _ in 0..3 {
        streamer.tick(&stream, Some(&far), Mat4::IDENTITY);
    }
    let buffer = sorter.sort_blocking(&stream, &far);
    print_buffer("camera at (150, 30, 0)", &stream, &buffer);

    streamer.shut_down(&stream);
    registry.unregister(stream.id());

    let stream_dir = cache_dir.join(stream.name());
    let files = if stream_dir.exists() {
        std::fs::read_dir(&stream_dir)?.count()
    } else {
        0
    };
    println!("Shut down; {files} tile cache files in {}", stream_dir.display());

    Ok(())
}

fn print_buffer(label: &str, stream: &Stream, buffer: &RenderBuffer) {
    let loaded = stream.lock_store().len();
    println!("--- {label} ---");
    println!("loaded tiles: {loaded}, render tiles: {}", buffer.tiles.len());

    for (preset_index, preset) in stream.presets.presets.iter().enumerate() {
        for band_index in 0..preset.lod_bands.len() {
            let count: usize = buffer
                .tiles
                .iter()
                .map(|t| t.band_count(preset_index, band_index))
                .sum();
            println!(
                "  {} band {} (<= {:.0}): {count} instances",
                preset.name, band_index, preset.lod_bands[band_index].draw_distance
            );
        }
    }
}

fn inspect(file: &std::path::Path) -> anyhow::Result<()> {
    let lists = scatterspace_persist::read_tile_file(file, 0)?;
    let total: usize = lists.iter().map(Vec::len).sum();
    println!("{}: {total} instances across {} presets", file.display(), lists.len());

    for (preset_index, instances) in lists.iter().enumerate() {
        if instances.is_empty() {
            continue;
        }
        let mut min = instances[0].position;
        let mut max = instances[0].position;
        for t in instances {
            min = min.min(t.position);
            max = max.max(t.position);
        }
        println!(
            "  preset {preset_index}: {} instances, extent ({:.1}, {:.1}, {:.1}) .. ({:.1}, {:.1}, {:.1})",
            instances.len(),
            min.x,
            min.y,
            min.z,
            max.x,
            max.y,
            max.z
        );
    }

    Ok(())
}
