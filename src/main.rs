use anyhow::{Context, Result};
use clap::Parser;
use serde::Serialize;
use std::cell::RefCell;
use std::path::PathBuf;
use std::rc::Rc;
use tokio::sync::Notify;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use furnace_render::colors::Rgb;
use furnace_render::config::{RenderConfig, ScheduleMode};
use furnace_render::gpu::{
    get_gpu_info, AtlasStats, FontdueRasterizer, GlyphAtlas, InstancedRenderer, RendererStats,
    WgpuBackend,
};
use furnace_render::grid::{Cell, CellFlags, CellGrid, Grid};
use furnace_render::scheduler::{FrameStats, IntervalFrameSource, RenderOptimizer};

/// Furnace Render - headless frame benchmark for the GPU cell renderer
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to a TTF/OTF font file
    #[arg(short, long, required_unless_present = "gpu_info")]
    font: Option<PathBuf>,

    /// Print the GPU adapter wgpu would pick and exit
    #[arg(long)]
    gpu_info: bool,

    /// Font size in pixels
    #[arg(short, long)]
    size: Option<f32>,

    /// Grid columns
    #[arg(long, default_value_t = 80)]
    cols: usize,

    /// Grid rows
    #[arg(long, default_value_t = 24)]
    rows: usize,

    /// Number of frames to render before exiting
    #[arg(short = 'n', long, default_value_t = 600)]
    frames: u64,

    /// Target frame rate
    #[arg(long)]
    fps: Option<u32>,

    /// Only render when the grid changes
    #[arg(long)]
    on_demand: bool,

    /// Print statistics as JSON
    #[arg(long)]
    json: bool,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

#[derive(Serialize)]
struct Report {
    device: String,
    frames: FrameStats,
    renderer: RendererStats,
    atlas: AtlasStats,
}

/// Grid contents for frame `frame`: a static body plus a changing status line
fn paint(grid: &mut Grid, frame: u64) {
    let (rows, cols) = (grid.rows(), grid.cols());
    if frame == 0 {
        let text: String = (0x21u8..0x7f).map(char::from).collect();
        for y in 1..rows {
            let fg = Rgb::from_ansi((y % 16) as u8);
            let offset = y % text.len();
            grid.put_str(0, y, &text[offset..], fg, Rgb::BLACK, CellFlags::empty());
        }
    }

    let status = format!(" frame {:>8} ", frame);
    grid.fill_row(0, Cell::new(' ', Rgb::BLACK, Rgb::WHITE, CellFlags::empty()));
    grid.put_str(
        cols.saturating_sub(status.len()),
        0,
        &status,
        Rgb::BLACK,
        Rgb::WHITE,
        CellFlags::BOLD,
    );
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = if args.debug { Level::DEBUG } else { Level::INFO };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set global default subscriber")?;

    if args.gpu_info {
        match get_gpu_info() {
            Some(info) => println!("{}", info),
            None => println!("No GPU adapter available"),
        }
        return Ok(());
    }
    let font = args.font.context("No font given")?;

    let mut config = RenderConfig::default();
    if let Some(size) = args.size {
        config.font.size = size;
    }
    if let Some(fps) = args.fps {
        config.scheduler.target_fps = fps;
    }
    if args.on_demand {
        config.scheduler.mode = ScheduleMode::OnDemand;
    }
    config.validate().context("Invalid configuration")?;

    let rasterizer = FontdueRasterizer::from_file(&font, config.font.size)
        .with_context(|| format!("Failed to load font {}", font.display()))?
        .with_cell_size(config.cell_width, config.cell_height);
    let atlas = GlyphAtlas::new(rasterizer, config.atlas.width, config.atlas.height)
        .context("Failed to create glyph atlas")?;

    let metrics = atlas.metrics();
    let viewport = (
        args.cols as u32 * metrics.width,
        args.rows as u32 * metrics.height,
    );
    let backend = WgpuBackend::headless(&config, viewport.0, viewport.1)
        .await
        .context("Failed to initialize GPU backend")?;
    let device = backend.get_device_info();
    info!("Rendering {}x{} cells on {}", args.cols, args.rows, device);

    let mut renderer = InstancedRenderer::new(backend, atlas, args.rows, args.cols, viewport);
    renderer.set_clear_color(config.clear_color);

    let renderer = Rc::new(RefCell::new(renderer));
    let grid = Rc::new(RefCell::new(Grid::new(args.rows, args.cols)));
    let done = Rc::new(Notify::new());

    let mut frame = 0u64;
    let target = args.frames;
    let callback = {
        let renderer = Rc::clone(&renderer);
        let grid = Rc::clone(&grid);
        let done = Rc::clone(&done);
        move || -> Result<()> {
            let mut grid = grid.borrow_mut();
            paint(&mut grid, frame);
            let mut renderer = renderer.borrow_mut();
            renderer.set_blink_phase((frame / 30) % 2 == 0);
            renderer.render(&mut *grid, frame == 0)?;

            frame += 1;
            if frame >= target {
                done.notify_one();
            }
            Ok(())
        }
    };

    let mut optimizer = RenderOptimizer::new(config.scheduler, callback)?;
    optimizer.on_error(|err| warn!("Frame failed: {:#}", err));
    let handle = optimizer.handle();
    let mut source = IntervalFrameSource::new(config.scheduler.target_fps);

    handle.start();
    if config.scheduler.mode == ScheduleMode::OnDemand {
        // the grid changes every frame; request one render per tick
        let requester = {
            let handle = handle.clone();
            let period = source.period();
            async move {
                let mut ticker = tokio::time::interval(period);
                loop {
                    ticker.tick().await;
                    handle.request_render();
                }
            }
        };
        tokio::select! {
            () = optimizer.run(&mut source) => {}
            () = requester => {}
            () = done.notified() => {}
        }
    } else {
        tokio::select! {
            () = optimizer.run(&mut source) => {}
            () = done.notified() => {}
        }
    }
    handle.stop();

    let mut renderer = renderer.borrow_mut();
    let report = Report {
        device,
        frames: optimizer.stats().clone(),
        renderer: renderer.stats().clone(),
        atlas: renderer.atlas().stats(),
    };
    renderer.destroy();

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        let frames = &report.frames;
        println!("Device:          {}", report.device);
        println!("Frames:          {}", frames.frame_count);
        println!("Dropped frames:  {}", frames.dropped_frames);
        println!("Avg frame time:  {:?}", frames.average_frame_time());
        println!("FPS:             {:.1}", frames.fps);
        println!("Instances/frame: {}", report.renderer.last_instance_count);
        println!(
            "Atlas:           {} glyphs, {} hits ({} fast), {} misses, {:.1}% used",
            report.atlas.cached_glyphs,
            report.atlas.hits,
            report.atlas.fast_path_hits,
            report.atlas.misses,
            report.atlas.utilization * 100.0
        );
    }

    Ok(())
}
