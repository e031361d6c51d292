use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::sync::mpsc;
use tracing::{Level, info, warn};

use caliper::annotate::{AnnotatedFrame, SizeUnit};
use caliper::pipeline::save_stages;
use caliper::settings::{DEFAULT_MIN_AREA, MeasurementSettings, SharedSettings};
use caliper::stream::{StreamController, create_frame_source};
use caliper::PipelineConfig;

/// Give up waiting for a streamed frame after this long
const FRAME_WAIT: Duration = Duration::from_secs(5);

#[derive(Parser)]
#[command(name = "caliper")]
#[command(about = "Measure objects in images or camera frames")]
struct Cli {
    /// Image file, or a V4L2 device such as /dev/video0
    #[arg(short, long, value_name = "INPUT")]
    input: String,

    /// Preprocessing steps, e.g. "gray,blur:5,threshold:127,close:5"
    #[arg(long)]
    steps: Option<String>,

    /// Binary threshold (0-255), applied to the threshold step
    #[arg(long)]
    threshold: Option<u32>,

    /// Minimum region area in pixels (0-500)
    #[arg(long, default_value_t = DEFAULT_MIN_AREA)]
    min_area: u32,

    /// Select the region at X,Y in the frozen frame
    #[arg(long, value_name = "X,Y", value_parser = parse_point)]
    select: Option<(i64, i64)>,

    /// Real width of the selected region, in millimeters
    #[arg(long, requires = "select")]
    reference_width: Option<f64>,

    /// Stream this many frames before freezing
    #[arg(long, default_value_t = 0)]
    frames: usize,

    /// Stream cadence in milliseconds
    #[arg(long, default_value_t = 30)]
    cadence_ms: u64,

    /// Save the annotated frame to this file
    #[arg(long, value_name = "FILE")]
    annotated_out: Option<PathBuf>,

    /// Save every preprocessing stage to directory (must be empty)
    #[arg(long, value_name = "DIR")]
    debug_out: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,
}

fn parse_point(text: &str) -> Result<(i64, i64), String> {
    let (x, y) = text
        .split_once(',')
        .ok_or_else(|| format!("expected X,Y, got '{}'", text))?;
    let parse = |v: &str| v.trim().parse::<i64>().map_err(|e| format!("'{}': {}", v, e));
    Ok((parse(x)?, parse(y)?))
}

fn print_rows(title: &str, frozen: &AnnotatedFrame) {
    println!("\n=== {} ===", title);
    println!("Total regions: {}", frozen.regions.len());
    for (i, row) in frozen.rows().iter().enumerate() {
        let unit = match row.unit {
            SizeUnit::Pixels => "px",
            SizeUnit::Millimeters => "mm",
        };
        println!(
            "  {:>3}  {:.1}{} x {:.1}{}  area {}  rect {} ({})",
            i + 1,
            row.width,
            unit,
            row.height,
            unit,
            row.area,
            row.bounding_rect_area,
            row.rect_size
        );
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Cli::parse();

    tracing_subscriber::fmt()
        .with_max_level(if args.verbose { Level::DEBUG } else { Level::INFO })
        .init();

    let pipeline = match &args.steps {
        Some(steps) => PipelineConfig::from_step_list(steps)?,
        None => PipelineConfig::standard(),
    };
    let mut settings = MeasurementSettings::default()
        .with_pipeline(pipeline)
        .with_min_area(args.min_area)?;
    settings.set_cadence(Duration::from_millis(args.cadence_ms))?;
    if let Some(threshold) = args.threshold {
        settings.set_binary_threshold(threshold)?;
    }
    for line in settings.pipeline.display_lines() {
        info!("{}", line);
    }

    let shared = SharedSettings::new(settings);
    let (tx, mut rx) = mpsc::unbounded_channel::<AnnotatedFrame>();
    let mut controller = StreamController::new(shared.clone(), Arc::new(tx));
    let source = create_frame_source(&args.input)?;

    if args.frames > 0 {
        controller.start(source, shared.snapshot().cadence).await?;
        for received in 1..=args.frames {
            match tokio::time::timeout(FRAME_WAIT, rx.recv()).await {
                Ok(Some(frame)) => info!("Frame {}: {} regions", received, frame.regions.len()),
                Ok(None) => break,
                Err(_) => {
                    warn!("No frame within {:?}; freezing anyway", FRAME_WAIT);
                    break;
                }
            }
        }
    } else {
        controller.attach(source).await?;
    }

    let mut frozen = controller.freeze().await?;
    print_rows("Measurements", &frozen);

    if let Some((x, y)) = args.select {
        match controller.select_at(x, y) {
            Some(region) => println!(
                "\nSelected region at ({}, {}): {}",
                region.bbox.x,
                region.bbox.y,
                region.rect_size()
            ),
            None => println!("\nNo region at ({}, {})", x, y),
        }

        if let Some(width) = args.reference_width {
            let ratio = controller.calibrate_selected(width)?;
            println!("Calibration: {:.4} mm/px", ratio);
            frozen = controller.freeze().await?;
            controller.select_at(x, y);
            print_rows("Calibrated measurements", &frozen);
        }
    }

    if let Some(path) = &args.annotated_out {
        let image = controller
            .selection()
            .highlighted()
            .unwrap_or_else(|| frozen.render());
        image.save(path)?;
        info!("Annotated frame saved to {}", path.display());
    }

    if let Some(dir) = &args.debug_out {
        let written = save_stages(dir, &shared.snapshot().pipeline, &frozen.stages)?;
        info!("Saved {} stages to {}", written.len(), dir.display());
    }

    controller.stop().await;
    Ok(())
}
