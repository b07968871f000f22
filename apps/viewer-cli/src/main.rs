use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use std::time::Instant;
use tracing::info;

use camera_transport::{CameraTransport, GrabStrategy, PixelFormat};
use device_registry::DeviceRegistry;
use live_stream::{
    DisplayFrame, DisplaySink, FrameSource, StreamConfig, StreamController, StreamMetrics,
    TickOutcome,
};

mod config;
use config::ViewerConfig;

/// Size of the viewer's image area; frames are fitted into it.
const VIEWPORT: (u32, u32) = (640, 480);

#[derive(Parser, Debug)]
#[command(
    name = "camview",
    version,
    about = "Live viewer for a single industrial camera",
    disable_help_subcommand = true
)]
struct Cli {
    /// YAML file with `stream:` settings and a `mock_cameras:` inventory
    #[arg(long, global = true)]
    config: Option<String>,

    /// Camera backend
    #[arg(long, value_enum, default_value_t = Backend::Mock, global = true)]
    backend: Backend,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum Backend {
    Mock,
    Opencv,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum Strategy {
    LatestOnly,
    OneByOne,
}

impl From<Strategy> for GrabStrategy {
    fn from(s: Strategy) -> Self {
        match s {
            Strategy::LatestOnly => GrabStrategy::LatestImageOnly,
            Strategy::OneByOne => GrabStrategy::OneByOne,
        }
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List attached cameras
    List {
        /// Print descriptors as JSON
        #[arg(long, action = ArgAction::SetTrue)]
        json: bool,
    },
    /// List pixel format tags and how they are displayed
    Formats,
    /// Open a camera, grab a single frame and print its geometry
    Probe {
        /// Camera id as printed by `list`
        #[arg(long)]
        device: String,
    },
    /// Stream from a camera into the console sink
    Stream {
        /// Camera id as printed by `list`
        #[arg(long)]
        device: String,
        /// Stop after this many ticks (0 runs until interrupted)
        #[arg(long, default_value_t = 100u64)]
        ticks: u64,
        /// Tick interval override in milliseconds
        #[arg(long)]
        interval_ms: Option<u64>,
        /// Retrieve timeout override in milliseconds
        #[arg(long)]
        timeout_ms: Option<u64>,
        /// Preferred pixel format, repeatable, most preferred first
        #[arg(long = "prefer")]
        prefer: Vec<String>,
        /// Grab strategy override
        #[arg(long, value_enum)]
        strategy: Option<Strategy>,
        /// Print a line for every Nth delivered frame
        #[arg(long, default_value_t = 10u64)]
        every: u64,
        /// Print Prometheus metrics when done
        #[arg(long, action = ArgAction::SetTrue)]
        metrics: bool,
    },
}

/// Console stand-in for a display widget.
struct ConsoleSink {
    every: u64,
    seen: u64,
}

impl DisplaySink for ConsoleSink {
    fn present(&mut self, frame: DisplayFrame) {
        self.seen += 1;
        if self.every == 0 || self.seen % self.every != 0 {
            return;
        }
        let (w, h) = frame.fit_within(VIEWPORT.0, VIEWPORT.1);
        let mean = if frame.data.is_empty() {
            0.0
        } else {
            frame.data.iter().map(|&b| b as f64).sum::<f64>() / frame.data.len() as f64
        };
        println!(
            "frame {}: {}x{} -> {}x{} mean={:.1} ts={:?}",
            self.seen, frame.width, frame.height, w, h, mean, frame.ts
        );
    }
}

fn main() -> Result<()> {
    setup_tracing();
    let cli = Cli::parse();
    let cfg = match &cli.config {
        Some(path) => ViewerConfig::load(path)?,
        None => ViewerConfig::default(),
    };

    match cli.backend {
        Backend::Mock => dispatch(cli.command, cfg.mock_transport(), cfg.stream),
        Backend::Opencv => opencv_dispatch(cli.command, cfg.stream),
    }
}

#[cfg(feature = "opencv")]
fn opencv_dispatch(command: Commands, stream: StreamConfig) -> Result<()> {
    dispatch(command, camera_transport::OpenCvTransport, stream)
}

#[cfg(not(feature = "opencv"))]
fn opencv_dispatch(_command: Commands, _stream: StreamConfig) -> Result<()> {
    anyhow::bail!("OpenCV backend not enabled at compile time")
}

fn setup_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

fn dispatch<T: CameraTransport>(
    command: Commands,
    transport: T,
    stream: StreamConfig,
) -> Result<()> {
    match command {
        Commands::List { json } => list(transport, stream, json),
        Commands::Formats => formats(),
        Commands::Probe { device } => probe(transport, stream, &device),
        Commands::Stream {
            device,
            ticks,
            interval_ms,
            timeout_ms,
            prefer,
            strategy,
            every,
            metrics,
        } => {
            let mut stream = stream;
            if let Some(ms) = interval_ms {
                stream.tick_interval_ms = ms;
            }
            if let Some(ms) = timeout_ms {
                stream.retrieve_timeout_ms = ms;
            }
            if !prefer.is_empty() {
                stream.preferred_formats = parse_formats(&prefer)?;
            }
            if let Some(s) = strategy {
                stream.grab_strategy = s.into();
            }
            run_stream(transport, stream, &device, ticks, every, metrics)
        }
    }
}

fn parse_formats(tags: &[String]) -> Result<Vec<PixelFormat>> {
    tags.iter()
        .map(|t| t.parse::<PixelFormat>().map_err(anyhow::Error::msg))
        .collect()
}

fn list<T: CameraTransport>(transport: T, stream: StreamConfig, json: bool) -> Result<()> {
    let mut ctl = StreamController::new(transport, |_: DisplayFrame| {}, stream);
    let devices = ctl.list_devices().context("listing cameras")?;
    if json {
        println!("{}", serde_json::to_string_pretty(&devices)?);
        return Ok(());
    }
    if devices.is_empty() {
        println!("No cameras found.");
    }
    for d in &devices {
        println!("{}\t{}\t{}", d.id, d.transport, d.label());
    }
    Ok(())
}

fn formats() -> Result<()> {
    for fmt in PixelFormat::ALL {
        let shown = match fmt {
            PixelFormat::Mono8 | PixelFormat::Rgb8 | PixelFormat::Bgr8 | PixelFormat::Bgra8 => {
                "RGB8"
            }
            _ => "skipped",
        };
        println!("{}\t{} byte(s)/px\t{}", fmt, fmt.channels(), shown);
    }
    Ok(())
}

fn probe<T: CameraTransport>(transport: T, stream: StreamConfig, device: &str) -> Result<()> {
    let mut registry = DeviceRegistry::new();
    let descriptor = registry
        .enumerate(&transport)?
        .into_iter()
        .find(|d| d.id == device)
        .with_context(|| format!("no camera with id {device}"))?;

    let mut source = FrameSource::new(transport);
    source.open(&descriptor)?;
    let picked = source.configure(&stream.preferred_formats)?;
    source.start_grabbing(stream.grab_strategy)?;
    let started = Instant::now();
    let raw = source.retrieve(stream.retrieve_timeout())?;
    println!(
        "{}: {}x{} {} stride={} negotiated={} in {:?}",
        descriptor.label(),
        raw.width,
        raw.height,
        raw.pixel_format,
        raw.stride,
        picked.map_or_else(|| "device default".to_string(), |f| f.to_string()),
        started.elapsed()
    );
    let shown = live_stream::normalize(&raw);
    raw.release();
    match shown {
        Ok(frame) => println!("display: {}x{} RGB8", frame.width, frame.height),
        Err(e) => println!("display: {e}"),
    }
    source.close();
    Ok(())
}

fn run_stream<T: CameraTransport>(
    transport: T,
    stream: StreamConfig,
    device: &str,
    ticks: u64,
    every: u64,
    with_metrics: bool,
) -> Result<()> {
    let metrics = StreamMetrics::new().context("registering metrics")?;
    let sink = ConsoleSink { every, seen: 0 };
    let mut ctl = StreamController::new(transport, sink, stream).with_metrics(metrics.clone());
    ctl.on_status(|msg| eprintln!("status: {msg}"));

    ctl.list_devices()?;
    ctl.select_device(device)?;
    ctl.start_streaming()?;
    info!(device, ticks, "streaming");

    let mut count = 0u64;
    ctl.run(|outcome| {
        count += 1;
        if matches!(outcome, TickOutcome::Idle) {
            return false;
        }
        ticks == 0 || count < ticks
    });
    ctl.stop_streaming();

    println!(
        "ticks={} delivered={} timeouts={} faults={} skipped={}",
        count,
        metrics.frames_delivered.get(),
        metrics.grab_timeouts.get(),
        metrics.grab_faults.get(),
        metrics.frames_skipped.get()
    );
    if with_metrics {
        print!("{}", metrics.encode_text());
    }
    Ok(())
}
