//! kms-scanout command line
//!
//! Binds an output on a DRM card, then either reports what was found or
//! pushes a generated frame through the same scanout path guest frames take.

use std::path::PathBuf;
use std::rc::Rc;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use drm::buffer::{Buffer, DrmFourcc, DrmModifier};
use drm::control::Device as ControlDevice;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use kms_scanout::scanout::SURFACE_FORMAT;
use kms_scanout::{
    bind, Config, DisplayHost, DisplayListener, DmaBuf, DrmCard, DrmDisplay, Rect, ScanoutState,
    Surface,
};

#[derive(Parser, Debug)]
#[command(name = "kms-scanout")]
#[command(about = "Present guest frames on a KMS output", long_about = None)]
struct Args {
    /// TOML config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// DRM card node, overrides the config file
    #[arg(long)]
    device: Option<PathBuf>,

    /// Enable verbose debug output
    #[arg(short, long)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Bind an output and list its connector, CRTC and modes
    Probe,
    /// Show colour bands on the bound output
    TestPattern {
        /// How long to keep the pattern on screen
        #[arg(long, default_value_t = 5)]
        seconds: u64,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = Config::load_or_default(args.config.as_deref())
        .context("Failed to load configuration")?;
    if let Some(device) = &args.device {
        config.device = device.clone();
    }

    let _guard = init_logging(&args, &config);
    info!(device = %config.device.display(), "kms-scanout starting");
    if let Some(path) = &args.config {
        info!("Loaded config from {}", path.display());
    }

    let card = DrmCard::open(&config.device)?;

    match args.command {
        Command::Probe => probe(&card),
        Command::TestPattern { seconds } => test_pattern(Rc::new(card), &config, seconds),
    }
}

fn init_logging(args: &Args, config: &Config) -> Option<WorkerGuard> {
    // Quiet by default, verbose with --debug
    let default_filter = if args.debug {
        "debug"
    } else {
        config.log.filter.as_deref().unwrap_or("warn,kms_scanout=info")
    };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let (file_layer, guard) = match &config.log.directory {
        Some(dir) => {
            let (non_blocking, guard) =
                tracing_appender::non_blocking(rolling::daily(dir, "kms-scanout.log"));
            let layer = fmt::layer().with_writer(non_blocking).with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .init();

    guard
}

fn probe(card: &DrmCard) -> Result<()> {
    let output = bind(card)?;
    let connector = output.connector();

    println!("Connector: {} ({:?})", connector.name, output.connector_id());
    println!("CRTC:      {:?}", output.crtc_id());
    println!("Modes:");
    for (i, mode) in output.modes().iter().enumerate() {
        let (width, height) = mode.size();
        println!(
            "  [{}] {}x{} @ {} Hz ({})",
            i,
            width,
            height,
            mode.vrefresh(),
            mode.name().to_string_lossy()
        );
    }

    Ok(())
}

/// Logs what the display reports back.
struct LogHost;

impl DisplayHost for LogHost {
    fn notify_presented(&mut self, region: Rect) {
        info!("Presented {}x{} at ({}, {})", region.width, region.height, region.x, region.y);
    }

    fn request_update(&mut self) {}
}

fn test_pattern(card: Rc<DrmCard>, config: &Config, seconds: u64) -> Result<()> {
    let mut display = DrmDisplay::new(Rc::clone(&card), LogHost, config)?;
    let mode = display
        .output()
        .mode()
        .context("Connector advertises no modes")?;
    let (width, height) = mode.size();
    let (width, height) = (u32::from(width), u32::from(height));

    let mut buffer = card
        .create_dumb_buffer((width, height), DrmFourcc::Xrgb8888, 32)
        .context("Failed to allocate dumb buffer")?;
    let pitch = buffer.pitch();
    {
        let mut mapping = card
            .map_dumb_buffer(&mut buffer)
            .context("Failed to map dumb buffer")?;
        fill_colour_bands(mapping.as_mut(), width, pitch);
    }

    let fd = card
        .buffer_to_prime_fd(buffer.handle(), (libc::O_CLOEXEC | libc::O_RDWR) as u32)
        .context("Failed to export dumb buffer")?;
    let dmabuf = DmaBuf {
        fd,
        width,
        height,
        fourcc: DrmFourcc::Xrgb8888,
        stride: pitch,
        modifier: DrmModifier::Linear,
    };

    display.surface_changed(Some(Surface {
        width,
        height,
        format: SURFACE_FORMAT,
    }));
    display.scanout_dmabuf(&dmabuf);
    display.flush(Rect::new(0, 0, width, height));

    if display.driver().state() == ScanoutState::Presenting {
        info!("Showing test pattern for {}s", seconds);
        thread::sleep(Duration::from_secs(seconds));
    } else {
        warn!("Test pattern was not presented");
    }

    if let Some(fb) = display.output().framebuffer() {
        display.release_dmabuf(fb);
    }
    display.scanout_disable();
    drop(dmabuf);

    card.destroy_dumb_buffer(buffer)
        .context("Failed to free dumb buffer")?;

    Ok(())
}

/// Vertical red, green, blue and white bands in XRGB8888.
fn fill_colour_bands(pixels: &mut [u8], width: u32, pitch: u32) {
    // B, G, R, X byte order
    const BANDS: [[u8; 4]; 4] = [
        [0x00, 0x00, 0xff, 0x00],
        [0x00, 0xff, 0x00, 0x00],
        [0xff, 0x00, 0x00, 0x00],
        [0xff, 0xff, 0xff, 0x00],
    ];

    let width = width as usize;
    for row in pixels.chunks_exact_mut(pitch as usize) {
        for (x, pixel) in row[..width * 4].chunks_exact_mut(4).enumerate() {
            pixel.copy_from_slice(&BANDS[x * BANDS.len() / width]);
        }
    }
}
