use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use spi_ws2812::animation::{self, Animator};
use spi_ws2812::frame::channel_value;
use spi_ws2812::{transport, ColorFrame, Config, FrameEncoder, Strip, TimingModel, Transport};

#[derive(Parser)]
#[command(name = "spi_ws2812")]
#[command(about = "Drive a WS2812 LED strip from a SPI or serial device", long_about = None)]
struct Cli {
    /// Path to configuration file (JSON)
    config: String,

    /// Enable debug output (statistics)
    #[arg(long)]
    debug: bool,

    /// Enable detailed debug (hex dumps every frame)
    #[arg(long)]
    ddebug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the serial encoding derived from the timing configuration
    Timing {
        /// Check that every table entry decodes back to its byte
        #[arg(long)]
        verify: bool,
    },
    /// Set every LED to one color, e.g. "255,0,0"
    Fill { color: String },
    /// Turn every LED off
    Clear,
    /// Fade a color in and out until Ctrl-C
    Breathe {
        color: String,
        /// Cycles per second
        #[arg(long, default_value_t = 1.0)]
        hz: f64,
    },
    /// Run a single lit LED along the strip until Ctrl-C
    Chase {
        color: String,
        /// Trips along the strip per second
        #[arg(long, default_value_t = 1.0)]
        hz: f64,
        /// Run from the first LED outwards
        #[arg(long)]
        reverse: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // ddebug implies debug
    let level = if cli.ddebug {
        "trace"
    } else if cli.debug {
        "debug"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .init();

    let config = Config::load(&cli.config).context(format!("Failed to load {}", cli.config))?;
    let model = TimingModel::build(&config.timing).context("Timing cannot be met")?;

    let channels = config.strip.channels_per_pixel;
    let fps = config.animation.fps;
    let led_count = config.strip.led_count;

    match cli.command {
        Command::Timing { verify } => print_timing(&config, &model, verify)?,
        Command::Clear => open_strip(&config, &model)?.clear()?,
        Command::Fill { color } => {
            let color = parse_color(&color, channels)?;
            let mut strip = open_strip(&config, &model)?;
            let mut frame = strip.new_frame();
            frame.fill(&color)?;
            strip.show(&frame)?;
        }
        Command::Breathe { color, hz } => {
            let frames = animation::breathe(led_count, &parse_color(&color, channels)?, fps, hz)?;
            animate(open_strip(&config, &model)?, frames, fps)?;
        }
        Command::Chase { color, hz, reverse } => {
            let frames = animation::chase(led_count, &parse_color(&color, channels)?, fps, hz, !reverse)?;
            animate(open_strip(&config, &model)?, frames, fps)?;
        }
    }

    Ok(())
}

fn open_strip(config: &Config, model: &TimingModel) -> Result<Strip<Box<dyn Transport>>> {
    let encoder = FrameEncoder::from_model(model, config.channel_order()?, config.strip.led_count)?;
    let port = transport::open(&config.output, model.clock_hz())
        .context(format!("Failed to open {}", config.output.device()))?;
    Ok(Strip::new(encoder, port))
}

fn print_timing(config: &Config, model: &TimingModel, verify: bool) -> Result<()> {
    let encoder = FrameEncoder::from_model(model, config.channel_order()?, config.strip.led_count)?;

    println!("clock:          {} Hz ({:.1} ns per bit)", model.clock_hz(), model.bit_period_ns());
    println!("ratio:          {} bits per protocol bit", model.ratio());
    for (name, pattern) in [("zero", model.zero()), ("one", model.one())] {
        println!(
            "{:<15} {} (high {:.0} ns, low {:.0} ns)",
            format!("{}:", name),
            pattern,
            model.high_ns(pattern),
            model.low_ns(pattern)
        );
    }
    println!("reset padding:  {} bytes", model.reset_padding_len());
    println!("channel order:  {}", encoder.order());
    println!("frame length:   {} bytes for {} LEDs", encoder.buffer_len(), encoder.led_count());

    if verify {
        let table = encoder.table();
        let bad: Vec<u8> = (0..=255u8)
            .filter(|&value| table.decode(table.entry(value)) != Some(value))
            .collect();
        if !bad.is_empty() {
            bail!("{} table entries do not decode: {:?}", bad.len(), bad);
        }
        println!("table:          all 256 entries decode");
    }

    Ok(())
}

/// Parse "R,G,B" (or "R,G,B,W"), rejecting values outside 0-255
fn parse_color(text: &str, channels: usize) -> Result<Vec<u8>> {
    let values = text
        .split(',')
        .map(|part| {
            let value: i64 = part
                .trim()
                .parse()
                .context(format!("'{}' is not a number", part.trim()))?;
            Ok(channel_value(value)?)
        })
        .collect::<Result<Vec<u8>>>()?;

    if values.len() != channels {
        bail!("color '{}' has {} channels, strip has {}", text, values.len(), channels);
    }
    Ok(values)
}

/// Play frames until Ctrl-C, then turn the strip off
fn animate<T: Transport + 'static>(strip: Strip<T>, frames: Vec<ColorFrame>, fps: u32) -> Result<()> {
    let running = Arc::new(AtomicBool::new(true));
    let handler_running = Arc::clone(&running);
    if let Err(e) = ctrlc::set_handler(move || {
        handler_running.store(false, Ordering::Relaxed);
    }) {
        warn!("Could not set Ctrl-C handler: {}", e);
    }

    let animator = Animator::start(strip, frames, fps)?;
    info!("Animating at {} fps (press Ctrl-C to stop)", fps);

    let mut last_report = Instant::now();
    let mut last_shown = 0;
    while running.load(Ordering::Relaxed) && animator.is_running() {
        thread::sleep(Duration::from_millis(100));

        if last_report.elapsed() >= Duration::from_secs(5) {
            let shown = animator.frames_shown();
            let rate = (shown - last_shown) as f64 / last_report.elapsed().as_secs_f64();
            debug!("[Stats] Shown: {:.1} fps", rate);
            last_shown = shown;
            last_report = Instant::now();
        }
    }

    let (mut strip, result) = animator.stop();
    info!("Turning off LEDs...");
    let cleared = strip.clear();
    result?;
    cleared?;

    Ok(())
}
