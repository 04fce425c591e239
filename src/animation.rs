use std::f64::consts::PI;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, error, warn};

use crate::error::{Error, Result};
use crate::frame::ColorFrame;
use crate::pipeline::Strip;
use crate::transport::Transport;

/// Fewer frames than this and a breathe cycle turns into flashing
const MIN_BREATHE_FRAMES: usize = 6;

/// Longest cycle precomputed, about 36 minutes at 30 fps
const MAX_CYCLE_FRAMES: usize = 1 << 16;

fn frames_per_cycle(fps: u32, hz: f64) -> Result<usize> {
    if fps == 0 {
        return Err(Error::invalid_config("fps must be at least 1"));
    }
    if !(hz.is_finite() && hz > 0.0) {
        return Err(Error::invalid_config(format!("animation rate {} Hz is not positive", hz)));
    }
    let frames = f64::from(fps) / hz;
    if frames > MAX_CYCLE_FRAMES as f64 {
        return Err(Error::invalid_config(format!(
            "animation rate {} Hz at {} fps needs {:.0} frames per cycle, at most {} allowed",
            hz, fps, frames, MAX_CYCLE_FRAMES
        )));
    }
    Ok(frames as usize)
}

fn check_color(color: &[u8]) -> Result<()> {
    if color.is_empty() {
        return Err(Error::invalid_config("animation color has no channels"));
    }
    Ok(())
}

/// One cycle of `color` fading in and back out.
///
/// Starts and ends dark, full brightness half way through.
pub fn breathe(led_count: usize, color: &[u8], fps: u32, hz: f64) -> Result<Vec<ColorFrame>> {
    check_color(color)?;
    let mut frames = frames_per_cycle(fps, hz)?;
    if frames < MIN_BREATHE_FRAMES {
        warn!(frames, hz, fps, "breathe rate too fast, clipping");
        frames = MIN_BREATHE_FRAMES;
    }

    let mut cycle = Vec::with_capacity(frames);
    for i in 0..frames {
        let phase = PI + 2.0 * PI * i as f64 / (frames - 1) as f64;
        let level = (phase.cos() + 1.0) * 0.5;
        let scaled: Vec<u8> = color.iter().map(|&c| (f64::from(c) * level) as u8).collect();

        let mut frame = ColorFrame::new(led_count, color.len());
        frame.fill(&scaled)?;
        cycle.push(frame);
    }

    Ok(cycle)
}

/// A single lit pixel running along the strip once per cycle.
///
/// The cycle length is rounded up to a whole number of frames per LED.
/// `clockwise` runs from the far end back towards the first LED.
pub fn chase(led_count: usize, color: &[u8], fps: u32, hz: f64, clockwise: bool) -> Result<Vec<ColorFrame>> {
    check_color(color)?;
    let frames = frames_per_cycle(fps, hz)?;
    if led_count == 0 {
        return Ok(Vec::new());
    }

    let frames_per_led = frames.div_ceil(led_count).max(1);
    let frames = frames_per_led * led_count;
    debug!(frames, frames_per_led, "chase cycle");

    let mut cycle = Vec::with_capacity(frames);
    for f in 0..frames {
        let mut frame = ColorFrame::new(led_count, color.len());
        frame.set_pixel(f / frames_per_led, color)?;
        cycle.push(frame);
    }

    if clockwise {
        cycle.reverse();
    }
    Ok(cycle)
}

/// Plays a list of frames on a strip from a worker thread until stopped.
pub struct Animator<T: Transport + 'static> {
    running: Arc<AtomicBool>,
    frames_shown: Arc<AtomicU64>,
    handle: Option<thread::JoinHandle<(Strip<T>, Result<()>)>>,
}

impl<T: Transport + 'static> Animator<T> {
    pub fn start(mut strip: Strip<T>, frames: Vec<ColorFrame>, fps: u32) -> Result<Self> {
        if frames.is_empty() {
            return Err(Error::invalid_config("animation has no frames"));
        }
        if fps == 0 {
            return Err(Error::invalid_config("fps must be at least 1"));
        }

        let running = Arc::new(AtomicBool::new(true));
        let frames_shown = Arc::new(AtomicU64::new(0));

        let worker_running = Arc::clone(&running);
        let worker_frames_shown = Arc::clone(&frames_shown);
        let period = Duration::from_secs_f64(1.0 / f64::from(fps));

        debug!(frames = frames.len(), fps, "animation starting");
        let handle = thread::spawn(move || {
            let mut next = Instant::now();
            for frame in frames.iter().cycle() {
                if !worker_running.load(Ordering::Relaxed) {
                    break;
                }
                if let Err(e) = strip.show(frame) {
                    error!(error = %e, "animation stopped");
                    return (strip, Err(e));
                }
                worker_frames_shown.fetch_add(1, Ordering::Relaxed);

                next += period;
                let now = Instant::now();
                if next > now {
                    thread::sleep(next - now);
                } else {
                    // fell behind, do not try to catch up with a burst
                    next = now;
                }
            }
            (strip, Ok(()))
        });

        Ok(Animator {
            running,
            frames_shown,
            handle: Some(handle),
        })
    }

    /// False once stopped, or once a write failed
    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    pub fn frames_shown(&self) -> u64 {
        self.frames_shown.load(Ordering::Relaxed)
    }

    /// Stop the worker and get the strip back, with the error that ended
    /// the animation if there was one.
    pub fn stop(mut self) -> (Strip<T>, Result<()>) {
        self.running.store(false, Ordering::Relaxed);
        match self.handle.take().map(thread::JoinHandle::join) {
            Some(Ok(stopped)) => stopped,
            Some(Err(panic)) => std::panic::resume_unwind(panic),
            None => unreachable!("animator handle is only taken by stop"),
        }
    }
}

impl<T: Transport + 'static> Drop for Animator<T> {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}
