//! Drive WS2812 style LED strips from a SPI (or serial) peripheral.
//!
//! Every protocol bit is sent as a short run of serial bits whose high and
//! low parts match the LED timing. The run for each byte value is looked up
//! in a table built once, and a frame is the table entries of all channels
//! followed by enough zero bytes to latch.
//!
//! ```no_run
//! use spi_ws2812::config::OutputConfig;
//! use spi_ws2812::{transport, FrameEncoder, Strip, TimingConfig, TimingModel};
//!
//! # fn main() -> spi_ws2812::Result<()> {
//! let model = TimingModel::build(&TimingConfig::ws2812b(2_400_000))?;
//! let encoder = FrameEncoder::from_model(&model, "GRB".parse()?, 60)?;
//! let output = OutputConfig::Spidev {
//!     device: "/dev/spidev1.0".into(),
//! };
//! let mut strip = Strip::new(encoder, transport::open(&output, model.clock_hz())?);
//!
//! let mut frame = strip.new_frame();
//! frame.set_pixel(0, &[255, 0, 0])?;
//! strip.show(&frame)?;
//! # Ok(())
//! # }
//! ```

pub mod animation;
pub mod config;
pub mod encoder;
pub mod error;
pub mod frame;
pub mod pipeline;
pub mod pixel_format;
pub mod table;
pub mod timing;
pub mod transport;

pub use config::{Config, TimingConfig};
pub use encoder::{FrameEncoder, OutputBuffer};
pub use error::{Error, Result, TransportError};
pub use frame::ColorFrame;
pub use pipeline::{FrameState, Pipeline, Strip};
pub use pixel_format::ChannelOrder;
pub use table::LookupTable;
pub use timing::{BitPattern, TimingModel};
pub use transport::Transport;
